//! Event callbacks of a CANape session
//!
//! CANape reports events (start and stop of the measurement, project changes, ...) through
//! callbacks registered with `Asap3RegisterCallBack`. A session registers all [EventCode]s
//! when it is created and routes them to its [CallbackRegistry]. Drivers deliver events with
//! [dispatch], which looks up the registry of the session owning the handle.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, LazyLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;

use crate::{constants::EventCode, driver::Asap3Handle};

/// Callback function invoked for an event
pub type EventCallback = Arc<dyn Fn() + Send + Sync>;

/// Identifier of a registered callback, used to unregister it
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

/// Callbacks of one session, per event code
pub struct CallbackRegistry {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<EventCode, Vec<(CallbackId, EventCallback)>>>,
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks = self.callbacks.lock();
        let counts: HashMap<EventCode, usize> = callbacks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("CallbackRegistry").field("callbacks", &counts).finish()
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a callback for `event`. Callbacks of an event run in registration order
    pub fn register<F>(&self, event: EventCode, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks
            .lock()
            .entry(event)
            .or_default()
            .push((id, Arc::new(callback)));
        log::debug!("Registered callback {id:?} for {event}");
        id
    }

    /// Removes a callback. Returns false if it was not registered for `event`
    pub fn unregister(&self, event: EventCode, id: CallbackId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let Some(list) = callbacks.get_mut(&event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(cid, _)| *cid != id);
        before != list.len()
    }

    /// Number of callbacks registered for `event`
    pub fn count(&self, event: EventCode) -> usize {
        self.callbacks.lock().get(&event).map(Vec::len).unwrap_or(0)
    }

    /// Runs all callbacks of `event`.
    ///
    /// The callbacks are called after the registry lock is released, so a callback
    /// may register or unregister callbacks itself.
    pub fn fire(&self, event: EventCode) {
        let to_call: Vec<EventCallback> = self
            .callbacks
            .lock()
            .get(&event)
            .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default();
        log::debug!("Event {event}, {} callback(s)", to_call.len());
        for cb in to_call {
            cb()
        }
    }
}

static SESSIONS: LazyLock<Mutex<HashMap<Asap3Handle, Weak<CallbackRegistry>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Routes events of `hdl` to `registry`
pub(crate) fn attach(hdl: Asap3Handle, registry: &Arc<CallbackRegistry>) {
    SESSIONS.lock().insert(hdl, Arc::downgrade(registry));
}

/// Stops routing events of `hdl` to `registry`. A newer session reusing the handle keeps its route
pub(crate) fn detach(hdl: Asap3Handle, registry: &Arc<CallbackRegistry>) {
    let mut sessions = SESSIONS.lock();
    if sessions.get(&hdl).is_some_and(|r| r.ptr_eq(&Arc::downgrade(registry))) {
        sessions.remove(&hdl);
    }
}

/// Delivers an event reported by the library for session `hdl`.
///
/// `private_data` is the value given at registration, which is the event code.
/// Returns false if the event is unknown or no session owns the handle.
pub fn dispatch(hdl: Asap3Handle, private_data: u64) -> bool {
    let Some(event) = u32::try_from(private_data).ok().and_then(EventCode::from_repr) else {
        log::warn!("Ignoring unknown event {private_data} for session {hdl:?}");
        return false;
    };
    let registry = SESSIONS.lock().get(&hdl).and_then(Weak::upgrade);
    match registry {
        Some(r) => {
            r.fire(event);
            true
        }
        None => {
            log::warn!("Event {event} for unknown session {hdl:?}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn register_fire_unregister() {
        let reg = CallbackRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let id = reg.register(EventCode::OnDataAcqStart, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        reg.fire(EventCode::OnDataAcqStart);
        reg.fire(EventCode::OnDataAcqStop);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!reg.unregister(EventCode::OnDataAcqStop, id));
        assert!(reg.unregister(EventCode::OnDataAcqStart, id));
        reg.fire(EventCode::OnDataAcqStart);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callbacks_can_modify_the_registry() {
        let reg = Arc::new(CallbackRegistry::new());
        let r = reg.clone();
        reg.register(EventCode::OnOpenProject, move || {
            r.register(EventCode::OnCloseProject, || {});
        });
        reg.fire(EventCode::OnOpenProject);
        assert_eq!(reg.count(EventCode::OnCloseProject), 1);
    }

    #[test]
    fn dispatch_by_handle() {
        let hdl = Asap3Handle(0xDEAD_0001);
        let reg = Arc::new(CallbackRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        reg.register(EventCode::OnCloseCanape, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!dispatch(hdl, EventCode::OnCloseCanape as u64));
        attach(hdl, &reg);
        assert!(dispatch(hdl, EventCode::OnCloseCanape as u64));
        assert!(!dispatch(hdl, 42));
        detach(hdl, &reg);
        assert!(!dispatch(hdl, EventCode::OnCloseCanape as u64));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_keeps_a_newer_route() {
        let hdl = Asap3Handle(0xDEAD_0002);
        let old = Arc::new(CallbackRegistry::new());
        let new = Arc::new(CallbackRegistry::new());
        attach(hdl, &old);
        attach(hdl, &new);
        detach(hdl, &old);
        assert!(dispatch(hdl, EventCode::OnDataAcqStart as u64));
        detach(hdl, &new);
        assert!(!dispatch(hdl, EventCode::OnDataAcqStart as u64));
    }
}
