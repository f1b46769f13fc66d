//! Chained operations on a session
//!
//! While a client is connected, CANape is locked for interactive use. An [ActionBuilder]
//! collects the operations to execute so that a session can be opened, used and closed
//! in one go with [ActionBuilder::run_session], keeping the time CANape is locked short.
//!
//! ```no_run
//! # fn run(driver: std::sync::Arc<dyn canape_asap3::driver::Asap3Driver>) -> canape_asap3::CanapeResult<()> {
//! use canape_asap3::{action::ActionBuilder, canape::CanapeOptions};
//!
//! ActionBuilder::new(|canape| canape.start_data_acquisition())
//!     .also(|canape| canape.stop_data_acquisition())
//!     .run_session(driver, CanapeOptions::new("C:\\Projects\\Demo"), true)?;
//! # Ok(())
//! # }
//! ```

use std::{fmt, sync::Arc};

use crate::{
    CanapeResult,
    canape::{Canape, CanapeOptions},
    driver::Asap3Driver,
};

type Action = Arc<dyn Fn(&Canape) -> CanapeResult<()> + Send + Sync>;

/// Chain of operations executed on one session
#[derive(Clone)]
pub struct ActionBuilder {
    actions: Vec<Action>,
}

impl fmt::Debug for ActionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBuilder").field("actions", &self.actions.len()).finish()
    }
}

impl Default for ActionBuilder {
    fn default() -> Self {
        Self { actions: Vec::new() }
    }
}

impl ActionBuilder {
    /// Starts a chain with `action`
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&Canape) -> CanapeResult<()> + Send + Sync + 'static,
    {
        Self::default().also(action)
    }

    /// Appends `action` to the chain
    pub fn also<F>(mut self, action: F) -> Self
    where
        F: Fn(&Canape) -> CanapeResult<()> + Send + Sync + 'static,
    {
        self.actions.push(Arc::new(action));
        self
    }

    /// Appends all operations of `other`
    pub fn then(mut self, other: ActionBuilder) -> Self {
        self.actions.extend(other.actions);
        self
    }

    /// Executes the chain on an open session. The chain holds the call lock of the driver,
    /// so calls from other threads are not interleaved. The first error ends the chain
    pub fn run(&self, canape: &Canape) -> CanapeResult<()> {
        let _guard = canape.driver().call_lock().lock();
        log::debug!("Running {} action(s)", self.actions.len());
        self.actions.iter().try_for_each(|action| action(canape))
    }

    /// Opens a session, executes the chain and exits the session, also when the chain failed.
    /// CANape is closed on exit if `close_canape` is true
    pub fn run_session(&self, driver: Arc<dyn Asap3Driver>, options: CanapeOptions, close_canape: bool) -> CanapeResult<()> {
        let canape = Canape::new(driver, options)?;
        let res = self.run(&canape);
        let exit = canape.exit(close_canape);
        res.and(exit)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{CanapeError, constants::ErrorCode, driver::SimulatedCanape};

    #[test]
    fn chain_runs_in_order() {
        let sim = Arc::new(SimulatedCanape::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let (c1, c2) = (calls.clone(), calls.clone());
        ActionBuilder::new(move |_| {
            assert_eq!(c1.fetch_add(1, Ordering::SeqCst), 0);
            Ok(())
        })
        .also(move |canape| {
            assert_eq!(c2.fetch_add(1, Ordering::SeqCst), 1);
            canape.set_interactive_mode(true)
        })
        .run_session(sim.clone(), CanapeOptions::new("demo"), false)
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(sim.interactive_mode());
        assert_eq!(sim.session_count(), 0);
    }

    #[test]
    fn first_error_ends_the_chain() {
        let sim = Arc::new(SimulatedCanape::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let res = ActionBuilder::new(|canape| canape.stop_data_acquisition())
            .also(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .run_session(sim.clone(), CanapeOptions::new("demo"), true);
        assert!(matches!(res, Err(CanapeError::Api { name: Some(ErrorCode::AcquisNotStarted), .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(sim.session_count(), 0);
    }
}
