//! Background reader of the data acquisition FIFO
//!
//! A [FifoReader] follows the CANape measurement: when the measurement starts it spawns a
//! thread which drains the FIFO of its [EcuTask] every `refresh_rate`, and when the
//! measurement stops the thread is joined. The last sample of every channel is kept and
//! can be read from any thread.
//!
//! ```no_run
//! # fn run(canape: &canape_asap3::canape::Canape, module: &canape_asap3::module::Module) -> canape_asap3::CanapeResult<()> {
//! use canape_asap3::daq::FifoReader;
//!
//! let tasks = module.get_ecu_tasks()?;
//! let task = tasks["100ms"].clone();
//! let reader = FifoReader::new(task);
//! reader.add_channel("channel1", 1, false)?;
//! canape.start_data_acquisition()?;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! println!("channel1 = {:?}", reader.get_value("channel1"));
//! canape.stop_data_acquisition()?;
//! # Ok(())
//! # }
//! ```

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    CanapeError, CanapeResult,
    constants::{ErrorCode, EventCode},
    ecu_task::{EcuTask, Sample},
    events::CallbackId,
};

/// Default interval between two reads of the FIFO
pub const DEFAULT_REFRESH_RATE: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct ReaderState {
    task: EcuTask,
    refresh_rate: Duration,
    /// Last sample per channel, in setup order
    channels: Mutex<Vec<(String, Sample)>>,
    stopped: AtomicBool,
    /// Set on start, the overrun flag is reset with the first drain
    reset_pending: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    error: Mutex<Option<CanapeError>>,
}

impl ReaderState {
    fn start(self: &Arc<Self>) {
        self.stop();
        log::debug!("Starting FIFO reader of task {}", self.task.description());
        self.reset_pending.store(true, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        let state = self.clone();
        let handle = thread::spawn(move || state.read_fifo());
        *self.worker.lock() = Some(handle);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(h) = handle {
            if h.thread().id() != thread::current().id() && h.join().is_err() {
                log::error!("FIFO reader of task {} panicked", self.task.description());
            }
        }
    }

    fn read_fifo(&self) {
        while !self.stopped.load(Ordering::SeqCst) {
            if let Err(e) = self.drain().or_else(ignore_empty) {
                log::error!("FIFO reader of task {} stopped: {e}", self.task.description());
                self.stopped.store(true, Ordering::SeqCst);
                *self.error.lock() = Some(e);
                return;
            }
            thread::sleep(self.refresh_rate);
        }
    }

    /// Reads every sample currently in the FIFO. Does nothing if the call lock
    /// is held by another thread for longer than one refresh interval
    fn drain(&self) -> CanapeResult<()> {
        // The call lock is taken before the channel table, as in `add_channel`
        let call_lock = self.task.session().driver.call_lock();
        let Some(_call) = call_lock.try_lock_for(self.refresh_rate) else {
            return Ok(());
        };
        if self.reset_pending.swap(false, Ordering::SeqCst) {
            self.task.daq_check_overrun(true).or_else(ignore_empty)?;
        }
        let mut channels = self.channels.lock();
        self.task.daq_check_overrun(false)?;
        let level = self.task.daq_get_fifo_level()?;
        for _ in 0..level {
            let samples = self.task.daq_get_next_sample(channels.len())?;
            for ((_, last), sample) in channels.iter_mut().zip(samples) {
                if !sample.value.is_nan() {
                    *last = sample;
                }
            }
        }
        Ok(())
    }
}

fn ignore_empty(e: CanapeError) -> CanapeResult<()> {
    if e.error_code() == Some(ErrorCode::NoValuesSampled) {
        Ok(())
    } else {
        Err(e)
    }
}

/// Keeps the last sample of the channels of an [EcuTask] while the measurement runs
#[derive(Debug)]
pub struct FifoReader {
    state: Arc<ReaderState>,
    on_start: CallbackId,
    on_stop: CallbackId,
}

impl FifoReader {
    /// Creates a reader for `task`, reading the FIFO every [DEFAULT_REFRESH_RATE]
    pub fn new(task: EcuTask) -> Self {
        Self::with_refresh_rate(task, DEFAULT_REFRESH_RATE)
    }

    /// Creates a reader for `task`, reading the FIFO every `refresh_rate`
    pub fn with_refresh_rate(task: EcuTask, refresh_rate: Duration) -> Self {
        let state = Arc::new(ReaderState {
            task,
            refresh_rate,
            channels: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(true),
            reset_pending: AtomicBool::new(false),
            worker: Mutex::new(None),
            error: Mutex::new(None),
        });
        let registry = state.task.session().registry.clone();
        let weak: Weak<ReaderState> = Arc::downgrade(&state);
        let on_start = registry.register(EventCode::OnDataAcqStart, move || {
            if let Some(s) = weak.upgrade() {
                s.start()
            }
        });
        let weak: Weak<ReaderState> = Arc::downgrade(&state);
        let on_stop = registry.register(EventCode::OnDataAcqStop, move || {
            if let Some(s) = weak.upgrade() {
                s.stop()
            }
        });
        Self { state, on_start, on_stop }
    }

    /// Task the reader drains
    pub fn task(&self) -> &EcuTask {
        &self.state.task
    }

    /// Adds a channel and sets it up for data acquisition. Adding a channel twice has no effect.
    ///
    /// Channels can only be set up while the measurement is stopped
    pub fn add_channel(&self, channel_name: &str, polling_rate: u16, save_to_file: bool) -> CanapeResult<()> {
        let _call = self.state.task.session().driver.call_lock().lock();
        let mut channels = self.state.channels.lock();
        if channels.iter().any(|(name, _)| name == channel_name) {
            return Ok(());
        }
        self.state.task.daq_setup_channel(channel_name, polling_rate, save_to_file)?;
        channels.push((channel_name.to_string(), Sample::EMPTY));
        Ok(())
    }

    /// Forgets all channels. The channels set up in CANape are not changed
    pub fn clear_channels(&self) {
        self.state.channels.lock().clear()
    }

    /// Names of the channels, in the order they were added
    pub fn channel_names(&self) -> Vec<String> {
        self.state.channels.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Last sample of a channel. [Sample::EMPTY] until a value was received,
    /// `None` for unknown channels
    pub fn get_sample(&self, channel_name: &str) -> Option<Sample> {
        self.state
            .channels
            .lock()
            .iter()
            .find(|(name, _)| name == channel_name)
            .map(|(_, sample)| *sample)
    }

    /// Last value of a channel
    pub fn get_value(&self, channel_name: &str) -> Option<f64> {
        self.get_sample(channel_name).map(|s| s.value)
    }

    /// True while the reader thread is running
    pub fn is_running(&self) -> bool {
        !self.state.stopped.load(Ordering::SeqCst)
    }

    /// Error which stopped the reader thread, if any
    pub fn take_error(&self) -> Option<CanapeError> {
        self.state.error.lock().take()
    }
}

impl Drop for FifoReader {
    fn drop(&mut self) {
        self.state.stop();
        let registry = &self.state.task.session().registry;
        registry.unregister(EventCode::OnDataAcqStart, self.on_start);
        registry.unregister(EventCode::OnDataAcqStop, self.on_stop);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fifo_is_not_an_error() {
        assert!(ignore_empty(CanapeError::from_code(17, "Asap3GetNextSample")).is_ok());
        let err = ignore_empty(CanapeError::from_code(37, "Asap3CheckOverrun")).unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::AcqStpOverflow));
        assert!(ignore_empty(CanapeError::NotWritable("x".into())).is_err());
    }
}
