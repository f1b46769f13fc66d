//! ECU tasks and data acquisition channels

use std::sync::Arc;

use crate::{
    CanapeResult,
    canape::Session,
    constants::Format,
    driver::{ModuleHandle, RawSample, TaskInfo},
};

/// Value of one channel in a sample
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Timestamp in ticks of 10 µs
    pub timestamp: f64,
    /// Physical value
    pub value: f64,
}

impl Sample {
    /// Sample of a channel which has not received a value
    pub const EMPTY: Sample = Sample { timestamp: f64::NAN, value: f64::NAN };

    /// Timestamp in seconds
    pub fn seconds(&self) -> f64 {
        self.timestamp * 1e-5
    }

    /// True if no value was received
    pub fn is_empty(&self) -> bool {
        self.value.is_nan()
    }
}

fn to_samples(raw: RawSample) -> Vec<Sample> {
    let timestamp = f64::from(raw.timestamp);
    raw.values.into_iter().map(|value| Sample { timestamp, value }).collect()
}

/// A task (raster) of an ECU, used for data acquisition.
///
/// Tasks are returned by [crate::module::Module::get_ecu_tasks]
#[derive(Debug, Clone)]
pub struct EcuTask {
    session: Arc<Session>,
    module: ModuleHandle,
    info: TaskInfo,
}

impl EcuTask {
    pub(crate) fn new(session: Arc<Session>, module: ModuleHandle, info: TaskInfo) -> Self {
        Self { session, module, info }
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Module the task belongs to
    pub fn module_handle(&self) -> ModuleHandle {
        self.module
    }

    /// Task description
    pub fn description(&self) -> &str {
        &self.info.description
    }

    /// Task ID
    pub fn task_id(&self) -> u16 {
        self.info.task_id
    }

    /// Cycle time in ms, 0 for event driven tasks
    pub fn task_cycle(&self) -> u32 {
        self.info.task_cycle
    }

    /// XCP event channel
    pub fn event_channel(&self) -> u32 {
        self.info.event_channel
    }

    /// Adds a measurement object to the data acquisition of this task.
    ///
    /// `polling_rate` is only used for polled tasks. With `save_to_file` the
    /// channel is also written to the measurement file
    pub fn daq_setup_channel(&self, measurement_object_name: &str, polling_rate: u16, save_to_file: bool) -> CanapeResult<()> {
        self.session.driver.setup_data_acquisition_channel(
            self.session.hdl,
            self.module,
            measurement_object_name,
            Format::PhysicalRepresentation,
            self.info.task_id,
            polling_rate,
            save_to_file,
        )
    }

    /// Checks the FIFO of the task for an overrun, optionally resetting the overrun state
    pub fn daq_check_overrun(&self, reset_overrun: bool) -> CanapeResult<()> {
        self.session
            .driver
            .check_overrun(self.session.hdl, self.module, self.info.task_id, reset_overrun)
    }

    /// Number of samples waiting in the FIFO
    pub fn daq_get_fifo_level(&self) -> CanapeResult<u32> {
        self.session.driver.get_fifo_level(self.session.hdl, self.module, self.info.task_id)
    }

    /// Takes the next sample from the FIFO. `count` is the number of channels of the task,
    /// the result has one [Sample] per channel in setup order
    pub fn daq_get_next_sample(&self, count: usize) -> CanapeResult<Vec<Sample>> {
        let raw = self
            .session
            .driver
            .get_next_sample(self.session.hdl, self.module, self.info.task_id, count)?;
        Ok(to_samples(raw))
    }

    /// Current values of the channels, without taking them from the FIFO
    pub fn daq_get_current_values(&self, count: usize) -> CanapeResult<Vec<Sample>> {
        let raw = self
            .session
            .driver
            .get_current_values(self.session.hdl, self.module, self.info.task_id, count)?;
        Ok(to_samples(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sample() {
        assert!(Sample::EMPTY.is_empty());
        assert!(Sample::EMPTY.timestamp.is_nan());
        let s = Sample { timestamp: 150_000.0, value: 1.0 };
        assert!(!s.is_empty());
        assert!((s.seconds() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn raw_samples_share_the_timestamp() {
        let samples = to_samples(RawSample { timestamp: 42, values: vec![1.0, f64::NAN] });
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], Sample { timestamp: 42.0, value: 1.0 });
        assert!(samples[1].is_empty());
    }
}
