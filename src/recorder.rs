//! Measurement recorders

use std::{path::Path, sync::Arc};

use crate::{
    CanapeResult,
    canape::Session,
    constants::RecorderState,
    driver::RecorderId,
};

/// A recorder of the CANape measurement.
///
/// Recorders are returned by [crate::canape::Canape::define_recorder],
/// [crate::canape::Canape::get_recorder_by_index] and [crate::canape::Canape::get_selected_recorder]
#[derive(Debug, Clone)]
pub struct Recorder {
    session: Arc<Session>,
    id: RecorderId,
}

impl Recorder {
    pub(crate) fn new(session: Arc<Session>, id: RecorderId) -> Self {
        Self { session, id }
    }

    /// Identifier of the recorder
    pub fn id(&self) -> RecorderId {
        self.id
    }

    /// Name of the recorder
    pub fn get_name(&self) -> CanapeResult<String> {
        self.session.driver.get_recorder_name(self.session.hdl, self.id)
    }

    /// State of the recorder
    pub fn get_state(&self) -> CanapeResult<RecorderState> {
        self.session.driver.get_recorder_state(self.session.hdl, self.id)
    }

    /// True if the recorder is enabled
    pub fn is_enabled(&self) -> CanapeResult<bool> {
        self.session.driver.is_recorder_enabled(self.session.hdl, self.id)
    }

    /// Enables the recorder
    pub fn enable(&self) -> CanapeResult<()> {
        self.session.driver.enable_recorder(self.session.hdl, self.id, true)
    }

    /// Disables the recorder
    pub fn disable(&self) -> CanapeResult<()> {
        self.session.driver.enable_recorder(self.session.hdl, self.id, false)
    }

    /// Output file of the recorder
    pub fn get_mdf_filename(&self) -> CanapeResult<String> {
        self.session.driver.get_recorder_mdf_filename(self.session.hdl, self.id)
    }

    /// Sets the output file of the recorder
    pub fn set_mdf_filename<P: AsRef<Path>>(&self, filename: P) -> CanapeResult<()> {
        let filename = filename.as_ref().to_string_lossy();
        self.session
            .driver
            .set_recorder_mdf_filename(self.session.hdl, self.id, &filename)
    }

    /// Starts recording. The measurement must be running
    pub fn start(&self) -> CanapeResult<()> {
        self.session.driver.start_recorder(self.session.hdl, self.id)
    }

    /// Stops recording. With `save_to_mdf` the recorded data is written to the output file
    pub fn stop(&self, save_to_mdf: bool) -> CanapeResult<()> {
        self.session.driver.stop_recorder(self.session.hdl, self.id, save_to_mdf)
    }

    /// Pauses or resumes recording
    pub fn pause(&self, pause: bool) -> CanapeResult<()> {
        self.session.driver.pause_recorder(self.session.hdl, self.id, pause)
    }
}
