//! CASL scripts

use std::sync::Arc;

use crate::{
    CanapeResult,
    canape::Session,
    constants::ScriptStatus,
    driver::{ModuleHandle, ScriptHandle},
};

/// A script declared with [crate::module::Module::execute_script_ex]
#[derive(Debug, Clone)]
pub struct Script {
    session: Arc<Session>,
    handle: ScriptHandle,
}

impl Script {
    pub(crate) fn new(session: Arc<Session>, handle: ScriptHandle) -> Self {
        Self { session, handle }
    }

    /// Handle of the script
    pub fn handle(&self) -> ScriptHandle {
        self.handle
    }

    /// State of the script
    pub fn get_script_state(&self) -> CanapeResult<ScriptStatus> {
        self.session.driver.get_script_state(self.session.hdl, self.handle)
    }

    /// Starts the script
    pub fn start_script(&self) -> CanapeResult<()> {
        self.start_script_with(None, None)
    }

    /// Starts the script with a command line, in the context of `module`
    pub fn start_script_with(&self, command_line: Option<&str>, module: Option<ModuleHandle>) -> CanapeResult<()> {
        self.session
            .driver
            .start_script(self.session.hdl, self.handle, command_line, module)
    }

    /// Stops the script
    pub fn stop_script(&self) -> CanapeResult<()> {
        self.session.driver.stop_script(self.session.hdl, self.handle)
    }

    /// Removes the script from CANape
    pub fn release_script(&self) -> CanapeResult<()> {
        self.session.driver.release_script(self.session.hdl, self.handle)
    }

    /// Numeric result of a finished script
    pub fn get_script_result_value(&self) -> CanapeResult<f64> {
        self.session.driver.get_script_result_value(self.session.hdl, self.handle)
    }

    /// Text result of a finished script
    pub fn get_script_result_string(&self) -> CanapeResult<String> {
        self.session.driver.get_script_result_string(self.session.hdl, self.handle)
    }
}
