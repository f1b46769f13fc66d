//! CANape session
//!
//! A [Canape] is created with [Canape::new], which starts (or attaches to) CANape through
//! `Asap3Init5` and registers every [EventCode] with the library. All other objects of
//! this crate ([Module], [Recorder], ...) are handed out by a session and share it.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::Mutex;
use strum::IntoEnumIterator;

use crate::{
    CanapeError, CanapeResult,
    constants::{Channel, DriverType, ErrorCode, EventCode, MeasurementState, RecorderType},
    driver::{AppVersion, Asap3Driver, Asap3Handle, DllVersion, InitParams, ModuleDefinition, ModuleHandle},
    events::{self, CallbackId, CallbackRegistry},
    module::Module,
    recorder::Recorder,
};

/// Driver and handle of an open session, shared by every object of the session
pub(crate) struct Session {
    pub(crate) driver: Arc<dyn Asap3Driver>,
    pub(crate) hdl: Asap3Handle,
    pub(crate) registry: Arc<CallbackRegistry>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("hdl", &self.hdl).finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        events::detach(self.hdl, &self.registry);
    }
}

/// Start parameters of a CANape session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanapeOptions {
    /// Working folder of CANape, where the project files are located
    pub project_path: String,
    /// FIFO buffer size of the measurement
    pub fifo_size: u32,
    /// Sample buffer size of the measurement. The measurement memory is `fifo_size * sample_size`
    pub sample_size: u32,
    /// Response timeout in ms
    pub time_out: u32,
    /// If true, all devices are cleared. If false, the devices of `CANape.ini` are added
    pub clear_device_list: bool,
    /// If true, CANape can be used alongside the client (non-modal). If false, only the client controls CANape
    pub modal_mode: bool,
    /// Start CANape with its debug window
    pub debug_mode: bool,
    /// Start CANape in hex mode
    pub hex_mode: bool,
}

impl CanapeOptions {
    /// Default options for a project folder
    pub fn new<S: Into<String>>(project_path: S) -> Self {
        Self {
            project_path: project_path.into(),
            fifo_size: 128,
            sample_size: 256,
            time_out: 0,
            clear_device_list: true,
            modal_mode: false,
            debug_mode: false,
            hex_mode: false,
        }
    }

    fn init_params(&self) -> InitParams {
        InitParams {
            working_dir: self.project_path.clone(),
            response_timeout: self.time_out,
            fifo_size: self.fifo_size,
            sample_size: self.sample_size,
            debug_mode: self.debug_mode,
            clear_device_list: self.clear_device_list,
            hex_mode: self.hex_mode,
            modal_mode: self.modal_mode,
        }
    }
}

/// Open connection to CANape
#[derive(Debug)]
pub struct Canape {
    session: Arc<Session>,
    modules: Mutex<HashMap<ModuleHandle, Module>>,
}

impl Canape {
    /// Starts CANape with `options` and registers all event callbacks
    pub fn new(driver: Arc<dyn Asap3Driver>, options: CanapeOptions) -> CanapeResult<Self> {
        log::info!("Starting CANape session in {}", options.project_path);
        let hdl = driver.init(&options.init_params())?;
        let registry = Arc::new(CallbackRegistry::new());
        events::attach(hdl, &registry);
        let session = Arc::new(Session { driver, hdl, registry });
        for event in EventCode::iter() {
            if let Err(e) = session.driver.register_event(hdl, event) {
                log::error!("Registering {event} failed: {e}");
                if let Err(exit) = session.driver.exit(hdl, false) {
                    log::error!("Closing session {hdl:?} failed: {exit}");
                }
                return Err(e);
            }
        }
        Ok(Self {
            session,
            modules: Mutex::new(HashMap::new()),
        })
    }

    /// Driver the session uses
    pub fn driver(&self) -> &Arc<dyn Asap3Driver> {
        &self.session.driver
    }

    /// ASAP3 handle of the session
    pub fn handle(&self) -> Asap3Handle {
        self.session.hdl
    }

    /// Adds a function which is called when CANape reports `event`
    pub fn register_callback<F>(&self, event: EventCode, callback: F) -> CallbackId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.session.registry.register(event, callback)
    }

    /// Removes a callback added with [Canape::register_callback]
    pub fn unregister_callback(&self, event: EventCode, id: CallbackId) -> bool {
        self.session.registry.unregister(event, id)
    }

    /// Version of the CANape application
    pub fn get_application_version(&self) -> CanapeResult<AppVersion> {
        self.session.driver.get_application_version(self.session.hdl)
    }

    /// Version of the ASAP3 library
    pub fn get_dll_version(&self) -> CanapeResult<DllVersion> {
        self.session.driver.get_dll_version()
    }

    /// Current project directory
    pub fn get_project_directory(&self) -> CanapeResult<String> {
        self.session.driver.get_project_directory(self.session.hdl)
    }

    fn cached_module(&self, handle: ModuleHandle) -> Module {
        self.modules
            .lock()
            .entry(handle)
            .or_insert_with(|| Module::new(self.session.clone(), handle))
            .clone()
    }

    /// Creates a device and loads its database (A2L or DB file).
    ///
    /// For XCP on Ethernet the channel is [Channel::DevTcp] or [Channel::DevUdp].
    /// `enable_cache` is 1 to enable the cache, 0 to disable it or -1 to keep the default
    pub fn create_module(
        &self,
        module_name: &str,
        database_filename: &str,
        driver: DriverType,
        channel: Channel,
        go_online: bool,
        enable_cache: i16,
    ) -> CanapeResult<Module> {
        let def = ModuleDefinition {
            name: module_name.to_string(),
            database_filename: database_filename.to_string(),
            driver,
            channel,
            go_online,
            enable_cache,
        };
        let handle = self.session.driver.create_module(self.session.hdl, &def)?;
        log::info!("Created module {module_name} ({handle:?})");
        Ok(self.cached_module(handle))
    }

    /// Number of modules of the project
    pub fn get_module_count(&self) -> CanapeResult<u32> {
        self.session.driver.get_module_count(self.session.hdl)
    }

    /// Existing module, by name
    pub fn get_module_by_name(&self, module_name: &str) -> CanapeResult<Module> {
        let handle = self.session.driver.get_module_handle(self.session.hdl, module_name)?;
        Ok(self.cached_module(handle))
    }

    /// Existing module, by index. The index is validated by reading the module name
    pub fn get_module_by_index(&self, index: u16) -> CanapeResult<Module> {
        let handle = ModuleHandle(index);
        let module = self
            .modules
            .lock()
            .get(&handle)
            .cloned()
            .unwrap_or_else(|| Module::new(self.session.clone(), handle));
        if module.get_module_name().is_err() {
            self.modules.lock().remove(&handle);
            return Err(CanapeError::from_code(
                ErrorCode::InvalidModuleHdl as u16,
                "Canape::get_module_by_index",
            ));
        }
        self.modules.lock().insert(handle, module.clone());
        Ok(module)
    }

    /// Enables or disables the interactive mode of CANape
    pub fn set_interactive_mode(&self, mode: bool) -> CanapeResult<()> {
        self.session.driver.set_interactive_mode(self.session.hdl, mode)
    }

    /// Shows the debug window of CANape
    pub fn popup_debug_window(&self) -> CanapeResult<()> {
        self.session.driver.popup_debug_window(self.session.hdl)
    }

    /// Activation state of a network
    pub fn is_network_activated(&self, network_name: &str) -> CanapeResult<bool> {
        self.session.driver.is_network_activated(self.session.hdl, network_name)
    }

    /// Clears the data acquisition channels defined through this interface
    pub fn reset_data_acquisition_channels(&self) -> CanapeResult<()> {
        self.session.driver.reset_data_acquisition_channels(self.session.hdl)
    }

    /// Starts the measurement
    pub fn start_data_acquisition(&self) -> CanapeResult<()> {
        self.session.driver.start_data_acquisition(self.session.hdl)
    }

    /// Stops the measurement
    pub fn stop_data_acquisition(&self) -> CanapeResult<()> {
        self.session.driver.stop_data_acquisition(self.session.hdl)
    }

    /// Number of defined recorders
    pub fn get_recorder_count(&self) -> CanapeResult<u32> {
        self.session.driver.get_recorder_count(self.session.hdl)
    }

    /// Creates a new recorder
    pub fn define_recorder(&self, recorder_name: &str, recorder_type: RecorderType) -> CanapeResult<Recorder> {
        let id = self.session.driver.define_recorder(self.session.hdl, recorder_name, recorder_type)?;
        Ok(Recorder::new(self.session.clone(), id))
    }

    /// Recorder at `index`
    pub fn get_recorder_by_index(&self, index: u32) -> CanapeResult<Recorder> {
        let id = self.session.driver.get_recorder_by_index(self.session.hdl, index)?;
        Ok(Recorder::new(self.session.clone(), id))
    }

    /// Recorder currently selected in CANape
    pub fn get_selected_recorder(&self) -> CanapeResult<Recorder> {
        let id = self.session.driver.get_selected_recorder(self.session.hdl)?;
        Ok(Recorder::new(self.session.clone(), id))
    }

    /// State of the measurement
    pub fn get_measurement_state(&self) -> CanapeResult<MeasurementState> {
        self.session.driver.get_measurement_state(self.session.hdl)
    }

    /// True if the MCD3 option is licensed
    pub fn has_mcd3_license(&self) -> CanapeResult<bool> {
        self.session.driver.has_mcd3_license(self.session.hdl)
    }

    /// Name of the configuration (CNA) file in use. Only available in non-modal mode
    pub fn get_cna_filename(&self) -> CanapeResult<String> {
        self.session.driver.get_cna_filename(self.session.hdl)
    }

    /// Loads a configuration (CNA) file
    pub fn load_cna_file(&self, cna_file: &str) -> CanapeResult<()> {
        self.session.driver.load_cna_file(self.session.hdl, cna_file)
    }

    /// Ends the session. CANape is closed as well if `close_canape` is true
    pub fn exit(self, close_canape: bool) -> CanapeResult<()> {
        log::info!("Closing CANape session {:?}", self.session.hdl);
        self.session.driver.exit(self.session.hdl, close_canape)?;
        events::detach(self.session.hdl, &self.session.registry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::driver::SimulatedCanape;

    #[test]
    fn default_options() {
        let opts = CanapeOptions::new("C:\\Projects\\Demo");
        assert_eq!(opts.fifo_size, 128);
        assert_eq!(opts.sample_size, 256);
        assert_eq!(opts.time_out, 0);
        assert!(opts.clear_device_list);
        assert!(!opts.modal_mode);
    }

    #[test]
    fn registers_every_event() {
        let sim = Arc::new(SimulatedCanape::new());
        let canape = Canape::new(sim.clone(), CanapeOptions::new("demo")).unwrap();
        assert_eq!(sim.registered_events(canape.handle()).len(), EventCode::iter().count());
    }

    #[test]
    fn callbacks_follow_the_measurement() {
        let sim = Arc::new(SimulatedCanape::new());
        let canape = Canape::new(sim.clone(), CanapeOptions::new("demo")).unwrap();
        let starts = Arc::new(AtomicUsize::new(0));
        let s = starts.clone();
        let id = canape.register_callback(EventCode::OnDataAcqStart, move || {
            s.fetch_add(1, Ordering::SeqCst);
        });
        canape.start_data_acquisition().unwrap();
        canape.stop_data_acquisition().unwrap();
        assert!(canape.unregister_callback(EventCode::OnDataAcqStart, id));
        canape.start_data_acquisition().unwrap();
        assert_eq!(starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_start_closes_the_session() {
        let sim = Arc::new(SimulatedCanape::new());
        sim.inject_error("Asap3RegisterCallBack", ErrorCode::EventAlreadyRegistered);
        let err = Canape::new(sim.clone(), CanapeOptions::new("demo")).unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::EventAlreadyRegistered));
        assert_eq!(sim.session_count(), 0);
    }

    #[test]
    fn exit_stops_event_routing() {
        let sim = Arc::new(SimulatedCanape::new());
        let canape = Canape::new(sim.clone(), CanapeOptions::new("demo")).unwrap();
        let hdl = canape.handle();
        sim.add_module("XCPsim", "XCPsim.a2l");
        // Keeps the session alive after exit
        let module = canape.get_module_by_index(0).unwrap();
        assert!(events::dispatch(hdl, EventCode::OnDataAcqStart as u64));
        canape.exit(false).unwrap();
        assert!(!events::dispatch(hdl, EventCode::OnDataAcqStart as u64));
        drop(module);
    }

    #[test]
    fn module_by_invalid_index() {
        let sim = Arc::new(SimulatedCanape::new());
        let canape = Canape::new(sim.clone(), CanapeOptions::new("demo")).unwrap();
        let err = canape.get_module_by_index(3).unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidModuleHdl));
        sim.add_module("XCPsim", "XCPsim.a2l");
        assert_eq!(canape.get_module_by_index(0).unwrap().get_module_name().unwrap(), "XCPsim");
    }
}
