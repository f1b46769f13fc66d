//! Simulated CANape for testing and offline development
//!
//! [SimulatedCanape] keeps modules, database objects, recorders, scripts and the
//! data acquisition FIFOs in memory. Tests populate it with the `add_*` functions and
//! feed samples with [SimulatedCanape::push_sample]. Failures are reported with the
//! same error codes CANape uses, so the wrappers can be tested against them.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::atomic::{AtomicUsize, Ordering},
};

use parking_lot::{Mutex, ReentrantMutex};

use super::{
    AppVersion, Asap3Driver, Asap3Handle, CalibrationValue, DatabaseInfo, DllVersion, InitParams,
    MeasurementListEntry, ModuleDefinition, ModuleHandle, ObjectInfo, ObjectParameter, RawSample, RecorderId,
    ScriptHandle, TaskInfo,
};
use crate::{
    CanapeError, CanapeResult,
    constants::{
        CANAPE_API_MAIN_VERSION, CANAPE_API_RELEASE, CANAPE_API_SUB_VERSION, Channel, DataType, DbFileType,
        DbObjectSelection, DbObjectType, DriverType, EcuState, ErrorCode, EventCode, Format, MeasurementState, ObjectType,
        RecorderState, RecorderType, ScriptStatus, ValueType,
    },
    events,
};

/// Session handles are unique per process, as events are routed by handle
static NEXT_SESSION: AtomicUsize = AtomicUsize::new(1);

#[derive(Debug, Clone)]
struct SimObject {
    name: String,
    info: ObjectInfo,
    parameter: ObjectParameter,
    value: CalibrationValue,
}

#[derive(Debug, Clone)]
struct SimChannel {
    name: String,
    polling_rate: u16,
    save_to_file: bool,
}

#[derive(Debug, Clone)]
struct SimTask {
    info: TaskInfo,
    channels: Vec<SimChannel>,
    fifo: VecDeque<RawSample>,
    overrun: bool,
    current: Option<RawSample>,
}

#[derive(Debug, Clone)]
struct SimModule {
    name: String,
    database: String,
    driver: DriverType,
    channel: Channel,
    network: String,
    online: EcuState,
    active: bool,
    resume_mode: bool,
    objects: Vec<SimObject>,
    tasks: Vec<SimTask>,
}

impl SimModule {
    fn object(&self, name: &str) -> CanapeResult<&SimObject> {
        self.objects
            .iter()
            .find(|o| o.name == name)
            .ok_or(ErrorCode::UnknownObject)
            .map_err(code_error)
    }

    fn task_mut(&mut self, task_id: u16) -> CanapeResult<&mut SimTask> {
        self.tasks
            .iter_mut()
            .find(|t| t.info.task_id == task_id)
            .ok_or_else(|| code_error(ErrorCode::ErrorInvalidTaskId))
    }
}

#[derive(Debug, Clone)]
struct SimRecorder {
    name: String,
    recorder_type: RecorderType,
    enabled: bool,
    state: RecorderState,
    mdf_filename: String,
}

#[derive(Debug, Clone)]
struct SimScript {
    script: String,
    status: ScriptStatus,
    result_value: f64,
    result_string: String,
}

#[derive(Debug)]
struct SimState {
    sessions: HashMap<Asap3Handle, HashSet<EventCode>>,
    project_dir: String,
    app_version: AppVersion,
    interactive: bool,
    networks: HashMap<String, bool>,
    measurement: MeasurementState,
    mcd3_license: bool,
    cna_filename: String,
    next_module: u16,
    modules: BTreeMap<u16, SimModule>,
    recorders: Vec<SimRecorder>,
    selected_recorder: Option<usize>,
    next_script: u32,
    scripts: HashMap<u32, SimScript>,
    missing: HashSet<String>,
    injected: HashMap<String, u16>,
}

/// Error returned by the simulation, in the form the library reports it
fn code_error(code: ErrorCode) -> CanapeError {
    CanapeError::Api {
        code: code as u16,
        name: Some(code),
        message: code.description().to_string(),
        function: "",
    }
}

/// Fills in the name of the failed function
fn in_function(err: CanapeError, function: &'static str) -> CanapeError {
    match err {
        CanapeError::Api { code, name, message, .. } => CanapeError::Api { code, name, message, function },
        other => other,
    }
}

impl SimState {
    fn check_session(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        if self.sessions.contains_key(&hdl) {
            Ok(())
        } else {
            Err(code_error(ErrorCode::InvalidAsap3Hdl))
        }
    }

    fn module(&self, module: ModuleHandle) -> CanapeResult<&SimModule> {
        self.modules.get(&module.0).ok_or_else(|| code_error(ErrorCode::InvalidModuleHdl))
    }

    fn module_mut(&mut self, module: ModuleHandle) -> CanapeResult<&mut SimModule> {
        self.modules.get_mut(&module.0).ok_or_else(|| code_error(ErrorCode::InvalidModuleHdl))
    }

    fn recorder_index(&self, recorder: RecorderId) -> CanapeResult<usize> {
        match recorder.0.checked_sub(1) {
            Some(idx) if idx < self.recorders.len() => Ok(idx),
            _ => Err(code_error(ErrorCode::RecorderNotFound)),
        }
    }

    fn recorder_mut(&mut self, recorder: RecorderId) -> CanapeResult<&mut SimRecorder> {
        let idx = self.recorder_index(recorder)?;
        Ok(&mut self.recorders[idx])
    }

    fn script_mut(&mut self, script: ScriptHandle) -> CanapeResult<&mut SimScript> {
        self.scripts.get_mut(&script.0).ok_or_else(|| code_error(ErrorCode::InvalidScrHandle))
    }

    fn is_measuring(&self) -> bool {
        self.measurement != MeasurementState::Stopped
    }

    fn not_while_measuring(&self) -> CanapeResult<()> {
        if self.is_measuring() {
            Err(code_error(ErrorCode::NotAvailableWhileAcq))
        } else {
            Ok(())
        }
    }

    /// Events of `events` which `hdl` registered for
    fn registered(&self, hdl: Asap3Handle, events: &[EventCode]) -> Vec<EventCode> {
        match self.sessions.get(&hdl) {
            Some(reg) => events.iter().copied().filter(|e| reg.contains(e)).collect(),
            None => Vec::new(),
        }
    }
}

/// In-memory implementation of [Asap3Driver]
#[derive(Debug)]
pub struct SimulatedCanape {
    lock: ReentrantMutex<()>,
    state: Mutex<SimState>,
}

impl Default for SimulatedCanape {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCanape {
    /// Creates an empty simulation: no modules, no recorders, measurement stopped
    pub fn new() -> Self {
        Self {
            lock: ReentrantMutex::new(()),
            state: Mutex::new(SimState {
                sessions: HashMap::new(),
                project_dir: String::new(),
                app_version: AppVersion {
                    main: 21,
                    sub: 0,
                    service_pack: 0,
                    application: "CANape (simulated)".into(),
                },
                interactive: false,
                networks: HashMap::new(),
                measurement: MeasurementState::Stopped,
                mcd3_license: false,
                cna_filename: String::new(),
                next_module: 0,
                modules: BTreeMap::new(),
                recorders: Vec::new(),
                selected_recorder: None,
                next_script: 1,
                scripts: HashMap::new(),
                missing: HashSet::new(),
                injected: HashMap::new(),
            }),
        }
    }

    /// Runs `op` the way the library executes a function: under the call lock, failing
    /// for missing functions and injected errors
    fn with<R>(&self, function: &'static str, op: impl FnOnce(&mut SimState) -> CanapeResult<R>) -> CanapeResult<R> {
        let _guard = self.lock.lock();
        log::debug!("Calling {function}");
        let mut state = self.state.lock();
        if state.missing.contains(function) {
            return Err(CanapeError::NotImplemented {
                function,
                version: format!("{CANAPE_API_MAIN_VERSION}.{CANAPE_API_SUB_VERSION}.{CANAPE_API_RELEASE}"),
            });
        }
        let res = match state.injected.remove(function) {
            Some(code) => Err(CanapeError::from_code(code, function)),
            None => op(&mut *state).map_err(|e| in_function(e, function)),
        };
        if let Err(e) = &res {
            log::error!("{e}");
        }
        res
    }

    /// Delivers events to the session, outside of every lock of the simulation
    fn deliver(hdl: Asap3Handle, to_fire: Vec<EventCode>) {
        for event in to_fire {
            events::dispatch(hdl, event as u64);
        }
    }

    /// Adds an online XCP module with the given database file
    pub fn add_module(&self, name: &str, database_filename: &str) -> ModuleHandle {
        let mut state = self.state.lock();
        let hdl = state.next_module;
        state.next_module += 1;
        state.modules.insert(
            hdl,
            SimModule {
                name: name.to_string(),
                database: database_filename.to_string(),
                driver: DriverType::Xcp,
                channel: Channel::DevTcp,
                network: format!("{name}_ETH"),
                online: EcuState::Online,
                active: true,
                resume_mode: false,
                objects: Vec::new(),
                tasks: Vec::new(),
            },
        );
        ModuleHandle(hdl)
    }

    fn add_object(&self, module: ModuleHandle, object: SimObject) {
        let mut state = self.state.lock();
        if let Some(m) = state.modules.get_mut(&module.0) {
            m.objects.retain(|o| o.name != object.name);
            m.objects.push(object);
        }
    }

    /// Adds a characteristic with its current physical value
    pub fn add_calibration(&self, module: ModuleHandle, name: &str, value: CalibrationValue, unit: &str) {
        let info = ObjectInfo {
            object_type: ObjectType::Calibrate,
            value_type: value.value_type() as u32,
            min: -1.0e6,
            max: 1.0e6,
            min_ex: -1.0e6,
            max_ex: 1.0e6,
            precision: 3,
            unit: unit.to_string(),
        };
        let data_type = match value {
            CalibrationValue::Ascii { .. } => DataType::String,
            _ => DataType::Float,
        };
        self.add_object(
            module,
            SimObject {
                name: name.to_string(),
                parameter: ObjectParameter { data_type, address: 0, min: info.min, max: info.max, increment: 1.0 },
                info,
                value,
            },
        );
    }

    /// Adds a scalar measurement object
    pub fn add_measurement(&self, module: ModuleHandle, name: &str, unit: &str) {
        let info = ObjectInfo {
            object_type: ObjectType::Measure,
            value_type: CalibrationValue::Scalar(0.0).value_type() as u32,
            min: -1.0e6,
            max: 1.0e6,
            min_ex: -1.0e6,
            max_ex: 1.0e6,
            precision: 2,
            unit: unit.to_string(),
        };
        self.add_object(
            module,
            SimObject {
                name: name.to_string(),
                parameter: ObjectParameter {
                    data_type: DataType::Double,
                    address: 0,
                    min: info.min,
                    max: info.max,
                    increment: 1.0,
                },
                info,
                value: CalibrationValue::Scalar(0.0),
            },
        );
    }

    /// Adds an ECU task. `cycle` is the cycle time in ms, 0 for event driven tasks
    pub fn add_task(&self, module: ModuleHandle, description: &str, task_id: u16, cycle: u32) {
        let mut state = self.state.lock();
        if let Some(m) = state.modules.get_mut(&module.0) {
            let event_channel = m.tasks.len() as u32;
            m.tasks.push(SimTask {
                info: TaskInfo { description: description.to_string(), task_id, task_cycle: cycle, event_channel },
                channels: Vec::new(),
                fifo: VecDeque::new(),
                overrun: false,
                current: None,
            });
        }
    }

    /// Appends a sample to the FIFO of a task. The sample also becomes the current value
    pub fn push_sample(&self, module: ModuleHandle, task_id: u16, timestamp: u32, values: &[f64]) {
        let mut state = self.state.lock();
        if let Some(task) = state.modules.get_mut(&module.0).and_then(|m| m.task_mut(task_id).ok()) {
            let sample = RawSample { timestamp, values: values.to_vec() };
            task.current = Some(sample.clone());
            task.fifo.push_back(sample);
        }
    }

    /// Number of samples waiting in the FIFO of a task
    pub fn fifo_len(&self, module: ModuleHandle, task_id: u16) -> usize {
        let mut state = self.state.lock();
        state
            .modules
            .get_mut(&module.0)
            .and_then(|m| m.task_mut(task_id).ok())
            .map(|t| t.fifo.len())
            .unwrap_or(0)
    }

    /// Marks the FIFO of a task as overrun
    pub fn set_overrun(&self, module: ModuleHandle, task_id: u16) {
        let mut state = self.state.lock();
        if let Some(task) = state.modules.get_mut(&module.0).and_then(|m| m.task_mut(task_id).ok()) {
            task.overrun = true;
        }
    }

    /// Current value of a database object
    pub fn object_value(&self, module: ModuleHandle, name: &str) -> Option<CalibrationValue> {
        let state = self.state.lock();
        state.modules.get(&module.0)?.object(name).ok().map(|o| o.value.clone())
    }

    /// Names of the data acquisition channels set up for a task, in setup order
    pub fn daq_channels(&self, module: ModuleHandle, task_id: u16) -> Vec<String> {
        let mut state = self.state.lock();
        state
            .modules
            .get_mut(&module.0)
            .and_then(|m| m.task_mut(task_id).ok())
            .map(|t| t.channels.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Sets the activation state of a network
    pub fn set_network(&self, name: &str, activated: bool) {
        self.state.lock().networks.insert(name.to_string(), activated);
    }

    /// Interactive mode set by the client
    pub fn interactive_mode(&self) -> bool {
        self.state.lock().interactive
    }

    /// Sets the MCD3 license flag
    pub fn set_mcd3_license(&self, licensed: bool) {
        self.state.lock().mcd3_license = licensed;
    }

    /// Makes `function` behave as if the loaded library did not export it
    pub fn set_missing(&self, function: &str) {
        self.state.lock().missing.insert(function.to_string());
    }

    /// Makes the next call of `function` fail with error `code`
    pub fn inject_error(&self, function: &str, code: ErrorCode) {
        self.state.lock().injected.insert(function.to_string(), code as u16);
    }

    /// Events a session registered for
    pub fn registered_events(&self, hdl: Asap3Handle) -> Vec<EventCode> {
        let state = self.state.lock();
        let mut events: Vec<EventCode> = state.sessions.get(&hdl).map(|s| s.iter().copied().collect()).unwrap_or_default();
        events.sort();
        events
    }

    /// Number of open sessions
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Source or file name a script was declared with
    pub fn script_source(&self, script: ScriptHandle) -> Option<String> {
        self.state.lock().scripts.get(&script.0).map(|s| s.script.clone())
    }

    /// Finishes a running script with its results
    pub fn finish_script(&self, script: ScriptHandle, status: ScriptStatus, value: f64, text: &str) {
        if let Some(s) = self.state.lock().scripts.get_mut(&script.0) {
            s.status = status;
            s.result_value = value;
            s.result_string = text.to_string();
        }
    }

    /// Reports an event to a session, if it registered for it
    pub fn fire_event(&self, hdl: Asap3Handle, event: EventCode) {
        let to_fire = self.state.lock().registered(hdl, &[event]);
        Self::deliver(hdl, to_fire);
    }
}

fn file_type(file_name: &str) -> DbFileType {
    let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase()).unwrap_or_default();
    match ext.as_str() {
        "a2l" => DbFileType::Asap2,
        "db" => DbFileType::Db,
        "dbc" => DbFileType::Dbc,
        "cdd" => DbFileType::Candela,
        "odx" | "pdx" => DbFileType::Pdx,
        "ldf" => DbFileType::Ldf,
        "arxml" => DbFileType::AutosarXml,
        _ => DbFileType::Unknown,
    }
}

/// Names of the objects matching `filter` and `selection`, each followed by `;`
fn object_list(module: &SimModule, filter: DbObjectType, selection: DbObjectSelection) -> String {
    module
        .objects
        .iter()
        .filter(|o| match filter {
            DbObjectType::Measurement => o.info.object_type == ObjectType::Measure,
            DbObjectType::Characteristic => o.info.object_type == ObjectType::Calibrate,
            DbObjectType::All => true,
        })
        .filter(|o| {
            let bit = match ValueType::from_repr(o.info.value_type) {
                Some(ValueType::Value) => DbObjectSelection::SCALAR,
                Some(ValueType::Curve) => DbObjectSelection::CURVE,
                Some(ValueType::Map) => DbObjectSelection::MAP,
                Some(ValueType::Axis) => DbObjectSelection::AXIS,
                Some(ValueType::Ascii) => DbObjectSelection::ASCII,
                Some(ValueType::ValBlk) => DbObjectSelection::VALBLK,
                None => DbObjectSelection::empty(),
            };
            selection.intersects(bit)
        })
        .map(|o| format!("{};", o.name))
        .collect()
}

/// Takes `count` values of a sample, padding missing channels with NaN
fn sample_values(sample: RawSample, count: usize) -> RawSample {
    let mut values = sample.values;
    values.resize(count, f64::NAN);
    RawSample { timestamp: sample.timestamp, values }
}

impl Asap3Driver for SimulatedCanape {
    fn call_lock(&self) -> &ReentrantMutex<()> {
        &self.lock
    }

    fn get_dll_version(&self) -> CanapeResult<DllVersion> {
        self.with("Asap3GetVersion", |_| {
            Ok(DllVersion {
                main: CANAPE_API_MAIN_VERSION,
                sub: CANAPE_API_SUB_VERSION,
                release: CANAPE_API_RELEASE,
                os_version: "Simulation".into(),
                os_release: 0,
            })
        })
    }

    fn init(&self, params: &InitParams) -> CanapeResult<Asap3Handle> {
        self.with("Asap3Init5", |st| {
            let hdl = Asap3Handle(NEXT_SESSION.fetch_add(1, Ordering::Relaxed));
            st.sessions.insert(hdl, HashSet::new());
            st.project_dir = params.working_dir.clone();
            if params.clear_device_list {
                st.modules.clear();
            }
            Ok(hdl)
        })
    }

    fn exit(&self, hdl: Asap3Handle, _close_canape: bool) -> CanapeResult<()> {
        self.with("Asap3Exit2", |st| {
            st.check_session(hdl)?;
            if st.is_measuring() {
                return Err(code_error(ErrorCode::ExitDeniedWhileAcqu));
            }
            st.sessions.remove(&hdl);
            Ok(())
        })
    }

    fn register_event(&self, hdl: Asap3Handle, event: EventCode) -> CanapeResult<()> {
        self.with("Asap3RegisterCallBack", |st| {
            let reg = st.sessions.get_mut(&hdl).ok_or_else(|| code_error(ErrorCode::InvalidAsap3Hdl))?;
            if !reg.insert(event) {
                return Err(code_error(ErrorCode::EventAlreadyRegistered));
            }
            Ok(())
        })
    }

    fn unregister_event(&self, hdl: Asap3Handle, event: EventCode) -> CanapeResult<()> {
        self.with("Asap3UnRegisterCallBack", |st| {
            let reg = st.sessions.get_mut(&hdl).ok_or_else(|| code_error(ErrorCode::InvalidAsap3Hdl))?;
            reg.remove(&event);
            Ok(())
        })
    }

    fn get_application_version(&self, hdl: Asap3Handle) -> CanapeResult<AppVersion> {
        self.with("Asap3GetApplicationVersion", |st| {
            st.check_session(hdl)?;
            Ok(st.app_version.clone())
        })
    }

    fn get_project_directory(&self, hdl: Asap3Handle) -> CanapeResult<String> {
        self.with("Asap3GetProjectDirectory", |st| {
            st.check_session(hdl)?;
            Ok(st.project_dir.clone())
        })
    }

    fn set_interactive_mode(&self, hdl: Asap3Handle, mode: bool) -> CanapeResult<()> {
        self.with("Asap3SetInteractiveMode", |st| {
            st.check_session(hdl)?;
            st.interactive = mode;
            Ok(())
        })
    }

    fn popup_debug_window(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        self.with("Asap3PopupDebugWindow", |st| st.check_session(hdl))
    }

    fn is_network_activated(&self, hdl: Asap3Handle, network: &str) -> CanapeResult<bool> {
        self.with("Asap3IsNetworkActivated", |st| {
            st.check_session(hdl)?;
            st.networks.get(network).copied().ok_or_else(|| code_error(ErrorCode::NetworkNotFound))
        })
    }

    fn reset_data_acquisition_channels(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        self.with("Asap3ResetDataAcquisitionChnls", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            for task in st.modules.values_mut().flat_map(|m| m.tasks.iter_mut()) {
                task.channels.clear();
            }
            Ok(())
        })
    }

    fn start_data_acquisition(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        let to_fire = self.with("Asap3StartDataAcquisition", |st| {
            st.check_session(hdl)?;
            if st.is_measuring() {
                return Err(code_error(ErrorCode::AcquisAlreadyRunning));
            }
            for task in st.modules.values_mut().flat_map(|m| m.tasks.iter_mut()) {
                task.fifo.clear();
                task.overrun = false;
                task.current = None;
            }
            st.measurement = MeasurementState::Running;
            Ok(st.registered(hdl, &[EventCode::OnBeforeDataAcqStart, EventCode::OnDataAcqStart]))
        })?;
        Self::deliver(hdl, to_fire);
        Ok(())
    }

    fn stop_data_acquisition(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        let to_fire = self.with("Asap3StopDataAcquisition", |st| {
            st.check_session(hdl)?;
            if !st.is_measuring() {
                return Err(code_error(ErrorCode::AcquisNotStarted));
            }
            st.measurement = MeasurementState::Stopped;
            for rec in st.recorders.iter_mut().filter(|r| r.state != RecorderState::Configure) {
                rec.state = RecorderState::Suspended;
            }
            Ok(st.registered(hdl, &[EventCode::OnDataAcqStop]))
        })?;
        Self::deliver(hdl, to_fire);
        Ok(())
    }

    fn get_measurement_state(&self, hdl: Asap3Handle) -> CanapeResult<MeasurementState> {
        self.with("Asap3GetMeasurementState", |st| {
            st.check_session(hdl)?;
            Ok(st.measurement)
        })
    }

    fn has_mcd3_license(&self, hdl: Asap3Handle) -> CanapeResult<bool> {
        self.with("Asap3HasMCD3License", |st| {
            st.check_session(hdl)?;
            Ok(st.mcd3_license)
        })
    }

    fn get_cna_filename(&self, hdl: Asap3Handle) -> CanapeResult<String> {
        self.with("Asap3GetCNAFilename", |st| {
            st.check_session(hdl)?;
            Ok(st.cna_filename.clone())
        })
    }

    fn load_cna_file(&self, hdl: Asap3Handle, file_name: &str) -> CanapeResult<()> {
        self.with("Asap3LoadCNAFile", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            if !file_name.to_ascii_lowercase().ends_with(".cna") {
                return Err(code_error(ErrorCode::ErrOpenFile));
            }
            st.cna_filename = file_name.to_string();
            Ok(())
        })
    }

    fn create_module(&self, hdl: Asap3Handle, def: &ModuleDefinition) -> CanapeResult<ModuleHandle> {
        self.with("Asap3CreateModule3", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            if def.database_filename.is_empty() {
                return Err(code_error(ErrorCode::Asap2FileNotFound));
            }
            if let Some((h, _)) = st.modules.iter().find(|(_, m)| m.name == def.name) {
                return Ok(ModuleHandle(*h));
            }
            let h = st.next_module;
            st.next_module += 1;
            st.modules.insert(
                h,
                SimModule {
                    name: def.name.clone(),
                    database: def.database_filename.clone(),
                    driver: def.driver,
                    channel: def.channel,
                    network: String::new(),
                    online: if def.go_online { EcuState::Online } else { EcuState::Offline },
                    active: true,
                    resume_mode: false,
                    objects: Vec::new(),
                    tasks: Vec::new(),
                },
            );
            Ok(ModuleHandle(h))
        })
    }

    fn get_module_count(&self, hdl: Asap3Handle) -> CanapeResult<u32> {
        self.with("Asap3GetModuleCount", |st| {
            st.check_session(hdl)?;
            Ok(st.modules.len() as u32)
        })
    }

    fn get_module_handle(&self, hdl: Asap3Handle, name: &str) -> CanapeResult<ModuleHandle> {
        self.with("Asap3GetModuleHandle", |st| {
            st.check_session(hdl)?;
            st.modules
                .iter()
                .find(|(_, m)| m.name == name)
                .map(|(h, _)| ModuleHandle(*h))
                .ok_or_else(|| code_error(ErrorCode::UnknownModuleName))
        })
    }

    fn get_module_name(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String> {
        self.with("Asap3GetModuleName", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.name.clone())
        })
    }

    fn get_communication_type(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String> {
        self.with("Asap3GetCommunicationType", |st| {
            st.check_session(hdl)?;
            let m = st.module(module)?;
            let comm = match m.channel {
                Channel::DevTcp | Channel::DevVxTcp => "TCP",
                Channel::DevUdp | Channel::DevVxUdp => "UDP",
                Channel::DevUsb => "USB",
                c if (c as i16) < 30 || (121..=129).contains(&(c as i16)) => "CAN",
                _ => "Other",
            };
            Ok(comm.to_string())
        })
    }

    fn get_network_name(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String> {
        self.with("Asap3GetNetworkName", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.network.clone())
        })
    }

    fn get_ecu_driver_type(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<DriverType> {
        self.with("Asap3GetEcuDriverType", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.driver)
        })
    }

    fn is_ecu_online(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<EcuState> {
        self.with("Asap3IsECUOnline", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.online)
        })
    }

    fn ecu_on_offline(&self, hdl: Asap3Handle, module: ModuleHandle, state: EcuState, _download: bool) -> CanapeResult<()> {
        self.with("Asap3ECUOnOffline", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            st.module_mut(module)?.online = state;
            Ok(())
        })
    }

    fn is_module_active(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<bool> {
        self.with("Asap3IsModuleActive", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.active)
        })
    }

    fn module_activation(&self, hdl: Asap3Handle, module: ModuleHandle, activate: bool) -> CanapeResult<()> {
        self.with("Asap3ModuleActivation", |st| {
            st.check_session(hdl)?;
            st.module_mut(module)?.active = activate;
            Ok(())
        })
    }

    fn has_resume_mode(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<bool> {
        self.with("Asap3HasResumeMode", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.resume_mode)
        })
    }

    fn reset_data_acquisition_channels_by_module(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<()> {
        self.with("Asap3ResetDataAcquisitionChnlsByModule", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            for task in st.module_mut(module)?.tasks.iter_mut() {
                task.channels.clear();
            }
            Ok(())
        })
    }

    fn release_module(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<()> {
        self.with("Asap3ReleaseModule", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            st.modules.remove(&module.0).map(|_| ()).ok_or_else(|| code_error(ErrorCode::InvalidModuleHdl))
        })
    }

    fn get_database_info(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<DatabaseInfo> {
        self.with("Asap3GetDatabaseInfo", |st| {
            st.check_session(hdl)?;
            let db = &st.module(module)?.database;
            let (path, name) = db.rsplit_once(['\\', '/']).unwrap_or(("", db.as_str()));
            Ok(DatabaseInfo { file_name: name.to_string(), file_path: path.to_string(), file_type: file_type(name) })
        })
    }

    fn get_database_objects(&self, hdl: Asap3Handle, module: ModuleHandle, filter: DbObjectType) -> CanapeResult<String> {
        self.with("Asap3GetDatabaseObjects", |st| {
            st.check_session(hdl)?;
            Ok(object_list(st.module(module)?, filter, DbObjectSelection::ALL))
        })
    }

    fn get_database_objects_by_type(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        filter: DbObjectType,
        selection: DbObjectSelection,
    ) -> CanapeResult<String> {
        self.with("Asap3GetDatabaseObjectsByType", |st| {
            st.check_session(hdl)?;
            Ok(object_list(st.module(module)?, filter, selection))
        })
    }

    fn get_ecu_tasks(&self, hdl: Asap3Handle, module: ModuleHandle, max_tasks: u16) -> CanapeResult<Vec<TaskInfo>> {
        self.with("Asap3GetEcuTasks2", |st| {
            st.check_session(hdl)?;
            let tasks = &st.module(module)?.tasks;
            Ok(tasks.iter().take(usize::from(max_tasks)).map(|t| t.info.clone()).collect())
        })
    }

    fn get_measurement_list_entries(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<Vec<MeasurementListEntry>> {
        self.with("Asap3GetMeasurementListEntries", |st| {
            st.check_session(hdl)?;
            let entries = st
                .module(module)?
                .tasks
                .iter()
                .flat_map(|t| {
                    t.channels.iter().map(|c| MeasurementListEntry {
                        task_id: t.info.task_id,
                        rate: u32::from(c.polling_rate),
                        save_flag: c.save_to_file,
                        disabled: false,
                        object_name: c.name.clone(),
                    })
                })
                .collect();
            Ok(entries)
        })
    }

    fn get_db_object_info(&self, hdl: Asap3Handle, module: ModuleHandle, name: &str) -> CanapeResult<ObjectInfo> {
        self.with("Asap3GetDBObjectInfo", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.object(name)?.info.clone())
        })
    }

    fn read_object_parameter(&self, hdl: Asap3Handle, module: ModuleHandle, name: &str, _format: Format) -> CanapeResult<ObjectParameter> {
        self.with("Asap3ReadObjectParameter", |st| {
            st.check_session(hdl)?;
            Ok(st.module(module)?.object(name)?.parameter)
        })
    }

    fn read_calibration_object(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        _format: Format,
        _force_upload: bool,
    ) -> CanapeResult<CalibrationValue> {
        self.with("Asap3ReadCalibrationObject2", |st| {
            st.check_session(hdl)?;
            let m = st.module(module)?;
            if m.online == EcuState::Offline && !m.active {
                return Err(code_error(ErrorCode::CalobjReadFailed));
            }
            Ok(m.object(name)?.value.clone())
        })
    }

    fn write_calibration_object(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        _format: Format,
        value: &CalibrationValue,
    ) -> CanapeResult<()> {
        self.with("Asap3WriteCalibrationObject", |st| {
            st.check_session(hdl)?;
            let m = st.module_mut(module)?;
            let obj = m
                .objects
                .iter_mut()
                .find(|o| o.name == name)
                .ok_or_else(|| code_error(ErrorCode::UnknownObject))?;
            if obj.info.object_type != ObjectType::Calibrate {
                return Err(code_error(ErrorCode::NotWriteAccess));
            }
            if obj.value.value_type() != value.value_type() {
                return Err(code_error(ErrorCode::ObjectTypeDoesntMatch));
            }
            if !obj.value.accepts(value) {
                return Err(code_error(ErrorCode::ErrDataSize));
            }
            obj.value.replace(value);
            Ok(())
        })
    }

    fn execute_script_ex(&self, hdl: Asap3Handle, module: ModuleHandle, _script_file: bool, script: &str) -> CanapeResult<ScriptHandle> {
        self.with("Asap3ExecuteScriptEx", |st| {
            st.check_session(hdl)?;
            st.module(module)?;
            if script.is_empty() {
                return Err(code_error(ErrorCode::ScriptCmdInvalid));
            }
            let h = st.next_script;
            st.next_script += 1;
            st.scripts.insert(
                h,
                SimScript {
                    script: script.to_string(),
                    status: ScriptStatus::Ready,
                    result_value: 0.0,
                    result_string: String::new(),
                },
            );
            Ok(ScriptHandle(h))
        })
    }

    fn get_script_state(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<ScriptStatus> {
        self.with("Asap3GetScriptState", |st| {
            st.check_session(hdl)?;
            Ok(st.script_mut(script)?.status)
        })
    }

    fn start_script(&self, hdl: Asap3Handle, script: ScriptHandle, _command_line: Option<&str>, module: Option<ModuleHandle>) -> CanapeResult<()> {
        self.with("Asap3StartScript", |st| {
            st.check_session(hdl)?;
            if let Some(m) = module {
                st.module(m)?;
            }
            let s = st.script_mut(script)?;
            if s.status == ScriptStatus::Running {
                return Err(code_error(ErrorCode::IllegalOperation));
            }
            s.status = ScriptStatus::Running;
            Ok(())
        })
    }

    fn stop_script(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<()> {
        self.with("Asap3StopScript", |st| {
            st.check_session(hdl)?;
            let s = st.script_mut(script)?;
            if s.status == ScriptStatus::Running {
                s.status = ScriptStatus::FinishedCancel;
            }
            Ok(())
        })
    }

    fn release_script(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<()> {
        self.with("Asap3ReleaseScript", |st| {
            st.check_session(hdl)?;
            st.scripts.remove(&script.0).map(|_| ()).ok_or_else(|| code_error(ErrorCode::InvalidScrHandle))
        })
    }

    fn get_script_result_value(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<f64> {
        self.with("Asap3GetScriptResultValue", |st| {
            st.check_session(hdl)?;
            Ok(st.script_mut(script)?.result_value)
        })
    }

    fn get_script_result_string(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<String> {
        self.with("Asap3GetScriptResultString", |st| {
            st.check_session(hdl)?;
            Ok(st.script_mut(script)?.result_string.clone())
        })
    }

    fn get_recorder_count(&self, hdl: Asap3Handle) -> CanapeResult<u32> {
        self.with("Asap3GetRecorderCount", |st| {
            st.check_session(hdl)?;
            Ok(st.recorders.len() as u32)
        })
    }

    fn define_recorder(&self, hdl: Asap3Handle, name: &str, recorder_type: RecorderType) -> CanapeResult<RecorderId> {
        self.with("Asap3DefineRecorder", |st| {
            st.check_session(hdl)?;
            if st.recorders.iter().any(|r| r.name == name) {
                return Err(code_error(ErrorCode::RecorderAlreadyExists));
            }
            if recorder_type == RecorderType::ILinkRt && !st.mcd3_license {
                return Err(code_error(ErrorCode::LicenseNotFound));
            }
            st.recorders.push(SimRecorder {
                name: name.to_string(),
                recorder_type,
                enabled: true,
                state: RecorderState::Configure,
                mdf_filename: format!("{name}.mf4"),
            });
            let idx = st.recorders.len() - 1;
            st.selected_recorder.get_or_insert(idx);
            Ok(RecorderId(idx + 1))
        })
    }

    fn get_recorder_by_index(&self, hdl: Asap3Handle, index: u32) -> CanapeResult<RecorderId> {
        self.with("Asap3GetRecorderByIndex", |st| {
            st.check_session(hdl)?;
            let idx = index as usize;
            if idx < st.recorders.len() {
                Ok(RecorderId(idx + 1))
            } else {
                Err(code_error(ErrorCode::RecorderIndexOutOfRange))
            }
        })
    }

    fn get_selected_recorder(&self, hdl: Asap3Handle) -> CanapeResult<RecorderId> {
        self.with("Asap3GetSelectedRecorder", |st| {
            st.check_session(hdl)?;
            st.selected_recorder.map(|idx| RecorderId(idx + 1)).ok_or_else(|| code_error(ErrorCode::RecorderNotFound))
        })
    }

    fn get_recorder_name(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<String> {
        self.with("Asap3GetRecorderName", |st| {
            st.check_session(hdl)?;
            Ok(st.recorder_mut(recorder)?.name.clone())
        })
    }

    fn get_recorder_state(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<RecorderState> {
        self.with("Asap3GetRecorderState", |st| {
            st.check_session(hdl)?;
            Ok(st.recorder_mut(recorder)?.state)
        })
    }

    fn is_recorder_enabled(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<bool> {
        self.with("Asap3IsRecorderEnabled", |st| {
            st.check_session(hdl)?;
            Ok(st.recorder_mut(recorder)?.enabled)
        })
    }

    fn enable_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, enable: bool) -> CanapeResult<()> {
        self.with("Asap3EnableRecorder", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            st.recorder_mut(recorder)?.enabled = enable;
            Ok(())
        })
    }

    fn get_recorder_mdf_filename(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<String> {
        self.with("Asap3GetRecorderMdfFileName", |st| {
            st.check_session(hdl)?;
            Ok(st.recorder_mut(recorder)?.mdf_filename.clone())
        })
    }

    fn set_recorder_mdf_filename(&self, hdl: Asap3Handle, recorder: RecorderId, file_name: &str) -> CanapeResult<()> {
        self.with("Asap3SetRecorderMdfFileName", |st| {
            st.check_session(hdl)?;
            let rec = st.recorder_mut(recorder)?;
            if file_name.is_empty() {
                return Err(code_error(ErrorCode::ErrorSetRecFilename));
            }
            if rec.recorder_type == RecorderType::Blf && !file_name.to_ascii_lowercase().ends_with(".blf") {
                return Err(code_error(ErrorCode::ErrorSetRecFilename));
            }
            rec.mdf_filename = file_name.to_string();
            Ok(())
        })
    }

    fn start_recorder(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<()> {
        self.with("Asap3StartRecorder", |st| {
            st.check_session(hdl)?;
            let measuring = st.is_measuring();
            let rec = st.recorder_mut(recorder)?;
            if !rec.enabled || !measuring {
                return Err(code_error(ErrorCode::IllegalOperation));
            }
            rec.state = RecorderState::Running;
            Ok(())
        })
    }

    fn stop_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, save_to_mdf: bool) -> CanapeResult<()> {
        self.with("Asap3StopRecorder", |st| {
            st.check_session(hdl)?;
            let rec = st.recorder_mut(recorder)?;
            if !matches!(rec.state, RecorderState::Running | RecorderState::Paused) {
                return Err(code_error(ErrorCode::IllegalOperation));
            }
            rec.state = if save_to_mdf { RecorderState::Suspended } else { RecorderState::Active };
            Ok(())
        })
    }

    fn pause_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, pause: bool) -> CanapeResult<()> {
        self.with("Asap3PauseRecorder", |st| {
            st.check_session(hdl)?;
            let rec = st.recorder_mut(recorder)?;
            rec.state = match (rec.state, pause) {
                (RecorderState::Running, true) => RecorderState::Paused,
                (RecorderState::Paused, false) => RecorderState::Running,
                (s, _) if s == RecorderState::Running || s == RecorderState::Paused => s,
                _ => return Err(code_error(ErrorCode::IllegalOperation)),
            };
            Ok(())
        })
    }

    fn setup_data_acquisition_channel(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        _format: Format,
        task_id: u16,
        polling_rate: u16,
        save_to_file: bool,
    ) -> CanapeResult<()> {
        self.with("Asap3SetupDataAcquisitionChnl", |st| {
            st.check_session(hdl)?;
            st.not_while_measuring()?;
            let m = st.module_mut(module)?;
            m.object(name)?;
            let task = m.task_mut(task_id)?;
            if task.channels.iter().any(|c| c.name == name) {
                return Err(code_error(ErrorCode::ObjectAlreadyDefined));
            }
            task.channels.push(SimChannel { name: name.to_string(), polling_rate, save_to_file });
            Ok(())
        })
    }

    fn check_overrun(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, reset: bool) -> CanapeResult<()> {
        self.with("Asap3CheckOverrun", |st| {
            st.check_session(hdl)?;
            let task = st.module_mut(module)?.task_mut(task_id)?;
            match (task.overrun, reset) {
                (false, _) => Ok(()),
                (true, true) => {
                    task.overrun = false;
                    Ok(())
                }
                (true, false) => Err(code_error(ErrorCode::AcqStpOverflow)),
            }
        })
    }

    fn get_fifo_level(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16) -> CanapeResult<u32> {
        self.with("Asap3GetFifoLevel", |st| {
            st.check_session(hdl)?;
            Ok(st.module_mut(module)?.task_mut(task_id)?.fifo.len() as u32)
        })
    }

    fn get_next_sample(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, count: usize) -> CanapeResult<RawSample> {
        self.with("Asap3GetNextSample", |st| {
            st.check_session(hdl)?;
            let task = st.module_mut(module)?.task_mut(task_id)?;
            task.fifo
                .pop_front()
                .map(|s| sample_values(s, count))
                .ok_or_else(|| code_error(ErrorCode::NoValuesSampled))
        })
    }

    fn get_current_values(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, count: usize) -> CanapeResult<RawSample> {
        self.with("Asap3GetCurrentValues", |st| {
            st.check_session(hdl)?;
            if !st.is_measuring() {
                return Err(code_error(ErrorCode::AcquisNotStarted));
            }
            let task = st.module_mut(module)?.task_mut(task_id)?;
            task.current
                .clone()
                .map(|s| sample_values(s, count))
                .ok_or_else(|| code_error(ErrorCode::NoValuesSampled))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(sim: &SimulatedCanape) -> Asap3Handle {
        sim.init(&InitParams {
            working_dir: "C:\\Projects\\Demo".into(),
            response_timeout: 0,
            fifo_size: 128,
            sample_size: 256,
            debug_mode: false,
            clear_device_list: false,
            hex_mode: false,
            modal_mode: false,
        })
        .unwrap()
    }

    #[test]
    fn errors_carry_function_and_code() {
        let sim = SimulatedCanape::new();
        let hdl = session(&sim);
        let err = sim.get_module_name(hdl, ModuleHandle(4)).unwrap_err();
        assert_eq!(err.error_code(), Some(ErrorCode::InvalidModuleHdl));
        assert!(matches!(err, CanapeError::Api { function: "Asap3GetModuleName", .. }));
        assert_eq!(
            sim.get_module_count(Asap3Handle(999)).unwrap_err().error_code(),
            Some(ErrorCode::InvalidAsap3Hdl)
        );
    }

    #[test]
    fn missing_and_injected_functions() {
        let sim = SimulatedCanape::new();
        let hdl = session(&sim);
        sim.set_missing("Asap3HasMCD3License");
        assert!(matches!(
            sim.has_mcd3_license(hdl),
            Err(CanapeError::NotImplemented { function: "Asap3HasMCD3License", .. })
        ));
        sim.inject_error("Asap3GetModuleCount", ErrorCode::TimeoutResponse);
        assert_eq!(sim.get_module_count(hdl).unwrap_err().raw_code(), Some(16));
        assert_eq!(sim.get_module_count(hdl).unwrap(), 0);
    }

    #[test]
    fn fifo_drains_in_order() {
        let sim = SimulatedCanape::new();
        let hdl = session(&sim);
        let m = sim.add_module("XCPsim", "C:\\db\\XCPsim.a2l");
        sim.add_measurement(m, "channel1", "V");
        sim.add_task(m, "10ms", 3, 10);
        sim.setup_data_acquisition_channel(hdl, m, "channel1", Format::PhysicalRepresentation, 3, 1, false)
            .unwrap();
        sim.start_data_acquisition(hdl).unwrap();
        sim.push_sample(m, 3, 100, &[1.0]);
        sim.push_sample(m, 3, 200, &[2.0]);
        assert_eq!(sim.get_fifo_level(hdl, m, 3).unwrap(), 2);
        assert_eq!(sim.get_next_sample(hdl, m, 3, 2).unwrap().timestamp, 100);
        let second = sim.get_next_sample(hdl, m, 3, 2).unwrap();
        assert_eq!(second.values[0], 2.0);
        assert!(second.values[1].is_nan());
        assert_eq!(
            sim.get_next_sample(hdl, m, 3, 1).unwrap_err().error_code(),
            Some(ErrorCode::NoValuesSampled)
        );
        assert_eq!(
            sim.start_data_acquisition(hdl).unwrap_err().error_code(),
            Some(ErrorCode::AcquisAlreadyRunning)
        );
    }

    #[test]
    fn overrun_is_reported_until_reset() {
        let sim = SimulatedCanape::new();
        let hdl = session(&sim);
        let m = sim.add_module("XCPsim", "XCPsim.a2l");
        sim.add_task(m, "1ms", 1, 1);
        sim.set_overrun(m, 1);
        assert_eq!(sim.check_overrun(hdl, m, 1, false).unwrap_err().error_code(), Some(ErrorCode::AcqStpOverflow));
        sim.check_overrun(hdl, m, 1, true).unwrap();
        sim.check_overrun(hdl, m, 1, false).unwrap();
    }

    #[test]
    fn database_info_splits_path() {
        let sim = SimulatedCanape::new();
        let hdl = session(&sim);
        let m = sim.add_module("XCPsim", "C:\\db\\XCPsim.A2L");
        let info = sim.get_database_info(hdl, m).unwrap();
        assert_eq!(info.file_name, "XCPsim.A2L");
        assert_eq!(info.file_path, "C:\\db");
        assert_eq!(info.file_type, DbFileType::Asap2);
    }
}
