//! The driver module contains the typed seam between the wrappers and the ASAP3 library.
//!
//! [Asap3Driver] has one function per ASAP3 function used by this crate. Implementations
//! are responsible for text conversion, memory management of the native structures and
//! error retrieval, so that the wrappers only deal with Rust types.

use std::fmt;

use parking_lot::ReentrantMutex;

use crate::{
    CanapeError, CanapeResult,
    constants::{
        Channel, DataType, DbFileType, DbObjectSelection, DbObjectType, DriverType, EcuState, EventCode, Format,
        MeasurementState, ObjectType, RecorderState, RecorderType, ScriptStatus, ValueType,
    },
};

#[cfg(feature = "dll")]
pub(crate) mod c_types;
#[cfg(feature = "dll")]
mod lib_funcs;
mod simulation;

#[cfg(feature = "dll")]
pub use lib_funcs::CanapeDll;
pub use simulation::SimulatedCanape;

/// Handle of an ASAP3 session (`TAsap3Hdl`)
///
/// The native handle is a pointer. It is stored as an integer so it can be shared between threads
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Asap3Handle(pub usize);

/// Handle of a module (`TModulHdl`)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModuleHandle(pub u16);

/// Identifier of a recorder (`TRecorderID`)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecorderId(pub usize);

/// Handle of a script (`TScriptHdl`)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScriptHandle(pub u32);

/// Parameters of `Asap3Init5`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitParams {
    /// CANape project directory
    pub working_dir: String,
    /// Timeout in milliseconds
    pub response_timeout: u32,
    /// Total size of the data acquisition FIFO
    pub fifo_size: u32,
    /// Maximum number of samples per FIFO read
    pub sample_size: u32,
    /// Start CANape with the debug window
    pub debug_mode: bool,
    /// Clear the device list of the project
    pub clear_device_list: bool,
    /// Start CANape in hex mode
    pub hex_mode: bool,
    /// Start CANape in non-modal mode
    pub modal_mode: bool,
}

/// Version of the ASAP3 library (`version_t`)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DllVersion {
    /// Main version
    pub main: i32,
    /// Sub version
    pub sub: i32,
    /// Release
    pub release: i32,
    /// Operating system description
    pub os_version: String,
    /// Operating system release
    pub os_release: i32,
}

impl fmt::Display for DllVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.main, self.sub, self.release)
    }
}

/// Version of the CANape application (`Appversion`)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AppVersion {
    /// Main version
    pub main: i32,
    /// Sub version
    pub sub: i32,
    /// Service pack
    pub service_pack: i32,
    /// Application name
    pub application: String,
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{} SP{}", self.application, self.main, self.sub, self.service_pack)
    }
}

/// Database of a module (`DBFileInfo`)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DatabaseInfo {
    /// File name of the database
    pub file_name: String,
    /// Directory of the database
    pub file_path: String,
    /// Type of the database
    pub file_type: DbFileType,
}

/// ECU task of a module (`TTaskInfo2`)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TaskInfo {
    /// Task description
    pub description: String,
    /// Task ID used for data acquisition
    pub task_id: u16,
    /// Cycle time in ms, 0 for event driven tasks
    pub task_cycle: u32,
    /// XCP event channel
    pub event_channel: u32,
}

/// Entry of a module's measurement list (`TMeasurementListEntry`)
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementListEntry {
    /// Task ID the object is measured in
    pub task_id: u16,
    /// Polling rate
    pub rate: u32,
    /// Object is saved to the measurement file
    pub save_flag: bool,
    /// Object is disabled
    pub disabled: bool,
    /// Name of the measured object
    pub object_name: String,
}

/// Database information of an object (`DBObjectInfo`)
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectInfo {
    /// Measurement or calibration object
    pub object_type: ObjectType,
    /// Raw value type, see [ValueType]
    pub value_type: u32,
    /// Lower limit
    pub min: f64,
    /// Upper limit
    pub max: f64,
    /// Extended lower limit
    pub min_ex: f64,
    /// Extended upper limit
    pub max_ex: f64,
    /// Number of decimal places
    pub precision: u8,
    /// Physical unit
    pub unit: String,
}

/// Parameters of an object from `Asap3ReadObjectParameter`
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectParameter {
    /// Data type of the object
    pub data_type: DataType,
    /// ECU address
    pub address: u32,
    /// Lower limit
    pub min: f64,
    /// Upper limit
    pub max: f64,
    /// Increment
    pub increment: f64,
}

/// Value of a calibration object (`TCalibrationObjectValue`)
///
/// Two dimensional values are stored x-major, `values[x][y]`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CalibrationValue {
    /// Scalar value
    Scalar(f64),
    /// Axis points
    Axis(Vec<f64>),
    /// ASCII string
    Ascii {
        /// Current text
        text: String,
        /// Capacity of the object in characters
        len: usize,
    },
    /// Curve with its axis
    Curve {
        /// Axis points
        axis: Vec<f64>,
        /// Curve values
        values: Vec<f64>,
    },
    /// Map with both axes
    Map {
        /// X axis points
        x_axis: Vec<f64>,
        /// Y axis points
        y_axis: Vec<f64>,
        /// Map values
        values: Vec<Vec<f64>>,
    },
    /// Value block
    ValueBlock {
        /// Block values
        values: Vec<Vec<f64>>,
    },
}

impl CalibrationValue {
    /// Value type of the value
    pub fn value_type(&self) -> ValueType {
        match self {
            CalibrationValue::Scalar(_) => ValueType::Value,
            CalibrationValue::Axis(_) => ValueType::Axis,
            CalibrationValue::Ascii { .. } => ValueType::Ascii,
            CalibrationValue::Curve { .. } => ValueType::Curve,
            CalibrationValue::Map { .. } => ValueType::Map,
            CalibrationValue::ValueBlock { .. } => ValueType::ValBlk,
        }
    }

    /// ASCII value filling its whole capacity
    pub fn ascii(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.chars().count();
        CalibrationValue::Ascii { text, len }
    }

    /// Dimension of the value. Empty for scalars, capacity for ASCII values,
    /// `[x, y]` for maps and value blocks
    pub fn dimension(&self) -> Vec<usize> {
        match self {
            CalibrationValue::Scalar(_) => Vec::new(),
            CalibrationValue::Axis(a) => vec![a.len()],
            CalibrationValue::Ascii { len, .. } => vec![*len],
            CalibrationValue::Curve { values, .. } => vec![values.len()],
            CalibrationValue::Map { x_axis, y_axis, .. } => vec![x_axis.len(), y_axis.len()],
            CalibrationValue::ValueBlock { values } => {
                vec![values.len(), values.first().map(|v| v.len()).unwrap_or(0)]
            }
        }
    }

    /// True if `new` can be written to an object holding `self`
    pub fn accepts(&self, new: &CalibrationValue) -> bool {
        match (self, new) {
            (CalibrationValue::Ascii { len, .. }, CalibrationValue::Ascii { text, .. }) => text.chars().count() <= *len,
            (old, new) => old.value_type() == new.value_type() && old.dimension() == new.dimension(),
        }
    }

    /// Replaces the value by `new`. ASCII values keep their capacity
    pub(crate) fn replace(&mut self, new: &CalibrationValue) {
        match (self, new) {
            (CalibrationValue::Ascii { text, .. }, CalibrationValue::Ascii { text: new_text, .. }) => {
                *text = new_text.clone()
            }
            (current, new) => *current = new.clone(),
        }
    }
}

/// Splits a flat x-major array into `x` rows of `y` values
#[cfg_attr(not(feature = "dll"), allow(dead_code))]
pub(crate) fn to_rows(flat: &[f64], x: usize, y: usize) -> Vec<Vec<f64>> {
    if y == 0 {
        return vec![Vec::new(); x];
    }
    flat.chunks(y).take(x).map(|c| c.to_vec()).collect()
}

/// Sample read from the FIFO of an ECU task
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    /// Timestamp in `TTime` ticks (10 µs)
    pub timestamp: u32,
    /// One value per configured channel, in setup order
    pub values: Vec<f64>,
}

/// Parameters of `Asap3CreateModule3`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDefinition {
    /// Module name
    pub name: String,
    /// Database file name, with full path
    pub database_filename: String,
    /// Driver type
    pub driver: DriverType,
    /// Communication channel
    pub channel: Channel,
    /// Switch the module online after creation
    pub go_online: bool,
    /// Cache mode. -1 keeps the CANape default
    pub enable_cache: i16,
}

/// Access to the ASAP3 functions used by this crate
///
/// All functions are safe. Errors reported by the library are returned as [CanapeError::Api].
/// Every call is serialized through [Asap3Driver::call_lock], which is reentrant so
/// that a sequence of calls can hold it for its whole duration.
pub trait Asap3Driver: Send + Sync + fmt::Debug {
    /// Reentrant lock every call of this driver is executed under
    fn call_lock(&self) -> &ReentrantMutex<()>;

    /// Version of the ASAP3 library (`Asap3GetVersion`)
    fn get_dll_version(&self) -> CanapeResult<DllVersion>;
    /// Starts or attaches to CANape (`Asap3Init5`)
    fn init(&self, params: &InitParams) -> CanapeResult<Asap3Handle>;
    /// Ends the session (`Asap3Exit2`)
    fn exit(&self, hdl: Asap3Handle, close_canape: bool) -> CanapeResult<()>;
    /// Routes `event` to the callbacks of the session (`Asap3RegisterCallBack`)
    fn register_event(&self, hdl: Asap3Handle, event: EventCode) -> CanapeResult<()>;
    /// Stops routing `event` (`Asap3UnRegisterCallBack`)
    fn unregister_event(&self, hdl: Asap3Handle, event: EventCode) -> CanapeResult<()>;

    /// `Asap3GetApplicationVersion`
    fn get_application_version(&self, hdl: Asap3Handle) -> CanapeResult<AppVersion>;
    /// `Asap3GetProjectDirectory`
    fn get_project_directory(&self, hdl: Asap3Handle) -> CanapeResult<String>;
    /// `Asap3SetInteractiveMode`
    fn set_interactive_mode(&self, hdl: Asap3Handle, mode: bool) -> CanapeResult<()>;
    /// `Asap3PopupDebugWindow`
    fn popup_debug_window(&self, hdl: Asap3Handle) -> CanapeResult<()>;
    /// `Asap3IsNetworkActivated`
    fn is_network_activated(&self, hdl: Asap3Handle, network: &str) -> CanapeResult<bool>;
    /// `Asap3ResetDataAcquisitionChnls`
    fn reset_data_acquisition_channels(&self, hdl: Asap3Handle) -> CanapeResult<()>;
    /// `Asap3StartDataAcquisition`
    fn start_data_acquisition(&self, hdl: Asap3Handle) -> CanapeResult<()>;
    /// `Asap3StopDataAcquisition`
    fn stop_data_acquisition(&self, hdl: Asap3Handle) -> CanapeResult<()>;
    /// `Asap3GetMeasurementState`
    fn get_measurement_state(&self, hdl: Asap3Handle) -> CanapeResult<MeasurementState>;
    /// `Asap3HasMCD3License`
    fn has_mcd3_license(&self, hdl: Asap3Handle) -> CanapeResult<bool>;
    /// `Asap3GetCNAFilename`
    fn get_cna_filename(&self, hdl: Asap3Handle) -> CanapeResult<String>;
    /// `Asap3LoadCNAFile`
    fn load_cna_file(&self, hdl: Asap3Handle, file_name: &str) -> CanapeResult<()>;

    /// `Asap3CreateModule3`
    fn create_module(&self, hdl: Asap3Handle, def: &ModuleDefinition) -> CanapeResult<ModuleHandle>;
    /// `Asap3GetModuleCount`
    fn get_module_count(&self, hdl: Asap3Handle) -> CanapeResult<u32>;
    /// `Asap3GetModuleHandle`
    fn get_module_handle(&self, hdl: Asap3Handle, name: &str) -> CanapeResult<ModuleHandle>;
    /// `Asap3GetModuleName`
    fn get_module_name(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String>;
    /// `Asap3GetCommunicationType`
    fn get_communication_type(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String>;
    /// `Asap3GetNetworkName`
    fn get_network_name(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String>;
    /// `Asap3GetEcuDriverType`
    fn get_ecu_driver_type(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<DriverType>;
    /// `Asap3IsECUOnline`
    fn is_ecu_online(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<EcuState>;
    /// `Asap3ECUOnOffline`
    fn ecu_on_offline(&self, hdl: Asap3Handle, module: ModuleHandle, state: EcuState, download: bool) -> CanapeResult<()>;
    /// `Asap3IsModuleActive`
    fn is_module_active(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<bool>;
    /// `Asap3ModuleActivation`
    fn module_activation(&self, hdl: Asap3Handle, module: ModuleHandle, activate: bool) -> CanapeResult<()>;
    /// `Asap3HasResumeMode`
    fn has_resume_mode(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<bool>;
    /// `Asap3ResetDataAcquisitionChnlsByModule`
    fn reset_data_acquisition_channels_by_module(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<()>;
    /// `Asap3ReleaseModule`
    fn release_module(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<()>;
    /// `Asap3GetDatabaseInfo`
    fn get_database_info(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<DatabaseInfo>;
    /// `Asap3GetDatabaseObjects`. Returns the raw `;` separated list
    fn get_database_objects(&self, hdl: Asap3Handle, module: ModuleHandle, filter: DbObjectType) -> CanapeResult<String>;
    /// `Asap3GetDatabaseObjectsByType`. Returns the raw `;` separated list
    fn get_database_objects_by_type(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        filter: DbObjectType,
        selection: DbObjectSelection,
    ) -> CanapeResult<String>;
    /// `Asap3GetEcuTasks2`
    fn get_ecu_tasks(&self, hdl: Asap3Handle, module: ModuleHandle, max_tasks: u16) -> CanapeResult<Vec<TaskInfo>>;
    /// `Asap3GetMeasurementListEntries`
    fn get_measurement_list_entries(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<Vec<MeasurementListEntry>>;
    /// `Asap3GetDBObjectInfo`
    fn get_db_object_info(&self, hdl: Asap3Handle, module: ModuleHandle, name: &str) -> CanapeResult<ObjectInfo>;
    /// `Asap3ReadObjectParameter`
    fn read_object_parameter(&self, hdl: Asap3Handle, module: ModuleHandle, name: &str, format: Format) -> CanapeResult<ObjectParameter>;
    /// `Asap3ReadCalibrationObject2`
    fn read_calibration_object(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        format: Format,
        force_upload: bool,
    ) -> CanapeResult<CalibrationValue>;
    /// `Asap3WriteCalibrationObject`
    fn write_calibration_object(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        format: Format,
        value: &CalibrationValue,
    ) -> CanapeResult<()>;
    /// `Asap3ExecuteScriptEx`
    fn execute_script_ex(&self, hdl: Asap3Handle, module: ModuleHandle, script_file: bool, script: &str) -> CanapeResult<ScriptHandle>;

    /// `Asap3GetScriptState`
    fn get_script_state(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<ScriptStatus>;
    /// `Asap3StartScript`
    fn start_script(&self, hdl: Asap3Handle, script: ScriptHandle, command_line: Option<&str>, module: Option<ModuleHandle>) -> CanapeResult<()>;
    /// `Asap3StopScript`
    fn stop_script(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<()>;
    /// `Asap3ReleaseScript`
    fn release_script(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<()>;
    /// `Asap3GetScriptResultValue`
    fn get_script_result_value(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<f64>;
    /// `Asap3GetScriptResultString`
    fn get_script_result_string(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<String>;

    /// `Asap3GetRecorderCount`
    fn get_recorder_count(&self, hdl: Asap3Handle) -> CanapeResult<u32>;
    /// `Asap3DefineRecorder`
    fn define_recorder(&self, hdl: Asap3Handle, name: &str, recorder_type: RecorderType) -> CanapeResult<RecorderId>;
    /// `Asap3GetRecorderByIndex`
    fn get_recorder_by_index(&self, hdl: Asap3Handle, index: u32) -> CanapeResult<RecorderId>;
    /// `Asap3GetSelectedRecorder`
    fn get_selected_recorder(&self, hdl: Asap3Handle) -> CanapeResult<RecorderId>;
    /// `Asap3GetRecorderName`
    fn get_recorder_name(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<String>;
    /// `Asap3GetRecorderState`
    fn get_recorder_state(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<RecorderState>;
    /// `Asap3IsRecorderEnabled`
    fn is_recorder_enabled(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<bool>;
    /// `Asap3EnableRecorder`
    fn enable_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, enable: bool) -> CanapeResult<()>;
    /// `Asap3GetRecorderMdfFileName`
    fn get_recorder_mdf_filename(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<String>;
    /// `Asap3SetRecorderMdfFileName`
    fn set_recorder_mdf_filename(&self, hdl: Asap3Handle, recorder: RecorderId, file_name: &str) -> CanapeResult<()>;
    /// `Asap3StartRecorder`
    fn start_recorder(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<()>;
    /// `Asap3StopRecorder`
    fn stop_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, save_to_mdf: bool) -> CanapeResult<()>;
    /// `Asap3PauseRecorder`
    fn pause_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, pause: bool) -> CanapeResult<()>;

    /// `Asap3SetupDataAcquisitionChnl`
    #[allow(clippy::too_many_arguments)]
    fn setup_data_acquisition_channel(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        format: Format,
        task_id: u16,
        polling_rate: u16,
        save_to_file: bool,
    ) -> CanapeResult<()>;
    /// `Asap3CheckOverrun`. Returns an error if the FIFO overran
    fn check_overrun(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, reset: bool) -> CanapeResult<()>;
    /// `Asap3GetFifoLevel`
    fn get_fifo_level(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16) -> CanapeResult<u32>;
    /// `Asap3GetNextSample`. `count` is the number of channels set up for the task
    fn get_next_sample(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, count: usize) -> CanapeResult<RawSample>;
    /// `Asap3GetCurrentValues`
    fn get_current_values(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, count: usize) -> CanapeResult<RawSample>;
}

/// Converts a raw library value into one of the typed enumerations
#[cfg_attr(not(feature = "dll"), allow(dead_code))]
pub(crate) fn enum_value<T, R>(kind: &'static str, raw: R, conv: impl FnOnce(R) -> Option<T>) -> CanapeResult<T>
where
    R: Copy + Into<i64>,
{
    conv(raw).ok_or_else(|| {
        log::error!("Library returned invalid {kind} value {}", raw.into());
        CanapeError::InvalidEnumValue { kind, value: raw.into() }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibration_value_dimensions() {
        let map = CalibrationValue::Map {
            x_axis: vec![0.0, 1.0, 2.0],
            y_axis: vec![0.0, 1.0],
            values: to_rows(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2),
        };
        assert_eq!(map.dimension(), vec![3, 2]);
        assert_eq!(map.value_type(), ValueType::Map);
        if let CalibrationValue::Map { values, .. } = map {
            assert_eq!(values[1], vec![3.0, 4.0]);
        }
        assert!(CalibrationValue::Scalar(1.0).dimension().is_empty());
        assert_eq!(CalibrationValue::ascii("abc").dimension(), vec![3]);
    }

    #[test]
    fn ascii_keeps_its_capacity() {
        let mut text = CalibrationValue::ascii("hello");
        assert!(text.accepts(&CalibrationValue::ascii("hi")));
        text.replace(&CalibrationValue::ascii("hi"));
        assert_eq!(text, CalibrationValue::Ascii { text: "hi".into(), len: 5 });
        assert!(text.accepts(&CalibrationValue::ascii("world")));
        assert!(!text.accepts(&CalibrationValue::ascii("hello!")));
        assert!(!text.accepts(&CalibrationValue::Scalar(1.0)));
    }

    #[test]
    fn invalid_enum_values_are_errors() {
        let res = enum_value("RecorderState", 9u32, RecorderState::from_repr);
        assert!(matches!(res, Err(CanapeError::InvalidEnumValue { kind: "RecorderState", value: 9 })));
        assert_eq!(enum_value("EcuState", 1u32, EcuState::from_repr).unwrap(), EcuState::Offline);
    }
}
