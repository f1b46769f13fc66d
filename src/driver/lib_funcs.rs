//! Runtime binding of `CANapAPI.dll` / `CANapAPI64.dll`

use std::{
    ffi::CStr,
    fmt,
    os::raw::{c_char, c_short, c_uint, c_ulong, c_ushort},
    ptr,
    sync::Arc,
};

use libloading::Library;
use parking_lot::ReentrantMutex;

use super::{
    AppVersion, Asap3Driver, Asap3Handle, CalibrationValue, DatabaseInfo, DllVersion, InitParams,
    MeasurementListEntry, ModuleDefinition, ModuleHandle, ObjectInfo, ObjectParameter, RawSample,
    RecorderId, ScriptHandle, TaskInfo, c_types::*, enum_value, to_rows,
};
use crate::{
    CanapeError, CanapeResult,
    config::DriverConfig,
    constants::{
        DataType, DbFileType, DbObjectSelection, DbObjectType, DriverType, EcuState, ErrorCode, EventCode, Format,
        INVALID_MODULE_HANDLE, MeasurementState, ObjectType, RecorderState, RecorderType,
        ScriptStatus, ValueType,
    },
    events,
    helpers::TextEncoding,
};

type Asap3GetLastErrorFn = unsafe extern "system" fn(hdl: TAsap3Hdl) -> c_ushort;
type Asap3ErrorTextFn = unsafe extern "system" fn(hdl: TAsap3Hdl, code: c_ushort, text: *mut *mut c_char) -> bool;
type Asap3GetVersionFn = unsafe extern "system" fn(version: *mut version_t) -> bool;
type Asap3Init5Fn = unsafe extern "system" fn(
    hdl: *mut TAsap3Hdl,
    response_timeout: ULONG,
    working_dir: *const c_char,
    fifo_size: ULONG,
    sample_size: ULONG,
    debug_mode: bool,
    clear_device_list: bool,
    hex_mode: bool,
    modal_mode: bool,
) -> bool;
type Asap3Exit2Fn = unsafe extern "system" fn(hdl: TAsap3Hdl, close_canape: bool) -> bool;
type Asap3RegisterCallBackFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, event: c_uint, callback: EVENT_CALLBACK, private_data: ULONG) -> bool;
type Asap3UnRegisterCallBackFn = unsafe extern "system" fn(hdl: TAsap3Hdl, event: c_uint) -> bool;
type Asap3GetApplicationVersionFn = unsafe extern "system" fn(hdl: TAsap3Hdl, version: *mut Appversion) -> bool;
type Asap3GetProjectDirectoryFn = unsafe extern "system" fn(hdl: TAsap3Hdl, dir: *mut c_char, size: *mut ULONG) -> bool;
type Asap3IsNetworkActivatedFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, name: *const c_char, activated: *mut bool) -> bool;
type Asap3GetCNAFilenameFn = unsafe extern "system" fn(hdl: TAsap3Hdl, name: *mut c_char, size: *mut c_uint) -> bool;
type Asap3CreateModule3Fn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module_name: *const c_char,
    desc_file: *const c_char,
    driver_type: c_short,
    channel_no: c_short,
    go_online: bool,
    enable_cache: c_short,
    module: *mut TModulHdl,
) -> bool;
type Asap3GetModuleHandleFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, name: *const c_char, module: *mut TModulHdl) -> bool;
type Asap3GetNetworkNameFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, name: *mut c_char, size: *mut c_uint) -> bool;
type Asap3ECUOnOfflineFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, state: c_uint, download: bool) -> bool;
type Asap3GetDatabaseInfoFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, info: *mut DBFileInfo) -> bool;
type Asap3GetDatabaseObjectsFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    objects: *mut c_char,
    max_size: *mut c_uint,
    db_type: c_uint,
) -> bool;
type Asap3GetDatabaseObjectsByTypeFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    objects: *mut c_char,
    max_size: *mut c_uint,
    db_type: c_uint,
    type_filter: c_ulong,
) -> bool;
type Asap3GetEcuTasks2Fn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    tasks: *mut TTaskInfo2,
    count: *mut c_ushort,
    max_tasks: c_ushort,
) -> bool;
type Asap3GetMeasurementListEntriesFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, items: *mut *mut TMeasurementListEntries) -> bool;
type Asap3GetDBObjectInfoFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, name: *const c_char, info: *mut DBObjectInfo) -> bool;
type Asap3ReadObjectParameterFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    name: *const c_char,
    format: c_uint,
    data_type: *mut c_uint,
    address: *mut ULONG,
    min: *mut f64,
    max: *mut f64,
    increment: *mut f64,
) -> bool;
type Asap3ReadCalibrationObject2Fn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    name: *const c_char,
    format: c_uint,
    force_upload: bool,
    value: *mut TCalibrationObjectValue,
) -> bool;
type Asap3WriteCalibrationObjectFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    name: *const c_char,
    format: c_uint,
    value: *mut TCalibrationObjectValue,
) -> bool;
type Asap3ExecuteScriptExFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    script_file: bool,
    script: *const c_char,
    script_hdl: *mut TScriptHdl,
) -> bool;
type Asap3GetScriptStateFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    script: TScriptHdl,
    state: *mut c_uint,
    text: *mut c_char,
    size: *mut ULONG,
) -> bool;
type Asap3StartScriptFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, script: TScriptHdl, command_line: *const c_char, module: TModulHdl) -> bool;
type Asap3GetScriptResultValueFn = unsafe extern "system" fn(hdl: TAsap3Hdl, script: TScriptHdl, value: *mut f64) -> bool;
type Asap3GetScriptResultStringFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, script: TScriptHdl, text: *mut c_char, size: *mut ULONG) -> bool;
type Asap3DefineRecorderFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    name: *const c_char,
    recorder: *mut TRecorderID,
    recorder_type: c_uint,
) -> bool;
type Asap3GetRecorderByIndexFn = unsafe extern "system" fn(hdl: TAsap3Hdl, index: ULONG, recorder: *mut TRecorderID) -> bool;
type Asap3GetSelectedRecorderFn = unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: *mut TRecorderID) -> bool;
type Asap3GetRecorderNameFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: TRecorderID, name: *mut c_char, size: *mut LONG) -> bool;
type Asap3GetRecorderMdfFileNameFn =
    unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: TRecorderID, name: *mut c_char, size: *mut ULONG) -> bool;
type Asap3SetupDataAcquisitionChnlFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    name: *const c_char,
    format: c_uint,
    task_id: c_ushort,
    polling_rate: c_ushort,
    save_to_file: bool,
) -> bool;
type Asap3CheckOverrunFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, task_id: c_ushort, reset: bool) -> bool;
type Asap3GetFifoLevelFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, task_id: c_ushort) -> LONG;
type Asap3GetNextSampleFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    task_id: c_ushort,
    timestamp: *mut TTime,
    values: *mut *mut f64,
) -> bool;
type Asap3GetCurrentValuesFn = unsafe extern "system" fn(
    hdl: TAsap3Hdl,
    module: TModulHdl,
    task_id: c_ushort,
    timestamp: *mut TTime,
    values: *mut f64,
    max_values: c_ushort,
) -> bool;

// Functions sharing a signature
type HdlFn = unsafe extern "system" fn(hdl: TAsap3Hdl) -> bool;
type HdlBoolFn = unsafe extern "system" fn(hdl: TAsap3Hdl, value: bool) -> bool;
type HdlOutBoolFn = unsafe extern "system" fn(hdl: TAsap3Hdl, value: *mut bool) -> bool;
type HdlOutEnumFn = unsafe extern "system" fn(hdl: TAsap3Hdl, value: *mut c_uint) -> bool;
type HdlOutUlongFn = unsafe extern "system" fn(hdl: TAsap3Hdl, value: *mut ULONG) -> bool;
type HdlStrFn = unsafe extern "system" fn(hdl: TAsap3Hdl, value: *const c_char) -> bool;
type ModFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl) -> bool;
type ModBoolFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, value: bool) -> bool;
type ModOutBoolFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, value: *mut bool) -> bool;
type ModOutEnumFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, value: *mut c_uint) -> bool;
type ModOutStrFn = unsafe extern "system" fn(hdl: TAsap3Hdl, module: TModulHdl, value: *mut *mut c_char) -> bool;
type ScriptFn = unsafe extern "system" fn(hdl: TAsap3Hdl, script: TScriptHdl) -> bool;
type RecFn = unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: TRecorderID) -> bool;
type RecBoolFn = unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: TRecorderID, value: bool) -> bool;
type RecOutBoolFn = unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: TRecorderID, value: *mut bool) -> bool;
type RecOutEnumFn = unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: TRecorderID, value: *mut c_uint) -> bool;
type RecStrFn = unsafe extern "system" fn(hdl: TAsap3Hdl, recorder: TRecorderID, value: *const c_char) -> bool;

/// Optional library function. Older library versions do not export every function
#[derive(Copy, Clone)]
struct Sym<T> {
    name: &'static str,
    func: Option<T>,
}

impl<T: Copy> Sym<T> {
    /// # Safety
    /// `T` must be the function pointer type matching the exported symbol
    unsafe fn load(lib: &Library, name: &'static str) -> Self {
        let func = match unsafe { lib.get::<T>(name.as_bytes()) } {
            Ok(s) => Some(*s),
            Err(e) => {
                log::warn!("{name} is not exported by the library: {e}");
                None
            }
        };
        Self { name, func }
    }
}

struct Symbols {
    init5: Sym<Asap3Init5Fn>,
    exit2: Sym<Asap3Exit2Fn>,
    register_callback: Sym<Asap3RegisterCallBackFn>,
    unregister_callback: Sym<Asap3UnRegisterCallBackFn>,
    get_application_version: Sym<Asap3GetApplicationVersionFn>,
    get_project_directory: Sym<Asap3GetProjectDirectoryFn>,
    set_interactive_mode: Sym<HdlBoolFn>,
    popup_debug_window: Sym<HdlFn>,
    is_network_activated: Sym<Asap3IsNetworkActivatedFn>,
    reset_data_acquisition_chnls: Sym<HdlFn>,
    start_data_acquisition: Sym<HdlFn>,
    stop_data_acquisition: Sym<HdlFn>,
    get_measurement_state: Sym<HdlOutEnumFn>,
    has_mcd3_license: Sym<HdlOutBoolFn>,
    get_cna_filename: Sym<Asap3GetCNAFilenameFn>,
    load_cna_file: Sym<HdlStrFn>,
    create_module3: Sym<Asap3CreateModule3Fn>,
    get_module_count: Sym<HdlOutUlongFn>,
    get_module_handle: Sym<Asap3GetModuleHandleFn>,
    get_module_name: Sym<ModOutStrFn>,
    get_communication_type: Sym<ModOutStrFn>,
    get_network_name: Sym<Asap3GetNetworkNameFn>,
    get_ecu_driver_type: Sym<ModOutEnumFn>,
    is_ecu_online: Sym<ModOutEnumFn>,
    ecu_on_offline: Sym<Asap3ECUOnOfflineFn>,
    is_module_active: Sym<ModOutBoolFn>,
    module_activation: Sym<ModBoolFn>,
    has_resume_mode: Sym<ModOutBoolFn>,
    reset_data_acquisition_chnls_by_module: Sym<ModFn>,
    release_module: Sym<ModFn>,
    get_database_info: Sym<Asap3GetDatabaseInfoFn>,
    get_database_objects: Sym<Asap3GetDatabaseObjectsFn>,
    get_database_objects_by_type: Sym<Asap3GetDatabaseObjectsByTypeFn>,
    get_ecu_tasks2: Sym<Asap3GetEcuTasks2Fn>,
    get_measurement_list_entries: Sym<Asap3GetMeasurementListEntriesFn>,
    get_db_object_info: Sym<Asap3GetDBObjectInfoFn>,
    read_object_parameter: Sym<Asap3ReadObjectParameterFn>,
    read_calibration_object2: Sym<Asap3ReadCalibrationObject2Fn>,
    write_calibration_object: Sym<Asap3WriteCalibrationObjectFn>,
    execute_script_ex: Sym<Asap3ExecuteScriptExFn>,
    get_script_state: Sym<Asap3GetScriptStateFn>,
    start_script: Sym<Asap3StartScriptFn>,
    stop_script: Sym<ScriptFn>,
    release_script: Sym<ScriptFn>,
    get_script_result_value: Sym<Asap3GetScriptResultValueFn>,
    get_script_result_string: Sym<Asap3GetScriptResultStringFn>,
    get_recorder_count: Sym<HdlOutUlongFn>,
    define_recorder: Sym<Asap3DefineRecorderFn>,
    get_recorder_by_index: Sym<Asap3GetRecorderByIndexFn>,
    get_selected_recorder: Sym<Asap3GetSelectedRecorderFn>,
    get_recorder_name: Sym<Asap3GetRecorderNameFn>,
    get_recorder_state: Sym<RecOutEnumFn>,
    is_recorder_enabled: Sym<RecOutBoolFn>,
    enable_recorder: Sym<RecBoolFn>,
    get_recorder_mdf_filename: Sym<Asap3GetRecorderMdfFileNameFn>,
    set_recorder_mdf_filename: Sym<RecStrFn>,
    start_recorder: Sym<RecFn>,
    stop_recorder: Sym<RecBoolFn>,
    pause_recorder: Sym<RecBoolFn>,
    setup_data_acquisition_chnl: Sym<Asap3SetupDataAcquisitionChnlFn>,
    check_overrun: Sym<Asap3CheckOverrunFn>,
    get_fifo_level: Sym<Asap3GetFifoLevelFn>,
    get_next_sample: Sym<Asap3GetNextSampleFn>,
    get_current_values: Sym<Asap3GetCurrentValuesFn>,
}

impl Symbols {
    unsafe fn load(lib: &Library) -> Self {
        unsafe {
            Self {
                init5: Sym::load(lib, "Asap3Init5"),
                exit2: Sym::load(lib, "Asap3Exit2"),
                register_callback: Sym::load(lib, "Asap3RegisterCallBack"),
                unregister_callback: Sym::load(lib, "Asap3UnRegisterCallBack"),
                get_application_version: Sym::load(lib, "Asap3GetApplicationVersion"),
                get_project_directory: Sym::load(lib, "Asap3GetProjectDirectory"),
                set_interactive_mode: Sym::load(lib, "Asap3SetInteractiveMode"),
                popup_debug_window: Sym::load(lib, "Asap3PopupDebugWindow"),
                is_network_activated: Sym::load(lib, "Asap3IsNetworkActivated"),
                reset_data_acquisition_chnls: Sym::load(lib, "Asap3ResetDataAcquisitionChnls"),
                start_data_acquisition: Sym::load(lib, "Asap3StartDataAcquisition"),
                stop_data_acquisition: Sym::load(lib, "Asap3StopDataAcquisition"),
                get_measurement_state: Sym::load(lib, "Asap3GetMeasurementState"),
                has_mcd3_license: Sym::load(lib, "Asap3HasMCD3License"),
                get_cna_filename: Sym::load(lib, "Asap3GetCNAFilename"),
                load_cna_file: Sym::load(lib, "Asap3LoadCNAFile"),
                create_module3: Sym::load(lib, "Asap3CreateModule3"),
                get_module_count: Sym::load(lib, "Asap3GetModuleCount"),
                get_module_handle: Sym::load(lib, "Asap3GetModuleHandle"),
                get_module_name: Sym::load(lib, "Asap3GetModuleName"),
                get_communication_type: Sym::load(lib, "Asap3GetCommunicationType"),
                get_network_name: Sym::load(lib, "Asap3GetNetworkName"),
                get_ecu_driver_type: Sym::load(lib, "Asap3GetEcuDriverType"),
                is_ecu_online: Sym::load(lib, "Asap3IsECUOnline"),
                ecu_on_offline: Sym::load(lib, "Asap3ECUOnOffline"),
                is_module_active: Sym::load(lib, "Asap3IsModuleActive"),
                module_activation: Sym::load(lib, "Asap3ModuleActivation"),
                has_resume_mode: Sym::load(lib, "Asap3HasResumeMode"),
                reset_data_acquisition_chnls_by_module: Sym::load(lib, "Asap3ResetDataAcquisitionChnlsByModule"),
                release_module: Sym::load(lib, "Asap3ReleaseModule"),
                get_database_info: Sym::load(lib, "Asap3GetDatabaseInfo"),
                get_database_objects: Sym::load(lib, "Asap3GetDatabaseObjects"),
                get_database_objects_by_type: Sym::load(lib, "Asap3GetDatabaseObjectsByType"),
                get_ecu_tasks2: Sym::load(lib, "Asap3GetEcuTasks2"),
                get_measurement_list_entries: Sym::load(lib, "Asap3GetMeasurementListEntries"),
                get_db_object_info: Sym::load(lib, "Asap3GetDBObjectInfo"),
                read_object_parameter: Sym::load(lib, "Asap3ReadObjectParameter"),
                read_calibration_object2: Sym::load(lib, "Asap3ReadCalibrationObject2"),
                write_calibration_object: Sym::load(lib, "Asap3WriteCalibrationObject"),
                execute_script_ex: Sym::load(lib, "Asap3ExecuteScriptEx"),
                get_script_state: Sym::load(lib, "Asap3GetScriptState"),
                start_script: Sym::load(lib, "Asap3StartScript"),
                stop_script: Sym::load(lib, "Asap3StopScript"),
                release_script: Sym::load(lib, "Asap3ReleaseScript"),
                get_script_result_value: Sym::load(lib, "Asap3GetScriptResultValue"),
                get_script_result_string: Sym::load(lib, "Asap3GetScriptResultString"),
                get_recorder_count: Sym::load(lib, "Asap3GetRecorderCount"),
                define_recorder: Sym::load(lib, "Asap3DefineRecorder"),
                get_recorder_by_index: Sym::load(lib, "Asap3GetRecorderByIndex"),
                get_selected_recorder: Sym::load(lib, "Asap3GetSelectedRecorder"),
                get_recorder_name: Sym::load(lib, "Asap3GetRecorderName"),
                get_recorder_state: Sym::load(lib, "Asap3GetRecorderState"),
                is_recorder_enabled: Sym::load(lib, "Asap3IsRecorderEnabled"),
                enable_recorder: Sym::load(lib, "Asap3EnableRecorder"),
                get_recorder_mdf_filename: Sym::load(lib, "Asap3GetRecorderMdfFileName"),
                set_recorder_mdf_filename: Sym::load(lib, "Asap3SetRecorderMdfFileName"),
                start_recorder: Sym::load(lib, "Asap3StartRecorder"),
                stop_recorder: Sym::load(lib, "Asap3StopRecorder"),
                pause_recorder: Sym::load(lib, "Asap3PauseRecorder"),
                setup_data_acquisition_chnl: Sym::load(lib, "Asap3SetupDataAcquisitionChnl"),
                check_overrun: Sym::load(lib, "Asap3CheckOverrun"),
                get_fifo_level: Sym::load(lib, "Asap3GetFifoLevel"),
                get_next_sample: Sym::load(lib, "Asap3GetNextSample"),
                get_current_values: Sym::load(lib, "Asap3GetCurrentValues"),
            }
        }
    }
}

/// Receives events from the library and hands them to the session registry
unsafe extern "system" fn event_trampoline(hdl: TAsap3Hdl, private_data: ULONG) -> LONG {
    let handle = Asap3Handle(hdl as usize);
    // A panic must not unwind into the library
    match std::panic::catch_unwind(|| events::dispatch(handle, u64::from(private_data))) {
        Ok(_) => 0,
        Err(_) => {
            log::error!("Event callback for {handle:?} panicked");
            0
        }
    }
}

fn raw(hdl: Asap3Handle) -> TAsap3Hdl {
    hdl.0 as TAsap3Hdl
}

fn raw_recorder(recorder: RecorderId) -> TRecorderID {
    recorder.0 as TRecorderID
}

fn short(len: usize) -> CanapeResult<c_short> {
    c_short::try_from(len).map_err(|_| CanapeError::DimensionMismatch {
        expected: vec![c_short::MAX as usize],
        actual: vec![len],
    })
}

fn dim(d: c_short) -> usize {
    usize::try_from(d).unwrap_or(0)
}

/// Copies `len` doubles from library owned memory
///
/// # Safety
/// `data` must be null or point to at least `len` doubles
unsafe fn read_doubles(data: *const f64, len: usize) -> Vec<f64> {
    if data.is_null() {
        return Vec::new();
    }
    (0..len).map(|i| unsafe { ptr::read_unaligned(data.add(i)) }).collect()
}

/// Loaded ASAP3 library
pub struct CanapeDll {
    /// Loaded library
    lib: Arc<Library>,
    /// Path the library was loaded from
    path: String,
    /// Encoding of strings exchanged with the library
    encoding: TextEncoding,
    /// Version reported by `Asap3GetVersion`
    version: DllVersion,
    /// Every call and its error retrieval run under this lock
    lock: ReentrantMutex<()>,
    get_last_error_fn: Asap3GetLastErrorFn,
    error_text_fn: Asap3ErrorTextFn,
    syms: Symbols,
}

impl fmt::Debug for CanapeDll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanapeDll")
            .field("path", &self.path)
            .field("version", &self.version.to_string())
            .field("encoding", &self.encoding)
            .field("library", &self.lib)
            .finish()
    }
}

impl CanapeDll {
    /// Loads the library from `path`.
    ///
    /// `Asap3GetLastError`, `Asap3ErrorText` and `Asap3GetVersion` must be exported.
    /// All other functions are optional, calling a missing one returns [CanapeError::NotImplemented]
    pub fn load_lib(path: &str, encoding: TextEncoding) -> CanapeResult<Self> {
        log::debug!("Opening function library {path}");
        let lib = unsafe { Library::new(path)? };
        let (get_last_error_fn, error_text_fn, get_version_fn, syms) = unsafe {
            let get_last_error_fn = *lib.get::<Asap3GetLastErrorFn>(b"Asap3GetLastError\0")?;
            let error_text_fn = *lib.get::<Asap3ErrorTextFn>(b"Asap3ErrorText\0")?;
            let get_version_fn = *lib.get::<Asap3GetVersionFn>(b"Asap3GetVersion\0")?;
            (get_last_error_fn, error_text_fn, get_version_fn, Symbols::load(&lib))
        };
        let mut dll = CanapeDll {
            lib: Arc::new(lib),
            path: path.to_string(),
            encoding,
            version: DllVersion {
                main: 0,
                sub: 0,
                release: 0,
                os_version: String::new(),
                os_release: 0,
            },
            lock: ReentrantMutex::new(()),
            get_last_error_fn,
            error_text_fn,
            syms,
        };
        let mut v = version_t::default();
        let ok = {
            let _guard = dll.lock.lock();
            unsafe { get_version_fn(&mut v) }
        };
        if !ok {
            let _guard = dll.lock.lock();
            return Err(dll
                .last_error(ptr::null_mut(), "Asap3GetVersion")
                .unwrap_or_else(|| CanapeError::from_code(ErrorCode::VersionError as u16, "Asap3GetVersion")));
        }
        let os_version = v.osVersion;
        dll.version = DllVersion {
            main: v.dllMainVersion,
            sub: v.dllSubVersion,
            release: v.dllRelease,
            os_version: encoding.decode(&os_version.map(|c| c as u8)),
            os_release: v.osRelease,
        };
        log::info!("Loaded CANapeAPI {} from {path}", dll.version);
        Ok(dll)
    }

    /// Loads the library named by the [DriverConfig] of this machine
    pub fn from_config() -> CanapeResult<Self> {
        let cfg = DriverConfig::load()?;
        Self::load_lib(&cfg.function_lib, cfg.encoding)
    }

    /// Version of the loaded library
    pub fn version(&self) -> &DllVersion {
        &self.version
    }

    /// Path the library was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Builds the API error of the last failed call. Must be called under the call lock.
    ///
    /// Returns `None` if the library reports no error code
    fn last_error(&self, hdl: TAsap3Hdl, function: &'static str) -> Option<CanapeError> {
        let code = unsafe { (self.get_last_error_fn)(hdl) };
        if code == 0 {
            log::debug!("{function} returned false without an error code");
            return None;
        }
        let name = ErrorCode::from_repr(code);
        let mut text: *mut c_char = ptr::null_mut();
        let has_text = unsafe { (self.error_text_fn)(hdl, code, &mut text) };
        let message = if has_text && !text.is_null() {
            self.encoding.decode(unsafe { CStr::from_ptr(text) }.to_bytes())
        } else {
            name.map(|n| n.description()).unwrap_or("Unknown error").to_string()
        };
        let err = CanapeError::Api { code, name, message, function };
        log::error!("{err}");
        Some(err)
    }

    fn func<T: Copy>(&self, sym: &Sym<T>) -> CanapeResult<T> {
        sym.func.ok_or_else(|| CanapeError::NotImplemented {
            function: sym.name,
            version: self.version.to_string(),
        })
    }

    /// Calls a function returning a boolean status, retrieving the last error on failure
    fn call<T: Copy>(&self, hdl: Asap3Handle, sym: &Sym<T>, op: impl FnOnce(T) -> bool) -> CanapeResult<()> {
        let f = self.func(sym)?;
        let _guard = self.lock.lock();
        log::debug!("{}", sym.name);
        match op(f) {
            true => Ok(()),
            false => self.last_error(raw(hdl), sym.name).map_or(Ok(()), Err),
        }
    }

    /// Reads a variable length string. The first call with a null buffer reports the size,
    /// it may fail as long as a size was reported
    fn read_string<T: Copy>(
        &self,
        hdl: Asap3Handle,
        sym: &Sym<T>,
        mut op: impl FnMut(T, *mut c_char, &mut u32) -> bool,
    ) -> CanapeResult<String> {
        let f = self.func(sym)?;
        let _guard = self.lock.lock();
        log::debug!("{} (size query)", sym.name);
        let mut size: u32 = 0;
        if !op(f, ptr::null_mut(), &mut size) && size == 0 {
            if let Some(e) = self.last_error(raw(hdl), sym.name) {
                return Err(e);
            }
        }
        let mut buffer = vec![0u8; size.max(1) as usize];
        self.call(hdl, sym, |f| op(f, buffer.as_mut_ptr().cast(), &mut size))?;
        Ok(self.encoding.decode(&buffer))
    }

    fn c_str(&self, text: &str) -> CanapeResult<Vec<u8>> {
        let mut bytes = self.encoding.encode(text)?;
        bytes.push(0);
        Ok(bytes)
    }

    /// Decodes a NUL terminated string owned by the library
    fn decode_ptr(&self, text: *const c_char) -> String {
        if text.is_null() {
            String::new()
        } else {
            self.encoding.decode(unsafe { CStr::from_ptr(text) }.to_bytes())
        }
    }

    fn read_cov(&self, name: &str, cov: &TCalibrationObjectValue) -> CanapeResult<CalibrationValue> {
        let value_type = unsafe { cov.type_ };
        let Some(vt) = ValueType::from_repr(value_type) else {
            return Err(CanapeError::UnknownValueType { name: name.to_string(), value_type });
        };
        let value = unsafe {
            match vt {
                ValueType::Value => CalibrationValue::Scalar(cov.value.value),
                ValueType::Axis => {
                    let a = cov.axis;
                    CalibrationValue::Axis(read_doubles(a.axis, dim(a.dimension)))
                }
                ValueType::Ascii => {
                    let a = cov.ascii;
                    CalibrationValue::Ascii { text: self.decode_ptr(a.ascii), len: dim(a.len) }
                }
                ValueType::Curve => {
                    let c = cov.curve;
                    CalibrationValue::Curve {
                        axis: read_doubles(c.axis, dim(c.dimension)),
                        values: read_doubles(c.values, dim(c.dimension)),
                    }
                }
                ValueType::Map => {
                    let m = cov.map;
                    let (x, y) = (dim(m.xDimension), dim(m.yDimension));
                    CalibrationValue::Map {
                        x_axis: read_doubles(m.xAxis, x),
                        y_axis: read_doubles(m.yAxis, y),
                        values: to_rows(&read_doubles(m.values, x * y), x, y),
                    }
                }
                ValueType::ValBlk => {
                    let b = cov.valblk;
                    let (x, y) = (dim(b.xDimension), dim(b.yDimension));
                    CalibrationValue::ValueBlock {
                        values: to_rows(&read_doubles(b.values, x * y), x, y),
                    }
                }
            }
        };
        Ok(value)
    }
}

impl Asap3Driver for CanapeDll {
    fn call_lock(&self) -> &ReentrantMutex<()> {
        &self.lock
    }

    fn get_dll_version(&self) -> CanapeResult<DllVersion> {
        Ok(self.version.clone())
    }

    fn init(&self, params: &InitParams) -> CanapeResult<Asap3Handle> {
        let working_dir = self.c_str(&params.working_dir)?;
        let mut hdl: TAsap3Hdl = ptr::null_mut();
        self.call(Asap3Handle(0), &self.syms.init5, |f| unsafe {
            f(
                &mut hdl,
                params.response_timeout,
                working_dir.as_ptr().cast(),
                params.fifo_size,
                params.sample_size,
                params.debug_mode,
                params.clear_device_list,
                params.hex_mode,
                params.modal_mode,
            )
        })?;
        Ok(Asap3Handle(hdl as usize))
    }

    fn exit(&self, hdl: Asap3Handle, close_canape: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.exit2, |f| unsafe { f(raw(hdl), close_canape) })
    }

    fn register_event(&self, hdl: Asap3Handle, event: EventCode) -> CanapeResult<()> {
        self.call(hdl, &self.syms.register_callback, |f| unsafe {
            f(raw(hdl), event as c_uint, event_trampoline, event as ULONG)
        })
    }

    fn unregister_event(&self, hdl: Asap3Handle, event: EventCode) -> CanapeResult<()> {
        self.call(hdl, &self.syms.unregister_callback, |f| unsafe { f(raw(hdl), event as c_uint) })
    }

    fn get_application_version(&self, hdl: Asap3Handle) -> CanapeResult<AppVersion> {
        let mut v = Appversion::default();
        self.call(hdl, &self.syms.get_application_version, |f| unsafe { f(raw(hdl), &mut v) })?;
        let application = v.Application;
        Ok(AppVersion {
            main: v.MainVersion,
            sub: v.SubVersion,
            service_pack: v.ServicePack,
            application: self.encoding.decode(&application.map(|c| c as u8)),
        })
    }

    fn get_project_directory(&self, hdl: Asap3Handle) -> CanapeResult<String> {
        let mut buffer = vec![0u8; 1024];
        let mut size: ULONG = 1024;
        self.call(hdl, &self.syms.get_project_directory, |f| unsafe {
            f(raw(hdl), buffer.as_mut_ptr().cast(), &mut size)
        })?;
        Ok(self.encoding.decode(&buffer))
    }

    fn set_interactive_mode(&self, hdl: Asap3Handle, mode: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.set_interactive_mode, |f| unsafe { f(raw(hdl), mode) })
    }

    fn popup_debug_window(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.popup_debug_window, |f| unsafe { f(raw(hdl)) })
    }

    fn is_network_activated(&self, hdl: Asap3Handle, network: &str) -> CanapeResult<bool> {
        let name = self.c_str(network)?;
        let mut activated = false;
        self.call(hdl, &self.syms.is_network_activated, |f| unsafe {
            f(raw(hdl), name.as_ptr().cast(), &mut activated)
        })?;
        Ok(activated)
    }

    fn reset_data_acquisition_channels(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.reset_data_acquisition_chnls, |f| unsafe { f(raw(hdl)) })
    }

    fn start_data_acquisition(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.start_data_acquisition, |f| unsafe { f(raw(hdl)) })
    }

    fn stop_data_acquisition(&self, hdl: Asap3Handle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.stop_data_acquisition, |f| unsafe { f(raw(hdl)) })
    }

    fn get_measurement_state(&self, hdl: Asap3Handle) -> CanapeResult<MeasurementState> {
        let mut state: c_uint = 0;
        self.call(hdl, &self.syms.get_measurement_state, |f| unsafe { f(raw(hdl), &mut state) })?;
        enum_value("MeasurementState", state, MeasurementState::from_repr)
    }

    fn has_mcd3_license(&self, hdl: Asap3Handle) -> CanapeResult<bool> {
        let mut licensed = false;
        self.call(hdl, &self.syms.has_mcd3_license, |f| unsafe { f(raw(hdl), &mut licensed) })?;
        Ok(licensed)
    }

    fn get_cna_filename(&self, hdl: Asap3Handle) -> CanapeResult<String> {
        self.read_string(hdl, &self.syms.get_cna_filename, |f, buf, size| unsafe { f(raw(hdl), buf, size) })
    }

    fn load_cna_file(&self, hdl: Asap3Handle, file_name: &str) -> CanapeResult<()> {
        let name = self.c_str(file_name)?;
        self.call(hdl, &self.syms.load_cna_file, |f| unsafe { f(raw(hdl), name.as_ptr().cast()) })
    }

    fn create_module(&self, hdl: Asap3Handle, def: &ModuleDefinition) -> CanapeResult<ModuleHandle> {
        let name = self.c_str(&def.name)?;
        let db = self.c_str(&def.database_filename)?;
        let mut module: TModulHdl = INVALID_MODULE_HANDLE;
        self.call(hdl, &self.syms.create_module3, |f| unsafe {
            f(
                raw(hdl),
                name.as_ptr().cast(),
                db.as_ptr().cast(),
                def.driver as c_short,
                def.channel as c_short,
                def.go_online,
                def.enable_cache,
                &mut module,
            )
        })?;
        Ok(ModuleHandle(module))
    }

    fn get_module_count(&self, hdl: Asap3Handle) -> CanapeResult<u32> {
        let mut count: ULONG = 0;
        self.call(hdl, &self.syms.get_module_count, |f| unsafe { f(raw(hdl), &mut count) })?;
        Ok(count)
    }

    fn get_module_handle(&self, hdl: Asap3Handle, name: &str) -> CanapeResult<ModuleHandle> {
        let c_name = self.c_str(name)?;
        let mut module: TModulHdl = INVALID_MODULE_HANDLE;
        self.call(hdl, &self.syms.get_module_handle, |f| unsafe {
            f(raw(hdl), c_name.as_ptr().cast(), &mut module)
        })?;
        Ok(ModuleHandle(module))
    }

    fn get_module_name(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String> {
        let mut name: *mut c_char = ptr::null_mut();
        self.call(hdl, &self.syms.get_module_name, |f| unsafe { f(raw(hdl), module.0, &mut name) })?;
        Ok(self.decode_ptr(name))
    }

    fn get_communication_type(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String> {
        let mut name: *mut c_char = ptr::null_mut();
        self.call(hdl, &self.syms.get_communication_type, |f| unsafe { f(raw(hdl), module.0, &mut name) })?;
        Ok(self.decode_ptr(name))
    }

    fn get_network_name(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<String> {
        self.read_string(hdl, &self.syms.get_network_name, |f, buf, size| unsafe {
            f(raw(hdl), module.0, buf, size)
        })
    }

    fn get_ecu_driver_type(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<DriverType> {
        let mut driver: c_uint = 0;
        self.call(hdl, &self.syms.get_ecu_driver_type, |f| unsafe { f(raw(hdl), module.0, &mut driver) })?;
        enum_value("DriverType", driver, |d| i16::try_from(d).ok().and_then(DriverType::from_repr))
    }

    fn is_ecu_online(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<EcuState> {
        let mut state: c_uint = 0;
        self.call(hdl, &self.syms.is_ecu_online, |f| unsafe { f(raw(hdl), module.0, &mut state) })?;
        enum_value("EcuState", state, EcuState::from_repr)
    }

    fn ecu_on_offline(&self, hdl: Asap3Handle, module: ModuleHandle, state: EcuState, download: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.ecu_on_offline, |f| unsafe {
            f(raw(hdl), module.0, state as c_uint, download)
        })
    }

    fn is_module_active(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<bool> {
        let mut active = false;
        self.call(hdl, &self.syms.is_module_active, |f| unsafe { f(raw(hdl), module.0, &mut active) })?;
        Ok(active)
    }

    fn module_activation(&self, hdl: Asap3Handle, module: ModuleHandle, activate: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.module_activation, |f| unsafe { f(raw(hdl), module.0, activate) })
    }

    fn has_resume_mode(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<bool> {
        let mut resume = false;
        self.call(hdl, &self.syms.has_resume_mode, |f| unsafe { f(raw(hdl), module.0, &mut resume) })?;
        Ok(resume)
    }

    fn reset_data_acquisition_channels_by_module(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.reset_data_acquisition_chnls_by_module, |f| unsafe { f(raw(hdl), module.0) })
    }

    fn release_module(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.release_module, |f| unsafe { f(raw(hdl), module.0) })
    }

    fn get_database_info(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<DatabaseInfo> {
        let mut info = DBFileInfo::default();
        self.call(hdl, &self.syms.get_database_info, |f| unsafe { f(raw(hdl), module.0, &mut info) })?;
        let (file_name, file_path) = (info.asap2Fname, info.asap2Path);
        Ok(DatabaseInfo {
            file_name: self.encoding.decode(&file_name.map(|c| c as u8)),
            file_path: self.encoding.decode(&file_path.map(|c| c as u8)),
            file_type: enum_value("DbFileType", info.type_, DbFileType::from_repr)?,
        })
    }

    fn get_database_objects(&self, hdl: Asap3Handle, module: ModuleHandle, filter: DbObjectType) -> CanapeResult<String> {
        self.read_string(hdl, &self.syms.get_database_objects, |f, buf, size| unsafe {
            f(raw(hdl), module.0, buf, size, filter as c_uint)
        })
    }

    fn get_database_objects_by_type(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        filter: DbObjectType,
        selection: DbObjectSelection,
    ) -> CanapeResult<String> {
        self.read_string(hdl, &self.syms.get_database_objects_by_type, |f, buf, size| unsafe {
            f(raw(hdl), module.0, buf, size, filter as c_uint, c_ulong::from(selection.bits()))
        })
    }

    fn get_ecu_tasks(&self, hdl: Asap3Handle, module: ModuleHandle, max_tasks: u16) -> CanapeResult<Vec<TaskInfo>> {
        let mut tasks = vec![TTaskInfo2::default(); usize::from(max_tasks)];
        let mut count: c_ushort = 0;
        self.call(hdl, &self.syms.get_ecu_tasks2, |f| unsafe {
            f(raw(hdl), module.0, tasks.as_mut_ptr(), &mut count, max_tasks)
        })?;
        Ok(tasks
            .iter()
            .take(usize::from(count))
            .map(|t| {
                let (description, task_id, task_cycle, event_channel) = (t.description, t.taskId, t.taskCycle, t.eventChannel);
                TaskInfo {
                    description: self.decode_ptr(description),
                    task_id,
                    task_cycle,
                    event_channel,
                }
            })
            .collect())
    }

    fn get_measurement_list_entries(&self, hdl: Asap3Handle, module: ModuleHandle) -> CanapeResult<Vec<MeasurementListEntry>> {
        let mut list: *mut TMeasurementListEntries = ptr::null_mut();
        self.call(hdl, &self.syms.get_measurement_list_entries, |f| unsafe {
            f(raw(hdl), module.0, &mut list)
        })?;
        if list.is_null() {
            return Ok(Vec::new());
        }
        let list = unsafe { ptr::read_unaligned(list) };
        let (count, entries) = (list.ItemCount, list.Entries);
        if entries.is_null() {
            return Ok(Vec::new());
        }
        let mut res = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let entry_ptr = unsafe { ptr::read_unaligned(entries.add(i)) };
            if entry_ptr.is_null() {
                continue;
            }
            let e = unsafe { ptr::read_unaligned(entry_ptr) };
            let (task_id, rate, save, disabled, name) = (e.taskId, e.rate, e.SaveFlag, e.Disabled, e.ObjectName);
            res.push(MeasurementListEntry {
                task_id,
                rate,
                save_flag: save != 0,
                disabled: disabled != 0,
                object_name: self.decode_ptr(name),
            });
        }
        Ok(res)
    }

    fn get_db_object_info(&self, hdl: Asap3Handle, module: ModuleHandle, name: &str) -> CanapeResult<ObjectInfo> {
        let c_name = self.c_str(name)?;
        let mut info = DBObjectInfo::default();
        self.call(hdl, &self.syms.get_db_object_info, |f| unsafe {
            f(raw(hdl), module.0, c_name.as_ptr().cast(), &mut info)
        })?;
        let unit = info.unit;
        Ok(ObjectInfo {
            object_type: enum_value("ObjectType", info.DBObjecttype, ObjectType::from_repr)?,
            value_type: info.type_,
            min: info.min,
            max: info.max,
            min_ex: info.minEx,
            max_ex: info.maxEx,
            precision: info.precision,
            unit: self.encoding.decode(&unit.map(|c| c as u8)),
        })
    }

    fn read_object_parameter(&self, hdl: Asap3Handle, module: ModuleHandle, name: &str, format: Format) -> CanapeResult<ObjectParameter> {
        let c_name = self.c_str(name)?;
        let mut data_type: c_uint = 0;
        let mut address: ULONG = 0;
        let (mut min, mut max, mut increment) = (0.0, 0.0, 0.0);
        self.call(hdl, &self.syms.read_object_parameter, |f| unsafe {
            f(
                raw(hdl),
                module.0,
                c_name.as_ptr().cast(),
                format as c_uint,
                &mut data_type,
                &mut address,
                &mut min,
                &mut max,
                &mut increment,
            )
        })?;
        Ok(ObjectParameter {
            data_type: enum_value("DataType", data_type, DataType::from_repr)?,
            address,
            min,
            max,
            increment,
        })
    }

    fn read_calibration_object(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        format: Format,
        force_upload: bool,
    ) -> CanapeResult<CalibrationValue> {
        let c_name = self.c_str(name)?;
        let _guard = self.lock.lock();
        let mut cov = TCalibrationObjectValue::default();
        self.call(hdl, &self.syms.read_calibration_object2, |f| unsafe {
            f(raw(hdl), module.0, c_name.as_ptr().cast(), format as c_uint, force_upload, &mut cov)
        })?;
        // The arrays belong to the library and stay valid until the next call
        self.read_cov(name, &cov)
    }

    fn write_calibration_object(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        format: Format,
        value: &CalibrationValue,
    ) -> CanapeResult<()> {
        let c_name = self.c_str(name)?;
        let type_ = value.value_type() as c_uint;
        // Buffers referenced by `cov`, they must outlive the call
        let mut first: Vec<f64> = Vec::new();
        let mut second: Vec<f64> = Vec::new();
        let mut third: Vec<f64> = Vec::new();
        let mut text: Vec<u8> = Vec::new();
        let mut cov = TCalibrationObjectValue::default();
        match value {
            CalibrationValue::Scalar(v) => cov.value = TValue { type_, value: *v },
            CalibrationValue::Axis(axis) => {
                first = axis.clone();
                cov.axis = TAxis { type_, dimension: short(first.len())?, axis: first.as_mut_ptr() };
            }
            CalibrationValue::Ascii { text: s, len } => {
                text = self.encoding.encode(s)?;
                if text.len() > *len {
                    return Err(CanapeError::DimensionMismatch { expected: vec![*len], actual: vec![text.len()] });
                }
                // NUL padded to the capacity of the object
                text.resize(len + 1, 0);
                cov.ascii = TAscii { type_, len: short(*len)?, ascii: text.as_mut_ptr().cast() };
            }
            CalibrationValue::Curve { axis, values } => {
                first = axis.clone();
                second = values.clone();
                cov.curve = TCurve {
                    type_,
                    dimension: short(second.len())?,
                    axis: first.as_mut_ptr(),
                    values: second.as_mut_ptr(),
                };
            }
            CalibrationValue::Map { x_axis, y_axis, values } => {
                first = x_axis.clone();
                second = y_axis.clone();
                third = values.concat();
                cov.map = TMap {
                    type_,
                    xDimension: short(first.len())?,
                    yDimension: short(second.len())?,
                    xAxis: first.as_mut_ptr(),
                    yAxis: second.as_mut_ptr(),
                    values: third.as_mut_ptr(),
                };
            }
            CalibrationValue::ValueBlock { values } => {
                let dims = value.dimension();
                third = values.concat();
                cov.valblk = TValBlk {
                    type_,
                    xDimension: short(dims[0])?,
                    yDimension: short(dims[1])?,
                    values: third.as_mut_ptr(),
                };
            }
        }
        let res = self.call(hdl, &self.syms.write_calibration_object, |f| unsafe {
            f(raw(hdl), module.0, c_name.as_ptr().cast(), format as c_uint, &mut cov)
        });
        drop((first, second, third, text));
        res
    }

    fn execute_script_ex(&self, hdl: Asap3Handle, module: ModuleHandle, script_file: bool, script: &str) -> CanapeResult<ScriptHandle> {
        let c_script = self.c_str(script)?;
        let mut script_hdl: TScriptHdl = 0;
        self.call(hdl, &self.syms.execute_script_ex, |f| unsafe {
            f(raw(hdl), module.0, script_file, c_script.as_ptr().cast(), &mut script_hdl)
        })?;
        Ok(ScriptHandle(script_hdl))
    }

    fn get_script_state(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<ScriptStatus> {
        let mut state: c_uint = 0;
        let mut size: ULONG = 0;
        self.call(hdl, &self.syms.get_script_state, |f| unsafe {
            f(raw(hdl), script.0, &mut state, ptr::null_mut(), &mut size)
        })?;
        enum_value("ScriptStatus", state, ScriptStatus::from_repr)
    }

    fn start_script(&self, hdl: Asap3Handle, script: ScriptHandle, command_line: Option<&str>, module: Option<ModuleHandle>) -> CanapeResult<()> {
        let cmd = command_line.map(|c| self.c_str(c)).transpose()?;
        let cmd_ptr = cmd.as_ref().map(|c| c.as_ptr().cast()).unwrap_or(ptr::null());
        let module = module.map(|m| m.0).unwrap_or(INVALID_MODULE_HANDLE);
        self.call(hdl, &self.syms.start_script, |f| unsafe { f(raw(hdl), script.0, cmd_ptr, module) })
    }

    fn stop_script(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.stop_script, |f| unsafe { f(raw(hdl), script.0) })
    }

    fn release_script(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<()> {
        self.call(hdl, &self.syms.release_script, |f| unsafe { f(raw(hdl), script.0) })
    }

    fn get_script_result_value(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<f64> {
        let mut value = 0.0;
        self.call(hdl, &self.syms.get_script_result_value, |f| unsafe { f(raw(hdl), script.0, &mut value) })?;
        Ok(value)
    }

    fn get_script_result_string(&self, hdl: Asap3Handle, script: ScriptHandle) -> CanapeResult<String> {
        self.read_string(hdl, &self.syms.get_script_result_string, |f, buf, size| unsafe {
            f(raw(hdl), script.0, buf, size)
        })
    }

    fn get_recorder_count(&self, hdl: Asap3Handle) -> CanapeResult<u32> {
        let mut count: ULONG = 0;
        self.call(hdl, &self.syms.get_recorder_count, |f| unsafe { f(raw(hdl), &mut count) })?;
        Ok(count)
    }

    fn define_recorder(&self, hdl: Asap3Handle, name: &str, recorder_type: RecorderType) -> CanapeResult<RecorderId> {
        let c_name = self.c_str(name)?;
        let mut recorder: TRecorderID = ptr::null_mut();
        self.call(hdl, &self.syms.define_recorder, |f| unsafe {
            f(raw(hdl), c_name.as_ptr().cast(), &mut recorder, recorder_type as c_uint)
        })?;
        Ok(RecorderId(recorder as usize))
    }

    fn get_recorder_by_index(&self, hdl: Asap3Handle, index: u32) -> CanapeResult<RecorderId> {
        let mut recorder: TRecorderID = ptr::null_mut();
        self.call(hdl, &self.syms.get_recorder_by_index, |f| unsafe { f(raw(hdl), index, &mut recorder) })?;
        Ok(RecorderId(recorder as usize))
    }

    fn get_selected_recorder(&self, hdl: Asap3Handle) -> CanapeResult<RecorderId> {
        let mut recorder: TRecorderID = ptr::null_mut();
        self.call(hdl, &self.syms.get_selected_recorder, |f| unsafe { f(raw(hdl), &mut recorder) })?;
        Ok(RecorderId(recorder as usize))
    }

    fn get_recorder_name(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<String> {
        self.read_string(hdl, &self.syms.get_recorder_name, |f, buf, size| {
            let mut len = LONG::try_from(*size).unwrap_or(LONG::MAX);
            let ok = unsafe { f(raw(hdl), raw_recorder(recorder), buf, &mut len) };
            *size = u32::try_from(len).unwrap_or(0);
            ok
        })
    }

    fn get_recorder_state(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<RecorderState> {
        let mut state: c_uint = 0;
        self.call(hdl, &self.syms.get_recorder_state, |f| unsafe {
            f(raw(hdl), raw_recorder(recorder), &mut state)
        })?;
        enum_value("RecorderState", state, RecorderState::from_repr)
    }

    fn is_recorder_enabled(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<bool> {
        let mut enabled = false;
        self.call(hdl, &self.syms.is_recorder_enabled, |f| unsafe {
            f(raw(hdl), raw_recorder(recorder), &mut enabled)
        })?;
        Ok(enabled)
    }

    fn enable_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, enable: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.enable_recorder, |f| unsafe { f(raw(hdl), raw_recorder(recorder), enable) })
    }

    fn get_recorder_mdf_filename(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<String> {
        self.read_string(hdl, &self.syms.get_recorder_mdf_filename, |f, buf, size| unsafe {
            f(raw(hdl), raw_recorder(recorder), buf, size)
        })
    }

    fn set_recorder_mdf_filename(&self, hdl: Asap3Handle, recorder: RecorderId, file_name: &str) -> CanapeResult<()> {
        let name = self.c_str(file_name)?;
        self.call(hdl, &self.syms.set_recorder_mdf_filename, |f| unsafe {
            f(raw(hdl), raw_recorder(recorder), name.as_ptr().cast())
        })
    }

    fn start_recorder(&self, hdl: Asap3Handle, recorder: RecorderId) -> CanapeResult<()> {
        self.call(hdl, &self.syms.start_recorder, |f| unsafe { f(raw(hdl), raw_recorder(recorder)) })
    }

    fn stop_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, save_to_mdf: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.stop_recorder, |f| unsafe { f(raw(hdl), raw_recorder(recorder), save_to_mdf) })
    }

    fn pause_recorder(&self, hdl: Asap3Handle, recorder: RecorderId, pause: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.pause_recorder, |f| unsafe { f(raw(hdl), raw_recorder(recorder), pause) })
    }

    fn setup_data_acquisition_channel(
        &self,
        hdl: Asap3Handle,
        module: ModuleHandle,
        name: &str,
        format: Format,
        task_id: u16,
        polling_rate: u16,
        save_to_file: bool,
    ) -> CanapeResult<()> {
        let c_name = self.c_str(name)?;
        self.call(hdl, &self.syms.setup_data_acquisition_chnl, |f| unsafe {
            f(raw(hdl), module.0, c_name.as_ptr().cast(), format as c_uint, task_id, polling_rate, save_to_file)
        })
    }

    fn check_overrun(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, reset: bool) -> CanapeResult<()> {
        self.call(hdl, &self.syms.check_overrun, |f| unsafe { f(raw(hdl), module.0, task_id, reset) })
    }

    fn get_fifo_level(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16) -> CanapeResult<u32> {
        let f = self.func(&self.syms.get_fifo_level)?;
        let _guard = self.lock.lock();
        let level = unsafe { f(raw(hdl), module.0, task_id) };
        // Negative levels report an error
        u32::try_from(level).map_err(|_| {
            let name = self.syms.get_fifo_level.name;
            self.last_error(raw(hdl), name)
                .unwrap_or_else(|| CanapeError::from_code(ErrorCode::FifoInternalError as u16, name))
        })
    }

    fn get_next_sample(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, count: usize) -> CanapeResult<RawSample> {
        let _guard = self.lock.lock();
        let mut timestamp: TTime = 0;
        let mut values: *mut f64 = ptr::null_mut();
        self.call(hdl, &self.syms.get_next_sample, |f| unsafe {
            f(raw(hdl), module.0, task_id, &mut timestamp, &mut values)
        })?;
        Ok(RawSample {
            timestamp,
            values: unsafe { read_doubles(values, count) },
        })
    }

    fn get_current_values(&self, hdl: Asap3Handle, module: ModuleHandle, task_id: u16, count: usize) -> CanapeResult<RawSample> {
        let max = c_ushort::try_from(count).unwrap_or(c_ushort::MAX);
        let mut values = vec![0.0; usize::from(max)];
        let mut timestamp: TTime = 0;
        self.call(hdl, &self.syms.get_current_values, |f| unsafe {
            f(raw(hdl), module.0, task_id, &mut timestamp, values.as_mut_ptr(), max)
        })?;
        Ok(RawSample { timestamp, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_a_load_error() {
        let res = CanapeDll::load_lib("this_library_does_not_exist_canape.dll", TextEncoding::Latin1);
        assert!(matches!(res, Err(CanapeError::LibLoad(_))));
    }

    #[test]
    fn unaligned_doubles_are_copied() {
        let data = [1.5f64, -2.0, 3.25];
        assert_eq!(unsafe { read_doubles(data.as_ptr(), 3) }, vec![1.5, -2.0, 3.25]);
        assert!(unsafe { read_doubles(ptr::null(), 4) }.is_empty());
    }

    #[test]
    fn dimensions_must_fit_a_short() {
        assert_eq!(short(12).unwrap(), 12);
        assert!(short(40_000).is_err());
        assert_eq!(dim(-1), 0);
    }
}
