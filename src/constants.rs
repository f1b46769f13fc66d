//! Constants and enumerations of the ASAP3 interface
//!
//! Every enumeration mirrors a C enum of `CANapAPI.h`. Values returned by the
//! library are converted with the `from_repr` function generated by [strum_macros::FromRepr],
//! which yields `None` for values this crate does not know about.

use bitflags::bitflags;
use strum_macros::{Display, EnumIter, EnumMessage, FromRepr};

/// Main version of the API header this crate was written against
pub const CANAPE_API_MAIN_VERSION: i32 = 2;
/// Sub version of the API header this crate was written against
pub const CANAPE_API_SUB_VERSION: i32 = 3;
/// Release of the API header this crate was written against
pub const CANAPE_API_RELEASE: i32 = 1;
/// Maximum length of the OS version string in `version_t`
pub const MAX_OS_VERSION: usize = 50;
/// Windows `MAX_PATH`, used by several fixed size string buffers
pub const MAX_PATH: usize = 260;
/// Module handle value CANape uses for "no module" (`-1` in the C header)
pub const INVALID_MODULE_HANDLE: u16 = u16::MAX;
/// Maximum number of ECU tasks requested by [crate::module::Module::get_ecu_tasks]
pub const MAX_ECU_TASKS: u16 = 32;

bitflags! {
    /// Object selection mask used by `Asap3GetDatabaseObjectsByType`
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DbObjectSelection: u32 {
        /// Scalar objects
        const SCALAR = 0x0000_0001;
        /// Curve objects
        const CURVE = 0x0000_0002;
        /// Map objects
        const MAP = 0x0000_0004;
        /// Axis objects
        const AXIS = 0x0000_0008;
        /// ASCII objects
        const ASCII = 0x0000_0010;
        /// Value block objects
        const VALBLK = 0x0000_0020;
        /// Include templates
        const TEMPLATE = 0x0000_0040;
        /// All object types without templates
        const ALL = Self::SCALAR.bits()
            | Self::CURVE.bits()
            | Self::MAP.bits()
            | Self::AXIS.bits()
            | Self::ASCII.bits()
            | Self::VALBLK.bits();
        /// All object types including templates
        const INCLUDING_TEMPLATES = Self::ALL.bits() | Self::TEMPLATE.bits();
    }
}

/// ASAP3 error codes, as returned by `Asap3GetLastError`
///
/// The doc comment of each variant is the error description and can be retrieved
/// at runtime with [ErrorCode::description]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, FromRepr, Display, EnumMessage, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum ErrorCode {
    /// Command not supported
    CmdNotSup = 1,
    /// Interface type not supported
    InterfaceNotSupported = 2,
    /// Error creating memory mapped file
    CreateMemMappedFile = 3,
    /// Error writing data to memory mapped file
    WriteCmd = 4,
    /// Error reading response from memory mapped file
    ReadResponse = 5,
    /// ASAP2 file not found
    Asap2FileNotFound = 6,
    /// Invalid module handle
    InvalidModuleHdl = 7,
    /// Open file error
    ErrOpenFile = 8,
    /// Unknown object name
    UnknownObject = 9,
    /// No database assigned
    NoDatabase = 10,
    /// Parameter 'size' too large
    ParSizeOverflow = 11,
    /// Object has no write access
    NotWriteAccess = 12,
    /// Object type doesn't match
    ObjectTypeDoesntMatch = 13,
    /// Number of tasks overflow
    NoTasksOverflow = 14,
    /// Invalid CCP response size
    CcpResponseSizeInvalid = 15,
    /// Timeout reading response from memory mapped file
    TimeoutResponse = 16,
    /// FIFO doesn't contain any values
    NoValuesSampled = 17,
    /// Too many channels defined relating to single raster
    AcqChnlOverrun = 18,
    /// Too many rasters selected for data acquisition
    NoRasterOverflow = 19,
    /// CreateProcess of CANape failed
    CanapeCreateProcFailed = 20,
    /// Asap3Exit denied because data acquisition is still running
    ExitDeniedWhileAcqu = 21,
    /// Error writing data to application RAM
    WriteDataFailed = 22,
    /// No response from ECU (attach Asap2 failed)
    NoResponseFromEcu = 23,
    /// Asap3StartDataAcquisition denied: data acquisition already running
    AcquisAlreadyRunning = 24,
    /// Asap3StopAcquisition denied: data acquisition not started
    AcquisNotStarted = 25,
    /// If cache is disabled, values aren't accessible while acquisition is running
    ValuesNotAccessible = 26,
    /// Invalid number of axis points
    NoAxisPtsNotValid = 27,
    /// Script command size overflow
    ScriptCmdToLarge = 28,
    /// Invalid/unknown script command
    ScriptCmdInvalid = 29,
    /// Unknown module
    UnknownModuleName = 30,
    /// CANape internal error concerning FIFO management
    FifoInternalError = 31,
    /// Access denied: incompatible CANape version
    VersionError = 32,
    /// Illegal driver type
    IllegalDriver = 33,
    /// Read of calibration object failed
    CalobjReadFailed = 34,
    /// Initialization of data acquisition failed
    AcqStpInitFailed = 35,
    /// Data acquisition failed
    AcqStpProcFailed = 36,
    /// Buffer overflow at data acquisition
    AcqStpOverflow = 37,
    /// Data acquisition stopped because selected time is elapsed
    AcqStpTimeOver = 38,
    /// No Server application available
    NoServerErrcode = 40,
    /// Unable to open data description file
    ErrOpenDataDescFile = 41,
    /// Unable to open a data file
    ErrOpenDataVersFile = 42,
    /// Maximal count of displays are opened
    ToMuchDisplaysOpen = 43,
    /// Attempt to create a module failed
    InternalCanapeError = 44,
    /// Unable to open a display
    CantOpenDisplay = 45,
    /// No parameter filename
    ErrNoPatternFileDefined = 46,
    /// Unable to open patternfile
    ErrOpenPatternFile = 47,
    /// Release of a mutex failed
    ErrCantReleaseMutex = 48,
    /// CANape does not fit to dll version
    WrongCanapeVersion = 49,
    /// Connect to ASAP3 server failed
    TcpServConnectFailed = 50,
    /// Missing CANape TCP Server configuration
    TcpMissingCfg = 51,
    /// Connection between ASAP3 Server and TCP CANapeAPI is not active
    TcpServNotConnected = 52,
    /// TCP exit not closed
    TcpExitNotClosed = 53,
    /// The FIFO Memory was already created
    FifoAlreadyInit = 54,
    /// It is not possible to operate this command
    IllegalOperation = 55,
    /// The given type is not supported
    WrongType = 56,
    /// CANape is not licensed
    NoCanapeLicense = 57,
    /// CANape registry key missing, CANape setup has not been correctly performed
    RegOpenKeyFailed = 58,
    /// CANape registry value "Path" missing
    RegQueryValueFailed = 59,
    /// CreateProcess of CANape failed: working directory not accessible
    WorkdirAccessFailed = 60,
    /// Internal error: Asap3InitCom() failed
    InitComFailed = 61,
    /// Negative Response from CANape: Init() failed
    InitCmdFailed = 62,
    /// CreateProcess of CANape failed: programme directory not accessible
    CanapeInvalidPrgPath = 63,
    /// Invalid asap3 handle
    InvalidAsap3Hdl = 64,
    /// File loading failed
    LoadingFile = 65,
    /// File saving failed
    SavingFile = 66,
    /// Upload failed
    Upload = 67,
    /// Value could not be written
    WriteValueError = 68,
    /// Other file transmission in process
    TmtfNotFinished = 69,
    /// TransmitFile: sequence error
    TmtfSequenceError = 70,
    /// TransmitFile: type error
    TdboTypeError = 71,
    /// Asap3_CCP_Request failed
    ExecuteServiceError = 72,
    /// Invalid drivertype for this operation
    InvalidDriverType = 73,
    /// Invalid drivertype for diagnostic operations
    DiagInvalidDriverType = 74,
    /// Invalid BusMessage
    DiagInvalidBusMessage = 75,
    /// Invalid Variant
    DiagInvalidVariant = 76,
    /// Invalid or unknown request
    DiagInvalidDiagService = 77,
    /// Error while sending service
    DiagErrExecuteService = 78,
    /// Invalid or unknown request parameters
    DiagInvalidParams = 79,
    /// Invalid or unknown parameter name
    DiagUnknownParamName = 80,
    /// Error while creating a request
    DiagExceptionError = 81,
    /// Error response cannot be handled
    DiagInvalidResponse = 82,
    /// Unknown parameter type
    DiagUnknownParamType = 83,
    /// Currently no information available
    DiagNoInfoAvailable = 84,
    /// Unknown response handle
    DiagUnknownRespHandle = 85,
    /// The current request is in the wrong state for this operation
    DiagWrongServiceState = 86,
    /// Complex index does not match
    DiagInvalidIndexSize = 87,
    /// Invalid response type
    DiagInvalidResponseType = 88,
    /// Flash manager invalid
    FlashInvalidManager = 89,
    /// Flash object out of range
    FlashObjOutOfRange = 90,
    /// Flash manager error
    FlashManagerError = 91,
    /// Flash already running
    FlashAlreadyRunning = 92,
    /// Invalid application name
    FlashInvalidAppName = 93,
    /// This function is not supported in this program version
    FunctionNotSupported = 94,
    /// License file not found
    LicenseNotFound = 95,
    /// Recorder already exists
    RecorderAlreadyExists = 96,
    /// Recorder does not exist
    RecorderNotFound = 97,
    /// Recorder index out of range
    RecorderIndexOutOfRange = 98,
    /// Error deleting Recorder
    RemoveRecorderErr = 99,
    /// Wrong parameter value
    InvalidParameter = 100,
    /// Error creating recorder
    ErrorCreateRecorder = 101,
    /// Error creating Filename
    ErrorSetRecFilename = 102,
    /// Invalid task id for the given Measurement object
    ErrorInvalidTaskId = 103,
    /// Parameter can not be set
    DiagParamSetError = 104,
    /// Command not supported in current mode
    CnfgWrongMode = 105,
    /// Specified File is Not Found
    CnfgFileNotFound = 106,
    /// File belongs to a different project
    CnfgFileInvalid = 107,
    /// Invalid script handle
    InvalidScrHandle = 108,
    /// Unable to remove Script
    RemoveScrHandle = 109,
    /// Unable to declare script
    ErrorDeclareScr = 110,
    /// The requested module doesn't support resume mode
    ErrorResumeSupported = 111,
    /// Undefined channel parameter
    UndefinedChannel = 112,
    /// No configuration for this drivertype available
    ErrDriverConfig = 113,
    /// Error creating DBC export file
    ErrDcbExport = 114,
    /// Function not available while a measurement is running
    NotAvailableWhileAcq = 115,
    /// ILinkRT Recorder available only with option MCD3
    NotMissingLicense = 116,
    /// Callback Event already registered
    EventAlreadyRegistered = 117,
    /// Measurement object already defined
    ObjectAlreadyDefined = 118,
    /// Calibration not allowed if online calibration is switched off
    CalNotAllowed = 119,
    /// Unknown service
    DiagUndefinedJob = 120,
    /// Prohibited command while a modal dialog is prompted
    ErrorModalDialog = 121,
    /// Hardware channel assignment
    ErrorChannelAssignment = 122,
    /// Measurement object is already instantiated in a structure object
    ErrorStructureObject = 123,
    /// Network not found or not available
    NetworkNotFound = 124,
    /// Error loading label list
    ErrorLoadingLabellist = 125,
    /// Currently the converter has no file access
    ErrorConvFileAccess = 126,
    /// Function not available for complex responses
    ErrorComplexResponses = 127,
    /// Function could not determine the project directory
    ErrorIniPath = 128,
    /// Interface name is not supported with this drivertype
    UnsupportedInterfaceId = 129,
    /// Buffer size too small
    InsufficientBufferSize = 130,
    /// Patch section not found
    PatchEntryNotFound = 131,
    /// Patch entry not found
    PatchSectionNotFound = 132,
    /// Security manager access error
    SecManagerError = 133,
    /// Measurement channel is optimized because its parent will already be measured
    ChannelOptimized = 134,
    /// Profile not registered
    ErrProfileId = 135,
    /// Unsupported data type for measurement
    ErrUnsupportedType = 136,
    /// Datasize of object too large
    ErrDataSize = 137,
    /// Invalid value - object can't be read
    CalobjInvalidValue = 138,
}

impl ErrorCode {
    /// Human readable description of the error code
    pub fn description(&self) -> &'static str {
        use strum::EnumMessage;
        self.get_documentation().unwrap_or("Unknown error")
    }
}

/// Logical communication channel used by a module (`channelNo` of `Asap3CreateModule`)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i16)]
#[allow(missing_docs)]
pub enum Channel {
    DevCan1 = 1,
    DevCan2 = 2,
    DevCan3 = 3,
    DevCan4 = 4,
    DevCan5 = 5,
    DevCan6 = 6,
    DevCan7 = 7,
    DevCan8 = 8,
    DevCan20 = 20,
    DevFlx1 = 31,
    DevFlx2 = 32,
    DevFlx3 = 33,
    DevFlx4 = 34,
    DevFlx5 = 35,
    DevFlx6 = 36,
    DevFlx7 = 37,
    DevFlx8 = 38,
    DevLin1 = 61,
    DevLin2 = 62,
    DevLin3 = 63,
    DevLin4 = 64,
    DevLin5 = 65,
    DevLin6 = 66,
    DevLin7 = 67,
    DevLin8 = 68,
    DevVxCan1 = 81,
    DevVxCan2 = 82,
    DevVxCan3 = 83,
    DevVxCan4 = 84,
    DevVxTcp = 85,
    DevVxUdp = 86,
    DevSxi1 = 91,
    DevSxi2 = 92,
    DevSxi3 = 93,
    DevSxi4 = 94,
    DevSxi5 = 95,
    DevSxi6 = 96,
    DevSxi7 = 97,
    DevSxi8 = 98,
    DevUsb = 110,
    DevCanFd1 = 121,
    DevCanFd2 = 122,
    DevCanFd3 = 123,
    DevCanFd4 = 124,
    DevCanFd5 = 125,
    DevCanFd6 = 126,
    DevCanFd7 = 127,
    DevCanFd8 = 128,
    DevCanFd9 = 129,
    /// XCP on TCP
    DevTcp = 255,
    /// XCP on UDP
    DevUdp = 256,
    /// User defined interface (also used for FlexRay with XCP)
    DevUserDefined = 261,
    DevVxEthernet1 = 271,
    DevVxEthernet2 = 272,
    DevDaioDll = 280,
}

/// Driver type of a module (`driverType` of `Asap3CreateModule`)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(i16)]
pub enum DriverType {
    /// Default value for error case, must not be used
    Unknown = 0,
    /// CAN calibration protocol
    Ccp = 1,
    /// XCP
    Xcp = 2,
    /// CAN
    Can = 20,
    /// Pure offline driver
    HexEdit = 40,
    /// Analog measurement data
    Analog = 50,
    /// CANopen
    CanOpen = 60,
    /// CANdela diagnostic
    CanDela = 70,
    /// Access to global variables
    Environment = 80,
    /// LIN
    Lin = 90,
    /// FlexRay
    Flx = 100,
    /// Functional diagnostic driver
    Func = 110,
    /// National Instruments DAQ driver
    NiDaqMx = 120,
    /// XCP driver for Ramscope
    XcpRamscope = 130,
    /// System driver
    System = 140,
    /// Ethernet driver
    Eth = 150,
    /// DAIO system driver
    DaioSystem = 160,
    /// SOME/IP driver
    SomeIp = 170,
    /// DLT driver
    Dlt = 180,
}

/// Representation of ECU measurement or calibration data
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum Format {
    /// Raw ECU value
    EcuInternal = 0,
    /// Converted physical value
    PhysicalRepresentation = 1,
}

/// Value type of a calibration object
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ValueType {
    /// Scalar object
    Value = 0,
    /// Curve object
    Curve = 1,
    /// Map object
    Map = 2,
    /// Axis object
    Axis = 3,
    /// ASCII string object
    Ascii = 4,
    /// Value block
    ValBlk = 5,
}

/// Measurement or calibration object
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ObjectType {
    /// Measurement object
    Measure = 0,
    /// Calibration object or writeable measurement object
    Calibrate = 1,
    /// Fallback value, should not appear
    Unknown = 2,
}

/// Datatype of a characteristic object
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
#[allow(missing_docs)]
pub enum DataType {
    Unknown = 0,
    Int = 1,
    Float = 2,
    Double = 3,
    Signed = 4,
    Unsigned = 5,
    String = 6,
    Int64 = 7,
    UInt64 = 8,
    UWord = 9,
    Word = 10,
    UInt = 11,
    UByte = 12,
    SByte = 13,
    Float16 = 14,
}

/// Database object filter of `Asap3GetDatabaseObjects`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u32)]
pub enum DbObjectType {
    /// Measurement objects
    Measurement = 1,
    /// Characteristic objects
    Characteristic = 2,
    /// Measurement and characteristic objects
    All = 3,
}

/// Online/offline state of an ECU
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum EcuState {
    /// ECU is (or shall be switched) online
    Online = 0,
    /// ECU is (or shall be switched) offline
    Offline = 1,
}

/// Recorder file type
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum RecorderType {
    /// MDF recorder
    #[default]
    Mdf = 0,
    /// ILinkRT recorder (needs the MCD3 option)
    ILinkRt = 1,
    /// BLF recorder
    Blf = 2,
}

/// State of a recorder
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum RecorderState {
    /// Recorder is configured
    Configure = 0,
    /// Recorder is active and ready to run
    Active = 1,
    /// Recorder is running
    Running = 2,
    /// Recorder paused but measurement is still running
    Paused = 3,
    /// Recorder has stopped
    Suspended = 4,
}

/// State of the CANape measurement
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum MeasurementState {
    /// No measurement
    Stopped = 0,
    /// Measurement started, measurement thread not running yet
    Init = 1,
    /// Measurement is being stopped during start
    StopOnStart = 2,
    /// Measurement stopped but not finished
    Exit = 3,
    /// Measurement started, measurement thread running
    ThreadRunning = 4,
    /// Measurement loop running
    Running = 5,
}

/// Events CANape reports through registered callbacks
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, FromRepr, Display, EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum EventCode {
    /// Data acquisition was started
    OnDataAcqStart = 0,
    /// Data acquisition was stopped
    OnDataAcqStop = 1,
    /// Data acquisition is about to start
    OnBeforeDataAcqStart = 2,
    /// The project is being closed
    OnCloseProject = 3,
    /// A project was opened
    OnOpenProject = 4,
    /// CANape is being closed
    OnCloseCanape = 5,
}

/// Type of a module database file
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum DbFileType {
    Unknown = 0,
    Asap2 = 1,
    Db = 2,
    Dbb = 3,
    Dbc = 4,
    Candela = 5,
    Odf = 6,
    Eds = 7,
    Ehr = 8,
    Rob = 9,
    Lst = 10,
    Ldf = 11,
    Cdm = 12,
    Mdf = 13,
    Xml = 14,
    Update = 15,
    Cdp = 16,
    LostVariable = 17,
    Pdx = 18,
    AutosarXml = 19,
    System = 20,
    Anonymous = 21,
}

/// State of a CASL script
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum ScriptStatus {
    /// Script is declared and ready to start
    Ready = 1,
    /// Script is starting
    Starting = 2,
    /// Script is running
    Running = 3,
    /// Script is sleeping
    Sleeping = 4,
    /// Script is suspended
    Suspended = 5,
    /// Script was terminated
    Terminated = 6,
    /// Script finished with a return statement
    FinishedReturn = 7,
    /// Script was cancelled
    FinishedCancel = 8,
    /// Script failed
    Failure = 9,
    /// Script timed out
    Timeout = 10,
}

/// Application type of a `TApplicationID`
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum ApplicationType {
    Undefined = 0,
    Canape = 1,
    Application = 3,
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn error_code_description_comes_from_docs() {
        assert_eq!(ErrorCode::NoValuesSampled.description(), "FIFO doesn't contain any values");
        assert_eq!(ErrorCode::from_repr(7), Some(ErrorCode::InvalidModuleHdl));
        // 39 is a gap in the header
        assert_eq!(ErrorCode::from_repr(39), None);
    }

    #[test]
    fn every_error_code_is_documented() {
        for code in ErrorCode::iter() {
            assert_ne!(code.description(), "Unknown error", "{code} has no description");
        }
    }

    #[test]
    fn channel_values_match_header() {
        assert_eq!(Channel::DevTcp as i16, 255);
        assert_eq!(Channel::from_repr(256), Some(Channel::DevUdp));
        assert_eq!(DriverType::from_repr(2), Some(DriverType::Xcp));
    }

    #[test]
    fn selection_masks() {
        assert_eq!(DbObjectSelection::ALL.bits(), 0x3F);
        assert_eq!(DbObjectSelection::INCLUDING_TEMPLATES.bits(), 0x7F);
    }
}
