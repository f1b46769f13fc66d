#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate for automating the Vector CANape measurement and calibration tool through
//! its ASAP3 automation interface (`CANapAPI.dll` / `CANapAPI64.dll`).
//!
//! ## Layers
//!
//! ### Driver
//! The [driver::Asap3Driver] trait is the typed, safe seam to the native library. Two
//! implementations are provided:
//! * [driver::CanapeDll] (feature `dll`) - Loads the vendor library at runtime and maps the
//!   functions this crate uses. Functions which are missing in older library versions do not
//!   prevent loading, they return [CanapeError::NotImplemented] when called.
//! * [driver::SimulatedCanape] - An in-memory CANape, used for testing and offline development.
//!
//! Every boolean result of the native library is checked. When a call fails, the error code and
//! error text are fetched from the library under the same lock as the call itself, and returned
//! as [CanapeError::Api].
//!
//! ### Wrappers
//! A [canape::Canape] session hands out [module::Module], [recorder::Recorder],
//! [calibration_object::CalibrationObject], [script::Script] and [ecu_task::EcuTask] objects.
//!
//! ### Data acquisition
//! The [daq::FifoReader] drains the sample FIFO of one ECU task in a background thread while
//! the CANape measurement is running, and keeps the last sample of every channel available.
//!
//! ## Example
//! ```no_run
//! # #[cfg(feature = "dll")]
//! # fn run() -> canape_asap3::CanapeResult<()> {
//! use std::sync::Arc;
//! use canape_asap3::{canape::{Canape, CanapeOptions}, driver::CanapeDll};
//!
//! let dll = Arc::new(CanapeDll::from_config()?);
//! let canape = Canape::new(dll, CanapeOptions::new("C:\\Projects\\Demo"))?;
//! let module = canape.get_module_by_name("XCPsim")?;
//! let cal = module.get_calibration_object("ampl*")?;
//! println!("{:?}", cal.value()?);
//! canape.exit(true)?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "dll")]
use std::sync::Arc;

use constants::ErrorCode;

pub mod action;
pub mod calibration_object;
pub mod canape;
#[cfg(feature = "dll")]
pub mod config;
pub mod constants;
pub mod daq;
pub mod driver;
pub mod ecu_task;
pub mod events;
mod helpers;
pub mod module;
pub mod recorder;
pub mod script;

pub use helpers::TextEncoding;

/// CANape API result
pub type CanapeResult<T> = Result<T, CanapeError>;

#[derive(Clone, Debug, thiserror::Error)]
/// CANape API error
pub enum CanapeError {
    /// A function of the ASAP3 library reported a failure
    #[error("{function} failed. Error {code} ({}): {message}", .name.map(|n| n.to_string()).unwrap_or_else(|| "Unknown".into()))]
    Api {
        /// Raw error code from `Asap3GetLastError`
        code: u16,
        /// Error code definition, if known
        name: Option<ErrorCode>,
        /// Error text from `Asap3ErrorText`
        message: String,
        /// Name of the ASAP3 function which failed
        function: &'static str,
    },
    /// The loaded library does not export the function
    #[error("{function} is not available in CANapeAPI version {version}")]
    NotImplemented {
        /// Name of the missing function
        function: &'static str,
        /// Version of the loaded library
        version: String,
    },
    /// The library or one of its mandatory functions could not be loaded
    #[cfg(feature = "dll")]
    #[error("Could not load the CANape API library")]
    LibLoad(
        #[from]
        #[source]
        Arc<libloading::Error>,
    ),
    /// Object does not exist in the module database
    #[error("Object '{0}' not found in the module database")]
    UnknownObject(String),
    /// Calibration object has a value type this crate cannot represent
    #[error("Object '{name}' has an unknown value type {value_type}")]
    UnknownValueType {
        /// Object name
        name: String,
        /// Raw value type
        value_type: u32,
    },
    /// Attempted to write a measurement object
    #[error("Object '{0}' is a measurement object and cannot be written")]
    NotWritable(String),
    /// Written array does not match the dimension of the calibration object
    #[error("Dimension mismatch. Expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Dimension of the calibration object
        expected: Vec<usize>,
        /// Dimension of the written value
        actual: Vec<usize>,
    },
    /// Text could not be converted to or from the library encoding
    #[error("Text encoding error: {0}")]
    Encoding(String),
    /// The library returned a value which is out of range for the enumeration
    #[error("Invalid value {value} for {kind}")]
    InvalidEnumValue {
        /// Name of the enumeration
        kind: &'static str,
        /// Raw value
        value: i64,
    },
    /// Driver configuration could not be read
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CanapeError {
    /// Typed ASAP3 error code, if this error was reported by the library
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            CanapeError::Api { name, .. } => *name,
            _ => None,
        }
    }

    /// Raw ASAP3 error code, if this error was reported by the library
    pub fn raw_code(&self) -> Option<u16> {
        match self {
            CanapeError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Builds an API error from a raw code, using the built-in description as message
    pub fn from_code(code: u16, function: &'static str) -> Self {
        let name = ErrorCode::from_repr(code);
        CanapeError::Api {
            code,
            name,
            message: name.map(|n| n.description()).unwrap_or("Unknown error").to_string(),
            function,
        }
    }
}

#[cfg(feature = "dll")]
impl From<libloading::Error> for CanapeError {
    fn from(err: libloading::Error) -> Self {
        Self::LibLoad(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = CanapeError::from_code(17, "Asap3GetNextSample");
        assert_eq!(err.error_code(), Some(ErrorCode::NoValuesSampled));
        assert_eq!(
            err.to_string(),
            "Asap3GetNextSample failed. Error 17 (NoValuesSampled): FIFO doesn't contain any values"
        );
        let unknown = CanapeError::from_code(39, "Asap3Init5");
        assert_eq!(unknown.error_code(), None);
        assert_eq!(unknown.raw_code(), Some(39));
    }
}
