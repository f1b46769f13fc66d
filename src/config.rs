//! Location of the ASAP3 library and the text encoding used with it
//!
//! The configuration is resolved in this order:
//! 1. The `CANAPE_API_LIB` environment variable, naming the library file
//! 2. The JSON file `~/.canape/api.json`
//! 3. The default library name of the target, found through the library search path
//!
//! ## Configuration file
//! ```json
//! {
//!     "FUNCTION_LIB": "C:\\Program Files\\Vector CANape 21\\CANapeAPI\\CANapAPI64.dll",
//!     "ENCODING": "latin-1"
//! }
//! ```
//! Both keys are optional. `~` in `FUNCTION_LIB` is expanded to the home directory.

use std::path::Path;

use crate::{CanapeError, CanapeResult, helpers::TextEncoding};

/// Environment variable overriding the library location
pub const LIB_ENV_VAR: &str = "CANAPE_API_LIB";
/// Location of the configuration file
pub const CONFIG_FILE: &str = "~/.canape/api.json";

/// Library file name used when nothing is configured
#[cfg(target_pointer_width = "64")]
pub const DEFAULT_LIB: &str = "CANapAPI64.dll";
/// Library file name used when nothing is configured
#[cfg(not(target_pointer_width = "64"))]
pub const DEFAULT_LIB: &str = "CANapAPI.dll";

/// Library location and text encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Path or name of the ASAP3 library
    pub function_lib: String,
    /// Encoding of strings exchanged with the library
    pub encoding: TextEncoding,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            function_lib: DEFAULT_LIB.to_string(),
            encoding: TextEncoding::default(),
        }
    }
}

impl DriverConfig {
    /// Resolves the configuration of this machine
    pub fn load() -> CanapeResult<Self> {
        let path = shellexpand::tilde(CONFIG_FILE).to_string();
        let mut cfg = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            log::debug!("{path} does not exist, using default configuration");
            Self::default()
        };
        if let Ok(lib) = std::env::var(LIB_ENV_VAR) {
            log::debug!("Library location from {LIB_ENV_VAR}: {lib}");
            cfg.function_lib = lib;
        }
        Ok(cfg)
    }

    /// Reads a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CanapeResult<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| CanapeError::Config(format!("Cannot read {}: {e}", path.display())))?;
        Self::from_json(&s).map_err(|e| match e {
            CanapeError::Config(msg) => CanapeError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parses the contents of a configuration file
    pub fn from_json(s: &str) -> CanapeResult<Self> {
        let json = serde_json::from_str::<serde_json::Value>(s).map_err(|e| CanapeError::Config(e.to_string()))?;
        let mut cfg = Self::default();
        if let Some(lib) = json["FUNCTION_LIB"].as_str() {
            cfg.function_lib = shellexpand::tilde(lib).to_string();
        }
        if let Some(enc) = json["ENCODING"].as_str() {
            cfg.encoding = TextEncoding::from_name(enc)
                .ok_or_else(|| CanapeError::Config(format!("Unsupported encoding '{enc}'")))?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        assert_eq!(DriverConfig::from_json("{}").unwrap(), DriverConfig::default());
    }

    #[test]
    fn reads_library_and_encoding() {
        let cfg = DriverConfig::from_json(r#"{"FUNCTION_LIB": "C:\\CANape\\CANapAPI64.dll", "ENCODING": "utf-8"}"#).unwrap();
        assert_eq!(cfg.function_lib, "C:\\CANape\\CANapAPI64.dll");
        assert_eq!(cfg.encoding, TextEncoding::Utf8);
    }

    #[test]
    fn rejects_unknown_encoding() {
        let res = DriverConfig::from_json(r#"{"ENCODING": "ebcdic"}"#);
        assert!(matches!(res, Err(CanapeError::Config(_))));
        assert!(DriverConfig::from_json("not json").is_err());
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"FUNCTION_LIB": "~/canape/CANapAPI64.dll"}}"#).unwrap();
        let cfg = DriverConfig::from_file(file.path()).unwrap();
        assert!(cfg.function_lib.ends_with("canape/CANapAPI64.dll"));
        assert_eq!(cfg.encoding, TextEncoding::Latin1);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = DriverConfig::from_file(dir.path().join("api.json"));
        assert!(matches!(res, Err(CanapeError::Config(_))));
    }
}
