//! Devices of a CANape project

use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    CanapeResult,
    calibration_object::CalibrationObject,
    canape::Session,
    constants::{DbObjectSelection, DbObjectType, DriverType, EcuState, MAX_ECU_TASKS},
    driver::{DatabaseInfo, MeasurementListEntry, ModuleHandle},
    ecu_task::EcuTask,
    helpers::{has_wildcard, wildcard_match},
    script::Script,
};

/// A device (module) of the CANape project.
///
/// Modules are returned by [crate::canape::Canape::create_module],
/// [crate::canape::Canape::get_module_by_name] and [crate::canape::Canape::get_module_by_index].
/// Clones share the cached object list.
#[derive(Debug, Clone)]
pub struct Module {
    session: Arc<Session>,
    handle: ModuleHandle,
    objects_cache: Arc<Mutex<Option<Vec<String>>>>,
}

impl Module {
    pub(crate) fn new(session: Arc<Session>, handle: ModuleHandle) -> Self {
        Self {
            session,
            handle,
            objects_cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle of the module
    pub fn handle(&self) -> ModuleHandle {
        self.handle
    }

    /// Database file of the module
    pub fn get_database_info(&self) -> CanapeResult<DatabaseInfo> {
        self.session.driver.get_database_info(self.session.hdl, self.handle)
    }

    /// Full path of the database file
    pub fn get_database_path(&self) -> CanapeResult<PathBuf> {
        let info = self.get_database_info()?;
        Ok(PathBuf::from(info.file_path).join(info.file_name))
    }

    /// Activation state of the module
    pub fn is_module_active(&self) -> CanapeResult<bool> {
        self.session.driver.is_module_active(self.session.hdl, self.handle)
    }

    /// Activates or deactivates the module
    pub fn module_activation(&self, activate: bool) -> CanapeResult<()> {
        self.session.driver.module_activation(self.session.hdl, self.handle, activate)
    }

    /// True if the ECU is online
    pub fn is_ecu_online(&self) -> CanapeResult<bool> {
        let state = self.session.driver.is_ecu_online(self.session.hdl, self.handle)?;
        Ok(state == EcuState::Online)
    }

    /// Switches the ECU online or offline. With `download`, CANape downloads the
    /// calibration data when going online
    pub fn switch_ecu_on_offline(&self, online: bool, download: bool) -> CanapeResult<()> {
        let state = if online { EcuState::Online } else { EcuState::Offline };
        self.session.driver.ecu_on_offline(self.session.hdl, self.handle, state, download)
    }

    /// Name of the module
    pub fn get_module_name(&self) -> CanapeResult<String> {
        self.session.driver.get_module_name(self.session.hdl, self.handle)
    }

    /// Communication type of the module, such as `CAN` or `TCP`
    pub fn get_communication_type(&self) -> CanapeResult<String> {
        self.session.driver.get_communication_type(self.session.hdl, self.handle)
    }

    /// Names of all measurement and calibration objects of the database.
    ///
    /// The list is read once and cached
    pub fn get_database_objects(&self) -> CanapeResult<Vec<String>> {
        let mut cache = self.objects_cache.lock();
        if let Some(list) = cache.as_ref() {
            return Ok(list.clone());
        }
        let raw = self
            .session
            .driver
            .get_database_objects(self.session.hdl, self.handle, DbObjectType::All)?;
        let list = split_list(&raw);
        log::debug!("Module {:?} has {} database objects", self.handle, list.len());
        *cache = Some(list.clone());
        Ok(list)
    }

    /// Names of the database objects of the value types in `selection`. Not cached
    pub fn get_database_objects_by_type(&self, filter: DbObjectType, selection: DbObjectSelection) -> CanapeResult<Vec<String>> {
        let raw = self
            .session
            .driver
            .get_database_objects_by_type(self.session.hdl, self.handle, filter, selection)?;
        Ok(split_list(&raw))
    }

    /// ECU tasks of the module, by description
    pub fn get_ecu_tasks(&self) -> CanapeResult<BTreeMap<String, EcuTask>> {
        let tasks = self
            .session
            .driver
            .get_ecu_tasks(self.session.hdl, self.handle, MAX_ECU_TASKS)?;
        Ok(tasks
            .into_iter()
            .map(|info| (info.description.clone(), EcuTask::new(self.session.clone(), self.handle, info)))
            .collect())
    }

    /// Name of the network the module is connected to
    pub fn get_network_name(&self) -> CanapeResult<String> {
        self.session.driver.get_network_name(self.session.hdl, self.handle)
    }

    /// Driver type of the module
    pub fn get_ecu_driver_type(&self) -> CanapeResult<DriverType> {
        self.session.driver.get_ecu_driver_type(self.session.hdl, self.handle)
    }

    /// Calibration or measurement object by name.
    ///
    /// `name` may contain `*` and `?` wildcards. The pattern is resolved against the
    /// database objects and used when exactly one object matches.
    pub fn get_calibration_object(&self, name: &str) -> CanapeResult<CalibrationObject> {
        let mut name = name.to_string();
        if has_wildcard(&name) {
            let objects = self.get_database_objects()?;
            let matches: Vec<&String> = objects.iter().filter(|o| wildcard_match(&name, o)).collect();
            if let [single] = matches.as_slice() {
                log::debug!("'{name}' resolved to '{single}'");
                name = single.to_string();
            } else {
                log::warn!("'{name}' matches {} objects", matches.len());
            }
        }
        CalibrationObject::new(self.session.clone(), self.handle, &name)
    }

    /// True if the device supports resume mode
    pub fn has_resume_mode(&self) -> CanapeResult<bool> {
        self.session.driver.has_resume_mode(self.session.hdl, self.handle)
    }

    /// Measurement list of the module, by object name
    pub fn get_measurement_list_entries(&self) -> CanapeResult<HashMap<String, MeasurementListEntry>> {
        let entries = self.session.driver.get_measurement_list_entries(self.session.hdl, self.handle)?;
        Ok(entries.into_iter().map(|e| (e.object_name.clone(), e)).collect())
    }

    /// Clears the data acquisition channels of this module defined through this interface
    pub fn reset_data_acquisition_channels_by_module(&self) -> CanapeResult<()> {
        self.session
            .driver
            .reset_data_acquisition_channels_by_module(self.session.hdl, self.handle)
    }

    /// Releases the module
    pub fn release_module(&self) -> CanapeResult<()> {
        self.session.driver.release_module(self.session.hdl, self.handle)
    }

    /// Declares a CASL script for this module. `script` is a file name if `script_file`
    /// is true, otherwise the script source
    pub fn execute_script_ex(&self, script_file: bool, script: &str) -> CanapeResult<Script> {
        let handle = self
            .session
            .driver
            .execute_script_ex(self.session.hdl, self.handle, script_file, script)?;
        Ok(Script::new(self.session.clone(), handle))
    }
}

/// Splits a `;` separated object list
fn split_list(raw: &str) -> Vec<String> {
    raw.split(';').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CanapeError,
        canape::{Canape, CanapeOptions},
        driver::{CalibrationValue, SimulatedCanape},
    };

    fn setup() -> (Arc<SimulatedCanape>, Canape, Module) {
        let sim = Arc::new(SimulatedCanape::new());
        let canape = Canape::new(sim.clone(), CanapeOptions::new("demo")).unwrap();
        let handle = sim.add_module("XCPsim", "C:\\db\\XCPsim.a2l");
        sim.add_calibration(handle, "ampl", CalibrationValue::Scalar(1.5), "V");
        sim.add_calibration(handle, "ampl_offset", CalibrationValue::Scalar(0.0), "V");
        sim.add_calibration(handle, "period", CalibrationValue::Scalar(2.0), "s");
        sim.add_measurement(handle, "channel1", "V");
        let module = canape.get_module_by_name("XCPsim").unwrap();
        (sim, canape, module)
    }

    #[test]
    fn database_objects_are_cached() {
        let (sim, _canape, module) = setup();
        assert_eq!(module.get_database_objects().unwrap(), ["ampl", "ampl_offset", "period", "channel1"]);
        sim.add_measurement(module.handle(), "channel2", "V");
        assert_eq!(module.get_database_objects().unwrap().len(), 4);
    }

    #[test]
    fn wildcard_resolves_single_match() {
        let (_sim, _canape, module) = setup();
        assert_eq!(module.get_calibration_object("per*").unwrap().name(), "period");
        assert_eq!(module.get_calibration_object("ampl_o?fset").unwrap().name(), "ampl_offset");
        // Two matches, the pattern itself is looked up
        assert!(matches!(
            module.get_calibration_object("ampl*"),
            Err(CanapeError::UnknownObject(name)) if name == "ampl*"
        ));
    }

    #[test]
    fn database_objects_by_type() {
        let (sim, _canape, module) = setup();
        sim.add_calibration(module.handle(), "label", CalibrationValue::ascii("abc"), "");
        let ascii = module
            .get_database_objects_by_type(DbObjectType::All, DbObjectSelection::ASCII)
            .unwrap();
        assert_eq!(ascii, ["label"]);
        let scalars = module
            .get_database_objects_by_type(DbObjectType::Characteristic, DbObjectSelection::SCALAR)
            .unwrap();
        assert_eq!(scalars, ["ampl", "ampl_offset", "period"]);
    }

    #[test]
    fn database_path_joins_directory() {
        let (_sim, _canape, module) = setup();
        let path = module.get_database_path().unwrap();
        assert!(path.ends_with("XCPsim.a2l"));
    }
}
