use std::sync::Arc;

use canape_asap3::{
    CanapeError,
    calibration_object::CalibrationObject,
    canape::{Canape, CanapeOptions},
    constants::{Channel, DriverType, ErrorCode, MeasurementState, RecorderState, RecorderType, ScriptStatus},
    driver::{Asap3Driver, CalibrationValue, ModuleHandle, SimulatedCanape},
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open() -> (Arc<SimulatedCanape>, Canape) {
    init_logging();
    let sim = Arc::new(SimulatedCanape::new());
    let canape = Canape::new(sim.clone(), CanapeOptions::new("C:\\Projects\\XCPDemo")).unwrap();
    (sim, canape)
}

fn xcp_module(sim: &SimulatedCanape) -> ModuleHandle {
    let m = sim.add_module("XCPsim", "C:\\Projects\\XCPDemo\\XCPsim.a2l");
    sim.add_calibration(m, "ampl", CalibrationValue::Scalar(2.5), "V");
    sim.add_calibration(m, "period", CalibrationValue::Scalar(10.0), "ms");
    sim.add_calibration(m, "map1_8_8_uc", map(), "");
    sim.add_calibration(
        m,
        "curve1",
        CalibrationValue::Curve { axis: vec![0.0, 1.0, 2.0], values: vec![5.0, 6.0, 7.0] },
        "",
    );
    sim.add_calibration(m, "testString", CalibrationValue::ascii("HELLO"), "");
    sim.add_measurement(m, "channel1", "V");
    m
}

fn map() -> CalibrationValue {
    CalibrationValue::Map {
        x_axis: vec![0.0, 1.0],
        y_axis: vec![10.0, 20.0, 30.0],
        values: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
    }
}

#[test]
fn session_information() {
    let (sim, canape) = open();
    assert_eq!(canape.get_project_directory().unwrap(), "C:\\Projects\\XCPDemo");
    assert_eq!(canape.get_application_version().unwrap().main, 21);
    let dll = canape.get_dll_version().unwrap();
    assert_eq!((dll.main, dll.sub), (2, 3));
    assert!(!canape.has_mcd3_license().unwrap());
    sim.set_mcd3_license(true);
    assert!(canape.has_mcd3_license().unwrap());
    assert_eq!(canape.get_measurement_state().unwrap(), MeasurementState::Stopped);
    canape.exit(false).unwrap();
    assert_eq!(sim.session_count(), 0);
}

#[test]
fn exit_is_denied_while_measuring() {
    let (sim, canape) = open();
    canape.start_data_acquisition().unwrap();
    let err = sim.exit(canape.handle(), true).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::ExitDeniedWhileAcqu));
    canape.stop_data_acquisition().unwrap();
    canape.exit(true).unwrap();
}

#[test]
fn networks() {
    let (sim, canape) = open();
    sim.set_network("CAN1", true);
    assert!(canape.is_network_activated("CAN1").unwrap());
    let err = canape.is_network_activated("CAN2").unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::NetworkNotFound));
}

#[test]
fn create_and_find_modules() {
    let (_sim, canape) = open();
    let module = canape
        .create_module("XCPsim", "XCPsim.a2l", DriverType::Xcp, Channel::DevTcp, true, -1)
        .unwrap();
    assert_eq!(canape.get_module_count().unwrap(), 1);
    assert_eq!(module.get_module_name().unwrap(), "XCPsim");
    assert_eq!(module.get_communication_type().unwrap(), "TCP");
    assert_eq!(module.get_ecu_driver_type().unwrap(), DriverType::Xcp);
    assert!(module.is_ecu_online().unwrap());
    assert_eq!(canape.get_module_by_name("XCPsim").unwrap().handle(), module.handle());

    let err = canape.get_module_by_name("CCPsim").unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::UnknownModuleName));

    module.switch_ecu_on_offline(false, false).unwrap();
    assert!(!module.is_ecu_online().unwrap());
    module.module_activation(false).unwrap();
    assert!(!module.is_module_active().unwrap());

    module.release_module().unwrap();
    assert_eq!(canape.get_module_count().unwrap(), 0);
}

#[test]
fn module_database() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();
    let info = module.get_database_info().unwrap();
    assert_eq!(info.file_name, "XCPsim.a2l");
    assert!(module.get_database_path().unwrap().ends_with("XCPsim.a2l"));
    let objects = module.get_database_objects().unwrap();
    assert_eq!(objects.len(), 6);
    assert!(objects.iter().any(|o| o == "channel1"));
}

#[test]
fn scalar_calibration() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();

    let CalibrationObject::Scalar(ampl) = module.get_calibration_object("amp*").unwrap() else {
        panic!("ampl is a scalar");
    };
    assert_eq!(ampl.name(), "ampl");
    assert_eq!(ampl.unit(), "V");
    assert_eq!(ampl.value().unwrap(), 2.5);
    ampl.set_value(3.0).unwrap();
    assert_eq!(sim.object_value(m, "ampl"), Some(CalibrationValue::Scalar(3.0)));
}

#[test]
fn ambiguous_wildcard_uses_the_literal_name() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();
    let err = module.get_calibration_object("*a*").unwrap_err();
    assert!(matches!(err, CanapeError::UnknownObject(name) if name == "*a*"));
}

#[test]
fn map_calibration() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();
    let CalibrationObject::Map(map) = module.get_calibration_object("map1_8_8_uc").unwrap() else {
        panic!("map1_8_8_uc is a map");
    };
    assert_eq!(map.x_dimension().unwrap(), 2);
    assert_eq!(map.y_dimension().unwrap(), 3);
    assert_eq!(map.y_axis().unwrap(), vec![10.0, 20.0, 30.0]);

    map.set_values(&[vec![0.0; 3], vec![1.0; 3]]).unwrap();
    assert_eq!(map.values().unwrap(), vec![vec![0.0; 3], vec![1.0; 3]]);

    let err = map.set_values(&[vec![0.0; 3]]).unwrap_err();
    assert!(matches!(err, CanapeError::DimensionMismatch { .. }));
    let err = map.set_x_axis(&[1.0, 2.0, 3.0]).unwrap_err();
    assert!(matches!(err, CanapeError::DimensionMismatch { .. }));
}

#[test]
fn curve_and_ascii_calibration() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();

    let CalibrationObject::Curve(curve) = module.get_calibration_object("curve1").unwrap() else {
        panic!("curve1 is a curve");
    };
    curve.set_values(&[1.0, 2.0, 3.0]).unwrap();
    assert_eq!(curve.values().unwrap(), vec![1.0, 2.0, 3.0]);
    assert_eq!(curve.axis().unwrap(), vec![0.0, 1.0, 2.0]);

    let CalibrationObject::Ascii(text) = module.get_calibration_object("testString").unwrap() else {
        panic!("testString is a string");
    };
    assert_eq!(text.len().unwrap(), 5);
    text.set_ascii("HEY").unwrap();
    assert_eq!(text.ascii().unwrap(), "HEY");
    assert!(matches!(text.set_ascii("TOO LONG").unwrap_err(), CanapeError::DimensionMismatch { .. }));
}

#[test]
fn measurement_list_by_object_name() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    sim.add_measurement(m, "channel2", "V");
    sim.add_task(m, "10ms", 2, 10);
    let module = canape.get_module_by_index(m.0).unwrap();
    assert!(module.get_measurement_list_entries().unwrap().is_empty());

    let task = module.get_ecu_tasks().unwrap()["10ms"].clone();
    task.daq_setup_channel("channel1", 5, true).unwrap();
    task.daq_setup_channel("channel2", 1, false).unwrap();
    let entries = module.get_measurement_list_entries().unwrap();
    assert_eq!(entries.len(), 2);
    let channel1 = &entries["channel1"];
    assert_eq!((channel1.task_id, channel1.rate, channel1.save_flag, channel1.disabled), (2, 5, true, false));
    assert_eq!(entries["channel2"].object_name, "channel2");
    assert!(!entries["channel2"].save_flag);
}

#[test]
fn measurement_objects_are_read_only() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();
    let channel = module.get_calibration_object("channel1").unwrap();
    assert!(matches!(
        channel.set_value(&CalibrationValue::Scalar(1.0)).unwrap_err(),
        CanapeError::NotWritable(_)
    ));
}

#[test]
fn generic_value_must_match_the_type() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();
    let period = module.get_calibration_object("period").unwrap();
    assert!(period.set_value(&CalibrationValue::Axis(vec![1.0])).is_err());
    period.set_value(&CalibrationValue::Scalar(20.0)).unwrap();
    assert_eq!(period.value().unwrap(), CalibrationValue::Scalar(20.0));
}

#[test]
fn recorders() {
    let (sim, canape) = open();
    assert_eq!(canape.get_recorder_count().unwrap(), 0);
    let rec = canape.define_recorder("Recorder 1", RecorderType::Mdf).unwrap();
    assert_eq!(canape.get_recorder_count().unwrap(), 1);
    assert_eq!(canape.get_selected_recorder().unwrap().id(), rec.id());
    assert_eq!(canape.get_recorder_by_index(0).unwrap().get_name().unwrap(), "Recorder 1");
    assert_eq!(
        canape.get_recorder_by_index(1).unwrap_err().error_code(),
        Some(ErrorCode::RecorderIndexOutOfRange)
    );
    assert_eq!(
        canape.define_recorder("Recorder 1", RecorderType::Mdf).unwrap_err().error_code(),
        Some(ErrorCode::RecorderAlreadyExists)
    );
    assert!(canape.define_recorder("Rt", RecorderType::ILinkRt).is_err());
    sim.set_mcd3_license(true);
    canape.define_recorder("Rt", RecorderType::ILinkRt).unwrap();

    rec.set_mdf_filename("C:\\Temp\\out.mf4").unwrap();
    assert_eq!(rec.get_mdf_filename().unwrap(), "C:\\Temp\\out.mf4");
    rec.disable().unwrap();
    assert!(!rec.is_enabled().unwrap());
    rec.enable().unwrap();

    canape.start_data_acquisition().unwrap();
    rec.start().unwrap();
    assert_eq!(rec.get_state().unwrap(), RecorderState::Running);
    rec.pause(true).unwrap();
    assert_eq!(rec.get_state().unwrap(), RecorderState::Paused);
    rec.pause(false).unwrap();
    rec.stop(true).unwrap();
    assert_eq!(rec.get_state().unwrap(), RecorderState::Suspended);
    canape.stop_data_acquisition().unwrap();
}

#[test]
fn scripts() {
    let (sim, canape) = open();
    let m = xcp_module(&sim);
    let module = canape.get_module_by_index(m.0).unwrap();
    let script = module.execute_script_ex(false, "return 42;").unwrap();
    assert_eq!(sim.script_source(script.handle()).as_deref(), Some("return 42;"));
    assert_eq!(script.get_script_state().unwrap(), ScriptStatus::Ready);
    script.start_script().unwrap();
    assert_eq!(script.get_script_state().unwrap(), ScriptStatus::Running);
    assert_eq!(script.start_script().unwrap_err().error_code(), Some(ErrorCode::IllegalOperation));

    sim.finish_script(script.handle(), ScriptStatus::FinishedReturn, 42.0, "done");
    assert_eq!(script.get_script_result_value().unwrap(), 42.0);
    assert_eq!(script.get_script_result_string().unwrap(), "done");
    script.release_script().unwrap();
    assert_eq!(script.get_script_state().unwrap_err().error_code(), Some(ErrorCode::InvalidScrHandle));
}

#[test]
fn missing_functions_report_not_implemented() {
    let (sim, canape) = open();
    sim.set_missing("Asap3GetCNAFilename");
    assert!(matches!(
        canape.get_cna_filename().unwrap_err(),
        CanapeError::NotImplemented { function: "Asap3GetCNAFilename", .. }
    ));
    canape.load_cna_file("XCPDemo.cna").unwrap();
}

#[test]
fn injected_errors_are_reported_once() {
    let (sim, canape) = open();
    sim.inject_error("Asap3StartDataAcquisition", ErrorCode::NoCanapeLicense);
    let err = canape.start_data_acquisition().unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::NoCanapeLicense));
    assert!(err.to_string().starts_with("Asap3StartDataAcquisition failed"));
    canape.start_data_acquisition().unwrap();
    canape.stop_data_acquisition().unwrap();
}
