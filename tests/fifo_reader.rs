use std::{
    sync::{Arc, mpsc},
    thread,
    time::{Duration, Instant},
};

use canape_asap3::{
    action::ActionBuilder,
    canape::{Canape, CanapeOptions},
    constants::ErrorCode,
    daq::FifoReader,
    driver::{ModuleHandle, SimulatedCanape},
    ecu_task::{EcuTask, Sample},
};

const TASK_ID: u16 = 2;

fn open() -> (Arc<SimulatedCanape>, Canape, ModuleHandle, EcuTask) {
    let _ = env_logger::builder().is_test(true).try_init();
    let sim = Arc::new(SimulatedCanape::new());
    let canape = Canape::new(sim.clone(), CanapeOptions::new("C:\\Projects\\XCPDemo")).unwrap();
    let m = sim.add_module("XCPsim", "XCPsim.a2l");
    sim.add_measurement(m, "channel1", "V");
    sim.add_measurement(m, "channel2", "V");
    sim.add_task(m, "1ms", 1, 1);
    sim.add_task(m, "10ms", TASK_ID, 10);
    let tasks = canape.get_module_by_index(m.0).unwrap().get_ecu_tasks().unwrap();
    let task = tasks["10ms"].clone();
    (sim, canape, m, task)
}

/// Polls `cond` until it holds or 2 seconds passed
fn wait_for(cond: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(2) {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn reader_follows_the_measurement() {
    let (sim, canape, m, task) = open();
    assert_eq!(task.task_id(), TASK_ID);
    let reader = FifoReader::new(task);
    reader.add_channel("channel1", 1, false).unwrap();
    reader.add_channel("channel2", 1, true).unwrap();
    assert_eq!(reader.channel_names(), vec!["channel1", "channel2"]);
    assert_eq!(sim.daq_channels(m, TASK_ID), vec!["channel1", "channel2"]);
    assert!(!reader.is_running());
    assert!(reader.get_sample("channel1").unwrap().is_empty());
    assert_eq!(reader.get_value("unknown"), None);

    canape.start_data_acquisition().unwrap();
    assert!(reader.is_running());
    sim.push_sample(m, TASK_ID, 100, &[1.0, 2.0]);
    sim.push_sample(m, TASK_ID, 200, &[1.5, 2.5]);
    assert!(wait_for(|| reader.get_value("channel2") == Some(2.5)));
    assert_eq!(reader.get_sample("channel1"), Some(Sample { timestamp: 200.0, value: 1.5 }));
    assert_eq!(sim.fifo_len(m, TASK_ID), 0);

    canape.stop_data_acquisition().unwrap();
    assert!(!reader.is_running());
    assert!(reader.take_error().is_none());
}

#[test]
fn missing_values_keep_the_last_sample() {
    let (sim, canape, m, task) = open();
    let reader = FifoReader::with_refresh_rate(task, Duration::from_millis(5));
    reader.add_channel("channel1", 1, false).unwrap();
    reader.add_channel("channel2", 1, false).unwrap();
    canape.start_data_acquisition().unwrap();
    sim.push_sample(m, TASK_ID, 100, &[1.0, 2.0]);
    sim.push_sample(m, TASK_ID, 200, &[3.0]);
    assert!(wait_for(|| reader.get_value("channel1") == Some(3.0)));
    assert_eq!(reader.get_sample("channel2"), Some(Sample { timestamp: 100.0, value: 2.0 }));
    canape.stop_data_acquisition().unwrap();
}

#[test]
fn reader_restarts_with_the_measurement() {
    let (sim, canape, m, task) = open();
    let reader = FifoReader::new(task);
    reader.add_channel("channel1", 1, false).unwrap();
    for round in 0..3 {
        let value = f64::from(round);
        canape.start_data_acquisition().unwrap();
        sim.push_sample(m, TASK_ID, 10, &[value]);
        assert!(wait_for(|| reader.get_value("channel1") == Some(value)));
        canape.stop_data_acquisition().unwrap();
        assert!(!reader.is_running());
    }
}

#[test]
fn overrun_stops_the_reader() {
    let (sim, canape, m, task) = open();
    let reader = FifoReader::new(task);
    reader.add_channel("channel1", 1, false).unwrap();
    canape.start_data_acquisition().unwrap();
    sim.push_sample(m, TASK_ID, 100, &[1.0]);
    assert!(wait_for(|| reader.get_value("channel1") == Some(1.0)));

    sim.set_overrun(m, TASK_ID);
    assert!(wait_for(|| !reader.is_running()));
    let err = reader.take_error().unwrap();
    assert_eq!(err.error_code(), Some(ErrorCode::AcqStpOverflow));
    assert!(reader.take_error().is_none());
    canape.stop_data_acquisition().unwrap();
}

#[test]
fn channels_are_added_once() {
    let (sim, _canape, m, task) = open();
    let reader = FifoReader::new(task);
    reader.add_channel("channel1", 1, false).unwrap();
    reader.add_channel("channel1", 1, false).unwrap();
    assert_eq!(reader.channel_names().len(), 1);
    assert_eq!(sim.daq_channels(m, TASK_ID).len(), 1);

    reader.clear_channels();
    assert!(reader.channel_names().is_empty());
    assert_eq!(sim.daq_channels(m, TASK_ID).len(), 1);
}

#[test]
fn channels_cannot_be_added_while_measuring() {
    let (_sim, canape, _m, task) = open();
    let reader = FifoReader::new(task);
    canape.start_data_acquisition().unwrap();
    let err = reader.add_channel("channel1", 1, false).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::NotAvailableWhileAcq));
    assert!(reader.channel_names().is_empty());
    canape.stop_data_acquisition().unwrap();
}

#[test]
fn unknown_channel_is_rejected() {
    let (_sim, _canape, _m, task) = open();
    let reader = FifoReader::new(task);
    let err = reader.add_channel("channel9", 1, false).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::UnknownObject));
}

#[test]
fn dropped_reader_no_longer_drains() {
    let (sim, canape, m, task) = open();
    let reader = FifoReader::new(task);
    reader.add_channel("channel1", 1, false).unwrap();
    canape.start_data_acquisition().unwrap();
    drop(reader);
    sim.push_sample(m, TASK_ID, 100, &[1.0]);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sim.fifo_len(m, TASK_ID), 1);
    canape.stop_data_acquisition().unwrap();
    canape.start_data_acquisition().unwrap();
    sim.push_sample(m, TASK_ID, 200, &[2.0]);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(sim.fifo_len(m, TASK_ID), 1);
    canape.stop_data_acquisition().unwrap();
}

#[test]
fn current_values_need_a_running_measurement() {
    let (sim, canape, m, task) = open();
    task.daq_setup_channel("channel1", 1, false).unwrap();
    task.daq_setup_channel("channel2", 1, false).unwrap();
    let err = task.daq_get_current_values(2).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::AcquisNotStarted));

    canape.start_data_acquisition().unwrap();
    sim.push_sample(m, TASK_ID, 300, &[4.0, 5.0]);
    assert_eq!(
        task.daq_get_current_values(2).unwrap(),
        vec![Sample { timestamp: 300.0, value: 4.0 }, Sample { timestamp: 300.0, value: 5.0 }]
    );
    // Current values leave the FIFO untouched
    assert_eq!(sim.fifo_len(m, TASK_ID), 1);
    canape.stop_data_acquisition().unwrap();
}

#[test]
fn chain_holding_the_call_lock_does_not_block_the_reader() {
    let (sim, canape, m, task) = open();
    let reader = FifoReader::with_refresh_rate(task, Duration::from_millis(5));
    reader.add_channel("channel1", 1, false).unwrap();
    let chain = ActionBuilder::new(|c| c.start_data_acquisition())
        .also(|_| {
            thread::sleep(Duration::from_millis(20));
            Ok(())
        })
        .also(|c| c.stop_data_acquisition());

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let res = chain.run(&canape);
        let _ = tx.send(res.map_err(|e| e.to_string()));
        canape
    });
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(Ok(())));
    let canape = worker.join().unwrap();
    assert!(!reader.is_running());
    assert!(reader.take_error().is_none());

    canape.start_data_acquisition().unwrap();
    sim.push_sample(m, TASK_ID, 100, &[1.0]);
    assert!(wait_for(|| reader.get_value("channel1") == Some(1.0)));
    canape.stop_data_acquisition().unwrap();
}
