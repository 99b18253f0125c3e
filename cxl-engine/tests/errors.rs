// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_engine::port::{InPort, OutPort};
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;

#[test]
#[should_panic(expected = "top::tx not connected")]
fn disconnected_outport() {
    let mut engine = start_test(file!());

    let tx_port = OutPort::new(engine.top(), "tx");
    engine.spawn(async move {
        tx_port.put(1)?.await;
        Ok(())
    });
    run_simulation!(engine);
}

#[test]
#[should_panic(expected = "top::tx not connected")]
fn disconnected_outport_try_put() {
    let mut engine = start_test(file!());

    let tx_port = OutPort::new(engine.top(), "tx");
    engine.spawn(async move {
        tx_port.try_put()?.await;
        tx_port.put(1)?.await;
        Ok(())
    });
    run_simulation!(engine);
}

#[test]
#[should_panic(expected = "top::rx not connected")]
fn disconnected_input() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let rx_port = InPort::new(&engine, &clock, engine.top(), "rx");
    engine.spawn(async move {
        let _: i32 = rx_port.get()?.await;
        Ok(())
    });
    run_simulation!(engine);
}

#[test]
fn input_connected_twice() {
    let engine = start_test(file!());
    let clock = engine.default_clock();

    let rx_port: InPort<i32> = InPort::new(&engine, &clock, engine.top(), "rx");
    let mut tx_a = OutPort::new(engine.top(), "tx_a");
    let mut tx_b = OutPort::new(engine.top(), "tx_b");
    tx_a.connect(rx_port.state()).unwrap();
    let err = tx_b.connect(rx_port.state()).unwrap_err();
    assert_eq!(err.to_string(), "Error: top::rx already connected");
    assert!(!tx_b.is_connected());
}

#[test]
#[should_panic(expected = "Error: task failed at 3")]
fn task_error_stops_simulation() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    engine.spawn(async move {
        clock.wait_ticks(3).await;
        cxl_engine::sim_error!("task failed at {}", clock.tick_now())
    });
    run_simulation!(engine);
}
