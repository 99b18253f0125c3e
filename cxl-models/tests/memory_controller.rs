// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_components::connect_port;
use cxl_components::sink::Sink;
use cxl_components::source::Source;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;
use cxl_models::Packet;
use cxl_models::memory_controller::{MemoryController, MemoryStats};
use cxl_models::packet::Status;
use cxl_models::test_helpers::{
    GB, create_range, create_read, create_write, reference_memory_config,
};

#[test]
fn responses_after_fixed_latency() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let config = reference_memory_config(create_range(0, GB));
    let memory = MemoryController::new_and_register(&engine, &clock, top, "mem", &config).unwrap();
    let packets = vec![
        create_read(top, 0x0, 64),
        create_write(top, 0x40, 128),
        create_read(top, 0x1_0000_0000, 64),
    ];
    let source =
        Source::new_and_register(&engine, top, "source", Some(Box::new(packets.into_iter())))
            .unwrap();
    let sink = Sink::new_and_register(&engine, &clock, top, "sink").unwrap();

    connect_port!(source, tx => memory, req_rx).unwrap();
    connect_port!(memory, rsp_tx => sink, rx).unwrap();

    run_simulation!(engine);

    let arrivals = sink.arrivals();
    let ticks: Vec<u64> = arrivals.iter().map(|(tick, _)| *tick).collect();
    assert_eq!(ticks, vec![10, 10, 10]);

    let statuses: Vec<Status> = arrivals.iter().map(|(_, p)| p.status()).collect();
    assert_eq!(statuses, vec![Status::Ok, Status::Ok, Status::Failed]);
    assert!(arrivals.iter().all(|(_, p)| !p.is_request()));

    assert_eq!(memory.stats(), MemoryStats {
        reads: 1,
        writes: 1,
        bytes_read: 64,
        bytes_written: 128,
        failed: 1,
    });
}

#[test]
fn access_crossing_range_end_fails() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let config = reference_memory_config(create_range(0x1000, 0x1000));
    let memory = MemoryController::new_and_register(&engine, &clock, top, "mem", &config).unwrap();
    let packets = vec![create_read(top, 0x1fc0, 64), create_read(top, 0x1fc0, 128)];
    let source =
        Source::new_and_register(&engine, top, "source", Some(Box::new(packets.into_iter())))
            .unwrap();
    let sink = Sink::new_and_register(&engine, &clock, top, "sink").unwrap();

    connect_port!(source, tx => memory, req_rx).unwrap();
    connect_port!(memory, rsp_tx => sink, rx).unwrap();

    run_simulation!(engine);

    let statuses: Vec<Status> = sink.arrivals().iter().map(|(_, p)| p.status()).collect();
    assert_eq!(statuses, vec![Status::Ok, Status::Failed]);
}

#[test]
#[should_panic(expected = "top::mem: unexpected response Read rsp")]
fn response_on_request_port_is_an_error() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let config = reference_memory_config(create_range(0, GB));
    let memory = MemoryController::new_and_register(&engine, &clock, top, "mem", &config).unwrap();
    let response: Packet = create_read(top, 0x0, 64).to_response();
    let source =
        Source::new_and_register(&engine, top, "source", Some(Box::new(std::iter::once(response))))
            .unwrap();
    let sink = Sink::new_and_register(&engine, &clock, top, "sink").unwrap();

    connect_port!(source, tx => memory, req_rx).unwrap();
    connect_port!(memory, rsp_tx => sink, rx).unwrap();

    run_simulation!(engine);
}
