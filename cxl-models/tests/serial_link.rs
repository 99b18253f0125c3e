// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_components::connect_port;
use cxl_components::sink::Sink;
use cxl_components::source::Source;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;
use cxl_models::Packet;
use cxl_models::serial_link::SerialLink;
use cxl_models::test_helpers::{GB, create_range, create_read, reference_link_config};

#[test]
fn full_link_holds_back_requests() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let config = reference_link_config(create_range(0, GB));
    let link = SerialLink::new_and_register(&engine, &clock, top, "link", &config).unwrap();

    let packets: Vec<Packet> = (0..11).map(|i| create_read(top, i * 64, 64)).collect();
    let source = Source::new_and_register(&engine, top, "source", Some(Box::new(packets.into_iter())))
        .unwrap();
    let sink = Sink::new_and_register(&engine, &clock, top, "sink").unwrap();
    let idle = Source::<Packet>::new_and_register(&engine, top, "idle", None).unwrap();
    let rsp_sink = Sink::<Packet>::new_and_register(&engine, &clock, top, "rsp_sink").unwrap();

    connect_port!(source, tx => link, up_req_rx).unwrap();
    connect_port!(link, down_req_tx => sink, rx).unwrap();
    connect_port!(idle, tx => link, down_rsp_rx).unwrap();
    connect_port!(link, up_rsp_tx => rsp_sink, rx).unwrap();

    run_simulation!(engine);

    // Ten packets fit. The eleventh only starts once the first has left.
    let mut expected: Vec<u64> = (0..10).map(|i| 102 + 2 * i).collect();
    expected.push(204);
    let arrivals = sink.arrivals();
    let ticks: Vec<u64> = arrivals.iter().map(|(tick, _)| *tick).collect();
    assert_eq!(ticks, expected);

    let addresses: Vec<u64> = arrivals.iter().map(|(_, p)| p.address()).collect();
    assert_eq!(addresses, (0..11).map(|i| i * 64).collect::<Vec<_>>());

    let stats = link.request_stats();
    assert_eq!(stats.packets, 11);
    assert_eq!(stats.bytes, 11 * 64);
    assert_eq!(link.response_stats().packets, 0);
}

#[test]
fn blocked_receiver_stalls_link() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let config = reference_link_config(create_range(0, GB));
    let link = SerialLink::new_and_register(&engine, &clock, top, "link", &config).unwrap();

    let packets: Vec<Packet> = (0..20).map(|i| create_read(top, i * 64, 64)).collect();
    let source = Source::new_and_register(&engine, top, "source", Some(Box::new(packets.into_iter())))
        .unwrap();
    let blocked = cxl_engine::port::InPort::<Packet>::new(&engine, &clock, top, "blocked");
    let idle = Source::<Packet>::new_and_register(&engine, top, "idle", None).unwrap();
    let rsp_sink = Sink::<Packet>::new_and_register(&engine, &clock, top, "rsp_sink").unwrap();

    connect_port!(source, tx => link, up_req_rx).unwrap();
    link.connect_port_down_req_tx(blocked.state()).unwrap();
    connect_port!(idle, tx => link, down_rsp_rx).unwrap();
    connect_port!(link, up_rsp_tx => rsp_sink, rx).unwrap();

    run_simulation!(engine);

    // Nothing is ever accepted so the link stops at its buffer size.
    assert_eq!(link.request_stats().packets, 10);
}

#[test]
fn invalid_lane_count_rejected() {
    let engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let mut config = reference_link_config(create_range(0, GB));
    config.num_lanes = 0;
    let result = SerialLink::new_and_register(&engine, &clock, top, "link", &config);
    assert!(result.is_err());
}
