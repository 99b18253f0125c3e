// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use cxl_components::connect_port;
use cxl_components::sink::Sink;
use cxl_components::source::Source;
use cxl_engine::engine::Engine;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;
use cxl_models::Packet;
use cxl_models::crossbar::{Crossbar, CrossbarConfig, PacketState, TERMINAL_STATE_HISTORY};
use cxl_models::packet::{Command, Status};
use cxl_models::router::AddressRouter;
use cxl_models::test_helpers::{GB, create_range, create_read, create_write};
use cxl_track::id::Unique;

struct Harness {
    xbar: Rc<Crossbar>,
    requests: Vec<Rc<Sink<Packet>>>,
    responses: Vec<Rc<Sink<Packet>>>,
}

/// Feed each upstream port from its own list of packets. Downstream ports
/// never respond.
fn build(
    engine: &Engine,
    config: CrossbarConfig,
    router: AddressRouter,
    inputs: Vec<Vec<Packet>>,
    num_downstream: usize,
) -> Harness {
    let clock = engine.default_clock();
    let top = engine.top();
    let num_upstream = inputs.len();
    let xbar = Crossbar::new_and_register(
        engine,
        &clock,
        top,
        "xbar",
        config,
        router,
        num_upstream,
        num_downstream,
    )
    .unwrap();

    let mut responses = Vec::new();
    for (i, packets) in inputs.into_iter().enumerate() {
        let source = Source::new_and_register(
            engine,
            top,
            &format!("source{i}"),
            Some(Box::new(packets.into_iter())),
        )
        .unwrap();
        connect_port!(source, tx => xbar, up_req_rx, i).unwrap();
        let sink = Sink::new_and_register(engine, &clock, top, &format!("rsp_sink{i}")).unwrap();
        connect_port!(xbar, up_rsp_tx, i => sink, rx).unwrap();
        responses.push(sink);
    }

    let mut requests = Vec::new();
    for i in 0..num_downstream {
        let sink = Sink::new_and_register(engine, &clock, top, &format!("req_sink{i}")).unwrap();
        connect_port!(xbar, down_req_tx, i => sink, rx).unwrap();
        requests.push(sink);
        let idle =
            Source::<Packet>::new_and_register(engine, top, &format!("idle{i}"), None).unwrap();
        connect_port!(idle, tx => xbar, down_rsp_rx, i).unwrap();
    }

    Harness {
        xbar,
        requests,
        responses,
    }
}

#[test]
fn round_robin_between_upstream_ports() {
    let mut engine = start_test(file!());
    let top = engine.top().clone();
    let inputs = vec![
        (0..4).map(|i| create_read(&top, i * 64, 64)).collect(),
        (0..4).map(|i| create_read(&top, 0x1000 + i * 64, 64)).collect(),
    ];
    let harness = build(
        &engine,
        CrossbarConfig::default(),
        AddressRouter::single_downstream(),
        inputs,
        1,
    );

    run_simulation!(engine);

    let arrivals = harness.requests[0].arrivals();
    let addresses: Vec<u64> = arrivals.iter().map(|(_, p)| p.address()).collect();
    assert_eq!(addresses, vec![
        0x0, 0x1000, 0x40, 0x1040, 0x80, 0x1080, 0xc0, 0x10c0
    ]);

    // The first grant takes the frontend and forward latencies, after which
    // each 64 byte packet holds the 32 byte wide layer for 2 cycles.
    let ticks: Vec<u64> = arrivals.iter().map(|(tick, _)| *tick).collect();
    assert_eq!(ticks, vec![3, 5, 7, 9, 11, 13, 15, 17]);

    let stats = harness.xbar.stats();
    assert_eq!(stats.pkt_count, vec![vec![4], vec![4]]);
    assert_eq!(stats.pkt_size, vec![vec![256], vec![256]]);
    assert_eq!(stats.delivered, 8);
    assert_eq!(stats.commands.get(&Command::Read), Some(&8));
}

#[test]
fn requests_routed_by_address() {
    let mut engine = start_test(file!());
    let top = engine.top().clone();
    let router = AddressRouter::from_ranges([
        (create_range(0, GB), 0),
        (create_range(GB, GB), 1),
    ])
    .unwrap();
    let inputs = vec![vec![
        create_write(&top, GB + 0x100, 32),
        create_read(&top, 0x100, 32),
        create_read(&top, GB - 32, 32),
    ]];
    let harness = build(&engine, CrossbarConfig::default(), router, inputs, 2);

    run_simulation!(engine);

    let to_port = |i: usize| -> Vec<u64> {
        harness.requests[i]
            .arrivals()
            .iter()
            .map(|(_, p)| p.address())
            .collect()
    };
    assert_eq!(to_port(0), vec![0x100, GB - 32]);
    assert_eq!(to_port(1), vec![GB + 0x100]);
    assert_eq!(harness.xbar.stats().pkt_count, vec![vec![2, 1]]);
}

#[test]
fn unroutable_request_gets_failed_response() {
    let mut engine = start_test(file!());
    let top = engine.top().clone();
    let router = AddressRouter::from_ranges([(create_range(0, GB), 0)]).unwrap();
    let lost = create_read(&top, 0x8000_0000, 64);
    let lost_id = lost.id();
    let inputs = vec![vec![lost, create_read(&top, 0x100, 64)]];
    let harness = build(&engine, CrossbarConfig::default(), router, inputs, 1);

    run_simulation!(engine);

    let responses = harness.responses[0].arrivals();
    assert_eq!(responses.len(), 1);
    let (tick, response) = &responses[0];
    assert_eq!(*tick, 3);
    assert_eq!(response.id(), lost_id);
    assert_eq!(response.status(), Status::Failed);
    assert!(!response.is_request());

    // The rejection does not hold up the next request.
    let requests = harness.requests[0].arrivals();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].0, 4);

    let stats = harness.xbar.stats();
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(harness.xbar.packet_state(lost_id), Some(PacketState::Rejected));
    assert_eq!(
        harness.xbar.packet_state(requests[0].1.id()),
        Some(PacketState::Delivered)
    );
}

#[test]
fn old_packet_states_are_forgotten() {
    let mut engine = start_test(file!());
    let top = engine.top().clone();
    let num_packets = TERMINAL_STATE_HISTORY as u64 + 10;
    let config = CrossbarConfig {
        max_outstanding: num_packets as usize,
        ..CrossbarConfig::default()
    };
    let packets: Vec<Packet> = (0..num_packets)
        .map(|i| create_read(&top, i * 64, 64))
        .collect();
    let first_id = packets[0].id();
    let last_id = packets[packets.len() - 1].id();
    let harness = build(
        &engine,
        config,
        AddressRouter::single_downstream(),
        vec![packets],
        1,
    );

    run_simulation!(engine);

    assert_eq!(harness.xbar.stats().delivered, num_packets);
    assert_eq!(harness.xbar.packet_state(first_id), None);
    assert_eq!(
        harness.xbar.packet_state(last_id),
        Some(PacketState::Delivered)
    );
}

#[test]
fn outstanding_limit_stops_grants() {
    let mut engine = start_test(file!());
    let top = engine.top().clone();
    let config = CrossbarConfig {
        max_outstanding: 2,
        ..CrossbarConfig::default()
    };
    let inputs = vec![(0..5).map(|i| create_read(&top, i * 64, 64)).collect()];
    let harness = build(&engine, config, AddressRouter::single_downstream(), inputs, 1);

    run_simulation!(engine);

    // No responses ever come back so only two requests get through.
    assert_eq!(harness.requests[0].num_sunk(), 2);
    assert_eq!(harness.xbar.outstanding(), 2);
    assert_eq!(harness.xbar.stats().delivered, 2);
}

#[test]
fn direct_forward_is_queued() {
    let mut engine = start_test(file!());
    let top = engine.top().clone();
    let config = CrossbarConfig {
        buffer_size_req: 2,
        ..CrossbarConfig::default()
    };
    let harness = build(&engine, config, AddressRouter::single_downstream(), vec![vec![]], 1);

    harness.xbar.forward(0, create_read(&top, 0x40, 64)).unwrap();
    harness.xbar.forward(0, create_read(&top, 0x80, 64)).unwrap();
    let extra = create_read(&top, 0xc0, 64);
    let extra_id = extra.id();
    match harness.xbar.forward(0, extra) {
        Err(cxl_models::CxlError::BufferFull(packet)) => assert_eq!(packet.id(), extra_id),
        other => panic!("expected BufferFull, got {other:?}"),
    }
    assert_eq!(harness.xbar.route(&create_read(&top, 0, 8)).unwrap(), 0);

    run_simulation!(engine);

    let addresses: Vec<u64> = harness.requests[0]
        .arrivals()
        .iter()
        .map(|(_, p)| p.address())
        .collect();
    assert_eq!(addresses, vec![0x40, 0x80]);
}

#[test]
fn router_port_out_of_range() {
    let engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();
    let router = AddressRouter::from_ranges([(create_range(0, GB), 1)]).unwrap();
    let result = Crossbar::new_and_register(
        &engine,
        &clock,
        top,
        "xbar",
        CrossbarConfig::default(),
        router,
        1,
        1,
    );
    let Err(error) = result else {
        panic!("expected an error");
    };
    assert_eq!(
        error.0,
        "top::xbar: configuration error: router uses downstream port 1 but only 1 exist"
    );
}
