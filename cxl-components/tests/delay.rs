// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_components::delay::Delay;
use cxl_components::sink::Sink;
use cxl_components::source::Source;
use cxl_components::{connect_port, option_box_repeat};
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;

#[test]
fn values_leave_after_delay() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let delay_ticks = 3;
    let source =
        Source::new_and_register(&engine, top, "source", Some(Box::new(0..5_i32))).unwrap();
    let delay = Delay::new_and_register(&engine, &clock, top, "delay", delay_ticks).unwrap();
    let sink = Sink::new_and_register(&engine, &clock, top, "sink").unwrap();

    connect_port!(source, tx => delay, rx).unwrap();
    connect_port!(delay, tx => sink, rx).unwrap();

    run_simulation!(engine);

    // Only `delay_ticks` values can be in flight, so the last two are only
    // accepted once the first ones leave.
    let arrivals = sink.arrivals();
    let values: Vec<i32> = arrivals.iter().map(|(_, v)| *v).collect();
    let ticks: Vec<u64> = arrivals.iter().map(|(t, _)| *t).collect();
    assert_eq!(values, vec![0, 1, 2, 3, 4]);
    assert_eq!(ticks, vec![3, 3, 3, 6, 6]);
}

#[test]
fn many_values_through_delay() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let num_puts = 30;
    let source =
        Source::new_and_register(&engine, top, "source", option_box_repeat!(500 ; num_puts))
            .unwrap();
    let delay = Delay::new_and_register(&engine, &clock, top, "delay", 3).unwrap();
    let sink = Sink::new_and_register(&engine, &clock, top, "sink").unwrap();

    connect_port!(source, tx => delay, rx).unwrap();
    connect_port!(delay, tx => sink, rx).unwrap();

    run_simulation!(engine);
    assert_eq!(sink.num_sunk(), num_puts);
}
