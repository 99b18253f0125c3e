// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_components::sink::Sink;
use cxl_components::source::Source;
use cxl_components::store::Store;
use cxl_components::{connect_port, option_box_repeat};
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;

/// Source → Store → Sink: all values make it through and the store drains.
#[test]
fn store_basic_flow() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    const NUM_PUTS: usize = 50;
    const CAPACITY: usize = 8;

    let top = engine.top();
    let source =
        Source::new_and_register(&engine, top, "source", option_box_repeat!(1 ; NUM_PUTS)).unwrap();
    let store = Store::new_and_register(&engine, &clock, top, "store", CAPACITY).unwrap();
    let sink = Sink::new_and_register(&engine, &clock, top, "sink").unwrap();

    connect_port!(source, tx => store, rx).unwrap();
    connect_port!(store, tx => sink, rx).unwrap();

    run_simulation!(engine);

    assert_eq!(sink.num_sunk(), NUM_PUTS);
    assert_eq!(store.fill_level(), 0);
}

#[test]
fn store_zero_capacity_fails() {
    let engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let result = Store::<i32>::new_and_register(&engine, &clock, top, "store_zero", 0);
    let Err(err) = result else {
        panic!("Expected zero-capacity Store construction to return an error");
    };
    assert_eq!(err.to_string(), "Error: Unsupported Store with 0 capacity");
}

/// With nothing consuming the output the store fills to capacity and then
/// back-pressures the source without losing anything.
#[test]
fn store_fills_then_blocks() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let source =
        Source::new_and_register(&engine, top, "source", option_box_repeat!(7 ; 10)).unwrap();
    let store = Store::new_and_register(&engine, &clock, top, "store", 4).unwrap();
    let blocked = cxl_engine::port::InPort::new(&engine, &clock, top, "blocked");
    store.connect_port_tx(blocked.state()).unwrap();
    connect_port!(source, tx => store, rx).unwrap();

    let level_change = store.get_level_change_event();
    {
        use cxl_engine::traits::Event;
        engine.spawn(async move {
            let mut level = 0;
            while level < 4 {
                level = level_change.listen().await;
            }
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(store.fill_level(), 4);
}

#[test]
#[should_panic(expected = "top::store::rx already connected")]
fn store_input_connected_twice() {
    let engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top();

    let source_a: std::rc::Rc<Source<i32>> =
        Source::new_and_register(&engine, top, "source_a", None).unwrap();
    let source_b: std::rc::Rc<Source<i32>> =
        Source::new_and_register(&engine, top, "source_b", None).unwrap();
    let store = Store::new_and_register(&engine, &clock, top, "store", 2).unwrap();

    connect_port!(source_a, tx => store, rx).unwrap();
    connect_port!(source_b, tx => store, rx).unwrap();
}
