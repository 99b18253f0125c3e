// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use cxl_engine::events::once::Once;
use cxl_engine::events::repeated::Repeated;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;
use cxl_engine::traits::Event;

mod common;
use common::create_once_event_at_delay;

#[test]
fn once_wakes_all_listeners() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let event = create_once_event_at_delay(&engine, 10, 7);
    let seen = Rc::new(RefCell::new(Vec::new()));

    for _ in 0..3 {
        let event = event.clone();
        let seen = seen.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            let value = event.listen().await;
            seen.borrow_mut().push((value, clock.tick_now()));
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(*seen.borrow(), vec![(7, 10), (7, 10), (7, 10)]);
}

#[test]
fn once_listen_after_trigger() {
    let mut engine = start_test(file!());
    let event = Once::default();
    event.notify().unwrap();
    assert!(event.has_triggered());

    engine.spawn(async move {
        event.listen().await;
        Ok(())
    });
    run_simulation!(engine);
}

#[test]
#[should_panic(expected = "once event already triggered")]
fn once_triggered_twice() {
    let mut engine = start_test(file!());
    let event = Once::default();
    engine.spawn(async move {
        event.notify()?;
        event.notify()?;
        Ok(())
    });
    run_simulation!(engine);
}

#[test]
fn repeated_passes_result() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let repeated = Repeated::new(0usize);

    {
        let repeated = repeated.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            assert_eq!(repeated.listen().await, 42);
            assert_eq!(clock.time_now_ns(), 10.0);
            assert_eq!(repeated.listen().await, 43);
            assert_eq!(clock.time_now_ns(), 20.0);
            Ok(())
        });
    }

    engine.spawn(async move {
        clock.wait_ticks(10).await;
        repeated.notify_result(42)?;
        clock.wait_ticks(10).await;
        repeated.notify_result(43)?;
        Ok(())
    });

    run_simulation!(engine);
}

#[test]
fn repeated_listener_misses_earlier_notify() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let repeated = Repeated::default();
    repeated.notify().unwrap();

    let woken = Rc::new(RefCell::new(None));
    {
        let repeated = repeated.clone();
        let clock = clock.clone();
        let woken = woken.clone();
        engine.spawn(async move {
            repeated.listen().await;
            *woken.borrow_mut() = Some(clock.tick_now());
            Ok(())
        });
    }
    engine.spawn(async move {
        clock.wait_ticks(3).await;
        repeated.notify()
    });

    run_simulation!(engine);
    assert_eq!(*woken.borrow(), Some(3));
}
