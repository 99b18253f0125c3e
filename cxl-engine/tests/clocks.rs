// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::RefCell;
use std::rc::Rc;

use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;

fn tick_ns(tick: u64, freq_mhz: f64) -> f64 {
    tick as f64 * 1000.0 / freq_mhz
}

/// Run clocks of different frequencies that add to a shared vector and check
/// that everything has been done in the correct order and at the right times.
#[test]
fn dual_clock() {
    let mut engine = start_test(file!());

    let mhz1 = 1000.0;
    let mhz2 = 1800.0;

    let clk1 = engine.clock_mhz(mhz1);
    let clk2 = engine.clock_mhz(mhz2);

    let all_values = Rc::new(RefCell::new(Vec::new()));

    let values = all_values.clone();
    engine.spawn(async move {
        for _ in 0..5 {
            clk1.wait_ticks(1).await;
            values.borrow_mut().push((1, clk1.time_now_ns()));
        }
        Ok(())
    });

    let values = all_values.clone();
    engine.spawn(async move {
        for _ in 0..5 {
            clk2.wait_ticks(1).await;
            values.borrow_mut().push((2, clk2.time_now_ns()));
        }
        Ok(())
    });

    run_simulation!(engine);

    assert_eq!(
        vec![
            (2, tick_ns(1, mhz2)),
            (1, tick_ns(1, mhz1)),
            (2, tick_ns(2, mhz2)),
            (2, tick_ns(3, mhz2)),
            (1, tick_ns(2, mhz1)),
            (2, tick_ns(4, mhz2)),
            (2, tick_ns(5, mhz2)),
            (1, tick_ns(3, mhz1)),
            (1, tick_ns(4, mhz1)),
            (1, tick_ns(5, mhz1)),
        ],
        *all_values.borrow()
    );
}

// A task that calls `wait_ticks_or_exit` must not stop a simulation from
// terminating.
#[test]
fn wait_ticks_or_exit() {
    let mut engine = start_test(file!());

    {
        let clk = engine.default_clock();
        engine.spawn(async move {
            for _ in 0..5 {
                clk.wait_ticks(1).await;
            }
            Ok(())
        });
    }

    {
        let clk = engine.default_clock();
        engine.spawn(async move {
            for _ in 0..50 {
                clk.wait_ticks_or_exit(10).await;
            }
            Ok(())
        });
    }

    run_simulation!(engine);

    // Simulation should have finished when the first loop completed
    assert_eq!(engine.time_now_ns(), 5.0);
}

#[test]
fn slow_clock_resumes_on_its_edge() {
    let mut engine = start_test(file!());
    let fast = engine.clock_mhz(1000.0);
    let slow = engine.clock_mhz(250.0);

    engine.spawn(async move {
        fast.wait_ticks(5).await;
        // 5ns is between edges 1 (4ns) and 2 (8ns) of the slow clock.
        assert_eq!(slow.tick_now(), 2);
        slow.wait_ticks(1).await;
        assert_eq!(slow.time_now_ns(), 12.0);
        Ok(())
    });
    run_simulation!(engine);
}

#[test]
fn scheduled_callbacks_run_in_time_then_fifo_order() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let order = Rc::new(RefCell::new(Vec::new()));

    for (name, ticks) in [("c", 3), ("a", 1), ("d", 3), ("b", 2)] {
        let order = order.clone();
        let clk = clock.clone();
        clock.schedule(ticks, move || {
            order.borrow_mut().push((name, clk.tick_now()));
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(
        *order.borrow(),
        vec![("a", 1), ("b", 2), ("c", 3), ("d", 3)]
    );
}

#[test]
fn callback_error_stops_simulation() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    clock.schedule(4, || cxl_engine::sim_error!("late failure"));
    run_simulation!(engine, "Error: late failure");
    assert_eq!(engine.time_now_ns(), 4.0);
}
