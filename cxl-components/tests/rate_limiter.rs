// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::Cell;
use std::rc::Rc;

use cxl_components::flow_controls::rate_limiter::RateLimiter;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;

#[test]
fn ticks_round_up_partial_transfers() {
    let engine = start_test(file!());
    let clock = engine.default_clock();

    // 16 lanes at 31 Gb/s on a 1 GHz clock.
    let limiter = RateLimiter::from_gbps(&clock, 16.0 * 31.0).unwrap();
    assert_eq!(limiter.bits_per_tick(), 496.0);
    assert_eq!(limiter.ticks_from_bits(64 * 8), 2);
    assert_eq!(limiter.ticks_from_bits(496), 1);
    assert_eq!(limiter.ticks_from_bits(0), 0);
}

#[test]
fn fractional_bits_per_tick() {
    let engine = start_test(file!());
    let clock = engine.clock_ghz(10.0);

    let limiter = RateLimiter::from_gbps(&clock, 16.0 * 31.0).unwrap();
    assert!((limiter.bits_per_tick() - 49.6).abs() < 1e-9);
    assert_eq!(limiter.ticks_from_bits(496), 10);
    assert_eq!(limiter.ticks_from_bits(497), 11);
}

#[test]
fn invalid_rates_rejected() {
    let engine = start_test(file!());
    let clock = engine.default_clock();

    assert!(RateLimiter::new(&clock, 0.0).is_err());
    assert!(RateLimiter::new(&clock, -1.0).is_err());
    assert!(RateLimiter::new(&clock, f64::INFINITY).is_err());
}

/// Back-to-back values through a limiter occupy consecutive windows.
#[test]
fn delay_accumulates() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    // An i32 is 32 bits, so 2 ticks at 16 bits per tick.
    let limiter = RateLimiter::new(&clock, 16.0).unwrap();
    let done_at = Rc::new(Cell::new(0));
    {
        let done_at = done_at.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            for value in 0..5_i32 {
                limiter.delay(&value).await;
            }
            done_at.set(clock.tick_now());
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(done_at.get(), 10);
}
