// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The engine at the core of the CXL interconnect simulator.
//!
//! This library provides a single-threaded [engine](crate::engine) which
//! executes event driven asynchronous simulation components. All time is kept
//! on one global event queue (see [time](crate::time)) from which suspended
//! tasks are woken and scheduled callbacks are run in time order.
//!
//! # Simple Application
//!
//! A very simple application would look like:
//!
//! ```rust
//! use cxl_engine::engine::Engine;
//! use cxl_engine::port::{InPort, OutPort};
//! use cxl_engine::run_simulation;
//!
//! let mut engine = Engine::default();
//! let clock = engine.default_clock();
//! let rx = InPort::new(&engine, &clock, engine.top(), "rx");
//! let mut tx = OutPort::new(engine.top(), "tx");
//! tx.connect(rx.state()).unwrap();
//!
//! engine.spawn(async move {
//!     tx.put(42)?.await;
//!     Ok(())
//! });
//! engine.spawn(async move {
//!     let value: i32 = rx.get()?.await;
//!     assert_eq!(value, 42);
//!     Ok(())
//! });
//! run_simulation!(engine);
//! ```

pub mod engine;
pub mod events;
pub mod executor;
pub mod port;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;

#[macro_export]
/// Run the simulation and check the result.
///
/// With one argument the simulation must succeed. With an expected message
/// the simulation must fail with exactly that error.
macro_rules! run_simulation {
    ($engine:ident) => {
        if let Err(e) = $engine.run() {
            panic!("{e}");
        }
    };
    ($engine:ident, $expect:expr) => {
        match $engine.run() {
            Ok(()) => panic!("Expected an error!"),
            Err(e) => assert_eq!(format!("{e}").as_str(), $expect),
        }
    };
}
