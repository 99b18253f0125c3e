// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Generic components that are combined to build the CXL models.
//!
//! Components follow the same pattern:
//!  - they are created with `new_and_register()` which registers them with
//!    the [engine](cxl_engine::engine::Engine) so that their `run()` is spawned
//!    when the simulation starts,
//!  - output ports are connected with `connect_port_<name>()` and input ports
//!    hand out their state with `port_<name>()`, which is what the
//!    [connect_port](crate::connect_port) macro relies on.

pub mod arbiter;
pub mod connect;
pub mod delay;
pub mod flow_controls;
pub mod sink;
pub mod source;
pub mod store;
pub mod types;
