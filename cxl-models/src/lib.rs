// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Models of a CXL-style memory interconnect.
//!
//! A host side [Requester](requester::Requester) issues [Packet]s into a
//! [Crossbar](crossbar::Crossbar) which routes them by address range to a
//! [SerialLink](serial_link::SerialLink). The link serializes each packet
//! into [flits](flit) and rebuilds it on the far side where another crossbar
//! or a [MemoryController](memory_controller::MemoryController) consumes it.
//! Responses return along the same path.
//!
//! All components exchange packets through a request port pair and a response
//! port pair, see [port].

pub mod crossbar;
pub mod error;
pub mod flit;
pub mod link_buffer;
pub mod memory_controller;
pub mod monitor;
pub mod packet;
pub mod port;
pub mod requester;
pub mod router;
pub mod serial_link;
pub mod test_helpers;

pub use error::{CxlError, FramingError};
pub use packet::Packet;
