// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Bidirectional packet ports.
//!
//! Every connection between two models is a pair of engine ports: requests
//! flow downstream on one and responses flow back upstream on the other. A
//! model that accepts requests is [UpstreamFacing] and one that issues them is
//! [DownstreamFacing]. Neither side owns the other, each keeps its own half of
//! the two port pairs.
//!
//! ```txt
//!   DownstreamFacing                        UpstreamFacing
//!  +----------------+    req_tx -> req_rx  +----------------+
//!  |                | -------------------> |                |
//!  |                | <------------------- |                |
//!  +----------------+    rsp_rx <- rsp_tx  +----------------+
//! ```

use std::fmt;
use std::rc::Rc;

use cxl_engine::port::PortStateResult;
use cxl_engine::sim_error;
use cxl_engine::types::SimResult;
use cxl_track::entity::{Entity, GetEntity};
use cxl_track::{connect, debug};

use crate::packet::Packet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    /// Faces towards the requesters: receives requests, sends responses.
    UpstreamFacing,

    /// Faces towards memory: sends requests, receives responses.
    DownstreamFacing,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortDirection::UpstreamFacing => write!(f, "upstream-facing"),
            PortDirection::DownstreamFacing => write!(f, "downstream-facing"),
        }
    }
}

/// A model with request inputs and response outputs.
pub trait UpstreamFacing: GetEntity {
    fn num_upstream_ports(&self) -> usize;
    fn port_req_rx(&self, index: usize) -> PortStateResult<Packet>;
    fn connect_port_rsp_tx(&self, index: usize, port_state: PortStateResult<Packet>)
    -> SimResult;
}

/// A model with request outputs and response inputs.
pub trait DownstreamFacing: GetEntity {
    fn num_downstream_ports(&self) -> usize;
    fn connect_port_req_tx(&self, index: usize, port_state: PortStateResult<Packet>)
    -> SimResult;
    fn port_rsp_rx(&self, index: usize) -> PortStateResult<Packet>;
}

fn check_index(
    entity: &Rc<Entity>,
    direction: PortDirection,
    index: usize,
    num_ports: usize,
) -> SimResult {
    if index >= num_ports {
        return sim_error!("{entity}: no {direction} port {index}, only {num_ports} exist");
    }
    Ok(())
}

/// Connect the downstream-facing port `from_index` of `from` to the
/// upstream-facing port `to_index` of `to`, in both directions.
///
/// Both indices are checked before either port is taken.
pub fn connect_bidirectional(
    from: &dyn DownstreamFacing,
    from_index: usize,
    to: &dyn UpstreamFacing,
    to_index: usize,
) -> SimResult {
    check_index(
        from.entity(),
        PortDirection::DownstreamFacing,
        from_index,
        from.num_downstream_ports(),
    )?;
    check_index(
        to.entity(),
        PortDirection::UpstreamFacing,
        to_index,
        to.num_upstream_ports(),
    )?;
    debug!(from.entity() ; "Connect {}[{from_index}] <=> {}[{to_index}]", from.entity(), to.entity());
    from.connect_port_req_tx(from_index, to.port_req_rx(to_index))?;
    to.connect_port_rsp_tx(to_index, from.port_rsp_rx(from_index))?;
    connect!(from.entity() ; to.entity());
    Ok(())
}
