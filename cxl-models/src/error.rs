// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Errors raised by the CXL models.
//!
//! A [CxlError] converts into a [SimError] so that model code can use `?`
//! inside component tasks.

use std::fmt;

use cxl_engine::types::SimError;

use crate::packet::Packet;
use crate::router::AddressRange;

/// Identify the packet involved in a routing or framing error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketContext {
    pub address: u64,
    pub flow_id: Option<u16>,
    pub tick: Option<u64>,
}

impl PacketContext {
    /// Context when only the address is known.
    #[must_use]
    pub fn address(address: u64) -> Self {
        Self {
            address,
            flow_id: None,
            tick: None,
        }
    }

    #[must_use]
    pub fn of(packet: &Packet, tick: u64) -> Self {
        Self {
            address: packet.address(),
            flow_id: Some(packet.flow_id()),
            tick: Some(tick),
        }
    }
}

impl fmt::Display for PacketContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "address {:#x}", self.address)?;
        if let Some(flow_id) = self.flow_id {
            write!(f, ", flow {flow_id}")?;
        }
        if let Some(tick) = self.tick {
            write!(f, ", tick {tick}")?;
        }
        Ok(())
    }
}

/// Problems found when rebuilding a packet from its flits.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("truncated flit sequence: {found} bits received, {expected} expected")]
    Truncated { expected: usize, found: usize },

    #[error("flit {index} is {found} bits wide, expected {expected}")]
    WidthMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u64 },

    #[error("header valid bit not set")]
    NotValid,

    #[error("header checksum {found:#06x} does not match computed {expected:#06x}")]
    Corrupt { expected: u16, found: u16 },

    #[error("{extra} trailing flit(s) after the end of the packet")]
    TrailingFlits { extra: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum CxlError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("overlapping address ranges {first} and {second}")]
    OverlappingRanges {
        first: AddressRange,
        second: AddressRange,
    },

    #[error("empty address range at {start:#x}")]
    EmptyRange { start: u64 },

    #[error("unroutable {0}")]
    UnroutableAddress(PacketContext),

    #[error("{0} matches more than one address range")]
    AmbiguousAddress(PacketContext),

    #[error("buffer full, unable to accept {0}")]
    BufferFull(Packet),

    #[error("framing error for {context}: {source}")]
    Framing {
        source: FramingError,
        context: PacketContext,
    },

    #[error(transparent)]
    Sim(#[from] SimError),
}

impl From<CxlError> for SimError {
    fn from(error: CxlError) -> Self {
        match error {
            CxlError::Sim(error) => error,
            other => SimError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_display() {
        assert_eq!(PacketContext::address(0x40).to_string(), "address 0x40");
        let context = PacketContext {
            address: 0x1000,
            flow_id: Some(3),
            tick: Some(12),
        };
        assert_eq!(context.to_string(), "address 0x1000, flow 3, tick 12");
    }

    #[test]
    fn converts_to_sim_error() {
        let error: SimError = CxlError::UnroutableAddress(PacketContext::address(0x80)).into();
        assert_eq!(error.to_string(), "Error: unroutable address 0x80");

        let error: SimError = CxlError::Sim(SimError("inner".to_string())).into();
        assert_eq!(error, SimError("inner".to_string()));
    }
}
