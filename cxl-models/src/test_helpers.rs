// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Builders shared by the model tests.

use std::rc::Rc;

use cxl_track::entity::Entity;

use crate::crossbar::CrossbarConfig;
use crate::memory_controller::MemoryControllerConfig;
use crate::packet::{Command, Packet};
use crate::router::AddressRange;
use crate::serial_link::SerialLinkConfig;

pub const GB: u64 = 1 << 30;

/// # Panics
///
/// Panics if `size_bytes` is 0.
#[must_use]
pub fn create_read(created_by: &Rc<Entity>, address: u64, size_bytes: u32) -> Packet {
    Packet::request(created_by, Command::Read, address, size_bytes, 0, 0).unwrap()
}

/// # Panics
///
/// Panics if `size_bytes` is 0.
#[must_use]
pub fn create_write(created_by: &Rc<Entity>, address: u64, size_bytes: u32) -> Packet {
    Packet::request(created_by, Command::Write, address, size_bytes, 0, 0).unwrap()
}

/// # Panics
///
/// Panics if the range is empty.
#[must_use]
pub fn create_range(start: u64, size: u64) -> AddressRange {
    AddressRange::new(start, size).unwrap()
}

/// 16 lanes at 31 Gbps with a 100 cycle fixed delay and 10 packet buffers.
#[must_use]
pub fn reference_link_config(range: AddressRange) -> SerialLinkConfig {
    SerialLinkConfig {
        num_lanes: 16,
        lane_speed_gbps: 31.0,
        fixed_delay_ticks: 100,
        buffer_size_req: 10,
        buffer_size_rsp: 10,
        range,
    }
}

#[must_use]
pub fn reference_crossbar_config() -> CrossbarConfig {
    CrossbarConfig::default()
}

#[must_use]
pub fn reference_memory_config(range: AddressRange) -> MemoryControllerConfig {
    MemoryControllerConfig {
        range,
        latency_ticks: 10,
        queue_size: 16,
    }
}
