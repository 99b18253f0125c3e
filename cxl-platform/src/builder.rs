// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::collections::HashMap;
use std::rc::Rc;

use cxl_engine::engine::Engine;
use cxl_engine::sim_error;
use cxl_engine::time::clock::Clock;
use cxl_engine::types::SimError;
use cxl_models::CxlError;
use cxl_models::crossbar::{Crossbar, CrossbarConfig};
use cxl_models::memory_controller::{MemoryController, MemoryControllerConfig};
use cxl_models::monitor::TrafficMonitor;
use cxl_models::requester::{RequestPattern, RequestSpec, Requester, RequesterConfig};
use cxl_models::router::{AddressRange, AddressRouter};
use cxl_models::serial_link::{SerialLink, SerialLinkConfig};
use cxl_track::entity::Entity;

use crate::types::{
    CrossbarSection, Parameters, PatternSection, PlatformConfig, RoutingKind, SerialLinkSection,
};
use crate::{Crossbars, Memories, Monitors, Requesters, SerialLinks};

/// Convert a duration into whole cycles of a clock, rounding to nearest.
#[must_use]
pub fn ns_to_ticks(ns: f64, freq_mhz: f64) -> u64 {
    (ns * freq_mhz / 1000.0).round() as u64
}

fn size_u32(name: &str, size_bytes: u64) -> Result<u32, SimError> {
    u32::try_from(size_bytes)
        .map_err(|_| SimError(format!("{name}: request size {size_bytes:#x} is too large")))
}

fn named<T>(name: &str, result: Result<T, CxlError>) -> Result<T, SimError> {
    result.map_err(|e| SimError(format!("{name}: {e}")))
}

/// The address range a serial link section describes.
pub fn serial_link_range(
    section: &SerialLinkSection,
    parameters: &Parameters,
) -> Result<AddressRange, SimError> {
    let size = section
        .size_bytes
        .unwrap_or(parameters.serial_link_addr_range);
    named(&section.name, AddressRange::new(section.base_address, size))
}

fn build_pattern(name: &str, section: &PatternSection) -> Result<RequestPattern, SimError> {
    Ok(match section {
        PatternSection::List(requests) => RequestPattern::List(
            requests
                .iter()
                .map(|request| {
                    Ok(RequestSpec {
                        command: request.command.into(),
                        address: request.address,
                        size_bytes: size_u32(name, request.size_bytes)?,
                    })
                })
                .collect::<Result<_, SimError>>()?,
        ),
        PatternSection::Stride(stride) => RequestPattern::Stride {
            command: stride.command.into(),
            start: stride.start,
            stride: stride.stride,
            size_bytes: size_u32(name, stride.size_bytes)?,
            count: stride.count,
        },
    })
}

pub fn build_requesters(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    cfg: &PlatformConfig,
    parameters: &Parameters,
) -> Result<Requesters, SimError> {
    let mut requesters = Vec::new();
    if let Some(sections) = &cfg.requesters {
        for (i, section) in sections.iter().enumerate() {
            let flow_id = match section.flow_id {
                Some(flow_id) => flow_id,
                None => u16::try_from(i)
                    .map_err(|_| SimError(format!("{}: too many requesters", section.name)))?,
            };
            let config = RequesterConfig {
                pattern: build_pattern(&section.name, &section.pattern)?,
                max_outstanding: section
                    .max_outstanding
                    .unwrap_or(parameters.max_outstanding),
                flow_id,
            };
            requesters.push(Requester::new_and_register(
                engine,
                clock,
                parent,
                &section.name,
                config,
            )?);
        }
    }
    Ok(requesters)
}

pub fn build_serial_links(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    cfg: &PlatformConfig,
    parameters: &Parameters,
) -> Result<SerialLinks, SimError> {
    let mut links = Vec::new();
    if let Some(sections) = &cfg.serial_links {
        for section in sections {
            let total_ctrl_latency_ns = section
                .total_ctrl_latency
                .unwrap_or(parameters.total_ctrl_latency_ns);
            let config = SerialLinkConfig {
                num_lanes: section.num_lanes.unwrap_or(parameters.num_lanes_per_link),
                lane_speed_gbps: section.lane_speed.unwrap_or(parameters.lane_speed_gbps),
                fixed_delay_ticks: ns_to_ticks(total_ctrl_latency_ns, clock.freq_mhz()),
                buffer_size_req: section
                    .buffer_size_req
                    .unwrap_or(parameters.link_buffer_size_req),
                buffer_size_rsp: section
                    .buffer_size_rsp
                    .unwrap_or(parameters.link_buffer_size_rsp),
                range: serial_link_range(section, parameters)?,
            };
            links.push(SerialLink::new_and_register(
                engine,
                clock,
                parent,
                &section.name,
                &config,
            )?);
        }
    }
    Ok(links)
}

pub fn build_monitors(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    cfg: &PlatformConfig,
) -> Result<Monitors, SimError> {
    let mut monitors = Vec::new();
    if let Some(sections) = &cfg.monitors {
        for section in sections {
            monitors.push(TrafficMonitor::new_and_register(
                engine,
                clock,
                parent,
                &section.name,
            )?);
        }
    }
    Ok(monitors)
}

/// Build the memories and split each memory group into its chunks.
///
/// Returns the controllers and, for each group, the indices of its chunks.
pub fn build_memories(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    cfg: &PlatformConfig,
    parameters: &Parameters,
) -> Result<(Memories, HashMap<String, Vec<usize>>), SimError> {
    let latency_ticks = |latency: Option<f64>| {
        ns_to_ticks(
            latency.unwrap_or(parameters.memory_latency_ns),
            clock.freq_mhz(),
        )
    };

    let mut memories = Vec::new();
    if let Some(sections) = &cfg.memories {
        for section in sections {
            let config = MemoryControllerConfig {
                range: named(
                    &section.name,
                    AddressRange::new(section.base_address, section.capacity_bytes),
                )?,
                latency_ticks: latency_ticks(section.latency),
                queue_size: section.queue_size.unwrap_or(parameters.memory_queue_size),
            };
            memories.push(MemoryController::new_and_register(
                engine,
                clock,
                parent,
                &section.name,
                &config,
            )?);
        }
    }

    let mut groups = HashMap::new();
    if let Some(sections) = &cfg.memory_groups {
        for section in sections {
            named(
                &section.name,
                AddressRange::new(section.base_address, section.capacity_bytes),
            )?;
            let chunks = section.chunks.unwrap_or(parameters.mem_chunk);
            if chunks == 0 || section.capacity_bytes % chunks as u64 != 0 {
                return sim_error!(
                    "{}: capacity {:#x} cannot be split into {chunks} chunks",
                    section.name,
                    section.capacity_bytes
                );
            }
            let chunk_bytes = section.capacity_bytes / chunks as u64;
            let mut indices = Vec::with_capacity(chunks);
            for i in 0..chunks {
                let name = format!("{}{i}", section.name);
                let start = section.base_address + i as u64 * chunk_bytes;
                let config = MemoryControllerConfig {
                    range: named(&name, AddressRange::new(start, chunk_bytes))?,
                    latency_ticks: latency_ticks(section.latency),
                    queue_size: section.queue_size.unwrap_or(parameters.memory_queue_size),
                };
                indices.push(memories.len());
                memories.push(MemoryController::new_and_register(
                    engine, clock, parent, &name, &config,
                )?);
            }
            groups.insert(section.name.clone(), indices);
        }
    }
    Ok((memories, groups))
}

/// How a crossbar is wired, worked out from the connections.
pub struct CrossbarLayout {
    pub num_upstream: usize,

    /// The address ranges reachable through each downstream port.
    pub downstream_ranges: Vec<Vec<AddressRange>>,
}

fn build_router(
    section: &CrossbarSection,
    layout: &CrossbarLayout,
) -> Result<AddressRouter, SimError> {
    let router = match section.routing.unwrap_or_default() {
        RoutingKind::Single => AddressRouter::single_downstream(),
        RoutingKind::Ranges => {
            let table = layout
                .downstream_ranges
                .iter()
                .enumerate()
                .flat_map(|(port, ranges)| ranges.iter().map(move |range| (*range, port)));
            named(&section.name, AddressRouter::from_ranges(table))?
        }
    };
    Ok(match section.default_port {
        Some(port) => router.with_default_port(port),
        None => router,
    })
}

pub fn build_crossbars(
    engine: &Engine,
    clock: &Clock,
    parent: &Rc<Entity>,
    cfg: &PlatformConfig,
    parameters: &Parameters,
    layout_of: impl Fn(&str) -> Result<CrossbarLayout, SimError>,
) -> Result<Crossbars, SimError> {
    let mut crossbars = Vec::new();
    if let Some(sections) = &cfg.crossbars {
        for section in sections {
            let layout = layout_of(&section.name)?;
            let config = CrossbarConfig {
                width_bytes: section.width.unwrap_or(parameters.xbar_width),
                frontend_latency: section
                    .frontend_latency
                    .unwrap_or(parameters.frontend_latency),
                forward_latency: section
                    .forward_latency
                    .unwrap_or(parameters.forward_latency),
                response_latency: section
                    .response_latency
                    .unwrap_or(parameters.response_latency),
                buffer_size_req: section
                    .buffer_size_req
                    .unwrap_or(parameters.xbar_buffer_size_req),
                buffer_size_resp: section
                    .buffer_size_resp
                    .unwrap_or(parameters.xbar_buffer_size_resp),
                max_outstanding: section
                    .max_outstanding
                    .unwrap_or(parameters.max_outstanding),
            };
            crossbars.push(Crossbar::new_and_register(
                engine,
                clock,
                parent,
                &section.name,
                config,
                build_router(section, &layout)?,
                layout.num_upstream,
                layout.downstream_ranges.len(),
            )?);
        }
    }
    Ok(crossbars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latency_in_cycles() {
        assert_eq!(ns_to_ticks(100.0, 10_000.0), 1000);
        assert_eq!(ns_to_ticks(10.0, 1000.0), 10);
        assert_eq!(ns_to_ticks(2.5, 625.0), 2);
        assert_eq!(ns_to_ticks(0.0, 1000.0), 0);
    }
}
