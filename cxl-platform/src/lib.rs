// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Build a CXL platform from a YAML description.
//!
//! ```yaml
//! parameters:
//!   link_frequency: 10GHz
//! requesters:
//!   - name: host
//!     pattern:
//!       stride: {command: read, start: 0x0, stride: 64, size_bytes: 64, count: 100}
//! crossbars:
//!   - name: host_xbar
//! serial_links:
//!   - name: host_link
//!     base_address: 0x0
//! memory_groups:
//!   - name: dram
//!     base_address: 0x0
//!     capacity_bytes: 1GiB
//! connections:
//!   - connect: [requester.host, xbar.host_xbar]
//!   - connect: [xbar.host_xbar, link.host_link]
//!   ...
//! ```
//!
//! Crossbar routing tables are derived from the address ranges reachable
//! through each of their downstream ports.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::rc::Rc;

use cxl_engine::engine::Engine;
use cxl_engine::sim_error;
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::EntityGet;
use cxl_models::CxlError;
use cxl_models::crossbar::Crossbar;
use cxl_models::memory_controller::MemoryController;
use cxl_models::monitor::TrafficMonitor;
use cxl_models::port::{DownstreamFacing, UpstreamFacing};
use cxl_models::requester::Requester;
use cxl_models::serial_link::SerialLink;
use cxl_track::entity::{Entity, GetEntity};
use cxl_track::info;

use crate::builder::{
    build_crossbars, build_memories, build_monitors, build_requesters, build_serial_links,
    serial_link_range,
};
use crate::connect::{Kind, PortId, Topology, component_kinds};
use crate::types::{Parameters, PlatformConfig};

pub mod builder;
mod connect;
pub mod types;

type Requesters = Vec<Rc<Requester>>;
type Crossbars = Vec<Rc<Crossbar>>;
type SerialLinks = Vec<Rc<SerialLink>>;
type Monitors = Vec<Rc<TrafficMonitor>>;
type Memories = Vec<Rc<MemoryController>>;

fn index_by_name<T: GetEntity>(components: &[Rc<T>]) -> HashMap<String, usize> {
    components
        .iter()
        .enumerate()
        .map(|(i, component)| (component.entity().name.to_string(), i))
        .collect()
}

#[derive(EntityGet)]
pub struct Platform {
    entity: Rc<Entity>,
    parameters: Parameters,
    requesters: Requesters,
    requesters_idx_by_id: HashMap<String, usize>,
    crossbars: Crossbars,
    crossbars_idx_by_id: HashMap<String, usize>,
    serial_links: SerialLinks,
    serial_links_idx_by_id: HashMap<String, usize>,
    monitors: Monitors,
    monitors_idx_by_id: HashMap<String, usize>,
    memories: Memories,
    memories_idx_by_id: HashMap<String, usize>,
    memory_groups: HashMap<String, Vec<usize>>,
}

impl Platform {
    pub fn from_file(engine: &Engine, platform_path: &Path) -> Result<Self, SimError> {
        let s = std::fs::read_to_string(platform_path)
            .map_err(|e| SimError(format!("Unable to read {}: {e}", platform_path.display())))?;
        Platform::from_string(engine, &s)
    }

    pub fn from_string(engine: &Engine, platform_config: &str) -> Result<Self, SimError> {
        let cfg: PlatformConfig = serde_yaml::from_str(platform_config)
            .map_err(|e| SimError(format!("serde_yaml::from_str failed: {e}")))?;
        Platform::build(engine, &cfg)
    }

    fn build(engine: &Engine, cfg: &PlatformConfig) -> Result<Self, SimError> {
        let parameters = cfg
            .parameters
            .as_ref()
            .map(Parameters::with_overrides)
            .unwrap_or_default();
        check_serial_link_ranges(cfg, &parameters)?;
        let kinds = component_kinds(cfg)?;
        let topology = Topology::parse(cfg, &kinds)?;

        let xbar_clock = engine.clock_mhz(parameters.xbar_frequency_mhz);
        let link_clock = engine.clock_mhz(parameters.link_frequency_mhz);
        let top = engine.top();

        let requesters = build_requesters(engine, &xbar_clock, top, cfg, &parameters)?;
        let serial_links = build_serial_links(engine, &link_clock, top, cfg, &parameters)?;
        let monitors = build_monitors(engine, &xbar_clock, top, cfg)?;
        let (memories, memory_groups) =
            build_memories(engine, &xbar_clock, top, cfg, &parameters)?;

        let mut platform = Platform {
            entity: Rc::new(Entity::new(top, "platform")),
            parameters,
            requesters_idx_by_id: index_by_name(&requesters),
            requesters,
            crossbars: Vec::new(),
            crossbars_idx_by_id: HashMap::new(),
            serial_links_idx_by_id: index_by_name(&serial_links),
            serial_links,
            monitors_idx_by_id: index_by_name(&monitors),
            monitors,
            memories_idx_by_id: index_by_name(&memories),
            memories,
            memory_groups,
        };

        let crossbars = build_crossbars(
            engine,
            &xbar_clock,
            top,
            cfg,
            &platform.parameters,
            |name| topology.crossbar_layout(&platform, name),
        )?;
        platform.crossbars_idx_by_id = index_by_name(&crossbars);
        platform.crossbars = crossbars;

        topology.connect_all(&platform)?;
        info!(platform.entity ; "Built platform:\n{platform}");
        Ok(platform)
    }

    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn requester(&self, name: &str) -> Result<&Rc<Requester>, SimError> {
        match self.requesters_idx_by_id.get(name) {
            Some(idx) => Ok(&self.requesters[*idx]),
            None => sim_error!("No Requester '{name}'"),
        }
    }

    pub fn crossbar(&self, name: &str) -> Result<&Rc<Crossbar>, SimError> {
        match self.crossbars_idx_by_id.get(name) {
            Some(idx) => Ok(&self.crossbars[*idx]),
            None => sim_error!("No Crossbar '{name}'"),
        }
    }

    pub fn serial_link(&self, name: &str) -> Result<&Rc<SerialLink>, SimError> {
        match self.serial_links_idx_by_id.get(name) {
            Some(idx) => Ok(&self.serial_links[*idx]),
            None => sim_error!("No SerialLink '{name}'"),
        }
    }

    pub fn monitor(&self, name: &str) -> Result<&Rc<TrafficMonitor>, SimError> {
        match self.monitors_idx_by_id.get(name) {
            Some(idx) => Ok(&self.monitors[*idx]),
            None => sim_error!("No Monitor '{name}'"),
        }
    }

    pub fn memory(&self, name: &str) -> Result<&Rc<MemoryController>, SimError> {
        match self.memories_idx_by_id.get(name) {
            Some(idx) => Ok(&self.memories[*idx]),
            None => sim_error!("No Memory '{name}'"),
        }
    }

    /// Names of the controllers a memory group was split into.
    pub fn memory_group_names(&self, name: &str) -> Result<Vec<String>, SimError> {
        match self.memory_groups.get(name) {
            Some(indices) => Ok(indices
                .iter()
                .map(|idx| self.memories[*idx].entity.name.to_string())
                .collect()),
            None => sim_error!("No MemoryGroup '{name}'"),
        }
    }

    #[must_use]
    pub fn requesters(&self) -> &[Rc<Requester>] {
        &self.requesters
    }

    #[must_use]
    pub fn crossbars(&self) -> &[Rc<Crossbar>] {
        &self.crossbars
    }

    #[must_use]
    pub fn serial_links(&self) -> &[Rc<SerialLink>] {
        &self.serial_links
    }

    #[must_use]
    pub fn monitors(&self) -> &[Rc<TrafficMonitor>] {
        &self.monitors
    }

    #[must_use]
    pub fn memories(&self) -> &[Rc<MemoryController>] {
        &self.memories
    }

    /// True once every requester has received all of its responses.
    #[must_use]
    pub fn all_requests_complete(&self) -> bool {
        self.requesters.iter().all(|requester| requester.is_done())
    }

    fn downstream_facing(&self, id: &PortId) -> Result<&dyn DownstreamFacing, SimError> {
        let facing: &dyn DownstreamFacing = match id.kind {
            Kind::Requester => &**self.requester(&id.name)?,
            Kind::Crossbar => &**self.crossbar(&id.name)?,
            Kind::SerialLink => &**self.serial_link(&id.name)?,
            Kind::Monitor => &**self.monitor(&id.name)?,
            Kind::Memory | Kind::MemoryGroup => {
                return sim_error!("{id} has no downstream ports");
            }
        };
        Ok(facing)
    }

    fn upstream_facing(&self, id: &PortId) -> Result<&dyn UpstreamFacing, SimError> {
        let facing: &dyn UpstreamFacing = match id.kind {
            Kind::Crossbar => &**self.crossbar(&id.name)?,
            Kind::SerialLink => &**self.serial_link(&id.name)?,
            Kind::Monitor => &**self.monitor(&id.name)?,
            Kind::Memory => &**self.memory(&id.name)?,
            Kind::Requester | Kind::MemoryGroup => {
                return sim_error!("{id} has no single upstream port");
            }
        };
        Ok(facing)
    }
}

/// Serial links may nest but must not partially overlap or repeat a range.
fn check_serial_link_ranges(cfg: &PlatformConfig, parameters: &Parameters) -> SimResult {
    let Some(sections) = &cfg.serial_links else {
        return Ok(());
    };
    let ranges = sections
        .iter()
        .map(|section| Ok((section.name.as_str(), serial_link_range(section, parameters)?)))
        .collect::<Result<Vec<_>, SimError>>()?;
    for (i, (first_name, first)) in ranges.iter().enumerate() {
        for (second_name, second) in &ranges[i + 1..] {
            let nested = first != second && (first.encloses(second) || second.encloses(first));
            if first.overlaps(second) && !nested {
                return Err(CxlError::Configuration(format!(
                    "serial links {first_name} {first} and {second_name} {second} overlap"
                ))
                .into());
            }
        }
    }
    Ok(())
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Requesters:")?;
        for (i, requester) in self.requesters.iter().enumerate() {
            writeln!(f, "  {i}: {}", requester.entity())?;
        }

        writeln!(f, "\nCrossbars:")?;
        for (i, crossbar) in self.crossbars.iter().enumerate() {
            writeln!(f, "  {i}: {}", crossbar.entity())?;
        }

        writeln!(f, "\nSerialLinks:")?;
        for (i, link) in self.serial_links.iter().enumerate() {
            writeln!(f, "  {i}: {} {}", link.entity(), link.range())?;
        }

        writeln!(f, "\nMonitors:")?;
        for (i, monitor) in self.monitors.iter().enumerate() {
            writeln!(f, "  {i}: {}", monitor.entity())?;
        }

        writeln!(f, "\nMemories:")?;
        for (i, memory) in self.memories.iter().enumerate() {
            writeln!(f, "  {i}: {} {}", memory.entity(), memory.range())?;
        }

        Ok(())
    }
}
