// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Wiring of the components listed in the `connections` section.
//!
//! Each entry connects the downstream side of one component to the upstream
//! side of another, for example `[xbar.host, link.host_link]`. Components
//! other than crossbars have one port on each side that can only be used
//! once. Crossbar ports are numbered in the order they appear.

use std::collections::{HashMap, HashSet};
use std::fmt;

use cxl_engine::sim_error;
use cxl_engine::types::{SimError, SimResult};
use cxl_models::port::connect_bidirectional;
use cxl_models::router::AddressRange;
use cxl_track::debug;

use crate::Platform;
use crate::builder::CrossbarLayout;
use crate::types::PlatformConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Requester,
    Crossbar,
    SerialLink,
    Monitor,
    Memory,
    MemoryGroup,
}

impl Kind {
    fn prefix(self) -> &'static str {
        match self {
            Kind::Requester => "requester",
            Kind::Crossbar => "xbar",
            Kind::SerialLink => "link",
            Kind::Monitor => "monitor",
            Kind::Memory => "mem",
            Kind::MemoryGroup => "memory_group",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        [
            Kind::Requester,
            Kind::Crossbar,
            Kind::SerialLink,
            Kind::Monitor,
            Kind::Memory,
            Kind::MemoryGroup,
        ]
        .into_iter()
        .find(|kind| kind.prefix() == prefix)
    }

    fn has_downstream_side(self) -> bool {
        matches!(
            self,
            Kind::Requester | Kind::Crossbar | Kind::SerialLink | Kind::Monitor
        )
    }

    fn has_upstream_side(self) -> bool {
        !matches!(self, Kind::Requester)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PortId {
    pub kind: Kind,
    pub name: String,
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.prefix(), self.name)
    }
}

/// Map every component name in the configuration to its kind.
pub fn component_kinds(cfg: &PlatformConfig) -> Result<HashMap<String, Kind>, SimError> {
    let mut kinds = HashMap::new();
    let mut add = |name: &str, kind: Kind| -> SimResult {
        if kinds.insert(name.to_string(), kind).is_some() {
            return sim_error!("Duplicate component name {name}");
        }
        Ok(())
    };
    for section in cfg.requesters.iter().flatten() {
        add(&section.name, Kind::Requester)?;
    }
    for section in cfg.crossbars.iter().flatten() {
        add(&section.name, Kind::Crossbar)?;
    }
    for section in cfg.serial_links.iter().flatten() {
        add(&section.name, Kind::SerialLink)?;
    }
    for section in cfg.monitors.iter().flatten() {
        add(&section.name, Kind::Monitor)?;
    }
    for section in cfg.memories.iter().flatten() {
        add(&section.name, Kind::Memory)?;
    }
    for section in cfg.memory_groups.iter().flatten() {
        add(&section.name, Kind::MemoryGroup)?;
    }
    Ok(kinds)
}

/// Parse a port ID of the form `kind.name`.
pub fn parse_port_id(kinds: &HashMap<String, Kind>, s: &str) -> Result<PortId, SimError> {
    let Some((prefix, name)) = s.split_once('.') else {
        return sim_error!("Failed to parse '{s}' - expected kind.name");
    };
    let Some(kind) = Kind::from_prefix(prefix) else {
        return sim_error!("Failed to parse '{s}' - unsupported kind");
    };
    match kinds.get(name) {
        Some(found) if *found == kind => Ok(PortId {
            kind,
            name: name.to_string(),
        }),
        Some(found) => sim_error!("'{name}' is a {}, not a {prefix}", found.prefix()),
        None => sim_error!("No component '{name}' for '{s}'"),
    }
}

/// The validated list of connections.
pub struct Topology {
    connections: Vec<(PortId, PortId)>,
    downstream: HashMap<String, Vec<PortId>>,
    upstream_count: HashMap<String, usize>,
}

impl Topology {
    pub fn parse(cfg: &PlatformConfig, kinds: &HashMap<String, Kind>) -> Result<Self, SimError> {
        let mut connections = Vec::new();
        let mut downstream: HashMap<String, Vec<PortId>> = HashMap::new();
        let mut upstream_count: HashMap<String, usize> = HashMap::new();
        let mut used = HashSet::new();

        for c in cfg.connections.iter().flatten() {
            if c.connect.len() != 2 {
                return sim_error!(
                    "Invalid 'connect' with {} entries (only 2 expected)",
                    c.connect.len()
                );
            }
            let from = parse_port_id(kinds, &c.connect[0])?;
            let to = parse_port_id(kinds, &c.connect[1])?;

            let group_from_other = to.kind == Kind::MemoryGroup && from.kind != Kind::Crossbar;
            if !from.kind.has_downstream_side() || !to.kind.has_upstream_side() || group_from_other
            {
                return sim_error!("Cannot connect {from} to {to}");
            }
            if from.kind != Kind::Crossbar && !used.insert((from.clone(), "downstream")) {
                return sim_error!("{from} connected downstream more than once");
            }
            if to.kind != Kind::Crossbar && !used.insert((to.clone(), "upstream")) {
                return sim_error!("{to} connected upstream more than once");
            }

            downstream
                .entry(from.name.clone())
                .or_default()
                .push(to.clone());
            *upstream_count.entry(to.name.clone()).or_default() += 1;
            connections.push((from, to));
        }

        let topology = Self {
            connections,
            downstream,
            upstream_count,
        };
        topology.check_complete(kinds)?;
        Ok(topology)
    }

    /// Every port of a single-port component must be connected.
    fn check_complete(&self, kinds: &HashMap<String, Kind>) -> SimResult {
        let mut names: Vec<(&String, &Kind)> = kinds.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        for (name, kind) in names {
            if *kind == Kind::Crossbar {
                continue;
            }
            let id = PortId {
                kind: *kind,
                name: name.clone(),
            };
            if kind.has_downstream_side() && !self.downstream.contains_key(name) {
                return sim_error!("{id} has no downstream connection");
            }
            if kind.has_upstream_side() && !self.upstream_count.contains_key(name) {
                return sim_error!("{id} has no upstream connection");
            }
        }
        Ok(())
    }

    /// The targets of a component's downstream ports in port order.
    ///
    /// A memory group takes one port per chunk.
    fn downstream_targets(
        &self,
        platform: &Platform,
        name: &str,
    ) -> Result<Vec<PortId>, SimError> {
        let mut targets = Vec::new();
        for peer in self.downstream.get(name).into_iter().flatten() {
            if peer.kind == Kind::MemoryGroup {
                for chunk in platform.memory_group_names(&peer.name)? {
                    targets.push(PortId {
                        kind: Kind::Memory,
                        name: chunk,
                    });
                }
            } else {
                targets.push(peer.clone());
            }
        }
        Ok(targets)
    }

    fn ranges_behind(
        &self,
        platform: &Platform,
        id: &PortId,
        depth: usize,
    ) -> Result<Vec<AddressRange>, SimError> {
        if depth > self.connections.len() {
            return sim_error!("Connection loop through {id}");
        }
        match id.kind {
            Kind::SerialLink => Ok(vec![platform.serial_link(&id.name)?.range()]),
            Kind::Memory => Ok(vec![platform.memory(&id.name)?.range()]),
            Kind::Requester => sim_error!("{id} has no address range"),
            Kind::Crossbar | Kind::Monitor | Kind::MemoryGroup => {
                let mut ranges = Vec::new();
                let targets = if id.kind == Kind::MemoryGroup {
                    platform
                        .memory_group_names(&id.name)?
                        .into_iter()
                        .map(|name| PortId {
                            kind: Kind::Memory,
                            name,
                        })
                        .collect()
                } else {
                    self.downstream_targets(platform, &id.name)?
                };
                for target in &targets {
                    ranges.extend(self.ranges_behind(platform, target, depth + 1)?);
                }
                Ok(ranges)
            }
        }
    }

    /// Port counts and routing ranges of a crossbar.
    pub fn crossbar_layout(
        &self,
        platform: &Platform,
        name: &str,
    ) -> Result<CrossbarLayout, SimError> {
        let downstream_ranges = self
            .downstream_targets(platform, name)?
            .iter()
            .map(|target| self.ranges_behind(platform, target, 1))
            .collect::<Result<_, SimError>>()?;
        Ok(CrossbarLayout {
            num_upstream: self.upstream_count.get(name).copied().unwrap_or(0),
            downstream_ranges,
        })
    }

    pub fn connect_all(&self, platform: &Platform) -> SimResult {
        let mut next_down = HashMap::new();
        let mut next_up = HashMap::new();
        for (from, to) in &self.connections {
            debug!(platform.entity ; "Connect {from} => {to}");
            let from_facing = platform.downstream_facing(from)?;
            if to.kind == Kind::MemoryGroup {
                for chunk in platform.memory_group_names(&to.name)? {
                    let from_index = take_port(&mut next_down, from);
                    let memory = platform.memory(&chunk)?;
                    connect_bidirectional(from_facing, from_index, &**memory, 0)?;
                }
                continue;
            }
            let from_index = take_port(&mut next_down, from);
            let to_index = take_port(&mut next_up, to);
            connect_bidirectional(
                from_facing,
                from_index,
                platform.upstream_facing(to)?,
                to_index,
            )?;
        }
        Ok(())
    }
}

/// Crossbar ports are handed out in order, other components only have port 0.
fn take_port(next: &mut HashMap<String, usize>, id: &PortId) -> usize {
    if id.kind != Kind::Crossbar {
        return 0;
    }
    let port = next.entry(id.name.clone()).or_default();
    *port += 1;
    *port - 1
}
