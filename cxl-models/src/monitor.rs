// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A pass-through observer.
//!
//! The [TrafficMonitor] sits on a bidirectional connection and records every
//! packet crossing it in either direction. Packets are forwarded in the same
//! tick and the sender is only released once the far side accepts, so the
//! monitor does not change timing, ordering or content.
//!
//! Responses are binned by round-trip latency (`now - issue_tick`) per flow.
//!
//! # Ports
//!
//!  - Upstream facing: `up_req_rx`, `up_rsp_tx`
//!  - Downstream facing: `down_req_tx`, `down_rsp_rx`

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::{connect_tx, port_rx, take_option};
use cxl_engine::engine::Engine;
use cxl_engine::executor::Spawner;
use cxl_engine::port::{InPort, OutPort, PortStateResult};
use cxl_engine::sim_error;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::Runnable;
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::id::Unique;
use cxl_track::{enter, exit};

use crate::packet::Packet;
use crate::port::{DownstreamFacing, UpstreamFacing};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub packets: u64,
    pub bytes: u64,
    pub requests: u64,
    pub responses: u64,

    /// Per flow: latency in ticks -> number of responses.
    pub latency: BTreeMap<u16, BTreeMap<u64, u64>>,
}

impl TrafficStats {
    pub fn observe(&mut self, packet: &Packet, tick: u64) {
        self.packets += 1;
        self.bytes += u64::from(packet.size_bytes());
        if packet.is_request() {
            self.requests += 1;
        } else {
            self.responses += 1;
            let latency = tick.saturating_sub(packet.issue_tick());
            *self
                .latency
                .entry(packet.flow_id())
                .or_default()
                .entry(latency)
                .or_default() += 1;
        }
    }

    /// Mean round-trip latency of a flow.
    #[must_use]
    pub fn mean_latency(&self, flow_id: u16) -> Option<f64> {
        let histogram = self.latency.get(&flow_id)?;
        let (sum, count) = histogram
            .iter()
            .fold((0, 0), |(sum, count), (latency, n)| {
                (sum + latency * n, count + n)
            });
        if count == 0 {
            None
        } else {
            Some(sum as f64 / count as f64)
        }
    }
}

#[derive(EntityGet, EntityDisplay)]
pub struct TrafficMonitor {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    clock: Clock,
    stats: Rc<RefCell<TrafficStats>>,

    up_req_rx: RefCell<Option<InPort<Packet>>>,
    up_rsp_tx: RefCell<Option<OutPort<Packet>>>,
    down_req_tx: RefCell<Option<OutPort<Packet>>>,
    down_rsp_rx: RefCell<Option<InPort<Packet>>>,
}

impl TrafficMonitor {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let up_req_rx = InPort::new(engine, clock, &entity, "up_req_rx");
        let up_rsp_tx = OutPort::new(&entity, "up_rsp_tx");
        let down_req_tx = OutPort::new(&entity, "down_req_tx");
        let down_rsp_rx = InPort::new(engine, clock, &entity, "down_rsp_rx");
        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            clock: clock.clone(),
            stats: Rc::new(RefCell::new(TrafficStats::default())),
            up_req_rx: RefCell::new(Some(up_req_rx)),
            up_rsp_tx: RefCell::new(Some(up_rsp_tx)),
            down_req_tx: RefCell::new(Some(down_req_tx)),
            down_rsp_rx: RefCell::new(Some(down_rsp_rx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    /// Record a packet seen at `tick`.
    pub fn observe(&self, packet: &Packet, tick: u64) {
        self.stats.borrow_mut().observe(packet, tick);
    }

    #[must_use]
    pub fn stats(&self) -> TrafficStats {
        self.stats.borrow().clone()
    }

    #[must_use]
    pub fn packets_observed(&self) -> u64 {
        self.stats.borrow().packets
    }

    #[must_use]
    pub fn bytes_observed(&self) -> u64 {
        self.stats.borrow().bytes
    }

    #[must_use]
    pub fn latency_histogram(&self, flow_id: u16) -> BTreeMap<u64, u64> {
        self.stats
            .borrow()
            .latency
            .get(&flow_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn port_up_req_rx(&self) -> PortStateResult<Packet> {
        port_rx!(self.up_req_rx, state)
    }

    pub fn connect_port_up_rsp_tx(&self, port_state: PortStateResult<Packet>) -> SimResult {
        connect_tx!(self.up_rsp_tx, connect ; port_state)
    }

    pub fn connect_port_down_req_tx(&self, port_state: PortStateResult<Packet>) -> SimResult {
        connect_tx!(self.down_req_tx, connect ; port_state)
    }

    pub fn port_down_rsp_rx(&self) -> PortStateResult<Packet> {
        port_rx!(self.down_rsp_rx, state)
    }
}

fn check_single_port(monitor: &TrafficMonitor, index: usize) -> SimResult {
    if index != 0 {
        return sim_error!("{monitor}: monitors only have port 0, not {index}");
    }
    Ok(())
}

impl UpstreamFacing for TrafficMonitor {
    fn num_upstream_ports(&self) -> usize {
        1
    }

    fn port_req_rx(&self, index: usize) -> PortStateResult<Packet> {
        check_single_port(self, index)?;
        self.port_up_req_rx()
    }

    fn connect_port_rsp_tx(
        &self,
        index: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        check_single_port(self, index)?;
        self.connect_port_up_rsp_tx(port_state)
    }
}

impl DownstreamFacing for TrafficMonitor {
    fn num_downstream_ports(&self) -> usize {
        1
    }

    fn connect_port_req_tx(
        &self,
        index: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        check_single_port(self, index)?;
        self.connect_port_down_req_tx(port_state)
    }

    fn port_rsp_rx(&self, index: usize) -> PortStateResult<Packet> {
        check_single_port(self, index)?;
        self.port_down_rsp_rx()
    }
}

#[async_trait(?Send)]
impl Runnable for TrafficMonitor {
    async fn run(&self) -> SimResult {
        let up_req_rx = take_option!(self.up_req_rx);
        let down_req_tx = take_option!(self.down_req_tx);
        let down_rsp_rx = take_option!(self.down_rsp_rx);
        let up_rsp_tx = take_option!(self.up_rsp_tx);

        let (entity, clock, stats) = (self.entity.clone(), self.clock.clone(), self.stats.clone());
        self.spawner.spawn(async move {
            pass_through(entity, clock, stats, up_req_rx, down_req_tx).await
        });
        let (entity, clock, stats) = (self.entity.clone(), self.clock.clone(), self.stats.clone());
        self.spawner.spawn(async move {
            pass_through(entity, clock, stats, down_rsp_rx, up_rsp_tx).await
        });
        Ok(())
    }
}

async fn pass_through(
    entity: Rc<Entity>,
    clock: Clock,
    stats: Rc<RefCell<TrafficStats>>,
    rx: InPort<Packet>,
    tx: OutPort<Packet>,
) -> SimResult {
    loop {
        let packet = rx.start_get()?.await;
        enter!(entity ; packet.id());
        stats.borrow_mut().observe(&packet, clock.tick_now());
        exit!(entity ; packet.id());
        tx.put(packet)?.await;
        rx.finish_get();
    }
}
