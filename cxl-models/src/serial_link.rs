// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A point-to-point serial link.
//!
//! The link owns a request [LinkBuffer] and a response [LinkBuffer]. Each
//! direction is handled by two tasks: one accepts packets while the buffer has
//! space, the other waits for the front packet to be ready and delivers it.
//! A packet that the far side does not accept stays at the head of its buffer
//! and blocks everything behind it.
//!
//! # Ports
//!
//!  - Upstream facing: `up_req_rx` [input](cxl_engine::port::InPort) and
//!    `up_rsp_tx` [output](cxl_engine::port::OutPort)
//!  - Downstream facing: `down_req_tx` [output](cxl_engine::port::OutPort) and
//!    `down_rsp_rx` [input](cxl_engine::port::InPort)

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::{connect_tx, port_rx, take_option};
use cxl_engine::engine::Engine;
use cxl_engine::events::repeated::Repeated;
use cxl_engine::executor::Spawner;
use cxl_engine::port::{InPort, OutPort, PortStateResult};
use cxl_engine::sim_error;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::{Event, Runnable};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::id::Unique;
use cxl_track::{enter, exit, trace};

use crate::error::CxlError;
use crate::link_buffer::{LinkBuffer, LinkConfig, LinkStats};
use crate::packet::Packet;
use crate::port::{DownstreamFacing, UpstreamFacing};
use crate::router::AddressRange;

#[derive(Clone, Debug, PartialEq)]
pub struct SerialLinkConfig {
    pub num_lanes: usize,
    pub lane_speed_gbps: f64,
    pub fixed_delay_ticks: u64,
    pub buffer_size_req: usize,
    pub buffer_size_rsp: usize,

    /// Addresses served by whatever is behind this link.
    pub range: AddressRange,
}

impl SerialLinkConfig {
    fn link_config(&self, capacity: usize) -> LinkConfig {
        LinkConfig {
            num_lanes: self.num_lanes,
            lane_speed_gbps: self.lane_speed_gbps,
            fixed_delay_ticks: self.fixed_delay_ticks,
            capacity,
        }
    }
}

/// One direction of the link with the events its two tasks wait on.
struct Direction {
    entity: Rc<Entity>,
    clock: Clock,
    buffer: RefCell<LinkBuffer>,
    submitted: Repeated<()>,
    space_freed: Repeated<()>,
}

impl Direction {
    fn new(
        parent: &Rc<Entity>,
        name: &str,
        clock: &Clock,
        config: &LinkConfig,
    ) -> Result<Self, CxlError> {
        Ok(Self {
            entity: Rc::new(Entity::new(parent, name)),
            clock: clock.clone(),
            buffer: RefCell::new(LinkBuffer::new(clock, config)?),
            submitted: Repeated::default(),
            space_freed: Repeated::default(),
        })
    }

    fn submit(&self, packet: Packet) -> Result<u64, CxlError> {
        let id = packet.id();
        let ready_tick = self
            .buffer
            .borrow_mut()
            .submit(packet, self.clock.tick_now())?;
        enter!(self.entity ; id);
        trace!(self.entity ; "{id} ready at tick {ready_tick}");
        self.submitted.notify()?;
        Ok(ready_tick)
    }

    fn is_full(&self) -> bool {
        self.buffer.borrow().is_full()
    }
}

#[derive(EntityGet, EntityDisplay)]
pub struct SerialLink {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    range: AddressRange,
    request: Rc<Direction>,
    response: Rc<Direction>,

    up_req_rx: RefCell<Option<InPort<Packet>>>,
    up_rsp_tx: RefCell<Option<OutPort<Packet>>>,
    down_req_tx: RefCell<Option<OutPort<Packet>>>,
    down_rsp_rx: RefCell<Option<InPort<Packet>>>,
}

impl SerialLink {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: &SerialLinkConfig,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let request = Direction::new(
            &entity,
            "req",
            clock,
            &config.link_config(config.buffer_size_req),
        )
        .map_err(|e| SimError(format!("{entity}: {e}")))?;
        let response = Direction::new(
            &entity,
            "rsp",
            clock,
            &config.link_config(config.buffer_size_rsp),
        )
        .map_err(|e| SimError(format!("{entity}: {e}")))?;

        let up_req_rx = InPort::new(engine, clock, &entity, "up_req_rx");
        let up_rsp_tx = OutPort::new(&entity, "up_rsp_tx");
        let down_req_tx = OutPort::new(&entity, "down_req_tx");
        let down_rsp_rx = InPort::new(engine, clock, &entity, "down_rsp_rx");

        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            range: config.range,
            request: Rc::new(request),
            response: Rc::new(response),
            up_req_rx: RefCell::new(Some(up_req_rx)),
            up_rsp_tx: RefCell::new(Some(up_rsp_tx)),
            down_req_tx: RefCell::new(Some(down_req_tx)),
            down_rsp_rx: RefCell::new(Some(down_rsp_rx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    #[must_use]
    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Accept a request for transfer downstream.
    ///
    /// Returns the tick at which it will be ready on the far side, or
    /// [CxlError::BufferFull] holding the packet.
    pub fn submit_request(&self, packet: Packet) -> Result<u64, CxlError> {
        self.request.submit(packet)
    }

    /// Accept a response for transfer upstream.
    pub fn submit_response(&self, packet: Packet) -> Result<u64, CxlError> {
        self.response.submit(packet)
    }

    #[must_use]
    pub fn request_stats(&self) -> LinkStats {
        self.request.buffer.borrow().stats()
    }

    #[must_use]
    pub fn response_stats(&self) -> LinkStats {
        self.response.buffer.borrow().stats()
    }

    /// Discard everything in flight in both directions.
    pub fn reset(&self) {
        self.request.buffer.borrow_mut().reset();
        self.response.buffer.borrow_mut().reset();
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

fn check_single_port(link: &SerialLink, index: usize) -> SimResult {
    if index != 0 {
        return sim_error!("{link}: serial links only have port 0, not {index}");
    }
    Ok(())
}

impl UpstreamFacing for SerialLink {
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

impl DownstreamFacing for SerialLink {
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
impl Runnable for SerialLink {
    async fn run(&self) -> SimResult {
        let up_req_rx = take_option!(self.up_req_rx);
        let down_req_tx = take_option!(self.down_req_tx);
        let down_rsp_rx = take_option!(self.down_rsp_rx);
        let up_rsp_tx = take_option!(self.up_rsp_tx);

        let request = self.request.clone();
        self.spawner
            .spawn(async move { run_rx(up_req_rx, request).await });
        let request = self.request.clone();
        self.spawner
            .spawn(async move { run_tx(down_req_tx, request).await });
        let response = self.response.clone();
        self.spawner
            .spawn(async move { run_rx(down_rsp_rx, response).await });
        let response = self.response.clone();
        self.spawner
            .spawn(async move { run_tx(up_rsp_tx, response).await });
        Ok(())
    }
}

async fn run_rx(rx: InPort<Packet>, direction: Rc<Direction>) -> SimResult {
    loop {
        while direction.is_full() {
            direction.space_freed.listen().await;
        }
        let packet = rx.get()?.await;
        direction.submit(packet)?;
    }
}

async fn run_tx(tx: OutPort<Packet>, direction: Rc<Direction>) -> SimResult {
    loop {
        let ready_tick = direction.buffer.borrow().front_ready_tick();
        let Some(ready_tick) = ready_tick else {
            direction.submitted.listen().await;
            continue;
        };
        direction.clock.wait_until(ready_tick).await;

        let now = direction.clock.tick_now();
        let packet = direction.buffer.borrow_mut().take_front(now)?;
        let Some(packet) = packet else {
            continue;
        };
        exit!(direction.entity ; packet.id());
        tx.put(packet)?.await;
        direction.buffer.borrow_mut().release();
        direction.space_freed.notify()?;
    }
}
