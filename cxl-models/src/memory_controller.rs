// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A stand-in for the memory behind a CXL device.
//!
//! Requests wait in a bounded queue, are answered in order and the responses
//! leave after a fixed latency. The DRAM timing itself is not modelled.
//! Requests outside the controller's range get a failed response.
//!
//! ```txt
//!  +--------------------------------------------------+
//!  |            MEMORY CONTROLLER                     |
//!  | req_rx -> QUEUE -> pending -> respond -> DELAY -> rsp_tx
//!  +--------------------------------------------------+
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::delay::Delay;
use cxl_components::store::Store;
use cxl_components::take_option;
use cxl_engine::engine::Engine;
use cxl_engine::port::{InPort, OutPort, PortStateResult};
use cxl_engine::sim_error;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::Runnable;
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::{debug, warn};

use crate::packet::{Command, Packet};
use crate::port::UpstreamFacing;
use crate::router::AddressRange;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryControllerConfig {
    pub range: AddressRange,
    pub latency_ticks: u64,
    pub queue_size: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub failed: u64,
}

#[derive(EntityGet, EntityDisplay)]
pub struct MemoryController {
    pub entity: Rc<Entity>,
    range: AddressRange,
    stats: RefCell<MemoryStats>,

    queue: Rc<Store<Packet>>,
    delay: Rc<Delay<Packet>>,
    pending: RefCell<Option<InPort<Packet>>>,
    response: RefCell<Option<OutPort<Packet>>>,
}

impl MemoryController {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: &MemoryControllerConfig,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let queue = Store::new_and_register(engine, clock, &entity, "queue", config.queue_size)?;
        let pending = InPort::new(engine, clock, &entity, "pending");
        queue.connect_port_tx(pending.state())?;

        let delay = Delay::new_and_register(engine, clock, &entity, "delay", config.latency_ticks)?;
        let mut response = OutPort::new(&entity, "response");
        response.connect(delay.port_rx())?;

        let rc_self = Rc::new(Self {
            entity,
            range: config.range,
            stats: RefCell::new(MemoryStats::default()),
            queue,
            delay,
            pending: RefCell::new(Some(pending)),
            response: RefCell::new(Some(response)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    #[must_use]
    pub fn range(&self) -> AddressRange {
        self.range
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        self.stats.borrow().clone()
    }

    pub fn port_req_rx(&self) -> PortStateResult<Packet> {
        self.queue.port_rx()
    }

    pub fn connect_port_rsp_tx(&self, port_state: PortStateResult<Packet>) -> SimResult {
        self.delay.connect_port_tx(port_state)
    }

    fn in_range(&self, packet: &Packet) -> bool {
        let Some(last) = packet
            .address()
            .checked_add(u64::from(packet.size_bytes()).saturating_sub(1))
        else {
            return false;
        };
        self.range.contains(packet.address()) && self.range.contains(last)
    }

    fn respond(&self, request: &Packet) -> Packet {
        let mut stats = self.stats.borrow_mut();
        if !self.in_range(request) {
            warn!(self.entity ; "{request} outside {}", self.range);
            stats.failed += 1;
            return request.failed_response();
        }
        let size = u64::from(request.size_bytes());
        match request.command() {
            Command::Read => {
                stats.reads += 1;
                stats.bytes_read += size;
            }
            Command::Write => {
                stats.writes += 1;
                stats.bytes_written += size;
            }
        }
        request.to_response()
    }
}

impl UpstreamFacing for MemoryController {
    fn num_upstream_ports(&self) -> usize {
        1
    }

    fn port_req_rx(&self, index: usize) -> PortStateResult<Packet> {
        if index != 0 {
            return sim_error!("{self}: memory controllers only have port 0, not {index}");
        }
        MemoryController::port_req_rx(self)
    }

    fn connect_port_rsp_tx(
        &self,
        index: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        if index != 0 {
            return sim_error!("{self}: memory controllers only have port 0, not {index}");
        }
        MemoryController::connect_port_rsp_tx(self, port_state)
    }
}

#[async_trait(?Send)]
impl Runnable for MemoryController {
    async fn run(&self) -> SimResult {
        let pending = take_option!(self.pending);
        let response = take_option!(self.response);

        loop {
            let request = pending.get()?.await;
            if !request.is_request() {
                return sim_error!("{self}: unexpected response {request}");
            }
            debug!(self.entity ; "Memory access {request}");
            response.put(self.respond(&request))?.await;
        }
    }
}
