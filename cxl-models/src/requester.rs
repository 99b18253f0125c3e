// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A host side traffic generator.
//!
//! The [Requester] issues the requests described by its [RequestPattern] in
//! order, one per cycle at most, and keeps no more than `max_outstanding`
//! requests in flight. Each response is matched against its request and the
//! round-trip latency is recorded.
//!
//! # Ports
//!
//!  - `req_tx`: requests out
//!  - `rsp_rx`: responses in

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
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
use cxl_track::{Id, debug, enter, exit, info, warn};

use crate::error::CxlError;
use crate::packet::{Command, Packet, Status};
use crate::port::DownstreamFacing;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestSpec {
    pub command: Command,
    pub address: u64,
    pub size_bytes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestPattern {
    /// Issue exactly these requests.
    List(Vec<RequestSpec>),

    /// `count` requests starting at `start` with addresses `stride` bytes apart.
    Stride {
        command: Command,
        start: u64,
        stride: u64,
        size_bytes: u32,
        count: usize,
    },
}

impl RequestPattern {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            RequestPattern::List(requests) => requests.len(),
            RequestPattern::Stride { count, .. } => *count,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The requests in issue order.
    ///
    /// Fails if a strided address does not fit in 64 bits.
    pub fn requests(&self) -> Result<Vec<RequestSpec>, CxlError> {
        match self {
            RequestPattern::List(requests) => Ok(requests.clone()),
            RequestPattern::Stride {
                command,
                start,
                stride,
                size_bytes,
                count,
            } => (0..*count as u64)
                .map(|i| {
                    let address = stride
                        .checked_mul(i)
                        .and_then(|offset| start.checked_add(offset))
                        .ok_or_else(|| {
                            CxlError::Configuration(format!(
                                "request {i} of stride {stride:#x} from {start:#x} overflows"
                            ))
                        })?;
                    Ok(RequestSpec {
                        command: *command,
                        address,
                        size_bytes: *size_bytes,
                    })
                })
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequesterConfig {
    pub pattern: RequestPattern,
    pub max_outstanding: usize,
    pub flow_id: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequesterStats {
    pub issued: u64,
    pub completed: u64,
    pub failed: u64,

    /// Round-trip latency of each completed request in completion order.
    pub latencies: Vec<u64>,
}

impl RequesterStats {
    #[must_use]
    pub fn mean_latency(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: u64 = self.latencies.iter().sum();
        Some(total as f64 / self.latencies.len() as f64)
    }
}

struct State {
    entity: Rc<Entity>,
    clock: Clock,
    stats: RefCell<RequesterStats>,
    in_flight: RefCell<HashMap<Id, u64>>,
    outstanding: Cell<usize>,
    response_received: Repeated<()>,
}

#[derive(EntityGet, EntityDisplay)]
pub struct Requester {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    config: RequesterConfig,
    state: Rc<State>,

    req_tx: RefCell<Option<OutPort<Packet>>>,
    rsp_rx: RefCell<Option<InPort<Packet>>>,
}

impl Requester {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: RequesterConfig,
    ) -> Result<Rc<Self>, SimError> {
        if config.max_outstanding == 0 {
            return sim_error!("{parent}::{name}: max_outstanding must be at least 1");
        }
        let entity = Rc::new(Entity::new(parent, name));
        let req_tx = OutPort::new(&entity, "req_tx");
        let rsp_rx = InPort::new(engine, clock, &entity, "rsp_rx");
        let state = Rc::new(State {
            entity: entity.clone(),
            clock: clock.clone(),
            stats: RefCell::new(RequesterStats::default()),
            in_flight: RefCell::new(HashMap::new()),
            outstanding: Cell::new(0),
            response_received: Repeated::default(),
        });
        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            config,
            state,
            req_tx: RefCell::new(Some(req_tx)),
            rsp_rx: RefCell::new(Some(rsp_rx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    #[must_use]
    pub fn config(&self) -> &RequesterConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> RequesterStats {
        self.state.stats.borrow().clone()
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.state.outstanding.get()
    }

    /// True once every request of the pattern has been answered.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.stats.borrow().completed == self.config.pattern.len() as u64
    }

    pub fn connect_port_req_tx(&self, port_state: PortStateResult<Packet>) -> SimResult {
        connect_tx!(self.req_tx, connect ; port_state)
    }

    pub fn port_rsp_rx(&self) -> PortStateResult<Packet> {
        port_rx!(self.rsp_rx, state)
    }
}

impl DownstreamFacing for Requester {
    fn num_downstream_ports(&self) -> usize {
        1
    }

    fn connect_port_req_tx(
        &self,
        index: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        if index != 0 {
            return sim_error!("{self}: requesters only have port 0, not {index}");
        }
        Requester::connect_port_req_tx(self, port_state)
    }

    fn port_rsp_rx(&self, index: usize) -> PortStateResult<Packet> {
        if index != 0 {
            return sim_error!("{self}: requesters only have port 0, not {index}");
        }
        Requester::port_rsp_rx(self)
    }
}

#[async_trait(?Send)]
impl Runnable for Requester {
    async fn run(&self) -> SimResult {
        let req_tx = take_option!(self.req_tx);
        let rsp_rx = take_option!(self.rsp_rx);

        let state = self.state.clone();
        self.spawner
            .spawn(async move { run_responses(state, rsp_rx).await });

        let state = &self.state;
        for spec in self.config.pattern.requests()? {
            while state.outstanding.get() >= self.config.max_outstanding {
                state.response_received.listen().await;
            }
            let packet = Packet::request(
                &self.entity,
                spec.command,
                spec.address,
                spec.size_bytes,
                self.config.flow_id,
                state.clock.tick_now(),
            )?;
            debug!(self.entity ; "issue {packet}");
            state.outstanding.set(state.outstanding.get() + 1);
            state
                .in_flight
                .borrow_mut()
                .insert(packet.id(), packet.issue_tick());
            state.stats.borrow_mut().issued += 1;
            exit!(self.entity ; packet.id());
            req_tx.put(packet)?.await;
            state.clock.wait_ticks(1).await;
        }
        info!(self.entity ; "issued {} requests", self.config.pattern.len());
        Ok(())
    }
}

async fn run_responses(state: Rc<State>, rx: InPort<Packet>) -> SimResult {
    loop {
        let response = rx.get()?.await;
        enter!(state.entity ; response.id());
        if response.is_request() {
            return sim_error!("{}: unexpected request {response}", state.entity);
        }
        let Some(issue_tick) = state.in_flight.borrow_mut().remove(&response.id()) else {
            return sim_error!("{}: response {response} matches no request", state.entity);
        };
        let latency = state.clock.tick_now() - issue_tick;
        {
            let mut stats = state.stats.borrow_mut();
            stats.completed += 1;
            if response.status() == Status::Failed {
                warn!(state.entity ; "{response} failed");
                stats.failed += 1;
            }
            stats.latencies.push(latency);
        }
        debug!(state.entity ; "{response} after {latency} ticks");
        state.outstanding.set(state.outstanding.get() - 1);
        state.response_received.notify()?;
    }
}
