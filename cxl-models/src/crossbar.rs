// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! An N-to-M crossbar that routes requests by address.
//!
//! Requests from each upstream port are queued in arrival order. One arbiter
//! task grants the upstream queues in round-robin order. Each grant costs
//! `frontend_latency` cycles, after which the request is routed and handed to
//! its downstream port `forward_latency` cycles later. Each downstream layer
//! is busy for `ceil(size / width_bytes)` cycles per packet so back-to-back
//! packets to one port are spread out.
//!
//! Responses return to the upstream port their request came from after
//! `response_latency` cycles. A request whose address cannot be routed is
//! rejected and answered with a failed response on the same path.
//!
//! At most `max_outstanding` requests may be waiting for a response. Once
//! that limit is reached no further grants are made until a response returns.
//!
//! ```txt
//!                 +-------------------------------------------+
//!  up_req_rx_0 -> | queue \                    /-> down_req_tx_0 |
//!  up_req_rx_1 -> | queue +-> ARBITER -> ROUTE +-> down_req_tx_1 |
//!                 |                                           |
//!  up_rsp_tx_0 <- | delay <-+   route_to   +<- down_rsp_rx_0     |
//!  up_rsp_tx_1 <- | delay <-+              +<- down_rsp_rx_1     |
//!                 +-------------------------------------------+
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::arbiter::{Arbitrate, RoundRobinPolicy};
use cxl_components::flow_controls::rate_limiter::RateLimiter;
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
use cxl_track::{Id, enter, exit, trace, warn};

use crate::error::CxlError;
use crate::packet::{Command, Packet};
use crate::port::{DownstreamFacing, UpstreamFacing};
use crate::router::{AddressRouter, RouterKind};

/// Number of packets in a terminal state whose [PacketState] is remembered.
pub const TERMINAL_STATE_HISTORY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossbarConfig {
    /// Bytes per cycle each downstream layer can carry.
    pub width_bytes: usize,
    pub frontend_latency: u64,
    pub forward_latency: u64,
    pub response_latency: u64,

    /// Depth of each upstream request queue.
    pub buffer_size_req: usize,

    /// Depth of each upstream response queue.
    pub buffer_size_resp: usize,

    /// Requests that may be waiting for a response.
    pub max_outstanding: usize,
}

impl Default for CrossbarConfig {
    fn default() -> Self {
        Self {
            width_bytes: 32,
            frontend_latency: 1,
            forward_latency: 2,
            response_latency: 2,
            buffer_size_req: 10,
            buffer_size_resp: 10,
            max_outstanding: 64,
        }
    }
}

/// Where a request is within the crossbar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketState {
    Arrived,
    Arbitrating,
    Forwarding,
    Delivered,
    Rejected,
}

impl PacketState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, PacketState::Delivered | PacketState::Rejected)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CrossbarStats {
    /// Requests forwarded, indexed `[upstream][downstream]`.
    pub pkt_count: Vec<Vec<u64>>,

    /// Bytes forwarded, indexed `[upstream][downstream]`.
    pub pkt_size: Vec<Vec<u64>>,

    /// Requests granted per command.
    pub commands: BTreeMap<Command, u64>,
    pub delivered: u64,
    pub rejected: u64,
    pub responses: u64,
}

/// A FIFO of packets each tagged with a tick, plus an event notified on every
/// push or pop.
struct PacketQueue {
    entries: RefCell<VecDeque<(Packet, u64)>>,
    changed: Repeated<()>,
}

impl PacketQueue {
    fn new() -> Self {
        Self {
            entries: RefCell::new(VecDeque::new()),
            changed: Repeated::default(),
        }
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn front_tick(&self) -> Option<u64> {
        self.entries.borrow().front().map(|(_, tick)| *tick)
    }

    fn front_id(&self) -> Option<Id> {
        self.entries.borrow().front().map(|(packet, _)| packet.id())
    }

    fn push(&self, packet: Packet, tick: u64) -> SimResult {
        self.entries.borrow_mut().push_back((packet, tick));
        self.changed.notify()
    }

    fn pop(&self) -> Result<Option<Packet>, SimError> {
        let entry = self.entries.borrow_mut().pop_front();
        self.changed.notify()?;
        Ok(entry.map(|(packet, _)| packet))
    }
}

struct Shared {
    entity: Rc<Entity>,
    clock: Clock,
    config: CrossbarConfig,
    router: AddressRouter,
    arbiter: RefCell<RoundRobinPolicy>,
    layer_limiter: RateLimiter,

    req_queues: Vec<PacketQueue>,
    request_arrived: Repeated<()>,
    down_queues: Vec<PacketQueue>,
    layer_free: Vec<Cell<u64>>,
    rsp_queues: Vec<PacketQueue>,

    outstanding: Cell<usize>,
    credit_returned: Repeated<()>,
    route_to: RefCell<HashMap<Id, usize>>,

    states: RefCell<HashMap<Id, PacketState>>,
    terminal: RefCell<VecDeque<Id>>,
    stats: RefCell<CrossbarStats>,
}

impl Shared {
    fn set_state(&self, id: Id, state: PacketState) {
        trace!(self.entity ; "{id}: {state:?}");
        let mut states = self.states.borrow_mut();
        states.insert(id, state);
        if state.is_terminal() {
            let mut terminal = self.terminal.borrow_mut();
            terminal.push_back(id);
            if terminal.len() > TERMINAL_STATE_HISTORY
                && let Some(oldest) = terminal.pop_front()
            {
                states.remove(&oldest);
            }
        }
    }

    async fn queue_response(&self, upstream: usize, packet: Packet, ready_tick: u64) -> SimResult {
        let queue = &self.rsp_queues[upstream];
        while queue.len() >= self.config.buffer_size_resp {
            queue.changed.listen().await;
        }
        queue.push(packet, ready_tick)
    }

    async fn dispatch(&self, upstream: usize, packet: Packet) -> SimResult {
        let now = self.clock.tick_now();
        let id = packet.id();
        *self
            .stats
            .borrow_mut()
            .commands
            .entry(packet.command())
            .or_default() += 1;

        let downstream = match self.router.route(&packet, now) {
            Ok(downstream) => downstream,
            Err(error) => {
                warn!(self.entity ; "rejected {packet}: {error}");
                self.set_state(id, PacketState::Rejected);
                self.stats.borrow_mut().rejected += 1;
                let response = packet.failed_response();
                return self
                    .queue_response(upstream, response, now + self.config.response_latency)
                    .await;
            }
        };
        if downstream >= self.down_queues.len() {
            return sim_error!(
                "{}: {packet} routed to missing downstream port {downstream}",
                self.entity
            );
        }

        self.outstanding.set(self.outstanding.get() + 1);
        self.route_to.borrow_mut().insert(id, upstream);

        let start = now.max(self.layer_free[downstream].get());
        self.layer_free[downstream].set(start + self.layer_limiter.ticks(&packet));
        let deliver_at = start + self.config.forward_latency;
        {
            let mut stats = self.stats.borrow_mut();
            stats.pkt_count[upstream][downstream] += 1;
            stats.pkt_size[upstream][downstream] += u64::from(packet.size_bytes());
        }
        trace!(self.entity ; "{packet} from {upstream} to {downstream} at tick {deliver_at}");
        self.set_state(id, PacketState::Forwarding);
        self.down_queues[downstream].push(packet, deliver_at)
    }
}

#[derive(EntityGet, EntityDisplay)]
pub struct Crossbar {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    shared: Rc<Shared>,

    up_req_rx: RefCell<Vec<InPort<Packet>>>,
    up_rsp_tx: RefCell<Vec<OutPort<Packet>>>,
    down_req_tx: RefCell<Vec<OutPort<Packet>>>,
    down_rsp_rx: RefCell<Vec<InPort<Packet>>>,
}

fn validate(
    config: &CrossbarConfig,
    router: &AddressRouter,
    num_upstream: usize,
    num_downstream: usize,
) -> Result<(), CxlError> {
    let positive = [
        ("number of upstream ports", num_upstream),
        ("number of downstream ports", num_downstream),
        ("xbar_width", config.width_bytes),
        ("xbar_buffer_size_req", config.buffer_size_req),
        ("xbar_buffer_size_resp", config.buffer_size_resp),
        ("max_outstanding", config.max_outstanding),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(CxlError::Configuration(format!(
                "{name} must be greater than 0"
            )));
        }
    }
    if matches!(router.kind(), RouterKind::SingleDownstream) && num_downstream != 1 {
        return Err(CxlError::Configuration(format!(
            "single downstream router used with {num_downstream} downstream ports"
        )));
    }
    if router.max_port() >= num_downstream {
        return Err(CxlError::Configuration(format!(
            "router uses downstream port {} but only {num_downstream} exist",
            router.max_port()
        )));
    }
    Ok(())
}

impl Crossbar {
    #[expect(clippy::too_many_arguments)]
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: CrossbarConfig,
        router: AddressRouter,
        num_upstream: usize,
        num_downstream: usize,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        validate(&config, &router, num_upstream, num_downstream)
            .map_err(|e| SimError(format!("{entity}: {e}")))?;
        let layer_limiter = RateLimiter::new(clock, (config.width_bytes * 8) as f64)?;

        let up_req_rx = (0..num_upstream)
            .map(|i| InPort::new(engine, clock, &entity, &format!("up_req_rx_{i}")))
            .collect();
        let up_rsp_tx = (0..num_upstream)
            .map(|i| OutPort::new(&entity, &format!("up_rsp_tx_{i}")))
            .collect();
        let down_req_tx = (0..num_downstream)
            .map(|i| OutPort::new(&entity, &format!("down_req_tx_{i}")))
            .collect();
        let down_rsp_rx = (0..num_downstream)
            .map(|i| InPort::new(engine, clock, &entity, &format!("down_rsp_rx_{i}")))
            .collect();

        let shared = Rc::new(Shared {
            entity: entity.clone(),
            clock: clock.clone(),
            config,
            router,
            arbiter: RefCell::new(RoundRobinPolicy::new()),
            layer_limiter,
            req_queues: (0..num_upstream).map(|_| PacketQueue::new()).collect(),
            request_arrived: Repeated::default(),
            down_queues: (0..num_downstream).map(|_| PacketQueue::new()).collect(),
            layer_free: (0..num_downstream).map(|_| Cell::new(0)).collect(),
            rsp_queues: (0..num_upstream).map(|_| PacketQueue::new()).collect(),
            outstanding: Cell::new(0),
            credit_returned: Repeated::default(),
            route_to: RefCell::new(HashMap::new()),
            states: RefCell::new(HashMap::new()),
            terminal: RefCell::new(VecDeque::new()),
            stats: RefCell::new(CrossbarStats {
                pkt_count: vec![vec![0; num_downstream]; num_upstream],
                pkt_size: vec![vec![0; num_downstream]; num_upstream],
                ..Default::default()
            }),
        });

        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            shared,
            up_req_rx: RefCell::new(up_req_rx),
            up_rsp_tx: RefCell::new(up_rsp_tx),
            down_req_tx: RefCell::new(down_req_tx),
            down_rsp_rx: RefCell::new(down_rsp_rx),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn port_up_req_rx_i(&self, i: usize) -> PortStateResult<Packet> {
        match self.up_req_rx.borrow().get(i) {
            None => sim_error!("{self}: no up_req_rx port {i}"),
            Some(rx) => rx.state(),
        }
    }

    pub fn connect_port_up_rsp_tx_i(
        &self,
        i: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        match self.up_rsp_tx.borrow_mut().get_mut(i) {
            None => sim_error!("{self}: no up_rsp_tx port {i}"),
            Some(tx) => tx.connect(port_state),
        }
    }

    pub fn connect_port_down_req_tx_i(
        &self,
        i: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        match self.down_req_tx.borrow_mut().get_mut(i) {
            None => sim_error!("{self}: no down_req_tx port {i}"),
            Some(tx) => tx.connect(port_state),
        }
    }

    pub fn port_down_rsp_rx_i(&self, i: usize) -> PortStateResult<Packet> {
        match self.down_rsp_rx.borrow().get(i) {
            None => sim_error!("{self}: no down_rsp_rx port {i}"),
            Some(rx) => rx.state(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CrossbarConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn router(&self) -> &AddressRouter {
        &self.shared.router
    }

    /// Queue a request as if it had arrived on upstream port `upstream`.
    ///
    /// Its response is sent on `up_rsp_tx_<upstream>`. A full queue hands the
    /// packet back in [CxlError::BufferFull].
    pub fn forward(&self, upstream: usize, packet: Packet) -> Result<(), CxlError> {
        let Some(queue) = self.shared.req_queues.get(upstream) else {
            return Err(CxlError::Configuration(format!(
                "{self}: no upstream port {upstream}"
            )));
        };
        if queue.len() >= self.shared.config.buffer_size_req {
            return Err(CxlError::BufferFull(packet));
        }
        self.shared.set_state(packet.id(), PacketState::Arrived);
        queue.push(packet, self.shared.clock.tick_now())?;
        self.shared.request_arrived.notify()?;
        Ok(())
    }

    /// Look up which downstream port a packet goes to.
    pub fn route(&self, packet: &Packet) -> Result<usize, CxlError> {
        self.shared.router.route(packet, self.shared.clock.tick_now())
    }

    #[must_use]
    pub fn stats(&self) -> CrossbarStats {
        self.shared.stats.borrow().clone()
    }

    /// Requests forwarded and still waiting for their response.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.get()
    }

    /// Where a packet is within the crossbar. Only the last
    /// [TERMINAL_STATE_HISTORY] delivered or rejected packets are kept.
    #[must_use]
    pub fn packet_state(&self, id: Id) -> Option<PacketState> {
        self.shared.states.borrow().get(&id).copied()
    }
}

impl UpstreamFacing for Crossbar {
    fn num_upstream_ports(&self) -> usize {
        self.shared.req_queues.len()
    }

    fn port_req_rx(&self, index: usize) -> PortStateResult<Packet> {
        self.port_up_req_rx_i(index)
    }

    fn connect_port_rsp_tx(
        &self,
        index: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        self.connect_port_up_rsp_tx_i(index, port_state)
    }
}

impl DownstreamFacing for Crossbar {
    fn num_downstream_ports(&self) -> usize {
        self.shared.down_queues.len()
    }

    fn connect_port_req_tx(
        &self,
        index: usize,
        port_state: PortStateResult<Packet>,
    ) -> SimResult {
        self.connect_port_down_req_tx_i(index, port_state)
    }

    fn port_rsp_rx(&self, index: usize) -> PortStateResult<Packet> {
        self.port_down_rsp_rx_i(index)
    }
}

#[async_trait(?Send)]
impl Runnable for Crossbar {
    async fn run(&self) -> SimResult {
        let up_req_rx: Vec<InPort<Packet>> = self.up_req_rx.borrow_mut().drain(..).collect();
        let up_rsp_tx: Vec<OutPort<Packet>> = self.up_rsp_tx.borrow_mut().drain(..).collect();
        let down_req_tx: Vec<OutPort<Packet>> =
            self.down_req_tx.borrow_mut().drain(..).collect();
        let down_rsp_rx: Vec<InPort<Packet>> =
            self.down_rsp_rx.borrow_mut().drain(..).collect();

        for (upstream, (rx, tx)) in up_req_rx.into_iter().zip(up_rsp_tx).enumerate() {
            let shared = self.shared.clone();
            self.spawner
                .spawn(async move { run_request_rx(shared, upstream, rx).await });
            let shared = self.shared.clone();
            self.spawner
                .spawn(async move { run_response_tx(shared, upstream, tx).await });
        }
        for (downstream, (tx, rx)) in down_req_tx.into_iter().zip(down_rsp_rx).enumerate() {
            let shared = self.shared.clone();
            self.spawner
                .spawn(async move { run_request_tx(shared, downstream, tx).await });
            let shared = self.shared.clone();
            self.spawner
                .spawn(async move { run_response_rx(shared, downstream, rx).await });
        }

        run_arbiter(self.shared.clone()).await
    }
}

async fn run_request_rx(shared: Rc<Shared>, upstream: usize, rx: InPort<Packet>) -> SimResult {
    let queue = &shared.req_queues[upstream];
    loop {
        while queue.len() >= shared.config.buffer_size_req {
            queue.changed.listen().await;
        }
        let packet = rx.get()?.await;
        if !packet.is_request() {
            return sim_error!("{}: response {packet} received on request port", shared.entity);
        }
        enter!(shared.entity ; packet.id());
        shared.set_state(packet.id(), PacketState::Arrived);
        queue.push(packet, shared.clock.tick_now())?;
        shared.request_arrived.notify()?;
    }
}

async fn run_arbiter(shared: Rc<Shared>) -> SimResult {
    loop {
        let requesting: Vec<bool> = shared.req_queues.iter().map(|q| !q.is_empty()).collect();
        if !requesting.contains(&true) {
            shared.request_arrived.listen().await;
            continue;
        }
        if shared.outstanding.get() >= shared.config.max_outstanding {
            trace!(shared.entity ; "waiting for a response credit");
            shared.credit_returned.listen().await;
            continue;
        }

        let granted = shared
            .arbiter
            .borrow_mut()
            .arbitrate(&shared.entity, &requesting);
        let Some(upstream) = granted else {
            continue;
        };
        if let Some(id) = shared.req_queues[upstream].front_id() {
            shared.set_state(id, PacketState::Arbitrating);
        }
        shared
            .clock
            .wait_ticks(shared.config.frontend_latency)
            .await;

        let Some(packet) = shared.req_queues[upstream].pop()? else {
            return sim_error!("{}: upstream queue {upstream} emptied while granted", shared.entity);
        };
        shared.dispatch(upstream, packet).await?;
    }
}

async fn run_request_tx(shared: Rc<Shared>, downstream: usize, tx: OutPort<Packet>) -> SimResult {
    let queue = &shared.down_queues[downstream];
    loop {
        let Some(deliver_at) = queue.front_tick() else {
            queue.changed.listen().await;
            continue;
        };
        shared.clock.wait_until(deliver_at).await;
        let Some(packet) = queue.pop()? else {
            continue;
        };
        let id = packet.id();
        exit!(shared.entity ; id);
        tx.put(packet)?.await;
        shared.set_state(id, PacketState::Delivered);
        shared.stats.borrow_mut().delivered += 1;
    }
}

async fn run_response_rx(shared: Rc<Shared>, downstream: usize, rx: InPort<Packet>) -> SimResult {
    loop {
        let packet = rx.get()?.await;
        let id = packet.id();
        if packet.is_request() {
            return sim_error!(
                "{}: request {packet} received on response port {downstream}",
                shared.entity
            );
        }
        let Some(upstream) = shared.route_to.borrow_mut().remove(&id) else {
            return sim_error!(
                "{}: response {packet} does not match an outstanding request",
                shared.entity
            );
        };
        enter!(shared.entity ; id);
        shared
            .outstanding
            .set(shared.outstanding.get().saturating_sub(1));
        shared.credit_returned.notify()?;
        shared.stats.borrow_mut().responses += 1;

        let ready_tick = shared.clock.tick_now() + shared.config.response_latency;
        shared.queue_response(upstream, packet, ready_tick).await?;
    }
}

async fn run_response_tx(shared: Rc<Shared>, upstream: usize, tx: OutPort<Packet>) -> SimResult {
    let queue = &shared.rsp_queues[upstream];
    loop {
        let Some(ready_tick) = queue.front_tick() else {
            queue.changed.listen().await;
            continue;
        };
        shared.clock.wait_until(ready_tick).await;
        let Some(packet) = queue.pop()? else {
            continue;
        };
        exit!(shared.entity ; packet.id());
        tx.put(packet)?.await;
    }
}
