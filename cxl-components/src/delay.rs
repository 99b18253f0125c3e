// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A component that adds `delay_ticks` between receiving anything and sending
//! it on to its output.
//!
//! The input and output are handled by separate tasks so that the input keeps
//! accepting values while earlier ones are in flight. At most `delay_ticks`
//! values can be in flight (one per tick) before the input is back-pressured.
//!
//! # Ports
//!
//!  - One [input port](cxl_engine::port::InPort): `rx`
//!  - One [output port](cxl_engine::port::OutPort): `tx`

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_engine::engine::Engine;
use cxl_engine::events::repeated::Repeated;
use cxl_engine::executor::Spawner;
use cxl_engine::port::{InPort, OutPort, PortStateResult};
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::{Event, Runnable, SimObject};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::{enter, exit};

use crate::{connect_tx, port_rx, take_option};

type Pending<T> = Rc<RefCell<VecDeque<(T, u64)>>>;

#[derive(EntityGet, EntityDisplay)]
pub struct Delay<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    spawner: Spawner,
    clock: Clock,
    delay_ticks: u64,

    rx: RefCell<Option<InPort<T>>>,
    pending: Pending<T>,
    pending_changed: Repeated<()>,
    output_changed: Repeated<()>,
    tx: RefCell<Option<OutPort<T>>>,
}

impl<T> Delay<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        delay_ticks: u64,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let tx = OutPort::new(&entity, "tx");
        let rx = InPort::new(engine, clock, &entity, "rx");
        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            clock: clock.clone(),
            delay_ticks,
            rx: RefCell::new(Some(rx)),
            pending: Rc::new(RefCell::new(VecDeque::new())),
            pending_changed: Repeated::default(),
            output_changed: Repeated::default(),
            tx: RefCell::new(Some(tx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx(&self, port_state: PortStateResult<T>) -> SimResult {
        connect_tx!(self.tx, connect ; port_state)
    }

    pub fn port_rx(&self) -> PortStateResult<T> {
        port_rx!(self.rx, state)
    }

    #[must_use]
    pub fn delay_ticks(&self) -> u64 {
        self.delay_ticks
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Delay<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let tx = take_option!(self.tx);
        let entity = self.entity.clone();
        let clock = self.clock.clone();
        let pending = self.pending.clone();
        let pending_changed = self.pending_changed.clone();
        let output_changed = self.output_changed.clone();
        self.spawner.spawn(async move {
            run_tx(entity, tx, clock, pending, pending_changed, output_changed).await
        });

        let rx = take_option!(self.rx);
        let max_in_flight = self.delay_ticks.max(1) as usize;
        loop {
            while self.pending.borrow().len() >= max_in_flight {
                self.output_changed.listen().await;
            }

            let value = rx.get()?.await;
            enter!(self.entity ; value.id());
            let leave_at = self.clock.tick_now() + self.delay_ticks;
            self.pending.borrow_mut().push_back((value, leave_at));
            self.pending_changed.notify()?;
        }
    }
}

async fn run_tx<T>(
    entity: Rc<Entity>,
    tx: OutPort<T>,
    clock: Clock,
    pending: Pending<T>,
    pending_changed: Repeated<()>,
    output_changed: Repeated<()>,
) -> SimResult
where
    T: SimObject,
{
    loop {
        let next = pending.borrow().front().map(|(_, tick)| *tick);
        match next {
            Some(leave_at) => {
                clock.wait_until(leave_at).await;
                let Some((value, _)) = pending.borrow_mut().pop_front() else {
                    continue;
                };
                exit!(entity ; value.id());
                tx.put(value)?.await;
                output_changed.notify()?;
            }
            None => pending_changed.listen().await,
        }
    }
}
