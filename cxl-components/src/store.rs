// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A bounded FIFO component.
//!
//! The [`Store`] accepts values on `rx` while it holds fewer than `capacity`
//! values and sends them in order on `tx`. When full, the input is not read
//! so the sender is back-pressured.
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
use cxl_engine::sim_error;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::{Event, Runnable, SimObject};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::{enter, exit};

use crate::{connect_tx, port_rx, take_option};

struct State<T>
where
    T: SimObject,
{
    entity: Rc<Entity>,
    capacity: usize,
    data: RefCell<VecDeque<T>>,
    level_change: Repeated<usize>,
}

impl<T> State<T>
where
    T: SimObject,
{
    fn level(&self) -> usize {
        self.data.borrow().len()
    }

    fn push_value(&self, value: T) -> SimResult {
        if self.level() >= self.capacity {
            return sim_error!("Overflow in {}", self.entity);
        }
        enter!(self.entity ; value.id());
        self.data.borrow_mut().push_back(value);
        self.level_change.notify_result(self.level())
    }

    fn pop_value(&self) -> Result<T, SimError> {
        let Some(value) = self.data.borrow_mut().pop_front() else {
            return sim_error!("Underflow in {}", self.entity);
        };
        exit!(self.entity ; value.id());
        self.level_change.notify_result(self.level())?;
        Ok(value)
    }
}

/// A component that can hold a configurable number of objects.
#[derive(EntityGet, EntityDisplay)]
pub struct Store<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    spawner: Spawner,
    state: Rc<State<T>>,

    tx: RefCell<Option<OutPort<T>>>,
    rx: RefCell<Option<InPort<T>>>,
}

impl<T> Store<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        capacity: usize,
    ) -> Result<Rc<Self>, SimError> {
        if capacity == 0 {
            return sim_error!("Unsupported Store with 0 capacity");
        }
        let entity = Rc::new(Entity::new(parent, name));
        let state = Rc::new(State {
            entity: entity.clone(),
            capacity,
            data: RefCell::new(VecDeque::with_capacity(capacity)),
            level_change: Repeated::new(0),
        });
        let tx = OutPort::new(&entity, "tx");
        let rx = InPort::new(engine, clock, &entity, "rx");
        let rc_self = Rc::new(Self {
            entity,
            spawner: engine.spawner(),
            state,
            tx: RefCell::new(Some(tx)),
            rx: RefCell::new(Some(rx)),
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
    pub fn fill_level(&self) -> usize {
        self.state.level()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.capacity
    }

    /// Event notified with the new fill level every time it changes.
    #[must_use]
    pub fn get_level_change_event(&self) -> Repeated<usize> {
        self.state.level_change.clone()
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Store<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        let state = self.state.clone();
        self.spawner.spawn(async move { run_rx(rx, state).await });

        let tx = take_option!(self.tx);
        let state = self.state.clone();
        self.spawner.spawn(async move { run_tx(tx, state).await });
        Ok(())
    }
}

async fn run_rx<T>(rx: InPort<T>, state: Rc<State<T>>) -> SimResult
where
    T: SimObject,
{
    loop {
        if state.level() < state.capacity {
            let value = rx.get()?.await;
            state.push_value(value)?;
        } else {
            state.level_change.listen().await;
        }
    }
}

async fn run_tx<T>(tx: OutPort<T>, state: Rc<State<T>>) -> SimResult
where
    T: SimObject,
{
    loop {
        if state.level() > 0 {
            // Only remove the value once something is ready to take it
            tx.try_put()?.await;
            let value = state.pop_value()?;
            tx.put(value)?.await;
        } else {
            state.level_change.listen().await;
        }
    }
}
