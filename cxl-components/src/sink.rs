// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A component that accepts everything sent to it and counts it.
//!
//! The time at which each value arrived is kept so tests can check the timing
//! of the models feeding the sink.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use cxl_engine::engine::Engine;
use cxl_engine::port::{InPort, PortStateResult};
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::{Runnable, SimObject};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::enter;
use cxl_track::entity::Entity;

use crate::{port_rx, take_option};

#[derive(EntityGet, EntityDisplay)]
pub struct Sink<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    clock: Clock,
    sunk_count: Cell<usize>,
    arrivals: RefCell<Vec<(u64, T)>>,
    rx: RefCell<Option<InPort<T>>>,
}

impl<T> Sink<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(engine, clock, &entity, "rx");
        let rc_self = Rc::new(Self {
            entity,
            clock: clock.clone(),
            sunk_count: Cell::new(0),
            arrivals: RefCell::new(Vec::new()),
            rx: RefCell::new(Some(rx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn port_rx(&self) -> PortStateResult<T> {
        port_rx!(self.rx, state)
    }

    #[must_use]
    pub fn num_sunk(&self) -> usize {
        self.sunk_count.get()
    }

    /// The tick at which each value arrived, in arrival order.
    #[must_use]
    pub fn arrivals(&self) -> Vec<(u64, T)> {
        self.arrivals.borrow().clone()
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Sink<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        loop {
            let value = rx.get()?.await;
            enter!(self.entity ; value.id());
            self.sunk_count.set(self.sunk_count.get() + 1);
            self.arrivals
                .borrow_mut()
                .push((self.clock.tick_now(), value));
        }
    }
}
