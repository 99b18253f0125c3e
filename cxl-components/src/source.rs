// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A component that sends every value produced by a
//! [DataGenerator](crate::types::DataGenerator) on its `tx` port.
//!
//! # Ports
//!
//!  - One [output port](cxl_engine::port::OutPort): `tx`

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_engine::engine::Engine;
use cxl_engine::port::{OutPort, PortStateResult};
use cxl_engine::traits::{Runnable, SimObject};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::exit;

use crate::types::DataGenerator;
use crate::{connect_tx, take_option};

#[macro_export]
/// Build an optional [DataGenerator](crate::types::DataGenerator) that
/// repeats a value a number of times.
macro_rules! option_box_repeat {
    ($value:expr ; $repeat:expr) => {
        Some(Box::new(std::iter::repeat($value).take($repeat)))
    };
}

#[derive(EntityGet, EntityDisplay)]
pub struct Source<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    data_generator: RefCell<Option<DataGenerator<T>>>,
    tx: RefCell<Option<OutPort<T>>>,
}

impl<T> Source<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        parent: &Rc<Entity>,
        name: &str,
        data_generator: Option<DataGenerator<T>>,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let tx = OutPort::new(&entity, "tx");
        let rc_self = Rc::new(Self {
            entity,
            data_generator: RefCell::new(data_generator),
            tx: RefCell::new(Some(tx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx(&self, port_state: PortStateResult<T>) -> SimResult {
        connect_tx!(self.tx, connect ; port_state)
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Source<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let Some(data_generator) = self.data_generator.borrow_mut().take() else {
            return Ok(());
        };

        let tx = take_option!(self.tx);
        for value in data_generator {
            exit!(self.entity ; value.id());
            tx.put(value)?.await;
        }
        Ok(())
    }
}
