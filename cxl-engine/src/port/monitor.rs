// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Bandwidth monitor for a port.
//!
//! Counts the bytes received through a port and, once per window, emits the
//! bandwidth seen over that window as a `value` event.

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use byte_unit::{Byte, Unit};
use cxl_track::entity::Entity;
use cxl_track::value;

use crate::engine::Engine;
use crate::time::clock::Clock;
use crate::traits::{Runnable, SimObject};
use crate::types::SimResult;

pub struct Monitor {
    pub bw_entity: Rc<Entity>,
    clock: Clock,
    window_size_ticks: u64,
    bytes_in_window: Cell<usize>,
    bytes_total: Cell<usize>,
    bw_unit: Unit,
}

impl Monitor {
    #[must_use]
    pub fn new_and_register(
        engine: &Engine,
        entity: &Rc<Entity>,
        clock: &Clock,
        window_size_ticks: u64,
    ) -> Rc<Self> {
        let bw_unit = Unit::GiB;
        let bw_entity = Rc::new(Entity::new(entity, &format!("bw_{bw_unit}/s")));
        let rc_self = Rc::new(Self {
            bw_entity,
            clock: clock.clone(),
            window_size_ticks: window_size_ticks.max(1),
            bytes_in_window: Cell::new(0),
            bytes_total: Cell::new(0),
            bw_unit,
        });
        engine.register(rc_self.clone());
        rc_self
    }

    pub fn sample<T>(&self, object: &T)
    where
        T: SimObject,
    {
        self.bytes_in_window
            .set(self.bytes_in_window.get() + object.total_bytes());
    }

    #[must_use]
    pub fn bytes_total(&self) -> usize {
        self.bytes_total.get() + self.bytes_in_window.get()
    }
}

#[async_trait(?Send)]
impl Runnable for Monitor {
    async fn run(&self) -> SimResult {
        let mut last_time_ns = self.clock.time_now_ns();
        loop {
            self.clock.wait_ticks_or_exit(self.window_size_ticks).await;
            let bytes_in_window = self.bytes_in_window.replace(0);
            self.bytes_total
                .set(self.bytes_total.get() + bytes_in_window);

            let time_now_ns = self.clock.time_now_ns();
            let window_duration_s = (time_now_ns - last_time_ns) / 1e9;
            last_time_ns = time_now_ns;

            let bytes_per_second = bytes_in_window as f64 / window_duration_s;
            if let Some(per_second) = Byte::from_f64(bytes_per_second) {
                let adjusted = per_second.get_adjusted_unit(self.bw_unit);
                value!(self.bw_entity ; adjusted.get_value());
            }
        }
    }
}
