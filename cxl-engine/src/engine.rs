// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The simulation [`Engine`].
//!
//! The engine owns the executor, hands out clocks and spawns every registered
//! component when the simulation is run.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use cxl_track::Tracker;
use cxl_track::entity::{Entity, toplevel};
use cxl_track::tracker::stdout_tracker;

use crate::executor::{self, Executor, Spawner};
use crate::time::clock::Clock;
use crate::types::{Component, SimResult};

/// Use a default clock frequency of 1GHz.
const DEFAULT_CLOCK_MHZ: f64 = 1000.0;

pub struct Engine {
    executor: Executor,
    spawner: Spawner,
    toplevel: Rc<Entity>,
    tracker: Tracker,
    components: RefCell<Vec<Component>>,
}

impl Engine {
    /// Create a standalone engine.
    #[must_use]
    pub fn new(tracker: &Tracker) -> Self {
        let toplevel = toplevel(tracker, "top");
        let (executor, spawner) = executor::new_executor_and_spawner(&toplevel);
        Self {
            executor,
            spawner,
            toplevel,
            tracker: tracker.clone(),
            components: RefCell::new(Vec::new()),
        }
    }

    /// Register a component whose `run()` is spawned when the simulation
    /// starts.
    pub fn register(&self, component: Component) {
        self.components.borrow_mut().push(component);
    }

    /// Spawn all registered components and run the simulation to completion.
    pub fn run(&mut self) -> SimResult {
        for component in self.components.borrow_mut().drain(..) {
            self.executor.spawn(async move { component.run().await });
        }
        self.executor.run()
    }

    pub fn spawn(&self, future: impl Future<Output = SimResult> + 'static) {
        self.executor.spawn(future);
    }

    #[must_use]
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    #[must_use]
    pub fn default_clock(&self) -> Clock {
        self.executor.get_clock(DEFAULT_CLOCK_MHZ)
    }

    #[must_use]
    pub fn clock_mhz(&self, freq_mhz: f64) -> Clock {
        self.executor.get_clock(freq_mhz)
    }

    #[must_use]
    pub fn clock_ghz(&self, freq_ghz: f64) -> Clock {
        self.executor.get_clock(freq_ghz * 1000.0)
    }

    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.executor.time_now_ns()
    }

    #[must_use]
    pub fn top(&self) -> &Rc<Entity> {
        &self.toplevel
    }

    #[must_use]
    pub fn tracker(&self) -> Tracker {
        self.tracker.clone()
    }
}

/// Create a default engine that sends [`Track`](cxl_track::Track) events to
/// stdout.
///
/// This is provided to keep documentation examples simple.
impl Default for Engine {
    fn default() -> Self {
        Self::new(&stdout_tracker(log::Level::Warn))
    }
}
