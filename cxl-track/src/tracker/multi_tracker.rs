// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use crate::Id;
use crate::tracker::{EntityManager, Track, Tracker};

/// Fan-out of track events to a number of [`Tracker`]s.
///
/// Each event is only forwarded to the trackers that have the source entity
/// enabled.
pub struct MultiTracker {
    // Only used to allocate IDs shared by all contained trackers.
    ids: EntityManager,
    trackers: Vec<Tracker>,
}

impl MultiTracker {
    /// Add a new tracker
    pub fn add_tracker(&mut self, tracker: Tracker) {
        self.trackers.push(tracker);
    }

    fn enabled(&self, id: Id, level: log::Level) -> impl Iterator<Item = &Tracker> {
        self.trackers
            .iter()
            .filter(move |t| t.is_entity_enabled(id, level))
    }
}

impl Default for MultiTracker {
    fn default() -> Self {
        Self {
            ids: EntityManager::new(log::Level::Error),
            trackers: Vec::new(),
        }
    }
}

impl Track for MultiTracker {
    fn unique_id(&self) -> Id {
        self.ids.unique_id()
    }

    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool {
        self.trackers.iter().any(|t| t.is_entity_enabled(id, level))
    }

    fn monitoring_window_size_for(&self, id: Id) -> Option<u64> {
        self.trackers
            .iter()
            .find_map(|t| t.monitoring_window_size_for(id))
    }

    fn add_entity(&self, id: Id, entity_name: &str) {
        for tracker in &self.trackers {
            tracker.add_entity(id, entity_name);
        }
    }

    fn enter(&self, id: Id, object: Id) {
        self.enabled(id, log::Level::Trace)
            .for_each(|t| t.enter(id, object));
    }

    fn exit(&self, id: Id, object: Id) {
        self.enabled(id, log::Level::Trace)
            .for_each(|t| t.exit(id, object));
    }

    fn value(&self, id: Id, value: f64) {
        self.enabled(id, log::Level::Trace)
            .for_each(|t| t.value(id, value));
    }

    fn create(&self, created_by: Id, id: Id, num_bytes: usize, req_type: i8, name: &str) {
        self.enabled(created_by, log::Level::Trace)
            .for_each(|t| t.create(created_by, id, num_bytes, req_type, name));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.enabled(destroyed_by, log::Level::Trace)
            .for_each(|t| t.destroy(destroyed_by, id));
    }

    fn connect(&self, connect_from: Id, connect_to: Id) {
        self.enabled(connect_from, log::Level::Trace)
            .for_each(|t| t.connect(connect_from, connect_to));
    }

    fn log(&self, id: Id, level: log::Level, msg: std::fmt::Arguments) {
        self.enabled(id, level).for_each(|t| t.log(id, level, msg));
    }

    fn time(&self, set_by: Id, time_ns: f64) {
        self.enabled(set_by, log::Level::Trace)
            .for_each(|t| t.time(set_by, time_ns));
    }

    fn shutdown(&self) {
        self.trackers.iter().for_each(|t| t.shutdown());
    }
}
