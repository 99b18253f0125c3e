// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Define the [`Track`] trait and the [`Tracker`]s that implement it.

/// Include the /dev/null tracker.
pub mod dev_null;
/// Include the entity level/monitor manager.
pub mod entity_manager;
/// Include the multi-tracker.
pub mod multi_tracker;
/// Include the text-based tracker.
pub mod text;

use std::io;
use std::rc::Rc;
use std::str::FromStr;

pub use dev_null::DevNullTracker;
pub use entity_manager::EntityManager;
pub use multi_tracker::MultiTracker;
pub use text::TextTracker;

use crate::Id;

/// Error used to return configuration errors
#[derive(Debug)]
pub struct TrackConfigError(pub String);

impl std::fmt::Display for TrackConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// This is the interface that is supported by all [`Tracker`]s.
pub trait Track {
    /// Allocate a new global ID
    fn unique_id(&self) -> Id;

    /// Determine whether tracking is enabled, and at what level for an
    /// entity looked up by its ID.
    fn is_entity_enabled(&self, id: Id, level: log::Level) -> bool;

    /// Return the monitoring window size (in ticks) if monitoring is enabled
    /// for the entity with the given ID.
    fn monitoring_window_size_for(&self, id: Id) -> Option<u64>;

    /// Record an entity being created.
    fn add_entity(&self, id: Id, entity_name: &str);

    /// Track when an object with the given ID arrives at an entity.
    fn enter(&self, enter_into: Id, enter_obj: Id);

    /// Track when an object with the given ID leaves an entity.
    fn exit(&self, exit_from: Id, exit_obj: Id);

    /// Track an entity setting a value.
    fn value(&self, id: Id, value: f64);

    /// Track when an object with the given ID is created.
    fn create(&self, created_by: Id, created_obj: Id, num_bytes: usize, req_type: i8, name: &str);

    /// Track when an object with the given ID is destroyed.
    fn destroy(&self, destroyed_by: Id, destroyed_obj: Id);

    /// Track when an entity is connected to another entity
    fn connect(&self, connect_from: Id, connect_to: Id);

    /// Track a log message of the given level.
    fn log(&self, msg_by: Id, level: log::Level, msg: std::fmt::Arguments);

    /// Advance the time to the time specified in `ns`.
    fn time(&self, set_by: Id, time_ns: f64);

    /// Perform any pre-exit shutdown/cleanup
    fn shutdown(&self);
}

/// The type of a [`Tracker`] that is shared across entities.
pub type Tracker = Rc<dyn Track>;

/// Create a [`Tracker`] that prints all track events to `stdout`.
#[must_use]
pub fn stdout_tracker(level: log::Level) -> Tracker {
    let stdout_writer = Box::new(io::BufWriter::new(io::stdout()));
    Rc::new(TextTracker::new(EntityManager::new(level), stdout_writer))
}

/// Create a [`Tracker`] that suppresses all track events.
#[must_use]
pub fn dev_null_tracker() -> Tracker {
    Rc::new(DevNullTracker::default())
}

/// Take a level string (e.g. from the command-line) and convert it to a
/// [`log::Level`].
pub fn str_to_level(lvl: &str) -> Result<log::Level, TrackConfigError> {
    log::Level::from_str(lvl)
        .map_err(|_| TrackConfigError(format!("Unable to parse level string '{lvl}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_levels() {
        assert_eq!(str_to_level("trace").unwrap(), log::Level::Trace);
        assert_eq!(str_to_level("Warn").unwrap(), log::Level::Warn);
        assert!(str_to_level("loud").is_err());
    }

    #[test]
    fn dev_null_ids_are_unique() {
        let tracker = dev_null_tracker();
        let first = tracker.unique_id();
        assert_ne!(first, tracker.unique_id());
    }
}
