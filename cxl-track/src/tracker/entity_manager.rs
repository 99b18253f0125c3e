// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use regex::Regex;

use crate::tracker::TrackConfigError;
use crate::{Id, ROOT};

/// The [`EntityManager`] is responsible for determining entity log / trace
/// enable states and which entities have monitoring enabled.
///
/// Filters are applied in the order they were added and the first match wins.
///
/// This manager is also used to allocate unique [`Id`] values.
pub struct EntityManager {
    default_entity_level: log::Level,
    level_filters: Vec<(Regex, log::Level)>,
    monitor_filters: Vec<(Regex, u64)>,
    next_id: Cell<u64>,

    /// Only entities whose level differs from the default are stored.
    entity_levels: RefCell<HashMap<Id, log::Level>>,
    monitor_windows: RefCell<HashMap<Id, u64>>,
}

fn compile(regex_str: &str) -> Result<Regex, TrackConfigError> {
    Regex::new(regex_str)
        .map_err(|e| TrackConfigError(format!("Failed to parse regex {regex_str}:\n{e}\n")))
}

impl EntityManager {
    /// Constructor with default [`log::Level`]
    #[must_use]
    pub fn new(default_entity_level: log::Level) -> Self {
        Self {
            default_entity_level,
            level_filters: Vec::new(),
            monitor_filters: Vec::new(),
            next_id: Cell::new(ROOT.0 + 1),
            entity_levels: RefCell::new(HashMap::new()),
            monitor_windows: RefCell::new(HashMap::new()),
        }
    }

    /// Add a filter regular expression to set matching entites to a given
    /// level.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cxl_track::tracker::EntityManager;
    /// let mut manager = EntityManager::new(log::Level::Warn);
    /// manager.add_entity_level_filter(".*xbar.*", log::Level::Trace).unwrap();
    /// ```
    pub fn add_entity_level_filter(
        &mut self,
        regex_str: &str,
        level: log::Level,
    ) -> Result<(), TrackConfigError> {
        self.level_filters.push((compile(regex_str)?, level));
        Ok(())
    }

    /// Enable monitoring with the given window size (in ticks) for entities
    /// that match the regular expression.
    pub fn set_monitor_window_size_for(
        &mut self,
        regex_str: &str,
        window_size_ticks: u64,
    ) -> Result<(), TrackConfigError> {
        self.monitor_filters
            .push((compile(regex_str)?, window_size_ticks));
        Ok(())
    }

    pub(crate) fn unique_id(&self) -> Id {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Id(id)
    }

    pub(crate) fn is_log_enabled_at_level(&self, id: Id, level: log::Level) -> bool {
        let entity_level = self
            .entity_levels
            .borrow()
            .get(&id)
            .copied()
            .unwrap_or(self.default_entity_level);
        level <= entity_level
    }

    pub(crate) fn monitoring_window_size_for(&self, id: Id) -> Option<u64> {
        self.monitor_windows.borrow().get(&id).copied()
    }

    pub(crate) fn add_entity(&self, id: Id, entity_name: &str) {
        let level = self.log_level_for(entity_name);
        if level != self.default_entity_level {
            self.entity_levels.borrow_mut().insert(id, level);
        }
        if let Some(window_size_ticks) = self.monitor_window_for(entity_name) {
            self.monitor_windows
                .borrow_mut()
                .insert(id, window_size_ticks);
        }
    }

    fn log_level_for(&self, entity_name: &str) -> log::Level {
        self.level_filters
            .iter()
            .find(|(regex, _)| regex.is_match(entity_name))
            .map_or(self.default_entity_level, |(_, level)| *level)
    }

    fn monitor_window_for(&self, entity_name: &str) -> Option<u64> {
        self.monitor_filters
            .iter()
            .find(|(regex, _)| regex.is_match(entity_name))
            .map(|(_, window)| *window)
    }
}

#[cfg(test)]
mod tests {
    use log::Level;

    use super::*;

    fn entity_paths() -> Vec<&'static str> {
        vec!["top", "top::xbar", "top::xbar::port0", "top::xbar::port1"]
    }

    fn check_levels(manager: &EntityManager, expected: &[Level]) {
        for (path, level) in entity_paths().iter().zip(expected) {
            assert_eq!(manager.log_level_for(path), *level, "level for {path}");
        }
    }

    #[test]
    fn no_filters() {
        let manager = EntityManager::new(Level::Error);
        check_levels(&manager, &[Level::Error; 4]);
    }

    #[test]
    fn filter_xbar_trace() {
        let mut manager = EntityManager::new(Level::Error);
        manager
            .add_entity_level_filter(r".*xbar.*", Level::Trace)
            .unwrap();
        check_levels(
            &manager,
            &[Level::Error, Level::Trace, Level::Trace, Level::Trace],
        );
    }

    #[test]
    fn filter_port0_error() {
        let mut manager = EntityManager::new(Level::Warn);
        manager
            .add_entity_level_filter(r".*port0", Level::Error)
            .unwrap();
        check_levels(
            &manager,
            &[Level::Warn, Level::Warn, Level::Error, Level::Warn],
        );
    }

    #[test]
    fn first_filter_wins() {
        let mut manager = EntityManager::new(Level::Error);
        manager
            .add_entity_level_filter(r".*port0", Level::Info)
            .unwrap();
        manager
            .add_entity_level_filter(r".*xbar.*", Level::Trace)
            .unwrap();
        manager
            .add_entity_level_filter(r"top.*", Level::Warn)
            .unwrap();
        check_levels(
            &manager,
            &[Level::Warn, Level::Trace, Level::Info, Level::Trace],
        );
    }

    #[test]
    fn bad_regex() {
        let mut manager = EntityManager::new(Level::Error);
        assert!(manager.add_entity_level_filter(r"(", Level::Info).is_err());
        assert!(manager.set_monitor_window_size_for(r"[", 10).is_err());
    }

    #[test]
    fn monitor_windows() {
        let mut manager = EntityManager::new(Level::Error);
        manager
            .set_monitor_window_size_for(r".*port1", 250)
            .unwrap();

        let ids: Vec<Id> = entity_paths()
            .iter()
            .map(|path| {
                let id = manager.unique_id();
                manager.add_entity(id, path);
                id
            })
            .collect();

        assert_eq!(manager.monitoring_window_size_for(ids[2]), None);
        assert_eq!(manager.monitoring_window_size_for(ids[3]), Some(250));
    }

    #[test]
    fn ids() {
        let manager = EntityManager::new(Level::Error);
        for i in 0..10 {
            assert_eq!(manager.unique_id(), Id(i + ROOT.0 + 1));
        }
    }
}
