// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Build the trackers requested by the user.

use std::fs;
use std::io::{self, BufWriter};
use std::rc::Rc;

use crate::tracker::{EntityManager, MultiTracker, TextTracker, TrackConfigError};
use crate::{Tracker, Writer};

/// Configuration options for an individual tracker.
pub struct TrackerConfig<'a> {
    /// Enable this tracker.
    pub enable: bool,

    /// Set the level at which this tracker should be enabled.
    pub level: log::Level,

    /// A regular expression to match which entities should have this level
    /// applied. All other entities only emit errors.
    pub filter_regex: &'a str,

    /// If required, the name of the file to which the tracker will write.
    pub file: Option<&'a str>,
}

impl Default for TrackerConfig<'_> {
    fn default() -> Self {
        Self {
            enable: true,
            level: log::Level::Warn,
            filter_regex: "",
            file: None,
        }
    }
}

/// Configuration options for monitoring.
#[derive(Default)]
pub struct MonitorsConfig<'a> {
    /// Enable monitoring.
    pub enable: bool,

    /// Window size in clock ticks to process monitoring.
    pub window_size_ticks: u64,

    /// Regular expression for which entities should have monitoring enabled.
    pub filter_regex: &'a str,
}

/// Configuration options for all tracking/monitoring.
pub struct TrackersConfig<'a> {
    /// Configuration for stdout.
    pub stdout: TrackerConfig<'a>,

    /// Configuration for a text log file.
    pub file: TrackerConfig<'a>,

    /// Configuration for monitoring.
    pub monitors: MonitorsConfig<'a>,
}

fn build_entity_manager(
    config: &TrackerConfig,
    monitors: &MonitorsConfig,
) -> Result<EntityManager, TrackConfigError> {
    let default_level = if config.filter_regex.is_empty() {
        config.level
    } else {
        log::Level::Error
    };

    let mut entity_manager = EntityManager::new(default_level);
    if !config.filter_regex.is_empty() {
        entity_manager.add_entity_level_filter(config.filter_regex, config.level)?;
    }
    if monitors.enable {
        entity_manager
            .set_monitor_window_size_for(monitors.filter_regex, monitors.window_size_ticks)?;
    }
    Ok(entity_manager)
}

fn build_stdout_tracker(
    config: &TrackerConfig,
    monitors: &MonitorsConfig,
) -> Result<Tracker, TrackConfigError> {
    let entity_manager = build_entity_manager(config, monitors)?;
    let writer: Writer = Box::new(BufWriter::new(io::stdout()));
    Ok(Rc::new(TextTracker::new(entity_manager, writer)))
}

fn build_file_tracker(
    config: &TrackerConfig,
    monitors: &MonitorsConfig,
) -> Result<Tracker, TrackConfigError> {
    let entity_manager = build_entity_manager(config, monitors)?;
    let Some(path) = config.file else {
        return Err(TrackConfigError(
            "File tracker enabled without a file name".to_string(),
        ));
    };
    let file = fs::File::create(path)
        .map_err(|e| TrackConfigError(format!("Unable to create '{path}': {e}")))?;
    let writer: Writer = Box::new(BufWriter::new(file));
    Ok(Rc::new(TextTracker::new(entity_manager, writer)))
}

/// Set up stdout/file trackers according to the configuration.
///
/// If nothing is enabled then a default stdout tracker at `Warn` is returned.
pub fn setup_trackers(config: &TrackersConfig) -> Result<Tracker, TrackConfigError> {
    match (config.stdout.enable, config.file.enable) {
        (true, true) => {
            let mut tracker = MultiTracker::default();
            tracker.add_tracker(build_stdout_tracker(&config.stdout, &config.monitors)?);
            tracker.add_tracker(build_file_tracker(&config.file, &config.monitors)?);
            Ok(Rc::new(tracker))
        }
        (true, false) => build_stdout_tracker(&config.stdout, &config.monitors),
        (false, true) => build_file_tracker(&config.file, &config.monitors),
        (false, false) => {
            build_stdout_tracker(&TrackerConfig::default(), &MonitorsConfig::default())
        }
    }
}
