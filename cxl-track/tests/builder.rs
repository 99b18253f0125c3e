// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use std::fs;

use cxl_track::builder::{MonitorsConfig, TrackerConfig, TrackersConfig, setup_trackers};
use cxl_track::entity::{Entity, toplevel};
use cxl_track::{Track, info, trace};

#[test]
fn file_tracker_writes_enabled_levels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sim.log");
    let path_str = path.to_str().unwrap();

    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        file: TrackerConfig {
            enable: true,
            level: log::Level::Info,
            filter_regex: "",
            file: Some(path_str),
        },
        monitors: MonitorsConfig::default(),
    };
    let tracker = setup_trackers(&config).unwrap();
    {
        let top = toplevel(&tracker, "top");
        let link = Entity::new(&top, "link");
        info!(link ; "link up");
        trace!(link ; "not written");
    }
    tracker.shutdown();
    drop(tracker);

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("INFO: link up"));
    assert!(!contents.contains("not written"));
}

#[test]
fn filter_regex_limits_entities() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filtered.log");
    let path_str = path.to_str().unwrap();

    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        file: TrackerConfig {
            enable: true,
            level: log::Level::Debug,
            filter_regex: "top::link",
            file: Some(path_str),
        },
        monitors: MonitorsConfig::default(),
    };
    let tracker = setup_trackers(&config).unwrap();
    {
        let top = toplevel(&tracker, "top");
        let link = Entity::new(&top, "link");
        let other = Entity::new(&top, "other");
        info!(link ; "from link");
        info!(other ; "from other");
    }
    tracker.shutdown();
    drop(tracker);

    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("from link"));
    assert!(!contents.contains("from other"));
}

#[test]
fn file_tracker_needs_a_file_name() {
    let config = TrackersConfig {
        stdout: TrackerConfig {
            enable: false,
            ..Default::default()
        },
        file: TrackerConfig {
            enable: true,
            ..Default::default()
        },
        monitors: MonitorsConfig::default(),
    };
    let Err(err) = setup_trackers(&config) else {
        panic!("Expected an error without a file name");
    };
    assert_eq!(err.0, "File tracker enabled without a file name");
}
