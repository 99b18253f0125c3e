// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Helper functions for testing track output.
//!
//! The [`TestTracker`] keeps all events in memory so that tests can check
//! exactly what was emitted.

use std::cell::{Cell, RefCell};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use regex::Regex;

use crate::tracker::{EntityManager, TextTracker};
use crate::{Id, Track, Tracker, Writer};

/// A tracker that keeps track events in memory.
pub struct TestTracker {
    events: RefCell<Vec<String>>,
    next_id: Cell<u64>,
}

impl TestTracker {
    /// Create a new tracker whose first allocated ID is `initial_id`.
    #[must_use]
    pub fn new(initial_id: u64) -> Self {
        Self {
            events: RefCell::new(Vec::new()),
            next_id: Cell::new(initial_id),
        }
    }

    fn add_event(&self, event: String) {
        println!("{event}");
        self.events.borrow_mut().push(event);
    }
}

impl Track for TestTracker {
    fn unique_id(&self) -> Id {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Id(id)
    }

    fn is_entity_enabled(&self, _id: Id, _level: log::Level) -> bool {
        true
    }

    fn monitoring_window_size_for(&self, _id: Id) -> Option<u64> {
        None
    }

    fn add_entity(&self, _id: Id, _entity_name: &str) {}

    fn enter(&self, id: Id, item: Id) {
        self.add_event(format!("{id}: enter {item}"));
    }

    fn exit(&self, id: Id, item: Id) {
        self.add_event(format!("{id}: exit {item}"));
    }

    fn value(&self, id: Id, value: f64) {
        self.add_event(format!("{id}: value {value}"));
    }

    fn create(&self, created_by: Id, id: Id, num_bytes: usize, req_type: i8, name: &str) {
        self.add_event(format!(
            "{created_by}: created {id}, {name}, {req_type}, {num_bytes} bytes"
        ));
    }

    fn destroy(&self, destroyed_by: Id, id: Id) {
        self.add_event(format!("{destroyed_by}: destroyed {id}"));
    }

    fn connect(&self, connect_from: Id, connect_to: Id) {
        self.add_event(format!("{connect_from}: connect to {connect_to}"));
    }

    fn log(&self, id: Id, level: log::Level, msg: std::fmt::Arguments) {
        self.add_event(format!("{id}:{level}: {msg}"));
    }

    fn time(&self, set_by: Id, time_ns: f64) {
        self.add_event(format!("{set_by}: set time to {time_ns:.1}ns"));
    }

    fn shutdown(&self) {}
}

/// Create a [`TestTracker`] and the [`Tracker`] handle to pass to the code
/// under test.
///
/// # Examples
///
/// ```
/// use cxl_track::test_helpers;
///
/// let (test_tracker, tracker) = cxl_track::test_init!(10);
/// let _top = cxl_track::entity::toplevel(&tracker, "top");
/// test_helpers::check_and_clear(&test_tracker, &["0: created 10, top"]);
/// ```
#[macro_export]
macro_rules! test_init {
    ($start_id:expr) => {{
        let test_tracker = std::rc::Rc::new($crate::test_helpers::TestTracker::new($start_id));
        let tracker: $crate::Tracker = test_tracker.clone();
        (test_tracker, tracker)
    }};
}

/// Check and clear the events recorded by a [`TestTracker`].
///
/// Each event seen since creation (or the last call) must match the
/// corresponding regular expression in `expected`.
pub fn check_and_clear(tracker: &TestTracker, expected: &[&str]) {
    let mut events = tracker.events.borrow_mut();

    assert_eq!(
        expected.len(),
        events.len(),
        "Expected {expected:?}, saw {:?}",
        *events
    );

    for (pattern, actual) in expected.iter().zip(events.iter()) {
        let re = Regex::new(pattern).unwrap();
        assert!(re.is_match(actual), "{pattern:?} does not match {actual:?}");
    }

    events.clear();
}

fn log_path_for(full_filepath: &str) -> PathBuf {
    let stem = Path::new(full_filepath)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("test");
    std::env::temp_dir()
        .join("cxl-test-logs")
        .join(format!("{stem}.log"))
}

/// Create a [`Tracker`] that writes all `Trace` level events of a test to a
/// log file named after the test source file.
///
/// Tests should pass `file!()` as the argument.
#[must_use]
pub fn create_tracker(full_filepath: &str) -> Tracker {
    let path = log_path_for(full_filepath);
    let writer: Writer = match path
        .parent()
        .map(fs::create_dir_all)
        .transpose()
        .and_then(|_| fs::File::create(&path))
    {
        Ok(file) => Box::new(BufWriter::new(file)),
        Err(_) => Box::new(std::io::sink()),
    };
    Rc::new(TextTracker::new(EntityManager::new(log::Level::Trace), writer))
}
