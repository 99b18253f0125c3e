// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

use cxl_track::test_helpers::create_tracker;

use crate::engine::Engine;

/// Create an engine for a test whose track output goes to a log file named
/// after the test file.
#[must_use]
pub fn start_test(full_filepath: &str) -> Engine {
    Engine::new(&create_tracker(full_filepath))
}
