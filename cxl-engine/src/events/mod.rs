// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Events that tasks can `listen()` to and be woken when they are notified.

pub mod once;
pub mod repeated;
