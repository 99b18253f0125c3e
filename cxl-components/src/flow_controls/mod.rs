// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Components and helpers that limit the flow of data.

pub mod rate_limiter;
