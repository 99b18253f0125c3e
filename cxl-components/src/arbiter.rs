// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Arbitration policies.
//!
//! A policy chooses which of a number of requesting inputs is granted next.
//! Components that arbitrate keep their own per-input queues and ask the
//! policy for a grant whenever the shared resource becomes free.

use std::rc::Rc;

use cxl_track::entity::Entity;
use cxl_track::trace;

pub trait Arbitrate {
    /// Choose one of the inputs for which `requesting` is true.
    ///
    /// Returns `None` if no input is requesting.
    fn arbitrate(&mut self, entity: &Rc<Entity>, requesting: &[bool]) -> Option<usize>;
}

/// Grant inputs in turn, starting the search after the last granted input.
///
/// With every input continuously requesting, any window of N consecutive
/// grants contains each of the N inputs exactly once.
#[derive(Default)]
pub struct RoundRobinPolicy {
    candidate: usize,
}

impl RoundRobinPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Arbitrate for RoundRobinPolicy {
    fn arbitrate(&mut self, entity: &Rc<Entity>, requesting: &[bool]) -> Option<usize> {
        let num_inputs = requesting.len();
        let granted = (0..num_inputs)
            .map(|i| (i + self.candidate) % num_inputs)
            .find(|&index| requesting[index])?;
        trace!(entity ; "round robin: granted {granted} of {requesting:?}");
        self.candidate = (granted + 1) % num_inputs;
        Some(granted)
    }
}

#[cfg(test)]
mod tests {
    use cxl_track::entity::toplevel;
    use cxl_track::tracker::dev_null_tracker;

    use super::*;

    #[test]
    fn each_input_once_per_window() {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut policy = RoundRobinPolicy::new();
        let all = [true; 4];

        let grants: Vec<usize> = (0..12)
            .filter_map(|_| policy.arbitrate(&top, &all))
            .collect();
        for window in grants.windows(4) {
            let mut sorted = window.to_vec();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn skips_idle_inputs() {
        let top = toplevel(&dev_null_tracker(), "top");
        let mut policy = RoundRobinPolicy::new();

        assert_eq!(policy.arbitrate(&top, &[false, true, false, true]), Some(1));
        assert_eq!(policy.arbitrate(&top, &[true, true, false, true]), Some(3));
        assert_eq!(policy.arbitrate(&top, &[true, true, false, true]), Some(0));
        assert_eq!(policy.arbitrate(&top, &[false; 4]), None);
        assert_eq!(policy.arbitrate(&top, &[]), None);
    }
}
