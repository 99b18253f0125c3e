// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Simulation time.
//!
//! There is a single global timeline measured in `ns`. Everything that needs
//! to happen in the future is an entry in one time-ordered event queue: either
//! a suspended task waiting for a [`Clock`](clock::Clock) delay or a callback
//! registered with [`Clock::schedule`](clock::Clock::schedule).
//!
//! Entries are ordered by time and then by the order in which they were
//! scheduled, so events at the same time are processed first-in first-out.

pub mod clock;

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::task::Waker;

use crate::types::SimResult;

/// A callback that is run when its scheduled time is reached.
pub type Callback = Box<dyn FnOnce() -> SimResult>;

pub(crate) enum Action {
    /// Wake a suspended task.
    Wake {
        waker: Waker,

        /// Background tasks (e.g. monitors) are allowed to never complete. The
        /// simulation finishes when only these remain.
        can_exit: bool,
    },
    Call(Callback),
}

impl Action {
    fn keeps_alive(&self) -> bool {
        !matches!(self, Action::Wake { can_exit: true, .. })
    }
}

pub(crate) struct Scheduled {
    pub(crate) time_ns: f64,
    seq: u64,
    pub(crate) action: Action,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reversed so that the `BinaryHeap` pops the earliest entry first.
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time_ns
            .total_cmp(&self.time_ns)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The global timeline shared by the executor and all clocks.
pub struct SimTime {
    now_ns: Cell<f64>,
    queue: RefCell<BinaryHeap<Scheduled>>,
    next_seq: Cell<u64>,

    /// Number of queued entries that keep the simulation running.
    keep_alive: Cell<usize>,
}

impl SimTime {
    pub(crate) fn new() -> Self {
        Self {
            now_ns: Cell::new(0.0),
            queue: RefCell::new(BinaryHeap::new()),
            next_seq: Cell::new(0),
            keep_alive: Cell::new(0),
        }
    }

    /// Current simulation time in `ns`.
    #[must_use]
    pub fn now_ns(&self) -> f64 {
        self.now_ns.get()
    }

    pub(crate) fn push(&self, time_ns: f64, action: Action) {
        debug_assert!(time_ns >= self.now_ns(), "Scheduling in the past");
        if action.keeps_alive() {
            self.keep_alive.set(self.keep_alive.get() + 1);
        }
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.queue.borrow_mut().push(Scheduled {
            time_ns: time_ns.max(self.now_ns()),
            seq,
            action,
        });
    }

    /// Remove the next entry and advance time to it.
    ///
    /// Returns `None` when nothing is left that would keep the simulation
    /// running.
    pub(crate) fn pop(&self) -> Option<Scheduled> {
        if self.keep_alive.get() == 0 {
            return None;
        }
        let next = self.queue.borrow_mut().pop()?;
        if next.action.keeps_alive() {
            self.keep_alive.set(self.keep_alive.get() - 1);
        }
        self.now_ns.set(next.time_ns);
        Some(next)
    }

    /// Number of entries still in the queue.
    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> Action {
        Action::Call(Box::new(|| Ok(())))
    }

    #[test]
    fn earliest_first_then_fifo() {
        let time = SimTime::new();
        time.push(5.0, call());
        time.push(1.0, call());
        time.push(5.0, call());
        time.push(3.0, call());

        let order: Vec<(f64, u64)> = std::iter::from_fn(|| time.pop())
            .map(|s| (s.time_ns, s.seq))
            .collect();
        assert_eq!(order, vec![(1.0, 1), (3.0, 3), (5.0, 0), (5.0, 2)]);
        assert_eq!(time.now_ns(), 5.0);
    }

    #[test]
    fn background_entries_do_not_keep_alive() {
        let time = SimTime::new();
        time.push(
            2.0,
            Action::Wake {
                waker: futures::task::noop_waker(),
                can_exit: true,
            },
        );
        assert!(time.pop().is_none());
        assert_eq!(time.num_pending(), 1);

        time.push(10.0, call());
        // The background entry is earlier so it is still processed first.
        assert_eq!(time.pop().map(|s| s.time_ns), Some(2.0));
        assert_eq!(time.pop().map(|s| s.time_ns), Some(10.0));
        assert!(time.pop().is_none());
    }
}
