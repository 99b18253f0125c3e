// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! A clock gives components a view of the global timeline in ticks of a
//! given frequency.
//!
//! The current tick of a clock is the first edge at or after the current
//! global time, so waiting on a clock always resumes on one of its edges.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::time::{Action, SimTime};
use crate::types::SimResult;

/// Tolerance used when converting `ns` to ticks to absorb rounding errors.
const TICK_EPSILON: f64 = 1e-6;

/// State representing a clock.
#[derive(Clone)]
pub struct Clock {
    /// Frequency of the clock in MHz.
    freq_mhz: f64,

    time: Rc<SimTime>,
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Clock({}MHz)", self.freq_mhz)
    }
}

impl Clock {
    pub(crate) fn new(freq_mhz: f64, time: Rc<SimTime>) -> Self {
        Self { freq_mhz, time }
    }

    /// Returns the clocks frequency in MHz.
    #[must_use]
    pub fn freq_mhz(&self) -> f64 {
        self.freq_mhz
    }

    /// Returns the current tick.
    #[must_use]
    pub fn tick_now(&self) -> u64 {
        let ticks = self.time.now_ns() * self.freq_mhz / 1000.0;
        (ticks - TICK_EPSILON).ceil().max(0.0) as u64
    }

    /// Returns the current global time in `ns`.
    #[must_use]
    pub fn time_now_ns(&self) -> f64 {
        self.time.now_ns()
    }

    /// Convert the given tick of this clock to a time in `ns`.
    #[must_use]
    pub fn to_ns(&self, tick: u64) -> f64 {
        tick as f64 * 1000.0 / self.freq_mhz
    }

    /// Returns a [ClockDelay] future which must be `await`ed to delay the
    /// specified number of ticks.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks(&self, ticks: u64) -> ClockDelay {
        self.delay(ticks, false)
    }

    /// As [`wait_ticks`](Self::wait_ticks) except that, if the remainder of
    /// the simulation completes, this future is allowed to never complete.
    /// This allows background tasks that run as long as anything else does.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_ticks_or_exit(&self, ticks: u64) -> ClockDelay {
        self.delay(ticks, true)
    }

    /// Wait until the given absolute tick. Returns immediately if it has
    /// already passed.
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    pub fn wait_until(&self, tick: u64) -> ClockDelay {
        self.delay(tick.saturating_sub(self.tick_now()), false)
    }

    fn delay(&self, ticks: u64, can_exit: bool) -> ClockDelay {
        ClockDelay {
            time: self.time.clone(),
            until_ns: self.to_ns(self.tick_now() + ticks),
            scheduled: false,
            can_exit,
        }
    }

    /// Register a callback to run `ticks` from now on the global event queue.
    ///
    /// Callbacks scheduled for the same time run in the order they were
    /// scheduled. An error returned by the callback stops the simulation.
    pub fn schedule(&self, ticks: u64, callback: impl FnOnce() -> SimResult + 'static) {
        let at_ns = self.to_ns(self.tick_now() + ticks);
        self.time.push(at_ns, Action::Call(Box::new(callback)));
    }
}

/// Future returned by the clock to manage advancing time using async
/// functions.
pub struct ClockDelay {
    time: Rc<SimTime>,
    until_ns: f64,
    scheduled: bool,
    can_exit: bool,
}

impl Future for ClockDelay {
    type Output = ();
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.scheduled {
            if self.time.now_ns() >= self.until_ns {
                return Poll::Ready(());
            }
            // Woken by something other than the queue entry, keep waiting.
            return Poll::Pending;
        }
        self.scheduled = true;
        let action = Action::Wake {
            waker: cx.waker().clone(),
            can_exit: self.can_exit,
        };
        self.time.push(self.until_ns, action);
        Poll::Pending
    }
}
