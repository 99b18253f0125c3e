// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Convert an amount of data into the number of clock ticks it takes to pass
//! through an interface of a given bandwidth.
//!
//! The bandwidth is given in bits per tick and may be fractional, for example
//! a 16 lane link at 31 Gb/s per lane carries 49.6 bits per tick of a 10 GHz
//! clock.

use cxl_engine::sim_error;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::TotalBytes;
use cxl_engine::types::SimError;

/// Tolerance for exact multiples that suffer from rounding errors.
const BITS_EPSILON: f64 = 1e-9;

#[derive(Clone, Debug)]
pub struct RateLimiter {
    /// Clock rate limiter is attached to.
    clock: Clock,

    /// Bits per tick that can pass through this interface.
    bits_per_tick: f64,
}

impl RateLimiter {
    pub fn new(clock: &Clock, bits_per_tick: f64) -> Result<Self, SimError> {
        if !(bits_per_tick > 0.0 && bits_per_tick.is_finite()) {
            return sim_error!("Invalid rate limit of {bits_per_tick} bits per tick");
        }
        Ok(Self {
            clock: clock.clone(),
            bits_per_tick,
        })
    }

    /// Build a limiter for an interface of `gbps` giga-bits per second.
    pub fn from_gbps(clock: &Clock, gbps: f64) -> Result<Self, SimError> {
        Self::new(clock, gbps * 1000.0 / clock.freq_mhz())
    }

    #[must_use]
    pub fn bits_per_tick(&self) -> f64 {
        self.bits_per_tick
    }

    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Ticks taken by an object to pass through.
    #[must_use]
    pub fn ticks<T>(&self, value: &T) -> u64
    where
        T: TotalBytes,
    {
        self.ticks_from_bits(value.total_bytes() * 8)
    }

    #[must_use]
    pub fn ticks_from_bits(&self, bits: usize) -> u64 {
        let ticks = bits as f64 / self.bits_per_tick;
        (ticks - BITS_EPSILON).ceil().max(0.0) as u64
    }

    /// Wait for the time taken by the object to pass through.
    pub async fn delay<T>(&self, value: &T)
    where
        T: TotalBytes,
    {
        self.clock.wait_ticks(self.ticks(value)).await;
    }
}
