// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! One direction of a serial link.
//!
//! A [LinkBuffer] holds up to `capacity` packets that have been accepted by
//! the link but not yet taken by the far side. Packets are packed into flits
//! on entry and unpacked on exit. They are serialized one after the other so a
//! packet starts transferring once the link is free and is ready
//! `fixed_delay_ticks` after its last bit was sent:
//!
//! ```txt
//! start = max(now, link_free)
//! ready = start + ceil(size * 8 / (num_lanes * lane_speed)) + fixed_delay
//! ```
//!
//! A packet taken from the front keeps its slot until it is
//! [released](LinkBuffer::release), which is when the consumer accepted it.

use std::collections::VecDeque;

use cxl_components::flow_controls::rate_limiter::RateLimiter;
use cxl_engine::time::clock::Clock;

use crate::error::{CxlError, PacketContext};
use crate::flit::{Flit, FlitFormat};
use crate::packet::Packet;

#[derive(Clone, Debug, PartialEq)]
pub struct LinkConfig {
    pub num_lanes: usize,
    pub lane_speed_gbps: f64,
    pub fixed_delay_ticks: u64,
    pub capacity: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub packets: u64,
    pub flits: u64,
    pub bytes: u64,
}

struct InFlight {
    flits: Vec<Flit>,
    ready_tick: u64,
    context: PacketContext,
}

pub struct LinkBuffer {
    capacity: usize,
    format: FlitFormat,
    limiter: RateLimiter,
    fixed_delay_ticks: u64,
    link_free_tick: u64,
    queue: VecDeque<InFlight>,
    reserved: usize,
    stats: LinkStats,
}

impl LinkBuffer {
    pub fn new(clock: &Clock, config: &LinkConfig) -> Result<Self, CxlError> {
        if config.capacity == 0 {
            return Err(CxlError::Configuration(
                "link buffer size must be greater than 0".to_string(),
            ));
        }
        let format = FlitFormat::new(config.num_lanes)?;
        let limiter =
            RateLimiter::from_gbps(clock, config.num_lanes as f64 * config.lane_speed_gbps)?;
        Ok(Self {
            capacity: config.capacity,
            format,
            limiter,
            fixed_delay_ticks: config.fixed_delay_ticks,
            link_free_tick: 0,
            queue: VecDeque::with_capacity(config.capacity),
            reserved: 0,
            stats: LinkStats::default(),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of occupied slots, including packets taken but not released.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len() + self.reserved
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Ticks to serialize a packet onto the lanes.
    #[must_use]
    pub fn transfer_ticks(&self, packet: &Packet) -> u64 {
        self.limiter.ticks(packet)
    }

    #[must_use]
    pub fn fixed_delay_ticks(&self) -> u64 {
        self.fixed_delay_ticks
    }

    /// Accept a packet at tick `now` and return the tick it becomes ready.
    ///
    /// A full buffer hands the packet back in [CxlError::BufferFull].
    pub fn submit(&mut self, packet: Packet, now: u64) -> Result<u64, CxlError> {
        if self.is_full() {
            return Err(CxlError::BufferFull(packet));
        }

        let start = now.max(self.link_free_tick);
        self.link_free_tick = start + self.transfer_ticks(&packet);
        let ready_tick = self.link_free_tick + self.fixed_delay_ticks;

        let flits = self.format.pack(&packet);
        self.stats.packets += 1;
        self.stats.flits += flits.len() as u64;
        self.stats.bytes += u64::from(packet.size_bytes());

        self.queue.push_back(InFlight {
            flits,
            ready_tick,
            context: PacketContext::of(&packet, now),
        });
        Ok(ready_tick)
    }

    #[must_use]
    pub fn front_ready_tick(&self) -> Option<u64> {
        self.queue.front().map(|in_flight| in_flight.ready_tick)
    }

    /// Unpack the front packet if it is ready at `now`.
    ///
    /// The slot stays occupied until [release](Self::release) is called.
    pub fn take_front(&mut self, now: u64) -> Result<Option<Packet>, CxlError> {
        match self.queue.front() {
            Some(in_flight) if in_flight.ready_tick <= now => {}
            _ => return Ok(None),
        }
        let Some(in_flight) = self.queue.pop_front() else {
            return Ok(None);
        };
        let packet = self
            .format
            .unpack(&in_flight.flits)
            .map_err(|source| CxlError::Framing {
                source,
                context: in_flight.context,
            })?;
        self.reserved += 1;
        Ok(Some(packet))
    }

    /// Free the slot of a packet returned by [take_front](Self::take_front).
    pub fn release(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Take and release every packet ready at `now`, in order.
    pub fn drain(&mut self, now: u64) -> Drain<'_> {
        Drain { buffer: self, now }
    }

    /// Discard all contents and return the link to idle.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.reserved = 0;
        self.link_free_tick = 0;
        self.stats = LinkStats::default();
    }

    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.stats.clone()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_front(&mut self) {
        if let Some(in_flight) = self.queue.front_mut() {
            in_flight.flits.pop();
        }
    }
}

/// Lazy sequence of ready packets, see [LinkBuffer::drain].
pub struct Drain<'a> {
    buffer: &'a mut LinkBuffer,
    now: u64,
}

impl Iterator for Drain<'_> {
    type Item = Result<Packet, CxlError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.buffer.take_front(self.now) {
            Ok(Some(packet)) => {
                self.buffer.release();
                Some(Ok(packet))
            }
            Ok(None) => None,
            Err(error) => Some(Err(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use cxl_engine::test_helpers::start_test;
    use cxl_track::entity::Entity;

    use super::*;
    use crate::error::FramingError;
    use crate::packet::Command;

    fn reference_config() -> LinkConfig {
        LinkConfig {
            num_lanes: 16,
            lane_speed_gbps: 31.0,
            fixed_delay_ticks: 100,
            capacity: 10,
        }
    }

    fn read(top: &Rc<Entity>, address: u64, size: u32) -> Packet {
        Packet::request(top, Command::Read, address, size, 0, 0).unwrap()
    }

    #[test]
    fn transfer_latency() {
        let engine = start_test(file!());
        let clock = engine.default_clock();
        let buffer = LinkBuffer::new(&clock, &reference_config()).unwrap();
        let top = engine.top();

        // ceil(64 * 8 / (16 * 31)) at 1GHz
        assert_eq!(buffer.transfer_ticks(&read(top, 0, 64)), 2);
        assert_eq!(buffer.transfer_ticks(&read(top, 0, 62)), 1);
    }

    #[test]
    fn full_buffer_returns_packet() {
        let engine = start_test(file!());
        let clock = engine.default_clock();
        let mut buffer = LinkBuffer::new(&clock, &reference_config()).unwrap();
        let top = engine.top();

        for i in 0..10 {
            let ready = buffer.submit(read(top, i * 64, 64), 0).unwrap();
            assert_eq!(ready, 102 + 2 * i);
        }
        assert!(buffer.is_full());

        let eleventh = read(top, 0x1000, 64);
        let id = eleventh.id;
        let Err(CxlError::BufferFull(returned)) = buffer.submit(eleventh, 0) else {
            panic!("expected BufferFull");
        };
        assert_eq!(returned.id, id);

        assert!(buffer.take_front(101).unwrap().is_none());
        let first = buffer.take_front(102).unwrap().unwrap();
        assert_eq!(first.address(), 0);

        // Still held until the consumer accepts it.
        assert!(buffer.is_full());
        let Err(CxlError::BufferFull(returned)) = buffer.submit(returned, 102) else {
            panic!("expected BufferFull");
        };

        buffer.release();
        assert_eq!(buffer.submit(returned, 102).unwrap(), 204);
    }

    #[test]
    fn drain_in_submission_order() {
        let engine = start_test(file!());
        let clock = engine.default_clock();
        let mut buffer = LinkBuffer::new(&clock, &reference_config()).unwrap();
        let top = engine.top();

        let sizes = [64, 8, 256, 32];
        for (i, size) in sizes.iter().enumerate() {
            buffer.submit(read(top, i as u64, *size), 0).unwrap();
        }

        // 64B: 2 ticks, 8B: 1, 256B: 5, 32B: 1
        assert_eq!(buffer.front_ready_tick(), Some(102));
        let early: Vec<u64> = buffer.drain(103).map(|p| p.unwrap().address()).collect();
        assert_eq!(early, vec![0, 1]);

        let rest: Vec<u64> = buffer.drain(200).map(|p| p.unwrap().address()).collect();
        assert_eq!(rest, vec![2, 3]);
        assert!(buffer.is_empty());
        assert!(buffer.drain(1000).next().is_none());

        let stats = buffer.stats();
        assert_eq!(stats.packets, 4);
        assert_eq!(stats.bytes, 64 + 8 + 256 + 32);
        assert_eq!(stats.flits, 4 * 17);
    }

    #[test]
    fn idle_link_restarts_from_now() {
        let engine = start_test(file!());
        let clock = engine.default_clock();
        let mut buffer = LinkBuffer::new(&clock, &reference_config()).unwrap();
        let top = engine.top();

        assert_eq!(buffer.submit(read(top, 0, 64), 0).unwrap(), 102);
        assert_eq!(buffer.submit(read(top, 0, 64), 500).unwrap(), 602);

        buffer.reset();
        assert!(buffer.is_empty());
        assert_eq!(buffer.submit(read(top, 0, 64), 10).unwrap(), 112);
        assert_eq!(buffer.stats().packets, 1);
    }

    #[test]
    fn framing_error_reports_packet() {
        let engine = start_test(file!());
        let clock = engine.default_clock();
        let mut buffer = LinkBuffer::new(&clock, &reference_config()).unwrap();
        let top = engine.top();

        let packet = Packet::request(top, Command::Write, 0x4000, 64, 5, 0).unwrap();
        buffer.submit(packet, 7).unwrap();
        buffer.corrupt_front();

        let Err(CxlError::Framing { source, context }) = buffer.take_front(1000) else {
            panic!("expected a framing error");
        };
        assert!(matches!(source, FramingError::Truncated { .. }));
        assert_eq!(context, PacketContext {
            address: 0x4000,
            flow_id: Some(5),
            tick: Some(7),
        });
    }

    #[test]
    fn invalid_configuration() {
        let engine = start_test(file!());
        let clock = engine.default_clock();

        let mut config = reference_config();
        config.capacity = 0;
        assert!(matches!(
            LinkBuffer::new(&clock, &config),
            Err(CxlError::Configuration(_))
        ));

        let mut config = reference_config();
        config.num_lanes = 0;
        assert!(LinkBuffer::new(&clock, &config).is_err());

        let mut config = reference_config();
        config.lane_speed_gbps = 0.0;
        assert!(matches!(
            LinkBuffer::new(&clock, &config),
            Err(CxlError::Sim(_))
        ));
    }
}
