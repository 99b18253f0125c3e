// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Map addresses to downstream ports.
//!
//! A crossbar with a single downstream port does not need a table and uses
//! [RouterKind::SingleDownstream]. Otherwise each downstream port owns one or
//! more disjoint [AddressRange]s held in a table sorted by start address.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CxlError, PacketContext};
use crate::packet::Packet;

/// A non-empty range of addresses `[start, start + size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressRange {
    start: u64,
    size: u64,
}

impl AddressRange {
    pub fn new(start: u64, size: u64) -> Result<Self, CxlError> {
        if size == 0 {
            return Err(CxlError::EmptyRange { start });
        }
        if start.checked_add(size - 1).is_none() {
            return Err(CxlError::Configuration(format!(
                "address range at {start:#x} of size {size:#x} exceeds the address space"
            )));
        }
        Ok(Self { start, size })
    }

    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last address within the range.
    #[must_use]
    pub fn last(&self) -> u64 {
        self.start + (self.size - 1)
    }

    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address - self.start < self.size
    }

    /// Whether `other` lies entirely inside this range.
    #[must_use]
    pub fn encloses(&self, other: &AddressRange) -> bool {
        self.start <= other.start && other.last() <= self.last()
    }

    #[must_use]
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.start <= other.last() && other.start <= self.last()
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let end = u128::from(self.start) + u128::from(self.size);
        write!(f, "[{:#x}, {end:#x})", self.start)
    }
}

/// How a router chooses the downstream port.
#[derive(Clone, Debug)]
pub enum RouterKind {
    /// Everything goes to port 0.
    SingleDownstream,

    /// Table keyed by range start holding the range and its port.
    RangeTable(BTreeMap<u64, (AddressRange, usize)>),
}

enum Lookup {
    Hit(usize),
    Miss,
    Ambiguous,
}

#[derive(Clone, Debug)]
pub struct AddressRouter {
    kind: RouterKind,
    default_port: Option<usize>,
}

impl AddressRouter {
    #[must_use]
    pub fn single_downstream() -> Self {
        Self {
            kind: RouterKind::SingleDownstream,
            default_port: None,
        }
    }

    /// Build a range table.
    ///
    /// Fails if any two ranges overlap, whether or not they belong to the same
    /// port.
    pub fn from_ranges(
        ranges: impl IntoIterator<Item = (AddressRange, usize)>,
    ) -> Result<Self, CxlError> {
        let mut table: BTreeMap<u64, (AddressRange, usize)> = BTreeMap::new();
        for (range, port) in ranges {
            if let Some((_, (prev, _))) = table.range(..=range.start()).next_back()
                && prev.overlaps(&range)
            {
                return Err(CxlError::OverlappingRanges {
                    first: *prev,
                    second: range,
                });
            }
            if let Some((_, (next, _))) = table.range(range.start()..).next()
                && next.overlaps(&range)
            {
                return Err(CxlError::OverlappingRanges {
                    first: *next,
                    second: range,
                });
            }
            table.insert(range.start(), (range, port));
        }
        Ok(Self {
            kind: RouterKind::RangeTable(table),
            default_port: None,
        })
    }

    /// Build a range table without the overlap checks.
    #[cfg(test)]
    fn from_ranges_unchecked(ranges: impl IntoIterator<Item = (AddressRange, usize)>) -> Self {
        Self {
            kind: RouterKind::RangeTable(
                ranges
                    .into_iter()
                    .map(|(range, port)| (range.start(), (range, port)))
                    .collect(),
            ),
            default_port: None,
        }
    }

    /// Port used for addresses outside every range.
    #[must_use]
    pub fn with_default_port(mut self, port: usize) -> Self {
        self.default_port = Some(port);
        self
    }

    #[must_use]
    pub fn kind(&self) -> &RouterKind {
        &self.kind
    }

    #[must_use]
    pub fn default_port(&self) -> Option<usize> {
        self.default_port
    }

    /// Highest port index this router can return.
    #[must_use]
    pub fn max_port(&self) -> usize {
        let table_max = match &self.kind {
            RouterKind::SingleDownstream => 0,
            RouterKind::RangeTable(table) => {
                table.values().map(|(_, port)| *port).max().unwrap_or(0)
            }
        };
        table_max.max(self.default_port.unwrap_or(0))
    }

    fn lookup(&self, address: u64) -> Lookup {
        let table = match &self.kind {
            RouterKind::SingleDownstream => return Lookup::Hit(0),
            RouterKind::RangeTable(table) => table,
        };
        // Tables are disjoint once built, but every candidate is checked so a
        // bad table fails instead of picking one of the ranges.
        let mut hits = table
            .range(..=address)
            .rev()
            .filter(|(_, (range, _))| range.contains(address))
            .map(|(_, (_, port))| *port);
        match (hits.next(), hits.next()) {
            (Some(port), None) => Lookup::Hit(port),
            (Some(_), Some(_)) => Lookup::Ambiguous,
            (None, _) => match self.default_port {
                Some(port) => Lookup::Hit(port),
                None => Lookup::Miss,
            },
        }
    }

    fn resolve_in(&self, context: PacketContext) -> Result<usize, CxlError> {
        match self.lookup(context.address) {
            Lookup::Hit(port) => Ok(port),
            Lookup::Miss => Err(CxlError::UnroutableAddress(context)),
            Lookup::Ambiguous => Err(CxlError::AmbiguousAddress(context)),
        }
    }

    /// Find the downstream port that owns `address`.
    pub fn resolve(&self, address: u64) -> Result<usize, CxlError> {
        self.resolve_in(PacketContext::address(address))
    }

    /// Find the downstream port for a packet, reporting failures against the
    /// packet and the current tick.
    pub fn route(&self, packet: &Packet, tick: u64) -> Result<usize, CxlError> {
        self.resolve_in(PacketContext::of(packet, tick))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;

    fn range(start: u64, size: u64) -> AddressRange {
        AddressRange::new(start, size).unwrap()
    }

    #[test]
    fn overlapping_ranges_rejected() {
        let result = AddressRouter::from_ranges([(range(0, GB), 0), (range(512 * MB, GB), 1)]);
        let Err(CxlError::OverlappingRanges { first, second }) = result else {
            panic!("expected OverlappingRanges");
        };
        assert_eq!(first, range(0, GB));
        assert_eq!(second, range(512 * MB, GB));
    }

    #[test]
    fn overlap_detected_in_any_order() {
        let result = AddressRouter::from_ranges([(range(512 * MB, GB), 1), (range(0, GB), 0)]);
        assert!(matches!(result, Err(CxlError::OverlappingRanges { .. })));

        let result = AddressRouter::from_ranges([(range(GB, GB), 0), (range(GB, GB), 1)]);
        assert!(matches!(result, Err(CxlError::OverlappingRanges { .. })));
    }

    #[test]
    fn overlap_message_names_both_ranges() {
        let err = AddressRouter::from_ranges([(range(0, GB), 0), (range(512 * MB, GB), 1)])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "overlapping address ranges [0x0, 0x40000000) and [0x20000000, 0x60000000)"
        );
    }

    #[test]
    fn resolve_adjacent_ranges() {
        let router =
            AddressRouter::from_ranges([(range(0, GB), 0), (range(GB, GB), 1), (range(4 * GB, GB), 0)])
                .unwrap();
        assert_eq!(router.resolve(0).unwrap(), 0);
        assert_eq!(router.resolve(GB - 1).unwrap(), 0);
        assert_eq!(router.resolve(GB).unwrap(), 1);
        assert_eq!(router.resolve(2 * GB - 1).unwrap(), 1);
        assert_eq!(router.resolve(4 * GB + 64).unwrap(), 0);
        assert_eq!(router.max_port(), 1);
    }

    #[test]
    fn unroutable_address() {
        let router = AddressRouter::from_ranges([(range(GB, GB), 0)]).unwrap();
        let err = router.resolve(2 * GB).unwrap_err();
        assert_eq!(err.to_string(), "unroutable address 0x80000000");
        assert!(matches!(
            router.resolve(0),
            Err(CxlError::UnroutableAddress(_))
        ));
    }

    #[test]
    fn default_port_catches_misses() {
        let router = AddressRouter::from_ranges([(range(GB, GB), 0)])
            .unwrap()
            .with_default_port(2);
        assert_eq!(router.resolve(0).unwrap(), 2);
        assert_eq!(router.resolve(GB).unwrap(), 0);
        assert_eq!(router.max_port(), 2);
    }

    #[test]
    fn overlapping_table_is_ambiguous() {
        let router = AddressRouter::from_ranges_unchecked([
            (range(0, 4 * GB), 0),
            (range(GB, 16 * MB), 1),
            (range(2 * GB, 16 * MB), 2),
        ]);
        // A range in between does not hold the address but the outer one does.
        assert!(matches!(
            router.resolve(2 * GB + 64),
            Err(CxlError::AmbiguousAddress(_))
        ));
        assert!(matches!(
            router.resolve(GB),
            Err(CxlError::AmbiguousAddress(_))
        ));
        // Only the outer range, not the one just below, holds the address.
        assert_eq!(router.resolve(3 * GB).unwrap(), 0);
        assert_eq!(router.resolve(GB - 1).unwrap(), 0);
        assert!(matches!(
            router.resolve(4 * GB),
            Err(CxlError::UnroutableAddress(_))
        ));
    }

    #[test]
    fn single_downstream_routes_everything() {
        let router = AddressRouter::single_downstream();
        assert_eq!(router.resolve(0).unwrap(), 0);
        assert_eq!(router.resolve(u64::MAX).unwrap(), 0);
    }

    #[test]
    fn range_validation() {
        assert!(matches!(
            AddressRange::new(0x1000, 0),
            Err(CxlError::EmptyRange { start: 0x1000 })
        ));
        assert!(matches!(
            AddressRange::new(u64::MAX, 2),
            Err(CxlError::Configuration(_))
        ));
        let top = range(u64::MAX - 15, 16);
        assert!(top.contains(u64::MAX));
        assert_eq!(top.to_string(), "[0xfffffffffffffff0, 0x10000000000000000)");
    }

    #[test]
    fn nesting() {
        let outer = range(0, 4 * GB);
        let inner = range(GB, GB);
        assert!(outer.encloses(&inner));
        assert!(!inner.encloses(&outer));
        assert!(outer.overlaps(&inner));
        assert!(!range(0, GB).overlaps(&range(GB, GB)));
    }
}
