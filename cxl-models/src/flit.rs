// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Pack packets into fixed-width flits and rebuild them.
//!
//! A packet is serialized LSB first as a header, a checksum over the header
//! and, for packets that carry data, `size_bytes * 8` payload bits. The
//! stream is padded with zeros to a whole number of flits where each flit is
//! `num_lanes` bits, i.e. one bit per lane per transfer.
//!
//! ```txt
//!  bit 0      1     2..6     6..8    8..24    24..56  56..120  120..184  184..248     248..264
//!  +-------+------+---------+-------+---------+------+---------+--------+------------+----------+---------+
//!  | valid | kind | command | status| flow id | size | address |   id   | issue tick | checksum | payload |
//!  +-------+------+---------+-------+---------+------+---------+--------+------------+----------+---------+
//! ```
//!
//! The checksum is the XOR of the header taken 16 bits at a time.

use std::ops::Range;

use bitvec::prelude::*;
use cxl_track::Id;

use crate::error::{CxlError, FramingError};
use crate::packet::{Command, Packet, PacketKind, Status};

/// Width of a CXL 68B flit without its CRC.
pub const CXL_FLIT_BITS: usize = 528;

pub type Flit = BitVec<u64, Lsb0>;

const VALID: usize = 0;
const KIND: usize = 1;
const COMMAND: Range<usize> = 2..6;
const STATUS: Range<usize> = 6..8;
const FLOW_ID: Range<usize> = 8..24;
const SIZE: Range<usize> = 24..56;
const ADDRESS: Range<usize> = 56..120;
const ID: Range<usize> = 120..184;
const ISSUE_TICK: Range<usize> = 184..248;
const HEADER_BITS: usize = 248;
const CHECKSUM: Range<usize> = 248..264;

/// Bits before the payload.
pub const FRAME_HEADER_BITS: usize = 264;

fn checksum(header: &BitSlice<u64, Lsb0>) -> u16 {
    header
        .chunks(16)
        .fold(0, |acc, chunk| acc ^ chunk.load_le::<u16>())
}

fn status_code(status: Status) -> u64 {
    match status {
        Status::Ok => 0,
        Status::Failed => 1,
    }
}

/// Number of bits a packet occupies on the wire before padding.
#[must_use]
pub fn frame_bits(packet: &Packet) -> usize {
    if packet.carries_data() {
        FRAME_HEADER_BITS + packet.size_bytes() as usize * 8
    } else {
        FRAME_HEADER_BITS
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlitFormat {
    num_lanes: usize,
}

impl FlitFormat {
    pub fn new(num_lanes: usize) -> Result<Self, CxlError> {
        if num_lanes == 0 {
            return Err(CxlError::Configuration(
                "num_lanes must be greater than 0".to_string(),
            ));
        }
        Ok(Self { num_lanes })
    }

    /// One full CXL flit per transfer.
    #[must_use]
    pub fn cxl() -> Self {
        Self {
            num_lanes: CXL_FLIT_BITS,
        }
    }

    #[must_use]
    pub fn num_lanes(&self) -> usize {
        self.num_lanes
    }

    #[must_use]
    pub fn num_flits(&self, packet: &Packet) -> usize {
        frame_bits(packet).div_ceil(self.num_lanes)
    }

    #[must_use]
    pub fn pack(&self, packet: &Packet) -> Vec<Flit> {
        let num_flits = self.num_flits(packet);
        let mut stream: Flit = BitVec::repeat(false, num_flits * self.num_lanes);

        stream.set(VALID, true);
        stream.set(KIND, packet.kind() == PacketKind::Response);
        stream[COMMAND].store_le(packet.command().opcode());
        stream[STATUS].store_le(status_code(packet.status()));
        stream[FLOW_ID].store_le(packet.flow_id());
        stream[SIZE].store_le(packet.size_bytes());
        stream[ADDRESS].store_le(packet.address());
        stream[ID].store_le(packet.id.0);
        stream[ISSUE_TICK].store_le(packet.issue_tick());
        let sum = checksum(&stream[..HEADER_BITS]);
        stream[CHECKSUM].store_le(sum);

        stream
            .chunks(self.num_lanes)
            .map(BitSlice::to_bitvec)
            .collect()
    }

    /// Rebuild a packet from flits in transmission order.
    pub fn unpack(&self, flits: &[Flit]) -> Result<Packet, FramingError> {
        let mut stream: Flit = BitVec::with_capacity(flits.len() * self.num_lanes);
        for (index, flit) in flits.iter().enumerate() {
            if flit.len() != self.num_lanes {
                return Err(FramingError::WidthMismatch {
                    index,
                    expected: self.num_lanes,
                    found: flit.len(),
                });
            }
            stream.extend_from_bitslice(flit.as_bitslice());
        }

        if stream.len() < FRAME_HEADER_BITS {
            return Err(FramingError::Truncated {
                expected: FRAME_HEADER_BITS,
                found: stream.len(),
            });
        }
        if !stream[VALID] {
            return Err(FramingError::NotValid);
        }
        let expected = checksum(&stream[..HEADER_BITS]);
        let found = stream[CHECKSUM].load_le::<u16>();
        if expected != found {
            return Err(FramingError::Corrupt { expected, found });
        }

        let kind = if stream[KIND] {
            PacketKind::Response
        } else {
            PacketKind::Request
        };
        let opcode = stream[COMMAND].load_le::<u64>();
        let Some(command) = Command::from_opcode(opcode) else {
            return Err(FramingError::InvalidField {
                field: "command",
                value: opcode,
            });
        };
        let status = match stream[STATUS].load_le::<u64>() {
            0 => Status::Ok,
            1 => Status::Failed,
            value => {
                return Err(FramingError::InvalidField {
                    field: "status",
                    value,
                });
            }
        };
        let size_bytes = stream[SIZE].load_le::<u32>();
        if size_bytes == 0 {
            return Err(FramingError::InvalidField {
                field: "size",
                value: 0,
            });
        }

        let packet = Packet {
            id: Id(stream[ID].load_le::<u64>()),
            kind,
            command,
            status,
            flow_id: stream[FLOW_ID].load_le::<u16>(),
            size_bytes,
            address: stream[ADDRESS].load_le::<u64>(),
            issue_tick: stream[ISSUE_TICK].load_le::<u64>(),
        };

        let expected_bits = frame_bits(&packet);
        if stream.len() < expected_bits {
            return Err(FramingError::Truncated {
                expected: expected_bits,
                found: stream.len(),
            });
        }
        let num_flits = self.num_flits(&packet);
        if flits.len() > num_flits {
            return Err(FramingError::TrailingFlits {
                extra: flits.len() - num_flits,
            });
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use cxl_track::entity::{Entity, toplevel};
    use cxl_track::tracker::dev_null_tracker;

    use super::*;

    fn top() -> Rc<Entity> {
        toplevel(&dev_null_tracker(), "top")
    }

    #[test]
    fn round_trip() {
        let top = top();
        let read = Packet::request(&top, Command::Read, 0x2_0000_0040, 64, 513, 1234).unwrap();
        let write = Packet::request(&top, Command::Write, u64::MAX - 63, 128, 7, 9).unwrap();
        let packets = [
            read.clone(),
            read.to_response(),
            read.failed_response(),
            write.clone(),
            write.to_response(),
        ];
        for num_lanes in [1, 16, 33, CXL_FLIT_BITS] {
            let format = FlitFormat::new(num_lanes).unwrap();
            for packet in &packets {
                let flits = format.pack(packet);
                assert_eq!(flits.len(), format.num_flits(packet));
                assert!(flits.iter().all(|flit| flit.len() == num_lanes));
                assert_eq!(&format.unpack(&flits).unwrap(), packet);
            }
        }
    }

    #[test]
    fn flit_counts() {
        let top = top();
        let format = FlitFormat::new(16).unwrap();
        let read = Packet::request(&top, Command::Read, 0, 64, 0, 0).unwrap();
        let write = Packet::request(&top, Command::Write, 0, 64, 0, 0).unwrap();

        // Header only: 264 bits.
        assert_eq!(format.num_flits(&read), 17);
        // Header plus 512 payload bits.
        assert_eq!(format.num_flits(&write), 49);
        assert_eq!(format.num_flits(&read.to_response()), 49);
        assert_eq!(FlitFormat::cxl().num_flits(&write), 2);
    }

    #[test]
    fn zero_lanes_rejected() {
        assert!(matches!(
            FlitFormat::new(0),
            Err(CxlError::Configuration(_))
        ));
    }

    #[test]
    fn truncated_sequence() {
        let top = top();
        let format = FlitFormat::new(16).unwrap();
        let write = Packet::request(&top, Command::Write, 0x80, 64, 1, 0).unwrap();
        let mut flits = format.pack(&write);
        flits.pop();
        assert_eq!(
            format.unpack(&flits),
            Err(FramingError::Truncated {
                expected: 776,
                found: 768
            })
        );

        assert_eq!(
            format.unpack(&flits[..4]),
            Err(FramingError::Truncated {
                expected: FRAME_HEADER_BITS,
                found: 64
            })
        );
        assert!(matches!(
            format.unpack(&[]),
            Err(FramingError::Truncated { found: 0, .. })
        ));
    }

    #[test]
    fn corrupt_header() {
        let top = top();
        let format = FlitFormat::cxl();
        let read = Packet::request(&top, Command::Read, 0x80, 64, 1, 0).unwrap();
        let mut flits = format.pack(&read);
        let bit = flits[0][100];
        flits[0].set(100, !bit);
        assert!(matches!(
            format.unpack(&flits),
            Err(FramingError::Corrupt { .. })
        ));

        let mut flits = format.pack(&read);
        flits[0].set(0, false);
        assert_eq!(format.unpack(&flits), Err(FramingError::NotValid));
    }

    #[test]
    fn width_and_trailing_flits() {
        let top = top();
        let format = FlitFormat::new(16).unwrap();
        let read = Packet::request(&top, Command::Read, 0x80, 64, 1, 0).unwrap();

        let mut flits = format.pack(&read);
        flits[3].push(false);
        assert_eq!(
            format.unpack(&flits),
            Err(FramingError::WidthMismatch {
                index: 3,
                expected: 16,
                found: 17
            })
        );

        let mut flits = format.pack(&read);
        flits.push(BitVec::repeat(false, 16));
        assert_eq!(
            format.unpack(&flits),
            Err(FramingError::TrailingFlits { extra: 1 })
        );
    }
}
