// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! The unit of transfer through the interconnect.
//!
//! A [Packet] is immutable once created. A response keeps the id of the
//! request it answers so that crossbars can route it back to the upstream
//! port the request arrived on.

use std::fmt;
use std::rc::Rc;

use cxl_engine::traits::{Routable, SimObject, TotalBytes};
use cxl_engine::types::AccessType;
use cxl_track::entity::Entity;
use cxl_track::id::Unique;
use cxl_track::{Id, create_id};

use crate::error::CxlError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Request,
    Response,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Command {
    Read,
    Write,
}

impl Command {
    /// Opcode carried in the flit header.
    #[must_use]
    pub fn opcode(self) -> u64 {
        match self {
            Command::Read => 0b0001,
            Command::Write => 0b0010,
        }
    }

    #[must_use]
    pub fn from_opcode(opcode: u64) -> Option<Self> {
        match opcode {
            0b0001 => Some(Command::Read),
            0b0010 => Some(Command::Write),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Command::Read => write!(f, "Read"),
            Command::Write => write!(f, "Write"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Ok,

    /// The transaction could not be completed, e.g. the address was not
    /// routable.
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub(crate) id: Id,
    pub(crate) kind: PacketKind,
    pub(crate) command: Command,
    pub(crate) status: Status,
    pub(crate) flow_id: u16,
    pub(crate) size_bytes: u32,
    pub(crate) address: u64,
    pub(crate) issue_tick: u64,
}

impl Packet {
    /// Create a new request.
    ///
    /// Returns an error if `size_bytes` is 0.
    pub fn request(
        created_by: &Rc<Entity>,
        command: Command,
        address: u64,
        size_bytes: u32,
        flow_id: u16,
        issue_tick: u64,
    ) -> Result<Self, CxlError> {
        if size_bytes == 0 {
            return Err(CxlError::Configuration(format!(
                "{created_by}: packet to {address:#x} has size 0"
            )));
        }
        Ok(Self {
            id: create_id!(created_by),
            kind: PacketKind::Request,
            command,
            status: Status::Ok,
            flow_id,
            size_bytes,
            address,
            issue_tick,
        })
    }

    /// The successful response to this request.
    #[must_use]
    pub fn to_response(&self) -> Self {
        Self {
            kind: PacketKind::Response,
            status: Status::Ok,
            ..self.clone()
        }
    }

    /// A response reporting that the transaction failed.
    #[must_use]
    pub fn failed_response(&self) -> Self {
        Self {
            kind: PacketKind::Response,
            status: Status::Failed,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    #[must_use]
    pub fn command(&self) -> Command {
        self.command
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn flow_id(&self) -> u16 {
        self.flow_id
    }

    #[must_use]
    pub fn size_bytes(&self) -> u32 {
        self.size_bytes
    }

    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Tick at which the original request was issued.
    #[must_use]
    pub fn issue_tick(&self) -> u64 {
        self.issue_tick
    }

    #[must_use]
    pub fn is_request(&self) -> bool {
        self.kind == PacketKind::Request
    }

    /// Whether the packet carries `size_bytes` of data on the wire.
    ///
    /// Write requests and successful read responses carry data, everything
    /// else is header only.
    #[must_use]
    pub fn carries_data(&self) -> bool {
        match (self.kind, self.command) {
            (PacketKind::Request, Command::Write) => true,
            (PacketKind::Response, Command::Read) => self.status == Status::Ok,
            _ => false,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            PacketKind::Request => "req",
            PacketKind::Response => "rsp",
        };
        write!(
            f,
            "{} {kind} #{} {}B@{:#x} flow {}",
            self.command, self.id, self.size_bytes, self.address, self.flow_id
        )?;
        if self.status == Status::Failed {
            write!(f, " failed")?;
        }
        Ok(())
    }
}

impl TotalBytes for Packet {
    fn total_bytes(&self) -> usize {
        self.size_bytes as usize
    }
}

impl Unique for Packet {
    fn id(&self) -> Id {
        self.id
    }
}

impl Routable for Packet {
    fn destination(&self) -> u64 {
        self.address
    }

    fn access_type(&self) -> AccessType {
        match self.command {
            Command::Read => AccessType::Read,
            Command::Write => AccessType::Write,
        }
    }
}

impl SimObject for Packet {}

#[cfg(test)]
mod tests {
    use cxl_track::entity::toplevel;
    use cxl_track::tracker::dev_null_tracker;

    use super::*;

    #[test]
    fn zero_sized_packet_rejected() {
        let top = toplevel(&dev_null_tracker(), "top");
        let result = Packet::request(&top, Command::Read, 0x100, 0, 0, 0);
        assert!(matches!(result, Err(CxlError::Configuration(_))));
    }

    #[test]
    fn response_keeps_request_identity() {
        let top = toplevel(&dev_null_tracker(), "top");
        let request = Packet::request(&top, Command::Read, 0x100, 64, 7, 3).unwrap();
        let response = request.to_response();
        assert_eq!(response.id(), request.id());
        assert_eq!(response.kind(), PacketKind::Response);
        assert_eq!(response.flow_id(), 7);
        assert_eq!(response.issue_tick(), 3);
        assert!(response.carries_data());

        let failed = request.failed_response();
        assert_eq!(failed.status(), Status::Failed);
        assert!(!failed.carries_data());
        assert!(failed.to_string().ends_with("failed"));
    }

    #[test]
    fn only_writes_carry_request_data() {
        let top = toplevel(&dev_null_tracker(), "top");
        let read = Packet::request(&top, Command::Read, 0, 64, 0, 0).unwrap();
        let write = Packet::request(&top, Command::Write, 0, 64, 0, 0).unwrap();
        assert!(!read.carries_data());
        assert!(write.carries_data());
        assert!(!write.to_response().carries_data());
    }
}
