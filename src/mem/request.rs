use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::timeq::{Cycle, Timed};

pub type Addr = u64;
pub type RequestId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessKind {
    Read,
    Write,
    InstFetch,
    WriteBack,
    Check,
}

impl AccessKind {
    // Kinds an issuing core may present to the hierarchy.
    pub fn is_demand(self) -> bool {
        matches!(self, Self::Read | Self::Write | Self::InstFetch)
    }

    pub fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }

    pub fn is_writeback(self) -> bool {
        matches!(self, Self::WriteBack)
    }

    /// Which upstream port a demand access belongs to.
    pub fn side(self) -> Side {
        match self {
            Self::InstFetch => Side::Instruction,
            _ => Side::Data,
        }
    }
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "R",
            Self::Write => "W",
            Self::InstFetch => "I",
            Self::WriteBack => "WB",
            Self::Check => "CHK",
        };
        f.write_str(s)
    }
}

impl FromStr for AccessKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "0" | "r" | "read" => Ok(Self::Read),
            "1" | "w" | "write" => Ok(Self::Write),
            "2" | "i" | "ifetch" | "inst_fetch" => Ok(Self::InstFetch),
            _ => Err(format!(
                "unsupported access type '{}', expected one of: 0/r, 1/w, 2/i",
                value
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Instruction,
    Data,
}

/// A memory request travelling through the hierarchy.
///
/// Exactly one queue owns a request at any time; moving it between queues is a move of the value.
/// Ordinary requests are created by the hierarchy and dropped on the done path; write-backs are
/// synthesised by a cache on a dirty eviction and dropped once the level below consumes them.
#[derive(Debug)]
pub struct Request {
    pub id: RequestId,
    pub addr: Addr,
    pub kind: AccessKind,
    pub issued_at: Cycle,
    pub ready_at: Cycle,
    pub dirty: bool,
    pub done: bool,
    pub is_miss: bool,
    // the level below evicted this line while the fill was still queued above it
    pub bypass: bool,
}

impl Request {
    pub fn new(id: RequestId, addr: Addr, kind: AccessKind, now: Cycle) -> Self {
        Self {
            id,
            addr,
            kind,
            issued_at: now,
            ready_at: now,
            dirty: false,
            done: false,
            is_miss: false,
            bypass: false,
        }
    }

    pub fn new_writeback(id: RequestId, addr: Addr, now: Cycle) -> Self {
        Self {
            dirty: true,
            ..Self::new(id, addr, AccessKind::WriteBack, now)
        }
    }
}

impl Timed for Request {
    fn ready_at(&self) -> Cycle {
        self.ready_at
    }
}

/// Observable outcome of an ordinary request once it leaves the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub id: RequestId,
    pub addr: Addr,
    pub kind: AccessKind,
    pub issued_at: Cycle,
    pub completed_at: Cycle,
    pub miss: bool,
}

impl Completion {
    pub fn from_request(request: &Request, completed_at: Cycle) -> Self {
        Self {
            id: request.id,
            addr: request.addr,
            kind: request.kind,
            issued_at: request.issued_at,
            completed_at,
            miss: request.is_miss,
        }
    }

    pub fn latency(&self) -> Cycle {
        self.completed_at.saturating_sub(self.issued_at)
    }
}
