use super::fabric::ActorId;
use super::request::{AccessKind, Addr, RequestId};

/// Marks an in-flight request as an outstanding miss of `line` at cache `owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissTag {
    pub owner: ActorId,
    pub line: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InflightEntry {
    pub id: RequestId,
    pub addr: Addr,
    pub kind: AccessKind,
    pub miss: Option<MissTag>,
}

/// Every ordinary request the hierarchy has issued and not yet retired.
///
/// Matching contract for coalescing: an entry matches a lookup at cache `owner` for line `line`
/// iff it has been marked as a miss by that same cache for that same line. Entries that have not
/// missed (still in a lookup queue, or served by a hit) never match.
///
/// Matching is by line address, not byte address: two accesses to different bytes of one line
/// share a single outstanding miss. Matching on the exact byte address would send a second miss
/// for the same line downstream, and its fill would find the line already installed.
#[derive(Debug, Default)]
pub struct InflightTable {
    entries: Vec<InflightEntry>,
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: RequestId, addr: Addr, kind: AccessKind) {
        debug_assert!(!self.contains(id), "request #{id} registered twice");
        self.entries.push(InflightEntry {
            id,
            addr,
            kind,
            miss: None,
        });
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn get(&self, id: RequestId) -> Option<&InflightEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Effective access kind, which may have been promoted by a coalesced write.
    pub fn kind_of(&self, id: RequestId) -> Option<AccessKind> {
        self.get(id).map(|entry| entry.kind)
    }

    pub fn mark_miss(&mut self, id: RequestId, owner: ActorId, line: u64) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
            entry.miss = Some(MissTag { owner, line });
        }
    }

    pub fn find_miss(&self, owner: ActorId, line: u64) -> Option<&InflightEntry> {
        let wanted = MissTag { owner, line };
        self.entries.iter().find(|entry| entry.miss == Some(wanted))
    }

    /// Fold a new access into the outstanding miss for the same line. A write upgrades the
    /// outstanding request so the line is installed dirty. Returns the id absorbing the access.
    pub fn coalesce(&mut self, owner: ActorId, line: u64, kind: AccessKind) -> Option<RequestId> {
        let id = self.find_miss(owner, line)?.id;
        if kind.is_write() {
            if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
                entry.kind = AccessKind::Write;
            }
        }
        Some(id)
    }

    pub fn remove(&mut self, id: RequestId) -> Option<InflightEntry> {
        let idx = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(idx))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
