use std::collections::VecDeque;

use super::request::{Addr, Request, RequestId};
use crate::timeq::Cycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritebackTicket {
    pub id: RequestId,
    pub addr: Addr,
    pub issued_at: Cycle,
}

impl WritebackTicket {
    pub fn for_request(request: &Request) -> Self {
        Self {
            id: request.id,
            addr: request.addr,
            issued_at: request.issued_at,
        }
    }
}

/// Write-backs headed for the component that owns this tracker and not yet absorbed by it.
#[derive(Debug, Default)]
pub struct WritebackTracker {
    entries: VecDeque<WritebackTicket>,
}

impl WritebackTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, ticket: WritebackTicket) {
        self.entries.push_back(ticket);
    }

    pub fn retire(&mut self, id: RequestId) -> Option<WritebackTicket> {
        let idx = self.entries.iter().position(|ticket| ticket.id == id)?;
        self.entries.remove(idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retire_out_of_order() {
        let mut tracker = WritebackTracker::new();
        for id in 0..3 {
            tracker.track(WritebackTicket::for_request(&Request::new_writeback(
                id,
                id * 64,
                0,
            )));
        }
        assert_eq!(tracker.retire(1).map(|t| t.addr), Some(64));
        assert_eq!(tracker.len(), 2);
        assert!(tracker.retire(1).is_none());
        tracker.retire(0);
        tracker.retire(2);
        assert!(tracker.is_empty());
    }
}
