use std::collections::VecDeque;

use super::inflight::InflightTable;
use super::request::{AccessKind, Request, RequestId, Side};
use super::simple_mem::MainMemory;
use crate::cache::actor::CacheActor;

/// Index of a cache inside the hierarchy's actor list.
pub type ActorId = usize;

/// Who sits above a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    /// The issuing core: completed requests go to the done path.
    Core,
    /// Inclusive interior level feeding instruction and data caches (possibly the same one).
    Caches { inst: ActorId, data: ActorId },
}

impl Upstream {
    pub fn target_for(self, kind: AccessKind) -> Option<ActorId> {
        match self {
            Upstream::Core => None,
            Upstream::Caches { inst, data } => match kind.side() {
                Side::Instruction => Some(inst),
                Side::Data => Some(data),
            },
        }
    }
}

/// Who sits below a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Downstream {
    Cache(ActorId),
    Memory,
}

/// Every actor except the one currently running.
pub struct Peers<'a> {
    head: &'a mut [CacheActor],
    tail: &'a mut [CacheActor],
    skip: ActorId,
}

impl<'a> Peers<'a> {
    pub fn split(actors: &'a mut [CacheActor], idx: ActorId) -> (&'a mut CacheActor, Peers<'a>) {
        let (head, rest) = actors.split_at_mut(idx);
        let (current, tail) = rest
            .split_first_mut()
            .unwrap_or_else(|| panic!("actor {idx} does not exist"));
        (current, Peers { head, tail, skip: idx })
    }

    pub fn get(&self, id: ActorId) -> &CacheActor {
        if id < self.skip {
            &self.head[id]
        } else if id > self.skip {
            &self.tail[id - self.skip - 1]
        } else {
            panic!("actor {id} addressed itself as a neighbor")
        }
    }

    pub fn get_mut(&mut self, id: ActorId) -> &mut CacheActor {
        if id < self.skip {
            &mut self.head[id]
        } else if id > self.skip {
            &mut self.tail[id - self.skip - 1]
        } else {
            panic!("actor {id} addressed itself as a neighbor")
        }
    }
}

#[derive(Debug, Default)]
pub struct RequestIds {
    next: RequestId,
}

impl RequestIds {
    pub fn next(&mut self) -> RequestId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Everything a cache may touch while it runs its cycle.
pub struct Fabric<'a> {
    pub peers: Peers<'a>,
    pub memory: &'a mut MainMemory,
    pub inflight: &'a mut InflightTable,
    pub done: &'a mut VecDeque<Request>,
    pub ids: &'a mut RequestIds,
}

impl Fabric<'_> {
    pub fn complete(&mut self, mut request: Request) {
        request.done = true;
        self.done.push_back(request);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tag_store::TagStore;

    fn actor(id: ActorId) -> CacheActor {
        let tags = TagStore::new(format!("C{id}"), 1, 1, 64);
        CacheActor::new(id, tags, 1, Upstream::Core, Downstream::Memory)
    }

    #[test]
    fn peers_exclude_the_running_actor() {
        let mut actors: Vec<_> = (0..3).map(actor).collect();
        let (current, mut peers) = Peers::split(&mut actors, 1);
        assert_eq!(current.id(), 1);
        assert_eq!(peers.get(0).id(), 0);
        assert_eq!(peers.get_mut(2).id(), 2);
    }

    #[test]
    #[should_panic(expected = "addressed itself")]
    fn self_reference_panics() {
        let mut actors: Vec<_> = (0..2).map(actor).collect();
        let (_, peers) = Peers::split(&mut actors, 0);
        peers.get(0);
    }

    #[test]
    fn kinds_route_by_side() {
        let up = Upstream::Caches { inst: 0, data: 1 };
        assert_eq!(up.target_for(AccessKind::InstFetch), Some(0));
        assert_eq!(up.target_for(AccessKind::Write), Some(1));
        assert_eq!(Upstream::Core.target_for(AccessKind::Read), None);
    }
}
