use log::debug;
use serde::Serialize;
use std::collections::VecDeque;

use super::fabric::ActorId;
use super::request::Request;
use super::writeback::{WritebackTicket, WritebackTracker};
use crate::cache::actor::CacheActor;
use crate::timeq::{Cycle, TimedQueue};

/// Where serviced demand requests go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemUpstream {
    Core,
    Cache(ActorId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    pub reads: u64,
    pub writebacks: u64,
}

/// Fixed-latency terminal responder.
#[derive(Debug)]
pub struct MainMemory {
    name: String,
    latency: Cycle,
    cycle: Cycle,
    queue: TimedQueue<Request>,
    in_flight_wb: WritebackTracker,
    upstream: MemUpstream,
    stats: MemoryStats,
}

impl MainMemory {
    pub fn new(name: impl Into<String>, latency: Cycle, upstream: MemUpstream) -> Self {
        Self {
            name: name.into(),
            latency,
            cycle: 0,
            queue: TimedQueue::new(),
            in_flight_wb: WritebackTracker::new(),
            upstream,
            stats: MemoryStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latency(&self) -> Cycle {
        self.latency
    }

    pub fn upstream(&self) -> MemUpstream {
        self.upstream
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn writeback_tracker(&self) -> &WritebackTracker {
        &self.in_flight_wb
    }

    pub fn track_writeback(&mut self, ticket: WritebackTicket) {
        self.in_flight_wb.track(ticket);
    }

    pub fn access(&mut self, mut request: Request) -> bool {
        request.ready_at = self.cycle + self.latency;
        debug!(
            "[{}] #{} {} {:#x} accepted, ready @ {}",
            self.name, request.id, request.kind, request.addr, request.ready_at
        );
        self.queue.push(request);
        true
    }

    pub fn run_a_cycle(&mut self, actors: &mut [CacheActor], done: &mut VecDeque<Request>) {
        while let Some(mut request) = self.queue.pop_ready(self.cycle) {
            if request.kind.is_writeback() {
                let retired = self.in_flight_wb.retire(request.id);
                assert!(
                    retired.is_some(),
                    "{}: untracked write-back #{} @ {:#x}",
                    self.name,
                    request.id,
                    request.addr
                );
                self.stats.writebacks += 1;
                debug!(
                    "[{}] write-back #{} {:#x} absorbed @ {}",
                    self.name, request.id, request.addr, self.cycle
                );
                continue;
            }

            self.stats.reads += 1;
            match self.upstream {
                MemUpstream::Core => {
                    request.done = true;
                    done.push_back(request);
                }
                MemUpstream::Cache(id) => {
                    actors[id].fill(request);
                }
            }
        }
        self.cycle += 1;
    }
}
