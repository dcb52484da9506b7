use log::debug;
use smallvec::{smallvec, SmallVec};

use super::tag_store::TagStore;
use crate::mem::fabric::{ActorId, Downstream, Fabric, RequestIds, Upstream};
use crate::mem::request::{AccessKind, Addr, Request, Side};
use crate::mem::simple_mem::MainMemory;
use crate::mem::writeback::{WritebackTicket, WritebackTracker};
use crate::timeq::{Cycle, TimedQueue};

/// One cache level: a tag store driven through four timed queues.
///
/// Each cycle the queues are drained in the order write-back, fill, out, in. Requests only
/// become visible to a queue once the cycle reaches their `ready_at`, which is set from this
/// cache's latency when `access` or `fill` enqueues them.
#[derive(Debug)]
pub struct CacheActor {
    id: ActorId,
    side: Option<Side>,
    tags: TagStore,
    latency: Cycle,
    cycle: Cycle,
    in_queue: TimedQueue<Request>,
    out_queue: TimedQueue<Request>,
    fill_queue: TimedQueue<Request>,
    wb_queue: TimedQueue<Request>,
    // write-backs from the level above that have not landed here yet
    in_flight_wb: WritebackTracker,
    upstream: Upstream,
    downstream: Downstream,
}

impl CacheActor {
    pub fn new(
        id: ActorId,
        tags: TagStore,
        latency: Cycle,
        upstream: Upstream,
        downstream: Downstream,
    ) -> Self {
        Self {
            id,
            side: None,
            tags,
            latency,
            cycle: 0,
            in_queue: TimedQueue::new(),
            out_queue: TimedQueue::new(),
            fill_queue: TimedQueue::new(),
            wb_queue: TimedQueue::new(),
            in_flight_wb: WritebackTracker::new(),
            upstream,
            downstream,
        }
    }

    /// Restrict this cache to one side of a split L1.
    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.tags.name()
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    pub fn latency(&self) -> Cycle {
        self.latency
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn upstream(&self) -> Upstream {
        self.upstream
    }

    pub fn downstream(&self) -> Downstream {
        self.downstream
    }

    pub fn is_top_level(&self) -> bool {
        self.upstream == Upstream::Core
    }

    pub fn writeback_tracker(&self) -> &WritebackTracker {
        &self.in_flight_wb
    }

    pub(crate) fn writeback_tracker_mut(&mut self) -> &mut WritebackTracker {
        &mut self.in_flight_wb
    }

    /// Requests held in any of the four queues.
    pub fn queued(&self) -> usize {
        self.in_queue.len() + self.out_queue.len() + self.fill_queue.len() + self.wb_queue.len()
    }

    pub fn access(&mut self, mut request: Request) -> bool {
        request.ready_at = self.cycle + self.latency;
        self.in_queue.push(request);
        true
    }

    pub fn fill(&mut self, mut request: Request) -> bool {
        request.ready_at = self.cycle + self.latency;
        self.fill_queue.push(request);
        true
    }

    pub fn run_a_cycle(&mut self, fabric: &mut Fabric<'_>) {
        self.process_wb_queue();
        self.process_fill_queue(fabric);
        self.process_out_queue(fabric);
        self.process_in_queue(fabric);
        self.cycle += 1;
    }

    // write-backs go out ahead of this cycle's misses
    fn process_wb_queue(&mut self) {
        while let Some(request) = self.wb_queue.pop() {
            self.out_queue.push(request);
        }
    }

    fn process_fill_queue(&mut self, fabric: &mut Fabric<'_>) {
        while let Some(request) = self.fill_queue.pop_ready(self.cycle) {
            if request.kind.is_writeback() {
                self.absorb_writeback(request);
            } else if self.is_top_level() {
                self.fill_top(request, fabric);
            } else {
                self.fill_interior(request, fabric);
            }
        }
    }

    fn process_out_queue(&mut self, fabric: &mut Fabric<'_>) {
        while let Some(request) = self.out_queue.pop_ready(self.cycle) {
            assert!(
                request.kind.is_demand() || request.kind.is_writeback(),
                "{}: {} request #{} in the out queue",
                self.name(),
                request.kind,
                request.id
            );
            match self.downstream {
                Downstream::Cache(next) if request.kind.is_writeback() => {
                    fabric.peers.get_mut(next).fill(request);
                }
                Downstream::Cache(next) => {
                    fabric.peers.get_mut(next).access(request);
                }
                Downstream::Memory => {
                    fabric.memory.access(request);
                }
            }
        }
    }

    fn process_in_queue(&mut self, fabric: &mut Fabric<'_>) {
        while let Some(request) = self.in_queue.pop_ready(self.cycle) {
            if self.is_top_level() {
                self.lookup_top(request, fabric);
            } else {
                self.lookup_interior(request, fabric);
            }
        }
    }

    fn lookup_top(&mut self, mut request: Request, fabric: &mut Fabric<'_>) {
        let line = self.tags.line_addr(request.addr);
        if !self.tags.contains(request.addr) {
            if let Some(absorbed_by) = fabric.inflight.coalesce(self.id, line, request.kind) {
                self.tags.record_coalesced_hit(request.kind);
                debug!(
                    "[{}] #{} {} {:#x} merged into outstanding miss #{} @ {}",
                    self.name(),
                    request.id,
                    request.kind,
                    request.addr,
                    absorbed_by,
                    self.cycle
                );
                fabric.complete(request);
                return;
            }
        }

        if self.tags.access(request.addr, request.kind, false) {
            fabric.complete(request);
        } else {
            request.is_miss = true;
            fabric.inflight.mark_miss(request.id, self.id, line);
            self.out_queue.push(request);
        }
    }

    fn lookup_interior(&mut self, mut request: Request, fabric: &mut Fabric<'_>) {
        // dirtiness belongs to the level above, so writes look up as reads here
        let kind = serviced_as(request.kind);
        if self.tags.access(request.addr, kind, false) {
            request.dirty = false;
            self.send_up(request, fabric);
        } else {
            self.out_queue.push(request);
        }
    }

    fn absorb_writeback(&mut self, request: Request) {
        assert!(
            !self.is_top_level(),
            "{}: write-back #{} delivered to a top-level cache @ {:#x}",
            self.name(),
            request.id,
            request.addr
        );
        self.tags.access(request.addr, AccessKind::WriteBack, true);
        let retired = self.in_flight_wb.retire(request.id);
        assert!(
            retired.is_some(),
            "{}: untracked write-back #{} @ {:#x}",
            self.name(),
            request.id,
            request.addr
        );
        debug!(
            "[{}] write-back #{} {:#x} absorbed @ {}",
            self.name(),
            request.id,
            request.addr,
            self.cycle
        );
    }

    fn fill_top(&mut self, request: Request, fabric: &mut Fabric<'_>) {
        // a coalesced write may have upgraded the outstanding request
        let kind = fabric.inflight.kind_of(request.id).unwrap_or(request.kind);
        if request.bypass {
            self.retire_bypassed_fill(request, kind, fabric);
            return;
        }
        self.tags.access(request.addr, kind, true);
        debug!(
            "[{}] fill #{} {} {:#x} @ {}",
            self.name(),
            request.id,
            kind,
            request.addr,
            self.cycle
        );

        if let Some(evicted) = self.tags.last_eviction().filter(|ev| ev.dirty) {
            assert!(
                self.side != Some(Side::Instruction),
                "{}: instruction cache evicted a dirty line @ {:#x}",
                self.name(),
                evicted.addr
            );
            self.emit_writeback(evicted.addr, fabric);
        }
        fabric.complete(request);
    }

    // The line is gone below, so installing it would break inclusion. A write still owes memory
    // its data.
    fn retire_bypassed_fill(
        &mut self,
        request: Request,
        kind: AccessKind,
        fabric: &mut Fabric<'_>,
    ) {
        let dirty = kind.is_write();
        self.tags.record_bypassed_fill(dirty);
        debug!(
            "[{}] fill #{} {} {:#x} bypassed (dirty: {}) @ {}",
            self.name(),
            request.id,
            kind,
            request.addr,
            dirty,
            self.cycle
        );
        if dirty {
            let line_size = self.tags.line_size();
            let base = self.tags.line_addr(request.addr) * line_size;
            let writeback = Request::new_writeback(fabric.ids.next(), base, self.cycle);
            fabric.memory.track_writeback(WritebackTicket::for_request(&writeback));
            fabric.memory.access(writeback);
        }
        fabric.complete(request);
    }

    fn fill_interior(&mut self, request: Request, fabric: &mut Fabric<'_>) {
        let addr = request.addr;
        let kind = serviced_as(request.kind);
        // inclusion: whatever lands here also lands above
        self.send_up(request, fabric);

        // both split caches missed on this line; the first fill already installed it
        if self.tags.contains(addr) {
            debug!(
                "[{}] {:#x} already resident, forwarded only @ {}",
                self.name(),
                addr,
                self.cycle
            );
            return;
        }
        self.tags.access(addr, kind, true);
        let Some(evicted) = self.tags.last_eviction() else {
            return;
        };
        if evicted.dirty {
            self.emit_writeback(evicted.addr, fabric);
        }
        self.forward_stranded_writebacks(evicted.addr, fabric);
        self.back_invalidate_upstream(evicted.addr, fabric);
    }

    fn send_up(&self, request: Request, fabric: &mut Fabric<'_>) {
        let Some(target) = self.upstream.target_for(request.kind) else {
            panic!(
                "{}: no upstream cache for #{} {} {:#x}",
                self.name(),
                request.id,
                request.kind,
                request.addr
            );
        };
        fabric.peers.get_mut(target).fill(request);
    }

    fn emit_writeback(&mut self, addr: Addr, fabric: &mut Fabric<'_>) {
        let writeback = Request::new_writeback(fabric.ids.next(), addr, self.cycle);
        let ticket = WritebackTicket::for_request(&writeback);
        match self.downstream {
            Downstream::Cache(next) => fabric.peers.get_mut(next).writeback_tracker_mut().track(ticket),
            Downstream::Memory => fabric.memory.track_writeback(ticket),
        }
        debug!(
            "[{}] dirty eviction {:#x}, write-back #{} @ {}",
            self.name(),
            addr,
            writeback.id,
            self.cycle
        );
        self.wb_queue.push(writeback);
    }

    // Distinct upstream caches, data side first.
    fn upstream_targets(&self) -> SmallVec<[(ActorId, Side); 2]> {
        let Upstream::Caches { inst, data } = self.upstream else {
            return SmallVec::new();
        };
        let mut targets: SmallVec<[(ActorId, Side); 2]> = smallvec![(data, Side::Data)];
        if inst != data {
            targets.push((inst, Side::Instruction));
        }
        targets
    }

    /// Write-backs from above for a line this level just evicted can no longer be absorbed here.
    /// They are retired from this level's tracker and passed on to memory.
    fn forward_stranded_writebacks(&mut self, addr: Addr, fabric: &mut Fabric<'_>) {
        let line_size = self.tags.line_size();
        let line = self.tags.line_addr(addr);
        let mut stranded = self
            .fill_queue
            .take_where(|req| req.kind.is_writeback() && req.addr / line_size == line);
        for (target, _) in self.upstream_targets() {
            stranded.extend(fabric.peers.get_mut(target).take_outbound_writebacks(line_size, line));
        }

        for writeback in stranded {
            let Some(ticket) = self.in_flight_wb.retire(writeback.id) else {
                panic!(
                    "{}: untracked write-back #{} @ {:#x}",
                    self.name(),
                    writeback.id,
                    writeback.addr
                );
            };
            self.tags.record_forwarded_writeback();
            debug!(
                "[{}] write-back #{} {:#x} forwarded to {} @ {}",
                self.name(),
                writeback.id,
                writeback.addr,
                fabric.memory.name(),
                self.cycle
            );
            fabric.memory.track_writeback(ticket);
            fabric.memory.access(writeback);
        }
    }

    /// Hand over write-backs for `line` (in units of `line_size`) that have not left this cache.
    pub(crate) fn take_outbound_writebacks(&mut self, line_size: u64, line: u64) -> Vec<Request> {
        let same_line = move |req: &Request| req.kind.is_writeback() && req.addr / line_size == line;
        let mut taken = self.wb_queue.take_where(same_line);
        taken.extend(self.out_queue.take_where(same_line));
        taken
    }

    /// Mark queued demand fills for `addr`'s line so they complete without installing. Returns
    /// how many were marked.
    pub(crate) fn bypass_pending_fills(&mut self, addr: Addr) -> usize {
        let line = self.tags.line_addr(addr);
        let line_size = self.tags.line_size();
        let mut marked = 0;
        for request in self.fill_queue.iter_mut() {
            if !request.kind.is_writeback() && request.addr / line_size == line {
                request.bypass = true;
                marked += 1;
            }
        }
        marked
    }

    fn back_invalidate_upstream(&mut self, addr: Addr, fabric: &mut Fabric<'_>) {
        for (target, which) in self.upstream_targets() {
            let peer = fabric.peers.get_mut(target);
            if peer.tags.access(addr, AccessKind::Check, false) {
                peer.back_inv(addr, which, fabric.memory, fabric.ids);
            } else if peer.bypass_pending_fills(addr) > 0 {
                debug!(
                    "[{}] {:#x} evicted under a pending fill in {} @ {}",
                    self.name(),
                    addr,
                    peer.name(),
                    self.cycle
                );
            }
        }
    }

    /// Drop `addr` because the inclusive level below evicted it. A dirty copy is written straight
    /// to memory, bypassing this cache's queues.
    pub(crate) fn back_inv(
        &mut self,
        addr: Addr,
        which: Side,
        memory: &mut MainMemory,
        ids: &mut RequestIds,
    ) {
        let Some(line) = self.tags.peek_line(addr) else {
            panic!("{}: back-invalidation missed @ {:#x}", self.name(), addr);
        };
        assert!(
            !(line.dirty && which == Side::Instruction),
            "{}: instruction-side back-invalidation found a dirty line @ {:#x}",
            self.name(),
            addr
        );

        let dirty = self.tags.back_invalidate(addr);
        debug!(
            "[{}] back-invalidate {:#x} (dirty: {}) @ {}",
            self.name(),
            addr,
            dirty,
            self.cycle
        );
        if dirty {
            let writeback = Request::new_writeback(ids.next(), addr, self.cycle);
            memory.track_writeback(WritebackTicket::for_request(&writeback));
            memory.access(writeback);
        }
    }

    pub fn report(&self) -> String {
        self.tags.report()
    }
}

// Interior levels service writes as reads.
fn serviced_as(kind: AccessKind) -> AccessKind {
    if kind.is_write() {
        AccessKind::Read
    } else {
        kind
    }
}
