use anyhow::{bail, Context};
use log::{debug, info};
use serde::Serialize;
use std::collections::VecDeque;
use std::io::Write;

use super::config::{CacheLevelConfig, HierarchyConfig, Topology};
use super::fabric::{ActorId, Downstream, Fabric, Peers, RequestIds, Upstream};
use super::inflight::InflightTable;
use super::request::{AccessKind, Addr, Completion, Request, Side};
use super::simple_mem::{MainMemory, MemUpstream, MemoryStats};
use crate::cache::actor::CacheActor;
use crate::cache::stats::CacheStats;
use crate::cache::tag_store::TagStore;
use crate::timeq::Cycle;

/// Where new accesses from the core enter the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Memory,
    Unified(ActorId),
    Split { inst: ActorId, data: ActorId },
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelStats {
    pub name: String,
    pub stats: CacheStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct HierarchyStats {
    pub topology: Topology,
    pub cycles: Cycle,
    pub levels: Vec<LevelStats>,
    // summed over the caches the core talks to
    pub top_level: CacheStats,
    pub memory: MemoryStats,
}

/// Caches and main memory wired into one of the fixed topologies.
///
/// Owns every request that is in flight: requests live in exactly one queue at a time, the
/// in-flight table keeps the bookkeeping needed to coalesce misses, and the done queue is where
/// finished requests are retired at the end of each cycle.
#[derive(Debug)]
pub struct MemoryHierarchy {
    topology: Topology,
    actors: Vec<CacheActor>,
    memory: MainMemory,
    entry: Entry,
    ids: RequestIds,
    cycle: Cycle,
    inflight: InflightTable,
    done: VecDeque<Request>,
    completions: VecDeque<Completion>,
    completed: u64,
}

fn build_cache(
    id: ActorId,
    name: &str,
    cfg: &CacheLevelConfig,
    upstream: Upstream,
    downstream: Downstream,
) -> CacheActor {
    let tags = TagStore::new(name, cfg.num_sets(), cfg.assoc, cfg.line_size);
    CacheActor::new(id, tags, cfg.latency, upstream, downstream)
}

impl MemoryHierarchy {
    pub fn new(config: &HierarchyConfig) -> anyhow::Result<Self> {
        config.validate().context("invalid hierarchy configuration")?;

        let latency = config.memory.latency;
        let (actors, memory, entry) = match config.topology {
            Topology::DramOnly => (
                Vec::new(),
                MainMemory::new("DRAM", latency, MemUpstream::Core),
                Entry::Memory,
            ),
            Topology::SingleLevel => (
                vec![build_cache(0, "L1D", &config.l1d, Upstream::Core, Downstream::Memory)],
                MainMemory::new("DRAM", latency, MemUpstream::Cache(0)),
                Entry::Unified(0),
            ),
            Topology::MultiLevel => (
                vec![
                    build_cache(0, "L1U", &config.l1d, Upstream::Core, Downstream::Cache(1)),
                    build_cache(
                        1,
                        "L2",
                        &config.l2,
                        Upstream::Caches { inst: 0, data: 0 },
                        Downstream::Memory,
                    ),
                ],
                MainMemory::new("DRAM", latency, MemUpstream::Cache(1)),
                Entry::Unified(0),
            ),
            Topology::SplitL1 => (
                vec![
                    build_cache(0, "L1I", &config.l1i, Upstream::Core, Downstream::Cache(2))
                        .with_side(Side::Instruction),
                    build_cache(1, "L1D", &config.l1d, Upstream::Core, Downstream::Cache(2))
                        .with_side(Side::Data),
                    build_cache(
                        2,
                        "L2",
                        &config.l2,
                        Upstream::Caches { inst: 0, data: 1 },
                        Downstream::Memory,
                    ),
                ],
                MainMemory::new("DRAM", latency, MemUpstream::Cache(2)),
                Entry::Split { inst: 0, data: 1 },
            ),
        };

        let hierarchy = Self {
            topology: config.topology,
            actors,
            memory,
            entry,
            ids: RequestIds::default(),
            cycle: 0,
            inflight: InflightTable::new(),
            done: VecDeque::new(),
            completions: VecDeque::new(),
            completed: 0,
        };
        hierarchy.validate_links()?;
        info!(
            "memory hierarchy {:?}: {}",
            hierarchy.topology,
            hierarchy
                .actors
                .iter()
                .map(|actor| actor.name())
                .chain(std::iter::once(hierarchy.memory.name()))
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(hierarchy)
    }

    // every neighbor reference must name another existing actor
    fn validate_links(&self) -> anyhow::Result<()> {
        let count = self.actors.len();
        let check = |from: &CacheActor, to: ActorId| -> anyhow::Result<()> {
            if to >= count || to == from.id() {
                bail!("{}: invalid neighbor reference {}", from.name(), to);
            }
            Ok(())
        };
        for (idx, actor) in self.actors.iter().enumerate() {
            if actor.id() != idx {
                bail!("{}: id {} stored at slot {}", actor.name(), actor.id(), idx);
            }
            if let Upstream::Caches { inst, data } = actor.upstream() {
                check(actor, inst)?;
                check(actor, data)?;
            }
            if let Downstream::Cache(next) = actor.downstream() {
                check(actor, next)?;
            }
        }
        match (self.memory.upstream(), self.entry) {
            (MemUpstream::Core, Entry::Memory) => {}
            (MemUpstream::Cache(id), _) if id < count => {}
            (upstream, _) => bail!("{}: invalid upstream {:?}", self.memory.name(), upstream),
        }
        match self.entry {
            Entry::Memory => {}
            Entry::Unified(id) if id < count => {}
            Entry::Split { inst, data } if inst < count && data < count => {}
            entry => bail!("invalid entry point {:?}", entry),
        }
        Ok(())
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    pub fn actors(&self) -> &[CacheActor] {
        &self.actors
    }

    pub fn actor(&self, name: &str) -> Option<&CacheActor> {
        self.actors.iter().find(|actor| actor.name() == name)
    }

    pub fn memory(&self) -> &MainMemory {
        &self.memory
    }

    pub fn inflight(&self) -> &InflightTable {
        &self.inflight
    }

    pub fn num_in_flight(&self) -> usize {
        self.inflight.len()
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Requests sitting in any cache queue or in memory.
    pub fn queued(&self) -> usize {
        self.actors.iter().map(CacheActor::queued).sum::<usize>() + self.memory.pending()
    }

    /// Issue an access from the core. Acknowledges scheduling only; the outcome shows up later as
    /// a `Completion`.
    pub fn access(&mut self, addr: Addr, kind: AccessKind) -> bool {
        assert!(
            kind.is_demand(),
            "{} cannot be issued as an ordinary access @ {:#x}",
            kind,
            addr
        );
        let request = Request::new(self.ids.next(), addr, kind, self.cycle);
        debug!(
            "[MEM_H] create #{} {} {:#x} @ {}",
            request.id, kind, addr, self.cycle
        );
        self.inflight.insert(request.id, addr, kind);

        match self.entry {
            Entry::Memory => self.memory.access(request),
            Entry::Unified(id) => self.actors[id].access(request),
            Entry::Split { inst, data } => match kind.side() {
                Side::Instruction => self.actors[inst].access(request),
                Side::Data => self.actors[data].access(request),
            },
        }
    }

    /// Advance every component by one cycle, top level first, memory last, then retire whatever
    /// finished.
    pub fn run_a_cycle(&mut self) {
        for idx in 0..self.actors.len() {
            let (actor, peers) = Peers::split(&mut self.actors, idx);
            let mut fabric = Fabric {
                peers,
                memory: &mut self.memory,
                inflight: &mut self.inflight,
                done: &mut self.done,
                ids: &mut self.ids,
            };
            actor.run_a_cycle(&mut fabric);
        }
        self.memory.run_a_cycle(&mut self.actors, &mut self.done);
        self.process_done();
        self.cycle += 1;
    }

    fn process_done(&mut self) {
        while let Some(request) = self.done.pop_front() {
            let retired = self.inflight.remove(request.id);
            assert!(
                retired.is_some(),
                "done request #{} was never in flight",
                request.id
            );
            debug!(
                "[MEM_H] done #{} {} {:#x} @ {}",
                request.id, request.kind, request.addr, self.cycle
            );
            self.completions
                .push_back(Completion::from_request(&request, self.cycle));
            self.completed += 1;
        }
    }

    pub fn pop_completion(&mut self) -> Option<Completion> {
        self.completions.pop_front()
    }

    /// True once no write-back is outstanding anywhere in the hierarchy.
    pub fn is_wb_done(&self) -> bool {
        self.actors
            .iter()
            .all(|actor| actor.writeback_tracker().is_empty())
            && self.memory.writeback_tracker().is_empty()
    }

    pub fn is_idle(&self) -> bool {
        self.inflight.is_empty() && self.is_wb_done()
    }

    pub fn stats(&self) -> HierarchyStats {
        let mut top_level = CacheStats::default();
        for actor in self.actors.iter().filter(|actor| actor.is_top_level()) {
            top_level += actor.tags().stats();
        }
        HierarchyStats {
            topology: self.topology,
            cycles: self.cycle,
            levels: self
                .actors
                .iter()
                .map(|actor| LevelStats {
                    name: actor.name().to_string(),
                    stats: *actor.tags().stats(),
                })
                .collect(),
            top_level,
            memory: *self.memory.stats(),
        }
    }

    pub fn report(&self) -> String {
        self.actors
            .iter()
            .map(CacheActor::report)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn dump<W: Write>(&self, out: &mut W) -> anyhow::Result<()> {
        for actor in &self.actors {
            actor.tags().dump(out)?;
        }
        Ok(())
    }

    pub fn dump_to_files(&self) -> anyhow::Result<()> {
        for actor in &self.actors {
            let path = actor
                .tags()
                .dump_to_file()
                .with_context(|| format!("cannot write tag store dump for {}", actor.name()))?;
            info!("wrote {}", path.display());
        }
        Ok(())
    }
}
