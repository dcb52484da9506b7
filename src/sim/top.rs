use anyhow::bail;
use log::info;
use serde::Serialize;

use crate::mem::config::HierarchyConfig;
use crate::mem::hierarchy::{HierarchyStats, MemoryHierarchy};
use crate::sim::trace::TraceRecord;
use crate::timeq::Cycle;

#[derive(Debug, Clone, Serialize)]
pub struct SimSummary {
    pub cycles: Cycle,
    pub issued: u64,
    pub completed: u64,
    pub misses: u64,
    pub avg_latency: f64,
    pub hierarchy: HierarchyStats,
}

#[derive(Debug, Default)]
struct LatencyTally {
    completed: u64,
    misses: u64,
    total_latency: u64,
}

impl LatencyTally {
    fn avg(&self) -> f64 {
        if self.completed == 0 {
            0.0
        } else {
            self.total_latency as f64 / self.completed as f64
        }
    }
}

pub struct Sim {
    pub hierarchy: MemoryHierarchy,
    pub timeout: u64,
    tally: LatencyTally,
    issued: u64,
}

impl Sim {
    pub fn new(config: &HierarchyConfig, timeout: u64) -> anyhow::Result<Self> {
        Ok(Self {
            hierarchy: MemoryHierarchy::new(config)?,
            timeout,
            tally: LatencyTally::default(),
            issued: 0,
        })
    }

    fn tick(&mut self) -> anyhow::Result<()> {
        if self.hierarchy.cycle() >= self.timeout {
            bail!(
                "simulation timeout after {} cycles ({} requests in flight, {} queued, write-backs done: {})",
                self.timeout,
                self.hierarchy.num_in_flight(),
                self.hierarchy.queued(),
                self.hierarchy.is_wb_done()
            );
        }
        self.hierarchy.run_a_cycle();
        while let Some(completion) = self.hierarchy.pop_completion() {
            self.tally.completed += 1;
            self.tally.total_latency += completion.latency();
            if completion.miss {
                self.tally.misses += 1;
            }
        }
        Ok(())
    }

    /// Issue one access per cycle, then cycle until every request and write-back has drained.
    pub fn simulate<I>(&mut self, trace: I) -> anyhow::Result<SimSummary>
    where
        I: IntoIterator<Item = TraceRecord>,
    {
        for record in trace {
            self.hierarchy.access(record.addr, record.kind);
            self.issued += 1;
            self.tick()?;
        }
        while !self.hierarchy.is_idle() {
            self.tick()?;
        }
        info!(
            "simulation finished in {} cycles, {} accesses",
            self.hierarchy.cycle(),
            self.issued
        );
        Ok(self.summary())
    }

    pub fn summary(&self) -> SimSummary {
        SimSummary {
            cycles: self.hierarchy.cycle(),
            issued: self.issued,
            completed: self.tally.completed,
            misses: self.tally.misses,
            avg_latency: self.tally.avg(),
            hierarchy: self.hierarchy.stats(),
        }
    }
}
