use crate::mem::config::{CacheLevelConfig, HierarchyConfig, MemoryConfig, Topology};
use crate::mem::hierarchy::MemoryHierarchy;
use crate::mem::request::{AccessKind, Addr, Completion};

pub const DRAIN_LIMIT: u64 = 10_000;

pub fn level(size: usize, assoc: usize, line_size: u64, latency: u64) -> CacheLevelConfig {
    CacheLevelConfig::new(size, assoc, line_size, latency)
}

pub fn hierarchy(
    topology: Topology,
    l1: CacheLevelConfig,
    l2: CacheLevelConfig,
    mem_latency: u64,
) -> MemoryHierarchy {
    let config = HierarchyConfig {
        topology,
        l1d: l1,
        l1i: l1,
        l2,
        memory: MemoryConfig {
            latency: mem_latency,
        },
    };
    MemoryHierarchy::new(&config).unwrap()
}

pub fn drain(hier: &mut MemoryHierarchy) -> Vec<Completion> {
    let mut completions = Vec::new();
    let start = hier.cycle();
    while !hier.is_idle() {
        assert!(
            hier.cycle() - start < DRAIN_LIMIT,
            "hierarchy did not drain within {} cycles",
            DRAIN_LIMIT
        );
        hier.run_a_cycle();
        while let Some(completion) = hier.pop_completion() {
            completions.push(completion);
        }
    }
    completions
}

/// Issue one access and run until it and everything it caused has drained.
pub fn access_and_drain(hier: &mut MemoryHierarchy, addr: Addr, kind: AccessKind) -> Completion {
    assert!(hier.access(addr, kind));
    let mut completions = drain(hier);
    assert_eq!(completions.len(), 1);
    completions.remove(0)
}
