use super::support::{access_and_drain, drain, hierarchy, level};
use crate::mem::config::Topology;
use crate::mem::request::AccessKind;

#[test]
fn l1_writeback_is_tracked_by_l2_until_absorbed() {
    let mut hier = hierarchy(Topology::MultiLevel, level(64, 2, 32, 1), level(1024, 4, 32, 4), 10);
    access_and_drain(&mut hier, 0x0, AccessKind::Write);
    access_and_drain(&mut hier, 0x20, AccessKind::Write);

    hier.access(0x40, AccessKind::Read);
    let mut seen_pending = false;
    let mut completed = 0;
    for _ in 0..1000 {
        if hier.is_idle() {
            break;
        }
        hier.run_a_cycle();
        while hier.pop_completion().is_some() {
            completed += 1;
        }
        assert!(hier.actor("L1U").unwrap().writeback_tracker().is_empty());
        if !hier.is_wb_done() {
            seen_pending = true;
            assert_eq!(hier.actor("L2").unwrap().writeback_tracker().len(), 1);
        }
    }
    assert!(seen_pending);
    assert_eq!(completed, 1);
    assert!(hier.is_idle());

    let l1 = hier.actor("L1U").unwrap().tags();
    let l2 = hier.actor("L2").unwrap().tags();
    assert_eq!(l1.stats().writebacks(), 1);
    assert!(!l1.contains(0x0));
    assert!(l2.peek_line(0x0).unwrap().dirty);
    assert_eq!(hier.memory().stats().writebacks, 0);
}

#[test]
fn l2_dirty_eviction_reaches_memory() {
    let mut hier = hierarchy(Topology::MultiLevel, level(64, 2, 32, 1), level(128, 2, 32, 2), 10);
    access_and_drain(&mut hier, 0x0, AccessKind::Write);
    access_and_drain(&mut hier, 0x20, AccessKind::Read);
    // pushes dirty 0x0 out of L1 into L2
    access_and_drain(&mut hier, 0x40, AccessKind::Read);
    assert!(hier.actor("L2").unwrap().tags().peek_line(0x0).unwrap().dirty);

    // 0x0 is now L2's LRU line in set 0
    access_and_drain(&mut hier, 0x80, AccessKind::Read);
    let l2 = hier.actor("L2").unwrap().tags();
    assert!(!l2.contains(0x0));
    assert_eq!(l2.stats().writebacks(), 1);
    assert_eq!(hier.memory().stats().writebacks, 1);
    assert_eq!(hier.actor("L1U").unwrap().tags().stats().back_invalidations(), 0);
    assert!(hier.is_wb_done());
}

#[test]
fn writebacks_are_not_completions() {
    let mut hier = hierarchy(Topology::SingleLevel, level(64, 1, 32, 1), level(1024, 4, 32, 4), 10);
    hier.access(0x0, AccessKind::Write);
    hier.access(0x40, AccessKind::Write);
    hier.access(0x80, AccessKind::Write);
    let done = drain(&mut hier);
    assert_eq!(done.len(), 3);
    assert!(done.iter().all(|c| c.kind == AccessKind::Write));
    assert_eq!(hier.memory().stats().writebacks, 2);
    assert_eq!(hier.completed(), 3);
}
