use smallvec::SmallVec;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use super::stats::CacheStats;
use crate::mem::request::{AccessKind, Addr};

const RULE: &str = "------------------------------";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Line {
    pub valid: bool,
    pub dirty: bool,
    pub tag: u64,
}

/// One set: `assoc` lines plus a recency list of way indices, MRU at the front.
///
/// The recency list only ever holds valid ways, so its length tracks the number of valid lines.
#[derive(Debug)]
pub struct CacheSet {
    lines: Vec<Line>,
    recency: SmallVec<[usize; 8]>,
}

impl CacheSet {
    fn new(assoc: usize) -> Self {
        Self {
            lines: vec![Line::default(); assoc],
            recency: SmallVec::new(),
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Way indices from most- to least-recently used.
    pub fn recency(&self) -> &[usize] {
        &self.recency
    }

    pub fn valid_count(&self) -> usize {
        self.lines.iter().filter(|line| line.valid).count()
    }

    fn find(&self, tag: u64) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.valid && line.tag == tag)
    }

    // first invalid way, else the LRU way
    fn victim_way(&self) -> usize {
        self.lines
            .iter()
            .position(|line| !line.valid)
            .or_else(|| self.recency.last().copied())
            .unwrap_or(0)
    }

    fn touch(&mut self, way: usize) {
        self.forget(way);
        self.recency.insert(0, way);
    }

    fn forget(&mut self, way: usize) {
        if let Some(pos) = self.recency.iter().position(|&w| w == way) {
            self.recency.remove(pos);
        }
    }
}

/// Line displaced by the most recent fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub addr: Addr,
    pub dirty: bool,
}

/// Set-associative tag store with LRU replacement. No data and no timing.
#[derive(Debug)]
pub struct TagStore {
    name: String,
    num_sets: usize,
    assoc: usize,
    line_size: u64,
    sets: Vec<CacheSet>,
    stats: CacheStats,
    eviction: Option<Eviction>,
}

impl TagStore {
    pub fn new(name: impl Into<String>, num_sets: usize, assoc: usize, line_size: u64) -> Self {
        let name = name.into();
        assert!(num_sets > 0, "{name}: num_sets must be > 0");
        assert!(assoc > 0, "{name}: assoc must be > 0");
        assert!(line_size > 0, "{name}: line_size must be > 0");
        Self {
            name,
            num_sets,
            assoc,
            line_size,
            sets: (0..num_sets).map(|_| CacheSet::new(assoc)).collect(),
            stats: CacheStats::default(),
            eviction: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn num_sets(&self) -> usize {
        self.num_sets
    }

    pub fn assoc(&self) -> usize {
        self.assoc
    }

    pub fn line_size(&self) -> u64 {
        self.line_size
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn sets(&self) -> &[CacheSet] {
        &self.sets
    }

    pub fn tag_of(&self, addr: Addr) -> u64 {
        addr / (self.num_sets as u64 * self.line_size)
    }

    pub fn set_index_of(&self, addr: Addr) -> usize {
        ((addr / self.line_size) % self.num_sets as u64) as usize
    }

    /// Line-granular address, used to match requests that target the same line.
    pub fn line_addr(&self, addr: Addr) -> u64 {
        addr / self.line_size
    }

    /// First byte address of the line holding `tag` in `set_index`.
    pub fn line_base(&self, tag: u64, set_index: usize) -> Addr {
        (tag * self.num_sets as u64 + set_index as u64) * self.line_size
    }

    fn locate(&self, addr: Addr) -> (usize, u64, Option<usize>) {
        let set_index = self.set_index_of(addr);
        let tag = self.tag_of(addr);
        (set_index, tag, self.sets[set_index].find(tag))
    }

    /// Look up (`is_fill == false`) or install (`is_fill == true`) the line for `addr`.
    ///
    /// Returns whether the line was resident before the call. `Check` looks up without touching any
    /// state. A `WriteBack` may only arrive as a fill and must hit; a demand fill must miss.
    pub fn access(&mut self, addr: Addr, kind: AccessKind, is_fill: bool) -> bool {
        if kind == AccessKind::Check {
            assert!(!is_fill, "{}: check access used as a fill @ {:#x}", self.name, addr);
            return self.contains(addr);
        }
        if is_fill {
            self.fill(addr, kind)
        } else {
            self.lookup(addr, kind)
        }
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.locate(addr).2.is_some()
    }

    pub fn peek_line(&self, addr: Addr) -> Option<&Line> {
        let (set_index, _, way) = self.locate(addr);
        way.map(|way| &self.sets[set_index].lines[way])
    }

    fn lookup(&mut self, addr: Addr, kind: AccessKind) -> bool {
        assert!(
            !kind.is_writeback(),
            "{}: write-back presented as an ordinary access @ {:#x}",
            self.name,
            addr
        );
        let (set_index, _, way) = self.locate(addr);
        if let Some(way) = way {
            let set = &mut self.sets[set_index];
            if kind.is_write() {
                set.lines[way].dirty = true;
            }
            set.touch(way);
        }
        self.stats.record_lookup(way.is_some(), kind.is_write());
        way.is_some()
    }

    /// Count an access that was satisfied by an already outstanding miss.
    pub(crate) fn record_coalesced_hit(&mut self, kind: AccessKind) {
        self.stats.record_lookup(true, kind.is_write());
    }

    /// Count a fill that was dropped because the level below evicted its line in the meantime.
    /// It is accounted as a back-invalidation of the line it would have installed.
    pub(crate) fn record_bypassed_fill(&mut self, dirty: bool) {
        self.stats.record_back_invalidation(dirty);
    }

    /// Count a write-back from above that was passed on to memory instead of absorbed.
    pub(crate) fn record_forwarded_writeback(&mut self) {
        self.stats.record_writeback();
    }

    fn fill(&mut self, addr: Addr, kind: AccessKind) -> bool {
        self.eviction = None;
        let (set_index, tag, way) = self.locate(addr);

        if kind.is_writeback() {
            let Some(way) = way else {
                panic!(
                    "{}: write-back fill missed @ {:#x}, inclusion violated",
                    self.name, addr
                );
            };
            // not a use; recency is left alone
            self.sets[set_index].lines[way].dirty = true;
            return true;
        }

        assert!(
            way.is_none(),
            "{}: {} fill for already resident line @ {:#x}",
            self.name,
            kind,
            addr
        );

        let victim = self.sets[set_index].victim_way();
        let old = self.sets[set_index].lines[victim];
        if old.valid {
            let evicted = Eviction {
                addr: self.line_base(old.tag, set_index),
                dirty: old.dirty,
            };
            if evicted.dirty {
                self.stats.record_writeback();
            }
            self.eviction = Some(evicted);
        }

        let set = &mut self.sets[set_index];
        set.forget(victim);
        set.lines[victim] = Line {
            valid: true,
            dirty: kind.is_write(),
            tag,
        };
        set.touch(victim);
        false
    }

    pub fn last_eviction(&self) -> Option<Eviction> {
        self.eviction
    }

    pub fn is_evicted(&self) -> bool {
        self.eviction.is_some()
    }

    pub fn is_evicted_dirty(&self) -> bool {
        self.eviction.map_or(false, |ev| ev.dirty)
    }

    pub fn evicted_addr(&self) -> Option<Addr> {
        self.eviction.map(|ev| ev.addr)
    }

    /// Drop the line for `addr`. Returns its state before invalidation.
    pub fn invalidate(&mut self, addr: Addr) -> Line {
        let (set_index, _, way) = self.locate(addr);
        let Some(way) = way else {
            panic!("{}: invalidation missed @ {:#x}", self.name, addr);
        };
        let set = &mut self.sets[set_index];
        let before = set.lines[way];
        set.lines[way] = Line::default();
        set.forget(way);
        before
    }

    /// Invalidate on behalf of an inclusive level below. Returns whether the line was dirty.
    pub fn back_invalidate(&mut self, addr: Addr) -> bool {
        let dirty = self.invalidate(addr).dirty;
        self.stats.record_back_invalidation(dirty);
        dirty
    }

    pub fn report(&self) -> String {
        format!(
            "{RULE}\n{} Hit Rate: {} % \n{RULE}\n{}",
            self.name,
            self.stats.hit_rate(),
            self.stats
        )
    }

    pub fn dump<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{RULE}")?;
        writeln!(out, "{} Tag Store", self.name)?;
        writeln!(out, "{RULE}")?;
        for set in &self.sets {
            for line in set.lines() {
                write!(
                    out,
                    "[{}, {}, {:>10x}] ",
                    line.valid as u8, line.dirty as u8, line.tag
                )?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn dump_to_file(&self) -> io::Result<PathBuf> {
        let path = PathBuf::from(format!("{}.dump", self.name));
        let mut out = BufWriter::new(File::create(&path)?);
        self.dump(&mut out)?;
        out.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::TagStore;
    use crate::mem::request::AccessKind::*;

    fn assert_set_bound(tags: &TagStore) {
        for set in tags.sets() {
            assert!(set.valid_count() <= tags.assoc());
            assert_eq!(set.recency().len(), set.valid_count());
        }
    }

    #[test]
    fn decomposition_brackets_the_address() {
        let tags = TagStore::new("t", 16, 2, 64);
        for addr in [0u64, 63, 64, 1023, 1024, 0xdead_beef, u64::MAX / 2] {
            let base = tags.line_base(tags.tag_of(addr), tags.set_index_of(addr));
            assert!(base <= addr && addr < base + 64, "addr {addr:#x}");
        }
    }

    #[test]
    fn demand_access_never_allocates() {
        let mut tags = TagStore::new("t", 4, 2, 64);
        assert!(!tags.access(0x100, Read, false));
        assert!(!tags.access(0x100, Write, false));
        assert!(!tags.contains(0x100));
        assert_eq!(tags.stats().misses(), 2);
        assert_eq!(tags.stats().writes(), 1);
    }

    #[test]
    fn round_trip_two_way_set() {
        let mut tags = TagStore::new("t", 1, 2, 4);

        assert!(!tags.access(0, Read, false));
        assert!(!tags.access(0, Read, true));
        assert!(tags.access(0, Read, false));

        assert!(!tags.access(4, Write, false));
        assert!(!tags.access(4, Write, true));
        assert!(tags.peek_line(4).unwrap().dirty);
        assert!(!tags.is_evicted());

        assert!(!tags.access(8, Write, false));
        tags.access(8, Write, true);
        assert!(tags.is_evicted());
        assert!(!tags.is_evicted_dirty());
        assert_eq!(tags.evicted_addr(), Some(0));
        assert!(!tags.contains(0));

        assert!(tags.access(4, Read, false));

        assert!(!tags.access(12, Write, false));
        tags.access(12, Write, true);
        assert!(tags.is_evicted_dirty());
        assert_eq!(tags.evicted_addr(), Some(8));
        assert_eq!(tags.stats().writebacks(), 1);
        assert_set_bound(&tags);
    }

    #[test]
    fn lru_evicts_least_recently_touched() {
        let mut tags = TagStore::new("t", 1, 4, 64);
        for addr in [0u64, 64, 128, 192] {
            tags.access(addr, Read, true);
        }
        tags.access(0, Read, false);
        tags.access(128, Read, false);
        tags.access(256, Read, true);
        assert_eq!(tags.evicted_addr(), Some(64));
        tags.access(320, Read, true);
        assert_eq!(tags.evicted_addr(), Some(192));
        assert!(tags.contains(0));
        assert!(tags.contains(128));
        assert_set_bound(&tags);
    }

    #[test]
    fn writeback_fill_marks_dirty_without_promotion() {
        let mut tags = TagStore::new("t", 1, 2, 64);
        tags.access(0, Read, true);
        tags.access(64, Read, true);
        assert!(tags.access(0, WriteBack, true));
        assert!(tags.peek_line(0).unwrap().dirty);
        // 0 is still LRU
        tags.access(128, Read, true);
        assert_eq!(tags.evicted_addr(), Some(0));
        assert!(tags.is_evicted_dirty());
    }

    #[test]
    fn check_is_side_effect_free() {
        let mut tags = TagStore::new("t", 2, 1, 64);
        tags.access(0, Read, true);
        let before = *tags.stats();
        assert!(tags.access(0, Check, false));
        assert!(!tags.access(64, Check, false));
        assert_eq!(*tags.stats(), before);
        assert_eq!(tags.sets()[0].recency(), &[0]);
    }

    #[test]
    fn eviction_state_resets_on_next_fill() {
        let mut tags = TagStore::new("t", 1, 1, 64);
        tags.access(0, Read, true);
        tags.access(64, Read, true);
        assert!(tags.is_evicted());
        tags.invalidate(64);
        tags.access(128, Read, true);
        assert!(!tags.is_evicted());
    }

    #[test]
    fn back_invalidate_clears_and_counts() {
        let mut tags = TagStore::new("t", 2, 2, 64);
        tags.access(0, Write, true);
        tags.access(64, Read, true);
        assert!(tags.back_invalidate(0));
        assert!(!tags.back_invalidate(64));
        assert!(!tags.contains(0));
        assert_eq!(tags.stats().back_invalidations(), 2);
        assert_eq!(tags.stats().back_invalidation_writebacks(), 1);
        assert_eq!(tags.stats().writebacks(), 0);
        assert_set_bound(&tags);
    }

    #[test]
    #[should_panic(expected = "write-back fill missed")]
    fn writeback_fill_miss_is_fatal() {
        let mut tags = TagStore::new("t", 1, 1, 64);
        tags.access(0, WriteBack, true);
    }

    #[test]
    #[should_panic(expected = "write-back presented as an ordinary access")]
    fn writeback_lookup_is_fatal() {
        let mut tags = TagStore::new("t", 1, 1, 64);
        tags.access(0, WriteBack, false);
    }

    #[test]
    #[should_panic(expected = "check access used as a fill")]
    fn check_fill_is_fatal() {
        let mut tags = TagStore::new("t", 1, 1, 64);
        tags.access(0, Check, true);
    }

    #[test]
    #[should_panic(expected = "invalidation missed")]
    fn invalidate_miss_is_fatal() {
        let mut tags = TagStore::new("t", 1, 1, 64);
        tags.invalidate(0);
    }

    #[test]
    fn dump_lists_every_way() {
        let mut tags = TagStore::new("L1", 2, 2, 64);
        tags.access(0x1000, Write, true);
        let mut buf = Vec::new();
        tags.dump(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("L1 Tag Store"));
        assert!(text.contains("[1, 1,         20]"));
        assert_eq!(text.lines().count(), 5);
    }
}
