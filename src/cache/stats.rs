use serde::Serialize;
use std::fmt;
use std::ops::AddAssign;

/// Monotonic per-level counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    accesses: u64,
    hits: u64,
    misses: u64,
    writes: u64,
    writebacks: u64,
    back_invalidations: u64,
    back_invalidation_writebacks: u64,
}

impl CacheStats {
    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn writebacks(&self) -> u64 {
        self.writebacks
    }

    pub fn back_invalidations(&self) -> u64 {
        self.back_invalidations
    }

    pub fn back_invalidation_writebacks(&self) -> u64 {
        self.back_invalidation_writebacks
    }

    pub fn hit_rate(&self) -> f64 {
        if self.accesses == 0 {
            return 0.0;
        }
        self.hits as f64 / self.accesses as f64 * 100.0
    }

    pub(crate) fn record_lookup(&mut self, hit: bool, is_write: bool) {
        self.accesses = self.accesses.saturating_add(1);
        if hit {
            self.hits = self.hits.saturating_add(1);
        } else {
            self.misses = self.misses.saturating_add(1);
        }
        if is_write {
            self.writes = self.writes.saturating_add(1);
        }
    }

    pub(crate) fn record_writeback(&mut self) {
        self.writebacks = self.writebacks.saturating_add(1);
    }

    pub(crate) fn record_back_invalidation(&mut self, dirty: bool) {
        self.back_invalidations = self.back_invalidations.saturating_add(1);
        if dirty {
            self.back_invalidation_writebacks = self.back_invalidation_writebacks.saturating_add(1);
        }
    }
}

impl AddAssign<&CacheStats> for CacheStats {
    fn add_assign(&mut self, other: &CacheStats) {
        self.accesses = self.accesses.saturating_add(other.accesses);
        self.hits = self.hits.saturating_add(other.hits);
        self.misses = self.misses.saturating_add(other.misses);
        self.writes = self.writes.saturating_add(other.writes);
        self.writebacks = self.writebacks.saturating_add(other.writebacks);
        self.back_invalidations = self
            .back_invalidations
            .saturating_add(other.back_invalidations);
        self.back_invalidation_writebacks = self
            .back_invalidation_writebacks
            .saturating_add(other.back_invalidation_writebacks);
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "number of accesses: {}", self.accesses)?;
        writeln!(f, "number of hits: {}", self.hits)?;
        writeln!(f, "number of misses: {}", self.misses)?;
        writeln!(f, "number of writes: {}", self.writes)?;
        writeln!(f, "number of writebacks: {}", self.writebacks)?;
        writeln!(f, "number of back invalidations: {}", self.back_invalidations)?;
        write!(
            f,
            "number of writebacks due to back invalidations: {}",
            self.back_invalidation_writebacks
        )
    }
}

#[cfg(test)]
mod tests {
    use super::CacheStats;

    #[test]
    fn lookup_splits_hits_and_misses() {
        let mut stats = CacheStats::default();
        stats.record_lookup(true, false);
        stats.record_lookup(false, true);
        assert_eq!(stats.accesses(), 2);
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.writes(), 1);
        assert_eq!(stats.hit_rate(), 50.0);
    }

    #[test]
    fn back_invalidation_writebacks_are_separate() {
        let mut stats = CacheStats::default();
        stats.record_back_invalidation(true);
        stats.record_back_invalidation(false);
        assert_eq!(stats.back_invalidations(), 2);
        assert_eq!(stats.back_invalidation_writebacks(), 1);
        assert_eq!(stats.writebacks(), 0);
    }

    #[test]
    fn accumulate_sums_every_counter() {
        let mut a = CacheStats::default();
        a.record_lookup(true, true);
        a.record_writeback();
        let mut total = CacheStats::default();
        total += &a;
        total += &a;
        assert_eq!(total.accesses(), 2);
        assert_eq!(total.writebacks(), 2);
    }

    #[test]
    fn empty_stats_have_zero_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
