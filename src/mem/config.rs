use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::sim::config::Config;
use crate::timeq::Cycle;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    DramOnly,
    SingleLevel,
    #[default]
    MultiLevel,
    SplitL1,
}

impl FromStr for Topology {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "dram_only" | "0" => Ok(Self::DramOnly),
            "single_level" | "1" => Ok(Self::SingleLevel),
            "multi_level" | "2" => Ok(Self::MultiLevel),
            "split_l1" | "3" => Ok(Self::SplitL1),
            _ => Err(format!(
                "unsupported hierarchy '{}', expected one of: dram_only, single_level, multi_level, split_l1",
                value
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CacheLevelConfig {
    pub size: usize,
    pub assoc: usize,
    pub line_size: u64,
    pub latency: Cycle,
}

impl Config for CacheLevelConfig {}

impl Default for CacheLevelConfig {
    fn default() -> Self {
        Self {
            size: 32 << 10,
            assoc: 8,
            line_size: 64,
            latency: 5,
        }
    }
}

impl CacheLevelConfig {
    pub fn new(size: usize, assoc: usize, line_size: u64, latency: Cycle) -> Self {
        Self {
            size,
            assoc,
            line_size,
            latency,
        }
    }

    pub fn num_sets(&self) -> usize {
        self.size / (self.assoc * self.line_size as usize)
    }

    pub fn validate(&self, name: &str) -> anyhow::Result<()> {
        ensure!(self.size > 0, "{name}: size must be > 0");
        ensure!(self.assoc > 0, "{name}: assoc must be > 0");
        ensure!(self.line_size > 0, "{name}: line_size must be > 0");
        let way_bytes = self.assoc * self.line_size as usize;
        if self.size % way_bytes != 0 || self.size < way_bytes {
            bail!(
                "{name}: size {} is not a multiple of assoc*line_size ({})",
                self.size,
                way_bytes
            );
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct MemoryConfig {
    pub latency: Cycle,
}

impl Config for MemoryConfig {}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { latency: 100 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyConfig {
    pub topology: Topology,
    pub l1d: CacheLevelConfig,
    pub l1i: CacheLevelConfig,
    pub l2: CacheLevelConfig,
    pub memory: MemoryConfig,
}

impl HierarchyConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.topology {
            Topology::DramOnly => {}
            Topology::SingleLevel => self.l1d.validate("l1d")?,
            Topology::MultiLevel => {
                self.l1d.validate("l1d")?;
                self.l2.validate("l2")?;
            }
            Topology::SplitL1 => {
                self.l1i.validate("l1i")?;
                self.l1d.validate("l1d")?;
                self.l2.validate("l2")?;
            }
        }
        Ok(())
    }
}
