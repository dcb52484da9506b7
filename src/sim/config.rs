use std::path::PathBuf;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::*;

use crate::mem::config::{CacheLevelConfig, HierarchyConfig, MemoryConfig, Topology};
use crate::sim::traffic::TrafficConfig;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub trace: Option<PathBuf>,
    pub hierarchy: Topology,
    pub log_level: u64,
    pub timeout: u64,
    pub dump: bool,
    pub stats_json: Option<PathBuf>,
}

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        match section {
            Some(value) => Ok(value.clone().try_into()?),
            None => {
                warn!("config section not found");
                Ok(Self::default())
            }
        }
    }
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            trace: None,
            hierarchy: Topology::MultiLevel,
            log_level: 0,
            timeout: 10000000,
            dump: false,
            stats_json: None,
        }
    }
}

/// All sections of a config file.
#[derive(Debug, Clone, Default)]
pub struct FullConfig {
    pub sim: SimConfig,
    pub l1d: CacheLevelConfig,
    pub l1i: CacheLevelConfig,
    pub l2: CacheLevelConfig,
    pub memory: MemoryConfig,
    pub traffic: TrafficConfig,
}

impl FullConfig {
    pub fn from_table(table: &Table) -> anyhow::Result<Self> {
        Ok(Self {
            sim: SimConfig::from_section(table.get("sim"))?,
            l1d: CacheLevelConfig::from_section(table.get("l1d"))?,
            l1i: CacheLevelConfig::from_section(table.get("l1i"))?,
            l2: CacheLevelConfig::from_section(table.get("l2"))?,
            memory: MemoryConfig::from_section(table.get("memory"))?,
            traffic: TrafficConfig::from_section(table.get("traffic"))?,
        })
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let table: Table = toml::from_str(text)?;
        Self::from_table(&table)
    }

    pub fn hierarchy(&self) -> HierarchyConfig {
        HierarchyConfig {
            topology: self.sim.hierarchy,
            l1d: self.l1d,
            l1i: self.l1i,
            l2: self.l2,
            memory: self.memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let cfg = FullConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.sim.hierarchy, Topology::MultiLevel);
        assert_eq!(cfg.memory.latency, 100);
        assert!(!cfg.traffic.enabled);
    }

    #[test]
    fn sections_override_fields() {
        let text = r#"
            [sim]
            hierarchy = "split_l1"
            timeout = 500

            [l1d]
            size = 1024
            assoc = 2
            line_size = 32
            latency = 1

            [memory]
            latency = 7
        "#;
        let cfg = FullConfig::from_toml_str(text).unwrap();
        let hier = cfg.hierarchy();
        assert_eq!(hier.topology, Topology::SplitL1);
        assert_eq!(hier.l1d.num_sets(), 16);
        assert_eq!(hier.l1i, CacheLevelConfig::default());
        assert_eq!(hier.memory.latency, 7);
        assert_eq!(cfg.sim.timeout, 500);
    }

    #[test]
    fn bad_field_type_is_an_error() {
        let text = "[l2]\nassoc = \"eight\"\n";
        assert!(FullConfig::from_toml_str(text).is_err());
    }
}
