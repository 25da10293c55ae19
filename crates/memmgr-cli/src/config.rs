use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use memmgr_core::MemMgrConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Ram,
    Eeprom,
}

/// One region of the simulated target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegionConfig {
    pub base: u64,
    pub size: usize,
    pub kind: RegionKind,
    #[serde(default)]
    pub bank: u32,
}

/// Layout of the simulated target plus the memory manager tunables.
///
/// ```json
/// {
///   "memmgr": { "dump_block_size": 1024 },
///   "regions": [{ "base": 268435456, "size": 65536, "kind": "ram" }],
///   "symbols": { "sci_buf": 268435712 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub memmgr: MemMgrConfig,
    pub regions: Vec<RegionConfig>,
    pub symbols: BTreeMap<String, u64>,
}

pub const DEFAULT_RAM_BASE: u64 = 0x1000_0000;
pub const DEFAULT_EEPROM_BASE: u64 = 0x2000_0000;

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            memmgr: MemMgrConfig::default(),
            regions: vec![
                RegionConfig {
                    base: DEFAULT_RAM_BASE,
                    size: 64 * 1024,
                    kind: RegionKind::Ram,
                    bank: 0,
                },
                RegionConfig {
                    base: DEFAULT_EEPROM_BASE,
                    size: 16 * 1024,
                    kind: RegionKind::Eeprom,
                    bank: 0,
                },
            ],
            symbols: BTreeMap::new(),
        }
    }
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let json = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.regions.is_empty() {
            bail!("config must declare at least one memory region");
        }
        self.memmgr.block_sizes()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_default_regions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.json");
        fs::write(
            &path,
            r#"{ "memmgr": { "task_block_limit": 2 }, "symbols": { "tbl": 268435456 } }"#,
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.memmgr.task_block_limit, 2);
        assert_eq!(config.regions.len(), 2);
        assert_eq!(config.symbols["tbl"], DEFAULT_RAM_BASE);
    }

    #[test]
    fn rejects_empty_layout_and_bad_block_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.json");

        fs::write(&path, r#"{ "regions": [] }"#).unwrap();
        assert!(CliConfig::load(Some(&path)).is_err());

        fs::write(&path, r#"{ "memmgr": { "load_block_size": 0 } }"#).unwrap();
        assert!(CliConfig::load(Some(&path)).is_err());
    }
}
