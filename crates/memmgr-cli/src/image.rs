use std::fs;
use std::path::Path;

use anyhow::Context;
use memmgr_core::BoardState;
use memmgr_platform::{MemoryProvider, PlatformMemKind, SimMemory, SimRegion};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CliConfig, RegionKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRegion {
    pub base: u64,
    pub kind: RegionKind,
    pub bank: u32,
    pub bytes: Vec<u8>,
}

/// Persisted state of the simulated target between invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetImage {
    pub regions: Vec<ImageRegion>,
    pub enabled_banks: Vec<u32>,
    pub durable_write_enabled: bool,
    /// Last command and counters, so `status` reports across invocations.
    #[serde(default)]
    pub status: BoardState,
}

impl TargetImage {
    /// Fresh image laid out by `config`: RAM zeroed, EEPROM erased.
    pub fn from_config(config: &CliConfig) -> Self {
        let regions = config
            .regions
            .iter()
            .map(|region| ImageRegion {
                base: region.base,
                kind: region.kind,
                bank: region.bank,
                bytes: match region.kind {
                    RegionKind::Ram => vec![0; region.size],
                    RegionKind::Eeprom => vec![0xFF; region.size],
                },
            })
            .collect();
        Self {
            regions,
            ..Self::default()
        }
    }

    pub fn load_or_create(path: &Path, config: &CliConfig) -> anyhow::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "creating target image");
            return Ok(Self::from_config(config));
        }
        let json = fs::read(path).with_context(|| format!("read image {}", path.display()))?;
        serde_json::from_slice(&json).with_context(|| format!("parse image {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec(self).context("serialize image")?;
        fs::write(path, json).with_context(|| format!("write image {}", path.display()))
    }

    /// Builds the simulated target, with `config`'s symbol table.
    pub fn to_sim(&self, config: &CliConfig) -> anyhow::Result<SimMemory> {
        let mut sim = SimMemory::new();
        for region in &self.regions {
            sim.add_region(SimRegion {
                base: region.base,
                kind: match region.kind {
                    RegionKind::Ram => PlatformMemKind::Ram,
                    RegionKind::Eeprom => PlatformMemKind::Eeprom,
                },
                bank: region.bank,
                bytes: region.bytes.clone(),
            })
            .with_context(|| format!("region at 0x{:08x}", region.base))?;
        }
        for (name, addr) in &config.symbols {
            sim.add_symbol(name.clone(), *addr);
        }
        for bank in &self.enabled_banks {
            sim.eeprom_write_enable(*bank)
                .with_context(|| format!("restore EEPROM bank {bank}"))?;
        }
        Ok(sim)
    }

    pub fn capture(sim: &SimMemory, durable_write_enabled: bool, status: BoardState) -> Self {
        let regions: Vec<ImageRegion> = sim
            .regions()
            .into_iter()
            .map(|region| ImageRegion {
                base: region.base,
                kind: match region.kind {
                    PlatformMemKind::Ram => RegionKind::Ram,
                    PlatformMemKind::Eeprom => RegionKind::Eeprom,
                },
                bank: region.bank,
                bytes: region.bytes,
            })
            .collect();
        let mut enabled_banks: Vec<u32> = regions
            .iter()
            .filter(|r| r.kind == RegionKind::Eeprom && sim.is_bank_enabled(r.bank))
            .map(|r| r.bank)
            .collect();
        enabled_banks.sort_unstable();
        enabled_banks.dedup();
        Self {
            regions,
            enabled_banks,
            durable_write_enabled,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_survives_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.json");
        let config = CliConfig::default();

        let image = TargetImage::load_or_create(&path, &config).unwrap();
        let sim = image.to_sim(&config).unwrap();
        sim.write_u32(crate::config::DEFAULT_RAM_BASE, 0xA1B2_C3D4).unwrap();
        sim.eeprom_write_enable(0).unwrap();
        let status = BoardState {
            valid_commands: 2,
            ..BoardState::default()
        };
        TargetImage::capture(&sim, true, status.clone()).save(&path).unwrap();

        let restored = TargetImage::load_or_create(&path, &config).unwrap();
        assert!(restored.durable_write_enabled);
        assert_eq!(restored.status, status);
        assert_eq!(restored.enabled_banks, vec![0]);
        let sim = restored.to_sim(&config).unwrap();
        assert_eq!(sim.read_u32(crate::config::DEFAULT_RAM_BASE).unwrap(), 0xA1B2_C3D4);
        assert!(sim.is_bank_enabled(0));
    }

    #[test]
    fn images_without_status_still_load() {
        let json = r#"{"regions":[],"enabled_banks":[],"durable_write_enabled":false}"#;
        let image: TargetImage = serde_json::from_str(json).unwrap();
        assert_eq!(image.status, BoardState::default());
    }
}
