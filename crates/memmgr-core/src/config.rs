use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{MemError, MemoryWidth, Result, WidthSet};

/// Size of the shared transfer buffer. Every configured block size is capped to it.
pub const IO_BLOCK_SIZE: usize = 2048;

/// Tunables of the memory manager.
///
/// Every key is optional in the JSON form; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemMgrConfig {
    pub load_block_size: usize,
    pub dump_block_size: usize,
    pub fill_block_size: usize,
    /// Blocks processed between pauses; 0 disables throttling.
    pub task_block_limit: u32,
    pub task_block_delay_ms: u32,
    pub task_perf_id: u32,
    pub worker_name: String,
    pub file_hdr_description: String,
    pub file_hdr_subtype: u32,
    pub widths: Vec<MemoryWidth>,
}

impl Default for MemMgrConfig {
    fn default() -> Self {
        Self {
            load_block_size: IO_BLOCK_SIZE,
            dump_block_size: IO_BLOCK_SIZE,
            fill_block_size: IO_BLOCK_SIZE,
            task_block_limit: 16,
            task_block_delay_ms: 20,
            task_perf_id: 39,
            worker_name: "MEM_FILE".to_string(),
            file_hdr_description: "Memory dump file".to_string(),
            file_hdr_subtype: 0x4D4D,
            widths: MemoryWidth::ALL.to_vec(),
        }
    }
}

/// Effective block sizes after capping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSizes {
    pub load: usize,
    pub dump: usize,
    pub fill: usize,
}

impl MemMgrConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|err| MemError::InvalidConfig(err.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path).map_err(|err| {
            MemError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    /// Block sizes clamped to [`IO_BLOCK_SIZE`].
    ///
    /// Oversized values are reduced with a warning; zero is rejected.
    pub fn block_sizes(&self) -> Result<BlockSizes> {
        Ok(BlockSizes {
            load: cap_block_size("load_block_size", self.load_block_size)?,
            dump: cap_block_size("dump_block_size", self.dump_block_size)?,
            fill: cap_block_size("fill_block_size", self.fill_block_size)?,
        })
    }

    pub fn width_set(&self) -> WidthSet {
        self.widths
            .iter()
            .fold(WidthSet::empty(), |set, width| set | WidthSet::from_width(*width))
    }
}

fn cap_block_size(key: &str, value: usize) -> Result<usize> {
    if value == 0 {
        return Err(MemError::InvalidConfig(format!("{key} must be non-zero")));
    }
    if value > IO_BLOCK_SIZE {
        warn!(
            key,
            configured = value,
            cap = IO_BLOCK_SIZE,
            "block size exceeds the I/O buffer, capping"
        );
        return Ok(IO_BLOCK_SIZE);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_take_defaults() {
        let config = MemMgrConfig::from_json_str(r#"{ "task_block_limit": 4 }"#).unwrap();
        assert_eq!(config.task_block_limit, 4);
        assert_eq!(config.dump_block_size, IO_BLOCK_SIZE);
        assert_eq!(config.worker_name, "MEM_FILE");
        assert_eq!(config.width_set(), WidthSet::all());
    }

    #[test]
    fn block_sizes_are_capped_and_zero_rejected() {
        let config = MemMgrConfig {
            load_block_size: 4096,
            dump_block_size: 512,
            ..MemMgrConfig::default()
        };
        let sizes = config.block_sizes().unwrap();
        assert_eq!(sizes.load, IO_BLOCK_SIZE);
        assert_eq!(sizes.dump, 512);

        let zero = MemMgrConfig {
            fill_block_size: 0,
            ..MemMgrConfig::default()
        };
        assert!(matches!(zero.block_sizes(), Err(MemError::InvalidConfig(_))));
    }

    #[test]
    fn widths_parse_by_name() {
        let config = MemMgrConfig::from_json_str(r#"{ "widths": ["8", "untyped"] }"#).unwrap();
        assert_eq!(config.width_set(), WidthSet::BITS8 | WidthSet::UNTYPED);

        assert!(MemMgrConfig::from_json_str(r#"{ "widths": ["64"] }"#).is_err());
        assert!(MemMgrConfig::from_json_str(r#"{ "bogus": 1 }"#).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memmgr.json");
        fs::write(&path, r#"{ "task_perf_id": 7 }"#).unwrap();
        assert_eq!(MemMgrConfig::from_path(&path).unwrap().task_perf_id, 7);
        assert!(MemMgrConfig::from_path(&dir.path().join("missing.json")).is_err());
    }
}
