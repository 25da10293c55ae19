use thiserror::Error;

use crate::PlatformMemKind;

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Status returned by platform primitives.
///
/// These mirror the failure codes a board support package reports. Callers above the platform
/// layer attach the operation context (width, element index, memory type) before reporting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("access fault at address 0x{addr:08x}")]
    AccessFault { addr: u64 },

    #[error("range 0x{addr:08x}+{len} is not valid {kind} memory")]
    InvalidRange {
        addr: u64,
        len: u64,
        kind: PlatformMemKind,
    },

    #[error("EEPROM bank {0} does not exist")]
    NoSuchBank(u32),

    #[error("symbol {0:?} not found")]
    SymbolNotFound(String),

    #[error("symbol table needs {needed} bytes, limit is {limit}")]
    SymbolTableTooLarge { limit: usize, needed: usize },

    #[error("io error: {0}")]
    Io(String),
}
