use std::fmt;
use std::path::Path;

use crate::PlatformResult;

/// Range-check domain understood by [`MemoryProvider::validate_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformMemKind {
    Ram,
    Eeprom,
}

impl fmt::Display for PlatformMemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformMemKind::Ram => f.write_str("RAM"),
            PlatformMemKind::Eeprom => f.write_str("EEPROM"),
        }
    }
}

/// Raw typed access to target memory.
///
/// All accessors take `&self`: a provider is shared between the command context and the transfer
/// worker, so implementations synchronize internally. Every primitive performs its own access
/// fault detection and reports it as [`crate::PlatformError::AccessFault`].
///
/// Typed values use the target's native byte order.
pub trait MemoryProvider: Send + Sync {
    fn read_u8(&self, addr: u64) -> PlatformResult<u8>;
    fn read_u16(&self, addr: u64) -> PlatformResult<u16>;
    fn read_u32(&self, addr: u64) -> PlatformResult<u32>;

    fn write_u8(&self, addr: u64, value: u8) -> PlatformResult<()>;
    fn write_u16(&self, addr: u64, value: u16) -> PlatformResult<()>;
    fn write_u32(&self, addr: u64, value: u32) -> PlatformResult<()>;

    /// Write-protected primitives; only effective while the addressed bank is write-enabled.
    fn eeprom_write_u8(&self, addr: u64, value: u8) -> PlatformResult<()>;
    fn eeprom_write_u16(&self, addr: u64, value: u16) -> PlatformResult<()>;
    fn eeprom_write_u32(&self, addr: u64, value: u32) -> PlatformResult<()>;

    /// Untyped copy out of target memory.
    fn copy_from(&self, addr: u64, dst: &mut [u8]) -> PlatformResult<()>;

    /// Untyped copy into target memory.
    fn copy_to(&self, addr: u64, src: &[u8]) -> PlatformResult<()>;

    /// Untyped fill of `len` bytes with `value`.
    fn set(&self, addr: u64, value: u8, len: usize) -> PlatformResult<()>;

    /// Copy performed as a single uninterruptible operation.
    ///
    /// Platforms that can mask interrupts override this; the default simply delegates to
    /// [`MemoryProvider::copy_to`].
    fn copy_to_uninterruptible(&self, addr: u64, src: &[u8]) -> PlatformResult<()> {
        self.copy_to(addr, src)
    }

    /// Byte-wise write-protected copy.
    fn eeprom_copy_to(&self, addr: u64, src: &[u8]) -> PlatformResult<()> {
        for (i, byte) in src.iter().enumerate() {
            self.eeprom_write_u8(addr + i as u64, *byte)?;
        }
        Ok(())
    }

    /// Checks that `[addr, addr + len)` is mapped memory of the given kind.
    fn validate_range(&self, addr: u64, len: u64, kind: PlatformMemKind) -> PlatformResult<()>;

    fn eeprom_write_enable(&self, bank: u32) -> PlatformResult<()>;
    fn eeprom_write_disable(&self, bank: u32) -> PlatformResult<()>;
}

/// Symbol table access provided by the operating system layer.
pub trait SymbolProvider: Send + Sync {
    fn lookup(&self, name: &str) -> PlatformResult<u64>;

    /// Writes the symbol table to `path`, failing if it would exceed `max_bytes`.
    fn dump_table(&self, path: &Path, max_bytes: usize) -> PlatformResult<()>;
}
