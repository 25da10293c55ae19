use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::{MemoryProvider, PlatformError, PlatformMemKind, PlatformResult, SymbolProvider};

/// One contiguous block of simulated target memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimRegion {
    pub base: u64,
    pub kind: PlatformMemKind,
    /// EEPROM bank that write-protects this region. Ignored for RAM.
    pub bank: u32,
    pub bytes: Vec<u8>,
}

impl SimRegion {
    fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    fn contains(&self, addr: u64, len: u64) -> bool {
        match addr.checked_add(len) {
            Some(end) => addr >= self.base && addr < self.end() && end <= self.end(),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
    EepromWrite,
}

#[derive(Debug, Default)]
struct SimState {
    regions: Vec<SimRegion>,
    faults: BTreeSet<u64>,
    enabled_banks: BTreeSet<u32>,
    writes: u64,
}

/// In-process target memory made of RAM and EEPROM regions.
///
/// - Plain writes into an EEPROM region fault; EEPROM regions are only writable through the
///   `eeprom_*` primitives while their bank is write-enabled.
/// - Addresses registered with [`SimMemory::inject_fault`] fault on any access.
/// - Every successful write primitive call increments [`SimMemory::write_count`].
#[derive(Debug, Default)]
pub struct SimMemory {
    state: Mutex<SimState>,
    symbols: BTreeMap<String, u64>,
}

impl SimMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ram(&mut self, base: u64, len: usize) -> PlatformResult<()> {
        self.add_region(SimRegion {
            base,
            kind: PlatformMemKind::Ram,
            bank: 0,
            bytes: vec![0; len],
        })
    }

    pub fn add_eeprom(&mut self, base: u64, len: usize, bank: u32) -> PlatformResult<()> {
        self.add_region(SimRegion {
            base,
            kind: PlatformMemKind::Eeprom,
            bank,
            bytes: vec![0xFF; len],
        })
    }

    pub fn add_region(&mut self, region: SimRegion) -> PlatformResult<()> {
        let len = region.bytes.len() as u64;
        if len == 0 || region.base.checked_add(len).is_none() {
            return Err(PlatformError::InvalidRange {
                addr: region.base,
                len,
                kind: region.kind,
            });
        }
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        let overlaps = state
            .regions
            .iter()
            .any(|r| region.base < r.end() && r.base < region.base + len);
        if overlaps {
            return Err(PlatformError::InvalidRange {
                addr: region.base,
                len,
                kind: region.kind,
            });
        }
        state.regions.push(region);
        state.regions.sort_by_key(|r| r.base);
        Ok(())
    }

    pub fn add_symbol(&mut self, name: impl Into<String>, addr: u64) {
        self.symbols.insert(name.into(), addr);
    }

    /// Makes every access touching `addr` fail with an access fault.
    pub fn inject_fault(&self, addr: u64) {
        self.lock().faults.insert(addr);
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    pub fn write_count(&self) -> u64 {
        self.lock().writes
    }

    pub fn is_bank_enabled(&self, bank: u32) -> bool {
        self.lock().enabled_banks.contains(&bank)
    }

    pub fn regions(&self) -> Vec<SimRegion> {
        self.lock().regions.clone()
    }

    /// Reads memory without going through the fault-checked primitives.
    pub fn snapshot(&self, addr: u64, len: usize) -> PlatformResult<Vec<u8>> {
        let state = self.lock();
        let (region, start) = locate(&state.regions, addr, len as u64)?;
        Ok(state.regions[region].bytes[start..start + len].to_vec())
    }

    /// Writes memory directly, regardless of region kind or write protection.
    pub fn seed(&self, addr: u64, bytes: &[u8]) -> PlatformResult<()> {
        let mut state = self.lock();
        let (region, start) = locate(&state.regions, addr, bytes.len() as u64)?;
        state.regions[region].bytes[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn access<R>(
        &self,
        addr: u64,
        len: usize,
        access: Access,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> PlatformResult<R> {
        let mut state = self.lock();
        let len_u64 = len as u64;
        if let Some(fault) = state
            .faults
            .range(addr..addr.saturating_add(len_u64.max(1)))
            .next()
        {
            return Err(PlatformError::AccessFault { addr: *fault });
        }

        let (index, start) = locate(&state.regions, addr, len_u64)?;
        let region = &state.regions[index];
        let writable = match access {
            Access::Read => true,
            Access::Write => region.kind == PlatformMemKind::Ram,
            Access::EepromWrite => {
                region.kind == PlatformMemKind::Eeprom && state.enabled_banks.contains(&region.bank)
            }
        };
        if !writable {
            return Err(PlatformError::AccessFault { addr });
        }

        if access != Access::Read {
            state.writes += 1;
        }
        Ok(f(&mut state.regions[index].bytes[start..start + len]))
    }

    fn write_bytes(&self, addr: u64, bytes: &[u8], access: Access) -> PlatformResult<()> {
        self.access(addr, bytes.len(), access, |dst| dst.copy_from_slice(bytes))
    }

    fn bank_exists(&self, bank: u32) -> bool {
        self.lock()
            .regions
            .iter()
            .any(|r| r.kind == PlatformMemKind::Eeprom && r.bank == bank)
    }
}

fn locate(regions: &[SimRegion], addr: u64, len: u64) -> PlatformResult<(usize, usize)> {
    regions
        .iter()
        .position(|r| r.contains(addr, len))
        .map(|index| (index, (addr - regions[index].base) as usize))
        .ok_or(PlatformError::AccessFault { addr })
}

impl MemoryProvider for SimMemory {
    fn read_u8(&self, addr: u64) -> PlatformResult<u8> {
        self.access(addr, 1, Access::Read, |b| b[0])
    }

    fn read_u16(&self, addr: u64) -> PlatformResult<u16> {
        self.access(addr, 2, Access::Read, |b| u16::from_ne_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, addr: u64) -> PlatformResult<u32> {
        self.access(addr, 4, Access::Read, |b| {
            u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
        })
    }

    fn write_u8(&self, addr: u64, value: u8) -> PlatformResult<()> {
        self.write_bytes(addr, &[value], Access::Write)
    }

    fn write_u16(&self, addr: u64, value: u16) -> PlatformResult<()> {
        self.write_bytes(addr, &value.to_ne_bytes(), Access::Write)
    }

    fn write_u32(&self, addr: u64, value: u32) -> PlatformResult<()> {
        self.write_bytes(addr, &value.to_ne_bytes(), Access::Write)
    }

    fn eeprom_write_u8(&self, addr: u64, value: u8) -> PlatformResult<()> {
        self.write_bytes(addr, &[value], Access::EepromWrite)
    }

    fn eeprom_write_u16(&self, addr: u64, value: u16) -> PlatformResult<()> {
        self.write_bytes(addr, &value.to_ne_bytes(), Access::EepromWrite)
    }

    fn eeprom_write_u32(&self, addr: u64, value: u32) -> PlatformResult<()> {
        self.write_bytes(addr, &value.to_ne_bytes(), Access::EepromWrite)
    }

    fn copy_from(&self, addr: u64, dst: &mut [u8]) -> PlatformResult<()> {
        self.access(addr, dst.len(), Access::Read, |src| dst.copy_from_slice(src))
    }

    fn copy_to(&self, addr: u64, src: &[u8]) -> PlatformResult<()> {
        self.write_bytes(addr, src, Access::Write)
    }

    fn set(&self, addr: u64, value: u8, len: usize) -> PlatformResult<()> {
        self.access(addr, len, Access::Write, |dst| dst.fill(value))
    }

    fn eeprom_copy_to(&self, addr: u64, src: &[u8]) -> PlatformResult<()> {
        self.write_bytes(addr, src, Access::EepromWrite)
    }

    fn validate_range(&self, addr: u64, len: u64, kind: PlatformMemKind) -> PlatformResult<()> {
        let state = self.lock();
        let valid = state
            .regions
            .iter()
            .any(|r| r.kind == kind && r.contains(addr, len));
        if valid {
            Ok(())
        } else {
            Err(PlatformError::InvalidRange { addr, len, kind })
        }
    }

    fn eeprom_write_enable(&self, bank: u32) -> PlatformResult<()> {
        if !self.bank_exists(bank) {
            return Err(PlatformError::NoSuchBank(bank));
        }
        self.lock().enabled_banks.insert(bank);
        Ok(())
    }

    fn eeprom_write_disable(&self, bank: u32) -> PlatformResult<()> {
        if !self.bank_exists(bank) {
            return Err(PlatformError::NoSuchBank(bank));
        }
        self.lock().enabled_banks.remove(&bank);
        Ok(())
    }
}

impl SymbolProvider for SimMemory {
    fn lookup(&self, name: &str) -> PlatformResult<u64> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| PlatformError::SymbolNotFound(name.to_string()))
    }

    fn dump_table(&self, path: &Path, max_bytes: usize) -> PlatformResult<()> {
        let mut text = String::new();
        for (name, addr) in &self.symbols {
            text.push_str(&format!("{name} 0x{addr:08x}\n"));
        }
        if text.len() > max_bytes {
            return Err(PlatformError::SymbolTableTooLarge {
                limit: max_bytes,
                needed: text.len(),
            });
        }
        fs::write(path, text).map_err(|err| PlatformError::Io(err.to_string()))
    }
}
