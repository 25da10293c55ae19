use std::fmt;

use memmgr_platform::PlatformMemKind;
use serde::{Deserialize, Serialize};

/// Size of the symbol name buffer, including the terminator.
pub const MAX_SYM_LEN: usize = 64;

/// Symbolic or absolute address.
///
/// An empty name means `offset` is an absolute address. Otherwise the address is the symbol's
/// address plus `offset`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressSpec {
    pub name: String,
    pub offset: u64,
}

impl AddressSpec {
    pub fn absolute(addr: u64) -> Self {
        Self {
            name: String::new(),
            offset: addr,
        }
    }

    pub fn symbol(name: impl Into<String>, offset: u64) -> Self {
        Self {
            name: name.into(),
            offset,
        }
    }

    /// The name as seen by symbol lookup: cut at the first NUL and bounded to
    /// `MAX_SYM_LEN - 1` bytes.
    pub fn symbol_name(&self) -> &str {
        bounded_name(&self.name)
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.symbol_name();
        if name.is_empty() {
            write!(f, "0x{:08x}", self.offset)
        } else {
            write!(f, "{name}+0x{:x}", self.offset)
        }
    }
}

pub(crate) fn bounded_name(name: &str) -> &str {
    let name = name.split('\0').next().unwrap_or("");
    let mut end = name.len().min(MAX_SYM_LEN - 1);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].trim()
}

/// Access width of a memory operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoryWidth {
    #[serde(rename = "8")]
    Bits8,
    #[serde(rename = "16")]
    Bits16,
    #[serde(rename = "32")]
    Bits32,
    /// Byte-count driven copy with no per-element handling.
    #[serde(rename = "untyped")]
    Untyped,
}

impl MemoryWidth {
    pub const ALL: [MemoryWidth; 4] = [
        MemoryWidth::Bits8,
        MemoryWidth::Bits16,
        MemoryWidth::Bits32,
        MemoryWidth::Untyped,
    ];

    /// Bytes per element. Untyped accesses are byte granular.
    pub fn element_bytes(self) -> u32 {
        match self {
            MemoryWidth::Bits8 | MemoryWidth::Untyped => 1,
            MemoryWidth::Bits16 => 2,
            MemoryWidth::Bits32 => 4,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MemoryWidth::Bits8 => 1,
            MemoryWidth::Bits16 => 2,
            MemoryWidth::Bits32 => 3,
            MemoryWidth::Untyped => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MemoryWidth::Bits8),
            2 => Some(MemoryWidth::Bits16),
            3 => Some(MemoryWidth::Bits32),
            4 => Some(MemoryWidth::Untyped),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryWidth::Bits8 => f.write_str("8-bit"),
            MemoryWidth::Bits16 => f.write_str("16-bit"),
            MemoryWidth::Bits32 => f.write_str("32-bit"),
            MemoryWidth::Untyped => f.write_str("untyped"),
        }
    }
}

/// Memory type named by a command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    #[default]
    Undefined,
    /// RAM.
    Volatile,
    /// EEPROM-like non-volatile memory behind a write-protect primitive.
    Durable,
}

impl MemoryType {
    pub fn label(self) -> &'static str {
        match self {
            MemoryType::Undefined => "UNDEF",
            MemoryType::Volatile => "RAM",
            MemoryType::Durable => "EEPROM",
        }
    }

    pub fn platform_kind(self) -> Option<PlatformMemKind> {
        match self {
            MemoryType::Volatile => Some(PlatformMemKind::Ram),
            MemoryType::Durable => Some(PlatformMemKind::Eeprom),
            MemoryType::Undefined => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MemoryType::Undefined => 0,
            MemoryType::Volatile => 1,
            MemoryType::Durable => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MemoryType::Undefined),
            1 => Some(MemoryType::Volatile),
            2 => Some(MemoryType::Durable),
            _ => None,
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Last memory function performed, as reported in status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemFunction {
    #[default]
    NonePerformed,
    Peek,
    Poke,
    LoadFromFile,
    LoadWithIntDisabled,
    DumpToFile,
    DumpToEvent,
    Fill,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_name_is_bounded_and_nul_terminated() {
        assert_eq!(AddressSpec::symbol("abc\0junk", 0).symbol_name(), "abc");
        assert_eq!(AddressSpec::absolute(0x40).symbol_name(), "");

        let long = "x".repeat(100);
        assert_eq!(
            AddressSpec::symbol(long, 0).symbol_name().len(),
            MAX_SYM_LEN - 1
        );

        // Truncation never splits a multi-byte character.
        let wide = "é".repeat(40);
        let bounded = AddressSpec::symbol(wide, 0);
        assert!(bounded.symbol_name().len() <= MAX_SYM_LEN - 1);
        assert!(bounded.symbol_name().chars().all(|c| c == 'é'));
    }

    #[test]
    fn codes_round_trip_and_reject_unknown_values() {
        for width in MemoryWidth::ALL {
            assert_eq!(MemoryWidth::from_code(width.code()), Some(width));
        }
        assert_eq!(MemoryWidth::from_code(0), None);
        assert_eq!(MemoryType::from_code(2), Some(MemoryType::Durable));
        assert_eq!(MemoryType::from_code(7), None);
    }

    #[test]
    fn address_spec_display() {
        assert_eq!(AddressSpec::absolute(0x1000).to_string(), "0x00001000");
        assert_eq!(AddressSpec::symbol("tbl", 0x10).to_string(), "tbl+0x10");
    }
}
