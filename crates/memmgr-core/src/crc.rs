use serde::{Deserialize, Serialize};

use crate::{MemError, Result};

/// CRC algorithm tag stored in transfer file headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrcAlgorithm {
    Crc8,
    Crc16,
    Crc32,
}

impl CrcAlgorithm {
    pub fn code(self) -> u8 {
        match self {
            CrcAlgorithm::Crc8 => 1,
            CrcAlgorithm::Crc16 => 2,
            CrcAlgorithm::Crc32 => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(CrcAlgorithm::Crc8),
            2 => Some(CrcAlgorithm::Crc16),
            3 => Some(CrcAlgorithm::Crc32),
            _ => None,
        }
    }
}

const CRC16_POLY: u16 = 0xA001;

const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC16_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Streaming 16-bit CRC (reflected polynomial 0xA001, no final xor).
///
/// Feeding the data in any number of pieces gives the same value as one call over the whole
/// buffer, which is what lets the transfer engine checksum block by block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    pub fn new(seed: u16) -> Self {
        Self { value: seed }
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut crc = self.value;
        for byte in data {
            crc = (crc >> 8) ^ CRC16_TABLE[usize::from((crc ^ u16::from(*byte)) & 0xFF)];
        }
        self.value = crc;
    }

    pub fn value(&self) -> u16 {
        self.value
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new(0)
    }
}

/// One-shot CRC of `data` starting from `seed`.
pub fn calculate_crc(data: &[u8], seed: u32, algorithm: CrcAlgorithm) -> Result<u32> {
    match algorithm {
        CrcAlgorithm::Crc16 => {
            let mut crc = Crc16::new(seed as u16);
            crc.update(data);
            Ok(u32::from(crc.value()))
        }
        other => Err(MemError::UnsupportedCrc {
            path: None,
            algorithm: other.code(),
        }),
    }
}
