//! Event identifiers, grouped by the component that raises them.
//!
//! Each component owns a block of ids starting at its base. The width accessor has one block per
//! width, all sharing the same offsets, see [`width_event`].

use memmgr_platform::EventId;

use crate::MemoryWidth;

pub const APP_BASE: u16 = 100;

pub const MEM_MGR_BASE: u16 = APP_BASE;
pub const MEMORY_BASE: u16 = APP_BASE + 20;
pub const SIZE8_BASE: u16 = APP_BASE + 30;
pub const SIZE16_BASE: u16 = APP_BASE + 40;
pub const SIZE32_BASE: u16 = APP_BASE + 50;
pub const MEM_FILE_BASE: u16 = APP_BASE + 60;
pub const UNTYPED_BASE: u16 = APP_BASE + 70;

pub const MEM_MGR_NOOP: EventId = EventId(MEM_MGR_BASE + 1);
pub const MEM_MGR_RESET: EventId = EventId(MEM_MGR_BASE + 2);
pub const MEM_MGR_INVALID_CONFIG: EventId = EventId(MEM_MGR_BASE + 4);

pub const MEMORY_DIS_EEPROM: EventId = EventId(MEMORY_BASE);
pub const MEMORY_DUMP_TO_EVENT: EventId = EventId(MEMORY_BASE + 1);
pub const MEMORY_ENA_EEPROM: EventId = EventId(MEMORY_BASE + 2);
pub const MEMORY_FILL: EventId = EventId(MEMORY_BASE + 3);
pub const MEMORY_LOOKUP_SYMBOL: EventId = EventId(MEMORY_BASE + 4);
pub const MEMORY_LOAD_INT_DIS: EventId = EventId(MEMORY_BASE + 5);
pub const MEMORY_PEEK: EventId = EventId(MEMORY_BASE + 6);
pub const MEMORY_POKE: EventId = EventId(MEMORY_BASE + 7);
pub const MEMORY_CREATE_CPU_ADDR: EventId = EventId(MEMORY_BASE + 8);
pub const MEMORY_GET_PSP_MEM_TYPE: EventId = EventId(MEMORY_BASE + 9);

pub const WIDTH_OPT_INCL: u16 = 0;
pub const WIDTH_FILL: u16 = 1;
pub const WIDTH_PEEK: u16 = 2;
pub const WIDTH_POKE: u16 = 3;
pub const WIDTH_READ_BLOCK: u16 = 4;
pub const WIDTH_WRITE_BLOCK: u16 = 5;
pub const WIDTH_VER_CPU_ADDR: u16 = 6;

pub const MEM_FILE_CONSTRUCTOR: EventId = EventId(MEM_FILE_BASE);
pub const MEM_FILE_DUMP_CMD: EventId = EventId(MEM_FILE_BASE + 1);
pub const MEM_FILE_DUMP_SYM_TBL: EventId = EventId(MEM_FILE_BASE + 2);
pub const MEM_FILE_LOAD_CMD: EventId = EventId(MEM_FILE_BASE + 3);
pub const MEM_FILE_PROCESS_LOAD_FILE: EventId = EventId(MEM_FILE_BASE + 4);
pub const MEM_FILE_COMPUTE_FILE_CRC: EventId = EventId(MEM_FILE_BASE + 5);
pub const MEM_FILE_CREATE_DUMP_FILE: EventId = EventId(MEM_FILE_BASE + 6);
pub const MEM_FILE_DUMP_MEM_TO_FILE: EventId = EventId(MEM_FILE_BASE + 7);
pub const MEM_FILE_LOAD_MEM_FROM_FILE: EventId = EventId(MEM_FILE_BASE + 8);
pub const MEM_FILE_VALID_LOAD_FILE: EventId = EventId(MEM_FILE_BASE + 9);

/// Event id `offset` within the block owned by `width`.
pub const fn width_event(width: MemoryWidth, offset: u16) -> EventId {
    let base = match width {
        MemoryWidth::Bits8 => SIZE8_BASE,
        MemoryWidth::Bits16 => SIZE16_BASE,
        MemoryWidth::Bits32 => SIZE32_BASE,
        MemoryWidth::Untyped => UNTYPED_BASE,
    };
    EventId(base + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_blocks_do_not_overlap() {
        let mut ids: Vec<u16> = MemoryWidth::ALL
            .iter()
            .flat_map(|w| (0..=WIDTH_VER_CPU_ADDR).map(move |o| width_event(*w, o).0))
            .collect();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert!(ids.iter().all(|id| *id < MEM_FILE_BASE || *id >= UNTYPED_BASE));
    }
}
