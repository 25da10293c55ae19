//! Memory access engine: symbolic address resolution, per-width validation and the
//! peek/poke/fill/dump/load primitives operators use to inspect and patch a running target.
//!
//! - [`resolve`]: `(symbol, offset)` to absolute address
//! - [`AddressVerifier`]: the only producer of [`VerifiedMemory`]
//! - [`WidthAccessor`]: width-polymorphic element access with a build-time capability set
//! - [`MemoryOps`]: the per-command operations, status bookkeeping and event reporting

mod config;
mod crc;
mod error;
pub mod events;
mod ops;
mod resolver;
mod status;
mod types;
mod verifier;
mod width;

pub use config::{BlockSizes, MemMgrConfig, IO_BLOCK_SIZE};
pub use crc::{calculate_crc, Crc16, CrcAlgorithm};
pub use error::{AccessOp, FileStage, MemError, RangeFault, Result};
pub use ops::{
    format_dump_event, InterruptsDisabledLoad, MemoryOps, DUMP_TO_EVENT_MAX_BYTES,
    EVS_MAX_MESSAGE_LENGTH, MAX_UNINTERRUPTIBLE_BYTES,
};
pub use resolver::resolve;
pub use status::{BoardState, CommandStatus, DurableWriteGate, StatusBoard, StatusReport};
pub use types::{AddressSpec, MemFunction, MemoryType, MemoryWidth, MAX_SYM_LEN};
pub use verifier::{AddressVerifier, VerifiedMemory};
pub use width::{WidthAccessor, WidthSet};

/// Platform traits re-exported so callers only need this crate for the common cases.
pub use memmgr_platform::{EventSink, MemoryProvider, SymbolProvider};

/// A target that provides both raw memory access and symbol lookup.
pub trait TargetPlatform: MemoryProvider + SymbolProvider {}

impl<T: MemoryProvider + SymbolProvider + ?Sized> TargetPlatform for T {}

pub const MEM_MGR_MAJOR_VER: u32 = 1;
pub const MEM_MGR_MINOR_VER: u32 = 0;
