//! Boundary collaborators for the memory manager.
//!
//! The memory manager never touches target memory or the filesystem directly. Everything goes
//! through the small set of provider traits defined here:
//!
//! - [`MemoryProvider`]: typed 8/16/32-bit reads and writes, raw byte copies, range validation and
//!   EEPROM write-protect control
//! - [`SymbolProvider`]: symbol name to address lookup and symbol table dumps
//! - [`FileStore`]: open/create/stat plus the directory and file pre-checks used before transfers
//! - [`EventSink`]: operator-visible status events
//! - [`TaskYield`]: bounded sleep and performance markers used by the transfer throttle
//!
//! [`SimMemory`] is an in-process target made of RAM and EEPROM regions. It backs the CLI and the
//! test suites.

mod error;
mod events;
mod file;
mod memory;
mod sim;
mod task;

pub use error::{PlatformError, PlatformResult};
pub use events::{Event, EventId, EventSink, RecordingEventSink, Severity, TracingEventSink};
pub use file::{FileCheckError, FileStore, StdFileStore, TransferFile};
pub use memory::{MemoryProvider, PlatformMemKind, SymbolProvider};
pub use sim::{SimMemory, SimRegion};
pub use task::{RecordingYield, TaskYield, ThreadYield};
