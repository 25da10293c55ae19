//! Bulk transfer of memory to and from files.
//!
//! A transfer file is a primary header, a secondary header describing the source range and its
//! CRC, then the raw payload. [`TransferEngine`] streams the payload in bounded blocks through a
//! shared buffer, yielding every few blocks, and validates size and CRC before a load writes any
//! memory. [`TransferWorker`] runs the engine on its own thread.

mod engine;
pub mod header;
mod io;
mod throttle;
mod worker;

pub use engine::{
    DumpRequest, LoadRequest, TransferEngine, TransferPhase, TransferSummary,
    MAX_SYMBOL_TABLE_BYTES,
};
pub use header::{
    read_headers, HeaderError, PrimaryHeader, SecondaryHeader, FILE_HEADER_BYTES,
};
pub use throttle::TransferThrottle;
pub use worker::{PendingTransfer, TransferOutcome, TransferRequest, TransferWorker};
