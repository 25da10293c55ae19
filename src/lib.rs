//! Memory manager for a running flight target.
//!
//! This crate ties the workspace together:
//!
//! - [`platform`]: provider traits for memory, symbols, files, events and task yielding, plus the
//!   simulated target used by the CLI and tests
//! - [`core`]: address resolution, validation and the per-command memory operations
//! - [`file`]: header codec, the throttled dump/load engine and its worker thread
//!
//! The operator CLI lives in `crates/memmgr-cli` and builds the `memmgr` binary.

pub use memmgr_core as core;
pub use memmgr_file as file;
pub use memmgr_platform as platform;

pub use memmgr_core::{
    AddressSpec, MemError, MemMgrConfig, MemoryOps, MemoryType, MemoryWidth, Result,
};
pub use memmgr_file::{DumpRequest, LoadRequest, TransferEngine, TransferWorker};
