use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::{MemFunction, MemoryType, MemoryWidth};

/// Outcome of the last successful memory command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandStatus {
    pub function: MemFunction,
    pub mem_type: MemoryType,
    /// `None` until a width-specific command succeeds.
    pub width: Option<MemoryWidth>,
    pub address: u64,
    pub data: u32,
    pub byte_count: u32,
    pub filename: Option<PathBuf>,
}

/// Contents of a [`StatusBoard`], for carrying it across process restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    pub last: CommandStatus,
    pub valid_commands: u32,
    pub failed_commands: u32,
}

/// Shared handle to the [`CommandStatus`] and command counters written by the command context
/// and the transfer worker.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<BoardState>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed memory command and counts it as valid. The last filename is left
    /// untouched.
    pub fn record(
        &self,
        function: MemFunction,
        mem_type: MemoryType,
        width: Option<MemoryWidth>,
        address: u64,
        data: u32,
        byte_count: u32,
    ) {
        let mut state = self.lock();
        state.valid_commands = state.valid_commands.wrapping_add(1);
        let status = &mut state.last;
        status.function = function;
        status.mem_type = mem_type;
        status.width = width;
        status.address = address;
        status.data = data;
        status.byte_count = byte_count;
    }

    pub fn record_filename(&self, filename: PathBuf) {
        self.lock().last.filename = Some(filename);
    }

    /// Counts a command that succeeded without touching memory (lookups, no-op, enable/disable).
    pub fn count_valid(&self) {
        let mut state = self.lock();
        state.valid_commands = state.valid_commands.wrapping_add(1);
    }

    pub fn count_failed(&self) {
        let mut state = self.lock();
        state.failed_commands = state.failed_commands.wrapping_add(1);
    }

    /// Clears the command counters. The last-command fields are kept.
    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.valid_commands = 0;
        state.failed_commands = 0;
    }

    /// `(valid, failed)` command counts.
    pub fn counters(&self) -> (u32, u32) {
        let state = self.lock();
        (state.valid_commands, state.failed_commands)
    }

    pub fn snapshot(&self) -> CommandStatus {
        self.lock().last.clone()
    }

    pub fn export(&self) -> BoardState {
        self.lock().clone()
    }

    /// Replaces the last-command fields and counters with `state`.
    pub fn restore(&self, state: BoardState) {
        *self.lock() = state;
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Process-wide EEPROM write enable. Starts disabled.
#[derive(Debug, Clone, Default)]
pub struct DurableWriteGate {
    enabled: Arc<AtomicBool>,
}

impl DurableWriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Only the enable/disable commands call this, after the platform primitive succeeded.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }
}

/// Read-only status payload published to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub version: String,
    pub valid_commands: u32,
    pub failed_commands: u32,
    pub durable_write_enabled: bool,
    #[serde(flatten)]
    pub last: CommandStatus,
}
