use std::fmt::Write as _;
use std::sync::Arc;

use memmgr_platform::{Event, EventId, EventSink, MemoryProvider, Severity, SymbolProvider};
use tracing::{debug, info};

use crate::events;
use crate::types::bounded_name;
use crate::{
    calculate_crc, AccessOp, AddressSpec, AddressVerifier, CrcAlgorithm, DurableWriteGate,
    MemError, MemFunction, MemMgrConfig, MemoryType, MemoryWidth, Result, StatusBoard,
    StatusReport, TargetPlatform, VerifiedMemory, WidthAccessor, MEM_MGR_MAJOR_VER,
    MEM_MGR_MINOR_VER,
};

/// Longest event message the event service carries, including the terminator.
pub const EVS_MAX_MESSAGE_LENGTH: usize = 122;

const DUMP_EVENT_HEADER: &str = "Memory Dump: ";
const DUMP_EVENT_HEADER_BUDGET: usize = 13;
const DUMP_EVENT_TRAILER_BUDGET: usize = 33;
const DUMP_EVENT_TOKEN_LEN: usize = 5;

/// Bytes that fit in a single dump-to-event message.
pub const DUMP_TO_EVENT_MAX_BYTES: u32 = ((EVS_MAX_MESSAGE_LENGTH
    - (DUMP_EVENT_HEADER_BUDGET + DUMP_EVENT_TRAILER_BUDGET))
    / DUMP_EVENT_TOKEN_LEN) as u32;

/// Largest payload of a load with interrupts disabled.
pub const MAX_UNINTERRUPTIBLE_BYTES: u32 = 200;

/// Renders `bytes` read from `addr` as a dump event message, truncated to the event length budget.
pub fn format_dump_event(bytes: &[u8], addr: u64) -> String {
    let mut message = String::with_capacity(EVS_MAX_MESSAGE_LENGTH);
    message.push_str(DUMP_EVENT_HEADER);
    for byte in bytes {
        let _ = write!(message, "0x{byte:02X} ");
    }
    let _ = write!(message, "from address: 0x{addr:08X}");
    message.truncate(EVS_MAX_MESSAGE_LENGTH - 1);
    message
}

/// Payload of a load with interrupts disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptsDisabledLoad {
    pub dest: AddressSpec,
    pub mem_type: MemoryType,
    pub data: Vec<u8>,
    pub crc: u32,
    pub crc_algorithm: CrcAlgorithm,
}

/// Single-command memory operations.
///
/// Each operation verifies its address first, reports an informational event and records
/// [`crate::CommandStatus`] on success. A failure is reported twice: once with the detailed cause
/// under the id of the component that detected it, then as a generic failure of the command.
pub struct MemoryOps<P: ?Sized> {
    platform: Arc<P>,
    verifier: AddressVerifier<P>,
    accessor: WidthAccessor<P>,
    gate: DurableWriteGate,
    status: StatusBoard,
    events: Arc<dyn EventSink>,
    fill_block_size: usize,
}

impl<P: TargetPlatform + ?Sized> MemoryOps<P> {
    pub fn new(platform: Arc<P>, config: &MemMgrConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let sizes = config.block_sizes()?;
        let widths = config.width_set();
        let gate = DurableWriteGate::new();
        let ops = Self {
            verifier: AddressVerifier::new(Arc::clone(&platform), widths),
            accessor: WidthAccessor::new(Arc::clone(&platform), widths, gate.clone()),
            platform,
            gate,
            status: StatusBoard::new(),
            events,
            fill_block_size: sizes.fill,
        };
        info!(?widths, fill_block_size = sizes.fill, "memory operations ready");
        Ok(ops)
    }

    pub fn platform(&self) -> &Arc<P> {
        &self.platform
    }

    pub fn verifier(&self) -> &AddressVerifier<P> {
        &self.verifier
    }

    pub fn accessor(&self) -> &WidthAccessor<P> {
        &self.accessor
    }

    pub fn status_board(&self) -> &StatusBoard {
        &self.status
    }

    pub fn durable_write_gate(&self) -> &DurableWriteGate {
        &self.gate
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub fn peek(&self, spec: &AddressSpec, mem_type: MemoryType, width: MemoryWidth) -> Result<u32> {
        let result = self
            .verifier
            .verify(spec, mem_type, width, width.element_bytes())
            .and_then(|mem| Ok((self.accessor.peek(&mem)?, mem)));
        let (value, mem) = self.check(result, events::MEMORY_PEEK, "Peek", spec)?;

        self.status.record(
            MemFunction::Peek,
            mem_type,
            Some(width),
            mem.addr(),
            value,
            mem.byte_count(),
        );
        self.events.info(
            events::MEMORY_PEEK,
            format!(
                "Peek Command: Addr = 0x{:08X} Size = {} bits Data = 0x{:08X}",
                mem.addr(),
                mem.byte_count() * 8,
                value
            ),
        );
        Ok(value)
    }

    pub fn poke(
        &self,
        spec: &AddressSpec,
        mem_type: MemoryType,
        width: MemoryWidth,
        value: u32,
    ) -> Result<()> {
        let result = self
            .verifier
            .verify(spec, mem_type, width, width.element_bytes())
            .and_then(|mem| self.accessor.poke(&mem, value).map(|()| mem));
        let mem = self.check(result, events::MEMORY_POKE, "Poke", spec)?;

        self.status.record(
            MemFunction::Poke,
            mem_type,
            Some(width),
            mem.addr(),
            value,
            mem.byte_count(),
        );
        self.events.info(
            events::MEMORY_POKE,
            format!(
                "Poke Command: Addr = 0x{:08X} Size = {} bits Data = 0x{:08X}",
                mem.addr(),
                mem.byte_count() * 8,
                value
            ),
        );
        Ok(())
    }

    /// Fills `byte_count` bytes in chunks of at most the configured fill block size.
    pub fn fill(
        &self,
        spec: &AddressSpec,
        mem_type: MemoryType,
        width: MemoryWidth,
        byte_count: u32,
        pattern: u32,
    ) -> Result<()> {
        let result = self
            .verifier
            .verify(spec, mem_type, width, byte_count)
            .and_then(|mem| self.fill_chunked(&mem, pattern).map(|()| mem));
        let mem = self.check(result, events::MEMORY_FILL, "Fill", spec)?;

        self.status.record(
            MemFunction::Fill,
            mem_type,
            Some(width),
            mem.addr(),
            pattern,
            byte_count,
        );
        self.events.info(
            events::MEMORY_FILL,
            format!(
                "Fill Memory Command: Filled {} bytes at address: 0x{:08X} with pattern: 0x{:08X}",
                byte_count,
                mem.addr(),
                pattern
            ),
        );
        Ok(())
    }

    fn fill_chunked(&self, mem: &VerifiedMemory, pattern: u32) -> Result<()> {
        let elem = mem.width().element_bytes();
        // Chunks must hold whole elements so each one stays aligned.
        let chunk = ((self.fill_block_size as u32) / elem).max(1) * elem;
        let mut offset = 0;
        while offset < mem.byte_count() {
            let len = chunk.min(mem.byte_count() - offset);
            self.accessor.fill_block(&mem.window(offset, len)?, pattern)?;
            offset += len;
        }
        Ok(())
    }

    /// Reads up to [`DUMP_TO_EVENT_MAX_BYTES`] and reports them as hex in one event.
    pub fn dump_to_event(
        &self,
        spec: &AddressSpec,
        mem_type: MemoryType,
        width: MemoryWidth,
        byte_count: u32,
    ) -> Result<String> {
        let result = if byte_count > DUMP_TO_EVENT_MAX_BYTES {
            Err(MemError::DumpTooLarge {
                requested: byte_count,
                max: DUMP_TO_EVENT_MAX_BYTES,
            })
        } else {
            self.verifier
                .verify(spec, mem_type, width, byte_count)
                .and_then(|mem| {
                    let mut scratch = vec![0u8; byte_count as usize];
                    self.accessor.read_block(&mem, &mut scratch)?;
                    Ok((scratch, mem))
                })
        };
        let (bytes, mem) = self.check(result, events::MEMORY_DUMP_TO_EVENT, "Dump to event", spec)?;

        let message = format_dump_event(&bytes, mem.addr());
        self.status.record(
            MemFunction::DumpToEvent,
            mem_type,
            Some(width),
            mem.addr(),
            0,
            byte_count,
        );
        self.events.info(events::MEMORY_DUMP_TO_EVENT, message.clone());
        Ok(message)
    }

    /// Checks the payload CRC, then writes it in one uninterruptible copy.
    ///
    /// Nothing is written unless the CRC matches and the destination verifies.
    pub fn load_with_interrupts_disabled(&self, load: &InterruptsDisabledLoad) -> Result<()> {
        let result = self.load_wid(load);
        let mem = self.check(
            result,
            events::MEMORY_LOAD_INT_DIS,
            "Load with interrupts disabled",
            &load.dest,
        )?;

        self.status.record(
            MemFunction::LoadWithIntDisabled,
            load.mem_type,
            Some(MemoryWidth::Untyped),
            mem.addr(),
            load.crc,
            mem.byte_count(),
        );
        self.events.info(
            events::MEMORY_LOAD_INT_DIS,
            format!(
                "Load Memory WID Command: Wrote {} bytes to address: 0x{:08X}",
                mem.byte_count(),
                mem.addr()
            ),
        );
        Ok(())
    }

    fn load_wid(&self, load: &InterruptsDisabledLoad) -> Result<VerifiedMemory> {
        let len = u32::try_from(load.data.len()).unwrap_or(u32::MAX);
        if len > MAX_UNINTERRUPTIBLE_BYTES {
            return Err(MemError::LoadTooLarge {
                requested: len,
                max: MAX_UNINTERRUPTIBLE_BYTES,
            });
        }

        let computed = calculate_crc(&load.data, 0, load.crc_algorithm)?;
        if computed != load.crc {
            return Err(MemError::CrcMismatch {
                path: None,
                expected: load.crc,
                computed,
            });
        }

        let mem = self
            .verifier
            .verify(&load.dest, load.mem_type, MemoryWidth::Untyped, len)?;
        match mem.mem_type() {
            MemoryType::Durable => self.accessor.write_block(&mem, &load.data)?,
            _ => MemoryProvider::copy_to_uninterruptible(&*self.platform, mem.addr(), &load.data)
                .map_err(|err| {
                    debug!(addr = mem.addr(), error = %err, "uninterruptible copy failed");
                    MemError::AccessFault {
                        op: AccessOp::WriteBlock,
                        addr: mem.addr(),
                        index: 0,
                        width: MemoryWidth::Untyped,
                    }
                })?,
        }
        Ok(mem)
    }

    /// Pure symbol query; the command status is not touched.
    pub fn lookup_symbol(&self, name: &str) -> Result<u64> {
        let bounded = bounded_name(name);
        let result = if bounded.is_empty() {
            Err(MemError::EmptySymbolName)
        } else {
            SymbolProvider::lookup(&*self.platform, bounded).map_err(|_| MemError::SymbolNotFound {
                name: bounded.to_string(),
            })
        };
        let spec = AddressSpec::symbol(bounded, 0);
        let addr = self.check(result, events::MEMORY_LOOKUP_SYMBOL, "Lookup symbol", &spec)?;

        self.status.count_valid();
        self.events.info(
            events::MEMORY_LOOKUP_SYMBOL,
            format!("Symbol Lookup Command: Name = '{bounded}' Addr = 0x{addr:08X}"),
        );
        Ok(addr)
    }

    /// Write-enables an EEPROM bank. The process-wide flag is only set once the platform has
    /// actually lifted the write protection.
    pub fn enable_durable_write(&self, bank: u32) -> Result<()> {
        self.set_durable_write(bank, true)
    }

    pub fn disable_durable_write(&self, bank: u32) -> Result<()> {
        self.set_durable_write(bank, false)
    }

    fn set_durable_write(&self, bank: u32, enable: bool) -> Result<()> {
        let (id, what) = if enable {
            (events::MEMORY_ENA_EEPROM, "enabled")
        } else {
            (events::MEMORY_DIS_EEPROM, "disabled")
        };
        let result = if enable {
            self.platform.eeprom_write_enable(bank)
        } else {
            self.platform.eeprom_write_disable(bank)
        };
        if let Err(err) = result {
            let err = MemError::WriteProtect {
                bank,
                enable,
                message: err.to_string(),
            };
            self.report(&err);
            self.status.count_failed();
            return Err(err);
        }

        self.gate.set_enabled(enable);
        self.status.count_valid();
        self.events
            .info(id, format!("EEPROM bank {bank} writes {what}"));
        Ok(())
    }

    /// Clears the command counters.
    pub fn reset_status(&self) {
        self.status.reset_counters();
        self.events.send(Event {
            id: events::MEM_MGR_RESET,
            severity: Severity::Debug,
            message: "Reset counters command received".to_string(),
        });
    }

    pub fn no_op(&self) -> String {
        let version = version();
        self.status.count_valid();
        self.events.info(
            events::MEM_MGR_NOOP,
            format!("No operation command received for memory manager version {version}"),
        );
        version
    }

    pub fn status_report(&self) -> StatusReport {
        let (valid_commands, failed_commands) = self.status.counters();
        StatusReport {
            version: version(),
            valid_commands,
            failed_commands,
            durable_write_enabled: self.gate.is_enabled(),
            last: self.status.snapshot(),
        }
    }

    fn check<T>(
        &self,
        result: Result<T>,
        id: EventId,
        command: &str,
        spec: &AddressSpec,
    ) -> Result<T> {
        result.map_err(|err| {
            self.report(&err);
            self.status.count_failed();
            self.events
                .error(id, format!("{command} command failed for {spec}"));
            err
        })
    }

    fn report(&self, err: &MemError) {
        self.events.error(err.event_id(), err.to_string());
    }
}

pub(crate) fn version() -> String {
    format!("{MEM_MGR_MAJOR_VER}.{MEM_MGR_MINOR_VER}")
}
