use std::fmt;
use std::path::{Path, PathBuf};

use memmgr_platform::EventId;
use thiserror::Error;

use crate::events::{self, width_event};
use crate::{MemoryType, MemoryWidth};

pub type Result<T> = std::result::Result<T, MemError>;

/// Why a range/alignment check rejected an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeFault {
    /// Address is not a multiple of the element size.
    Misaligned,
    /// Range is not valid memory of the requested type.
    OutOfRange,
    /// Byte count is not a whole number of elements.
    PartialElement,
}

impl fmt::Display for RangeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeFault::Misaligned => f.write_str("address is not aligned to the access width"),
            RangeFault::OutOfRange => f.write_str("range is outside valid memory"),
            RangeFault::PartialElement => {
                f.write_str("byte count is not a multiple of the access width")
            }
        }
    }
}

/// Width accessor primitive that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessOp {
    Peek,
    Poke,
    Fill,
    ReadBlock,
    WriteBlock,
}

impl AccessOp {
    fn event_offset(self) -> u16 {
        match self {
            AccessOp::Peek => events::WIDTH_PEEK,
            AccessOp::Poke => events::WIDTH_POKE,
            AccessOp::Fill => events::WIDTH_FILL,
            AccessOp::ReadBlock => events::WIDTH_READ_BLOCK,
            AccessOp::WriteBlock => events::WIDTH_WRITE_BLOCK,
        }
    }
}

impl fmt::Display for AccessOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessOp::Peek => f.write_str("peek"),
            AccessOp::Poke => f.write_str("poke"),
            AccessOp::Fill => f.write_str("fill"),
            AccessOp::ReadBlock => f.write_str("read block"),
            AccessOp::WriteBlock => f.write_str("write block"),
        }
    }
}

/// Stage of a bulk transfer at which a file error was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStage {
    CreateDumpFile,
    DumpMemToFile,
    ProcessLoadFile,
    ComputeFileCrc,
    ValidLoadFile,
    LoadMemFromFile,
}

impl FileStage {
    fn event_id(self) -> EventId {
        match self {
            FileStage::CreateDumpFile => events::MEM_FILE_CREATE_DUMP_FILE,
            FileStage::DumpMemToFile => events::MEM_FILE_DUMP_MEM_TO_FILE,
            FileStage::ProcessLoadFile => events::MEM_FILE_PROCESS_LOAD_FILE,
            FileStage::ComputeFileCrc => events::MEM_FILE_COMPUTE_FILE_CRC,
            FileStage::ValidLoadFile => events::MEM_FILE_VALID_LOAD_FILE,
            FileStage::LoadMemFromFile => events::MEM_FILE_LOAD_MEM_FROM_FILE,
        }
    }
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStage::CreateDumpFile => f.write_str("create dump file"),
            FileStage::DumpMemToFile => f.write_str("dump memory to file"),
            FileStage::ProcessLoadFile => f.write_str("process load file"),
            FileStage::ComputeFileCrc => f.write_str("compute file CRC"),
            FileStage::ValidLoadFile => f.write_str("validate load file"),
            FileStage::LoadMemFromFile => f.write_str("load memory from file"),
        }
    }
}

/// Every failure the memory manager reports.
///
/// Variants carry enough context (address, width, type, expected vs. actual) to diagnose the
/// failure from the event alone. [`MemError::event_id`] gives the id of the component that
/// detected it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemError {
    #[error("symbol {name:?} not found")]
    SymbolNotFound { name: String },

    #[error("symbol name is empty")]
    EmptySymbolName,

    #[error("address {name}+0x{offset:x} overflows (symbol at 0x{base:08x})")]
    AddressOverflow { name: String, base: u64, offset: u64 },

    #[error("invalid memory type {0}")]
    InvalidMemoryType(MemoryType),

    #[error(
        "{width} {mem_type} range check failed for 0x{addr:08x}, {byte_count} bytes: {reason}"
    )]
    RangeOrAlignment {
        addr: u64,
        width: MemoryWidth,
        mem_type: MemoryType,
        byte_count: u32,
        reason: RangeFault,
    },

    #[error("{width} {op} failed at 0x{addr:08x} (element {index})")]
    AccessFault {
        op: AccessOp,
        addr: u64,
        index: u32,
        width: MemoryWidth,
    },

    #[error("{0} memory access is not included in this build")]
    WidthNotBuilt(MemoryWidth),

    #[error("{op} is not supported for {width} access")]
    UnsupportedWidth { op: AccessOp, width: MemoryWidth },

    #[error("{width} {op} buffer holds {actual} bytes, expected {expected}")]
    BufferLength {
        op: AccessOp,
        width: MemoryWidth,
        expected: usize,
        actual: usize,
    },

    #[error("EEPROM write to 0x{addr:08x} rejected: EEPROM writes are disabled")]
    DurableWriteDisabled { addr: u64 },

    #[error("EEPROM write {} failed for bank {bank}: {message}", direction(.enable))]
    WriteProtect {
        bank: u32,
        enable: bool,
        message: String,
    },

    #[error("{stage}: {op} of {} transferred {actual} of {expected} bytes", .path.display())]
    ShortIo {
        stage: FileStage,
        op: &'static str,
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("{} is {actual} bytes, headers and payload require {expected}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("CRC mismatch{}: expected 0x{expected:08x}, computed 0x{computed:08x}", origin(.path))]
    CrcMismatch {
        path: Option<PathBuf>,
        expected: u32,
        computed: u32,
    },

    #[error("unsupported CRC algorithm {algorithm}{}", origin(.path))]
    UnsupportedCrc { path: Option<PathBuf>, algorithm: u8 },

    #[error("dump to event of {requested} bytes exceeds the {max} byte limit")]
    DumpTooLarge { requested: u32, max: u32 },

    #[error("interrupts-disabled load of {requested} bytes exceeds the {max} byte limit")]
    LoadTooLarge { requested: u32, max: u32 },

    #[error("invalid header in {}: {reason}", .path.display())]
    InvalidHeader { path: PathBuf, reason: String },

    #[error("{}: directory is not writable ({reason})", .path.display())]
    DirNotWritable { path: PathBuf, reason: String },

    #[error("{}: file is not readable ({reason})", .path.display())]
    FileNotReadable { path: PathBuf, reason: String },

    #[error("filename is empty")]
    EmptyFilename,

    #[error("symbol table dump to {} failed: {message}", .path.display())]
    SymbolTableDump { path: PathBuf, message: String },

    #[error("{stage}: {op} {} failed: {message}", .path.display())]
    Io {
        stage: FileStage,
        op: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start transfer worker: {0}")]
    WorkerSpawn(String),

    #[error("transfer worker is not running")]
    WorkerUnavailable,
}

fn direction(enable: &bool) -> &'static str {
    if *enable {
        "enable"
    } else {
        "disable"
    }
}

fn origin(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" in {}", path.display()),
        None => String::new(),
    }
}

impl MemError {
    pub fn io(stage: FileStage, op: &'static str, path: &Path, err: &std::io::Error) -> Self {
        MemError::Io {
            stage,
            op,
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }

    /// Id of the event reporting this failure.
    pub fn event_id(&self) -> EventId {
        match self {
            MemError::SymbolNotFound { .. } | MemError::AddressOverflow { .. } => {
                events::MEMORY_CREATE_CPU_ADDR
            }
            MemError::EmptySymbolName => events::MEMORY_LOOKUP_SYMBOL,
            MemError::InvalidMemoryType(_) => events::MEMORY_GET_PSP_MEM_TYPE,
            MemError::RangeOrAlignment { width, .. } => {
                width_event(*width, events::WIDTH_VER_CPU_ADDR)
            }
            MemError::AccessFault { op, width, .. }
            | MemError::UnsupportedWidth { op, width }
            | MemError::BufferLength { op, width, .. } => width_event(*width, op.event_offset()),
            MemError::WidthNotBuilt(width) => width_event(*width, events::WIDTH_OPT_INCL),
            MemError::DurableWriteDisabled { .. } => events::MEMORY_POKE,
            MemError::WriteProtect { enable: true, .. } => events::MEMORY_ENA_EEPROM,
            MemError::WriteProtect { enable: false, .. } => events::MEMORY_DIS_EEPROM,
            MemError::ShortIo { stage, .. } | MemError::Io { stage, .. } => stage.event_id(),
            MemError::SizeMismatch { .. } => events::MEM_FILE_VALID_LOAD_FILE,
            MemError::CrcMismatch { path: Some(_), .. }
            | MemError::UnsupportedCrc { path: Some(_), .. } => events::MEM_FILE_VALID_LOAD_FILE,
            MemError::CrcMismatch { path: None, .. }
            | MemError::UnsupportedCrc { path: None, .. }
            | MemError::LoadTooLarge { .. } => events::MEMORY_LOAD_INT_DIS,
            MemError::DumpTooLarge { .. } => events::MEMORY_DUMP_TO_EVENT,
            MemError::InvalidHeader { .. } => events::MEM_FILE_PROCESS_LOAD_FILE,
            MemError::DirNotWritable { .. } => events::MEM_FILE_DUMP_CMD,
            MemError::FileNotReadable { .. } => events::MEM_FILE_LOAD_CMD,
            MemError::EmptyFilename | MemError::SymbolTableDump { .. } => {
                events::MEM_FILE_DUMP_SYM_TBL
            }
            MemError::InvalidConfig(_) => events::MEM_MGR_INVALID_CONFIG,
            MemError::WorkerSpawn(_) | MemError::WorkerUnavailable => events::MEM_FILE_CONSTRUCTOR,
        }
    }
}
