use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use memmgr_core::events::{MEM_FILE_DUMP_CMD, MEM_FILE_DUMP_SYM_TBL, MEM_FILE_LOAD_CMD};
use memmgr_core::{
    AddressSpec, AddressVerifier, BlockSizes, Crc16, CrcAlgorithm, FileStage, MemError,
    MemFunction, MemMgrConfig, MemoryOps, MemoryType, MemoryWidth, Result, StatusBoard,
    TargetPlatform, VerifiedMemory, WidthAccessor, IO_BLOCK_SIZE,
};
use memmgr_platform::{
    EventId, EventSink, FileCheckError, FileStore, StdFileStore, SymbolProvider, TaskYield,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::header::{
    PrimaryHeader, SecondaryHeader, FILE_HEADER_BYTES, PRIMARY_HEADER_BYTES,
    SECONDARY_HEADER_BYTES,
};
use crate::throttle::TransferThrottle;

/// Upper bound on the size of a symbol table dump.
pub const MAX_SYMBOL_TABLE_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRequest {
    pub source: AddressSpec,
    pub mem_type: MemoryType,
    pub width: MemoryWidth,
    pub byte_count: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub path: PathBuf,
    /// Destination override. `None` loads back to the address recorded in the file.
    pub dest: Option<AddressSpec>,
}

/// Result of a completed dump or load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub path: PathBuf,
    pub addr: u64,
    pub mem_type: MemoryType,
    pub width: MemoryWidth,
    pub byte_count: u32,
    pub crc: u32,
    pub blocks: u32,
}

/// Where the current (or last) transfer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Idle,
    HeaderWritten,
    HeaderRead,
    Validated,
    Streaming,
    Closed { success: bool },
}

/// Moves memory to and from transfer files.
///
/// One engine serves one transfer at a time: it owns the only I/O buffer and throttle, so it
/// is driven from a single context, normally the [`crate::TransferWorker`].
pub struct TransferEngine<P: ?Sized, F = StdFileStore> {
    platform: Arc<P>,
    verifier: AddressVerifier<P>,
    accessor: WidthAccessor<P>,
    status: StatusBoard,
    events: Arc<dyn EventSink>,
    files: F,
    yielder: Arc<dyn TaskYield>,
    throttle: TransferThrottle,
    sizes: BlockSizes,
    file_subtype: u32,
    file_description: String,
    buffer: Box<[u8]>,
    phase: TransferPhase,
}

impl<P, F> TransferEngine<P, F>
where
    P: TargetPlatform + ?Sized,
    F: FileStore,
{
    /// Builds an engine sharing the verifier, accessor, status and event sink of `ops`.
    pub fn new(
        ops: &MemoryOps<P>,
        config: &MemMgrConfig,
        files: F,
        yielder: Arc<dyn TaskYield>,
    ) -> Result<Self> {
        let sizes = config.block_sizes()?;
        info!(
            load_block_size = sizes.load,
            dump_block_size = sizes.dump,
            block_limit = config.task_block_limit,
            block_delay_ms = config.task_block_delay_ms,
            "transfer engine ready"
        );
        Ok(Self {
            platform: Arc::clone(ops.platform()),
            verifier: ops.verifier().clone(),
            accessor: ops.accessor().clone(),
            status: ops.status_board().clone(),
            events: Arc::clone(ops.events()),
            files,
            yielder,
            throttle: TransferThrottle::new(
                config.task_block_limit,
                config.task_block_delay_ms,
                config.task_perf_id,
            ),
            sizes,
            file_subtype: config.file_hdr_subtype,
            file_description: config.file_hdr_description.clone(),
            buffer: vec![0u8; IO_BLOCK_SIZE].into_boxed_slice(),
            phase: TransferPhase::Idle,
        })
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Clears transfer-local state. Memory and files are not touched.
    pub fn reset_status(&mut self) {
        self.throttle.reset();
        self.phase = TransferPhase::Idle;
    }

    /// Dumps a verified memory range into a new transfer file.
    ///
    /// The payload CRC is accumulated while streaming and written into the secondary header once
    /// the payload is complete. On failure the file keeps whatever was written so far.
    pub fn dump_to_file(&mut self, req: &DumpRequest) -> Result<TransferSummary> {
        self.phase = TransferPhase::Idle;
        let result = self.dump(req);
        let summary = self.finish(result, MEM_FILE_DUMP_CMD, "Dump to file", &req.path)?;

        self.status.record(
            MemFunction::DumpToFile,
            summary.mem_type,
            Some(summary.width),
            summary.addr,
            summary.crc,
            summary.byte_count,
        );
        self.status.record_filename(summary.path.clone());
        self.events.info(
            MEM_FILE_DUMP_CMD,
            format!(
                "Dump Memory to File Command: Dumped {} bytes from address 0x{:08X} to file {}",
                summary.byte_count,
                summary.addr,
                summary.path.display()
            ),
        );
        Ok(summary)
    }

    fn dump(&mut self, req: &DumpRequest) -> Result<TransferSummary> {
        let path = req.path.as_path();
        self.files
            .verify_dir_for_write(path)
            .map_err(file_check_error)?;
        let mem = self
            .verifier
            .verify(&req.source, req.mem_type, req.width, req.byte_count)?;

        let mut file = self
            .files
            .create(path)
            .map_err(|err| MemError::io(FileStage::CreateDumpFile, "create", path, &err))?;
        let primary = PrimaryHeader::new(self.file_subtype, &self.file_description);
        let mut secondary =
            SecondaryHeader::new(req.source.clone(), req.mem_type, req.width, req.byte_count);
        write_fully(&mut file, &primary.encode(), FileStage::CreateDumpFile, path)?;
        write_fully(&mut file, &secondary.encode(), FileStage::CreateDumpFile, path)?;
        self.phase = TransferPhase::HeaderWritten;
        debug!(path = %path.display(), addr = mem.addr(), byte_count = mem.byte_count(), "dump header written");

        self.phase = TransferPhase::Streaming;
        let (crc, blocks) = self.dump_mem_to_file(&mut file, &mem, path)?;

        secondary.crc = crc;
        file.seek(SeekFrom::Start(PRIMARY_HEADER_BYTES as u64))
            .map_err(|err| MemError::io(FileStage::DumpMemToFile, "seek", path, &err))?;
        write_fully(&mut file, &secondary.encode(), FileStage::DumpMemToFile, path)?;
        self.files
            .close(file)
            .map_err(|err| MemError::io(FileStage::DumpMemToFile, "close", path, &err))?;

        Ok(TransferSummary {
            path: path.to_path_buf(),
            addr: mem.addr(),
            mem_type: mem.mem_type(),
            width: mem.width(),
            byte_count: mem.byte_count(),
            crc,
            blocks,
        })
    }

    fn dump_mem_to_file(
        &mut self,
        file: &mut F::File,
        mem: &VerifiedMemory,
        path: &Path,
    ) -> Result<(u32, u32)> {
        let block = block_len(self.sizes.dump, mem.width());
        let total = mem.byte_count();
        let mut crc = Crc16::default();
        let mut offset = 0u32;
        let mut blocks = 0u32;

        self.throttle.reset();
        while offset < total {
            let len = block.min(total - offset);
            let window = mem.window(offset, len)?;
            let chunk = &mut self.buffer[..len as usize];
            self.accessor.read_block(&window, chunk)?;
            crc.update(chunk);
            write_fully(file, chunk, FileStage::DumpMemToFile, path)?;

            offset += len;
            blocks += 1;
            if offset < total {
                self.throttle.pause(&*self.yielder);
            }
        }
        Ok((u32::from(crc.value()), blocks))
    }

    /// Loads a transfer file into memory.
    ///
    /// The file size and payload CRC are validated before the destination is verified, and the
    /// destination is only written once both checks pass.
    pub fn load_from_file(&mut self, req: &LoadRequest) -> Result<TransferSummary> {
        self.phase = TransferPhase::Idle;
        let result = self.load(req);
        let summary = self.finish(result, MEM_FILE_LOAD_CMD, "Load from file", &req.path)?;

        self.status.record(
            MemFunction::LoadFromFile,
            summary.mem_type,
            Some(summary.width),
            summary.addr,
            summary.crc,
            summary.byte_count,
        );
        self.status.record_filename(summary.path.clone());
        self.events.info(
            MEM_FILE_LOAD_CMD,
            format!(
                "Load Memory from File Command: Loaded {} bytes to address 0x{:08X} from file {}",
                summary.byte_count,
                summary.addr,
                summary.path.display()
            ),
        );
        Ok(summary)
    }

    fn load(&mut self, req: &LoadRequest) -> Result<TransferSummary> {
        let path = req.path.as_path();
        self.files
            .verify_file_for_read(path)
            .map_err(file_check_error)?;
        let mut file = self
            .files
            .open_read(path)
            .map_err(|err| MemError::io(FileStage::ProcessLoadFile, "open", path, &err))?;

        let header = self.read_load_headers(&mut file, path)?;
        self.phase = TransferPhase::HeaderRead;

        self.validate_load_file(&mut file, &header, path)?;
        self.phase = TransferPhase::Validated;

        let dest = req.dest.as_ref().unwrap_or(&header.address);
        let mem = self
            .verifier
            .verify(dest, header.mem_type, header.width, header.byte_count)?;

        file.seek(SeekFrom::Start(FILE_HEADER_BYTES as u64))
            .map_err(|err| MemError::io(FileStage::LoadMemFromFile, "seek", path, &err))?;
        self.phase = TransferPhase::Streaming;
        let blocks = self.load_mem_from_file(&mut file, &mem, path)?;
        self.files
            .close(file)
            .map_err(|err| MemError::io(FileStage::LoadMemFromFile, "close", path, &err))?;

        Ok(TransferSummary {
            path: path.to_path_buf(),
            addr: mem.addr(),
            mem_type: mem.mem_type(),
            width: mem.width(),
            byte_count: mem.byte_count(),
            crc: header.crc,
            blocks,
        })
    }

    fn read_load_headers(&self, file: &mut F::File, path: &Path) -> Result<SecondaryHeader> {
        let invalid = |reason: String| MemError::InvalidHeader {
            path: path.to_path_buf(),
            reason,
        };

        let mut primary = [0u8; PRIMARY_HEADER_BYTES];
        read_fully(file, &mut primary, FileStage::ProcessLoadFile, path)?;
        let primary = PrimaryHeader::decode(&primary).map_err(|err| invalid(err.to_string()))?;
        if primary.sub_type != self.file_subtype {
            warn!(
                path = %path.display(),
                sub_type = primary.sub_type,
                expected = self.file_subtype,
                "load file has an unexpected header subtype"
            );
        }

        let mut secondary = [0u8; SECONDARY_HEADER_BYTES];
        read_fully(file, &mut secondary, FileStage::ProcessLoadFile, path)?;
        SecondaryHeader::decode(&secondary).map_err(|err| invalid(err.to_string()))
    }

    /// Size check first, then a CRC pass over the payload read back from the file.
    fn validate_load_file(
        &mut self,
        file: &mut F::File,
        header: &SecondaryHeader,
        path: &Path,
    ) -> Result<()> {
        let actual = self
            .files
            .size(path)
            .map_err(|err| MemError::io(FileStage::ValidLoadFile, "stat", path, &err))?;
        let expected = u64::from(header.byte_count) + FILE_HEADER_BYTES as u64;
        if actual != expected {
            return Err(MemError::SizeMismatch {
                path: path.to_path_buf(),
                expected,
                actual,
            });
        }

        match header.crc_algorithm() {
            Some(CrcAlgorithm::Crc16) => {}
            _ => {
                return Err(MemError::UnsupportedCrc {
                    path: Some(path.to_path_buf()),
                    algorithm: header.crc_algorithm,
                })
            }
        }

        let computed = self.compute_file_crc(file, header.byte_count, path)?;
        if computed != header.crc {
            return Err(MemError::CrcMismatch {
                path: Some(path.to_path_buf()),
                expected: header.crc,
                computed,
            });
        }
        Ok(())
    }

    /// CRC of the next `byte_count` bytes of `file`, read in load-sized blocks.
    fn compute_file_crc(&mut self, file: &mut F::File, byte_count: u32, path: &Path) -> Result<u32> {
        let block = self.sizes.load as u32;
        let mut crc = Crc16::default();
        let mut remaining = byte_count;

        self.throttle.reset();
        while remaining > 0 {
            let len = block.min(remaining);
            let chunk = &mut self.buffer[..len as usize];
            read_fully(file, chunk, FileStage::ComputeFileCrc, path)?;
            crc.update(chunk);

            remaining -= len;
            if remaining > 0 {
                self.throttle.pause(&*self.yielder);
            }
        }
        Ok(u32::from(crc.value()))
    }

    fn load_mem_from_file(
        &mut self,
        file: &mut F::File,
        mem: &VerifiedMemory,
        path: &Path,
    ) -> Result<u32> {
        let block = block_len(self.sizes.load, mem.width());
        let total = mem.byte_count();
        let mut offset = 0u32;
        let mut blocks = 0u32;

        self.throttle.reset();
        while offset < total {
            let len = block.min(total - offset);
            let window = mem.window(offset, len)?;
            let chunk = &mut self.buffer[..len as usize];
            read_fully(file, chunk, FileStage::LoadMemFromFile, path)?;
            self.accessor.write_block(&window, chunk)?;

            offset += len;
            blocks += 1;
            if offset < total {
                self.throttle.pause(&*self.yielder);
            }
        }
        Ok(blocks)
    }

    /// Writes the platform symbol table to `path`. Memory is not touched.
    pub fn dump_symbol_table(&mut self, path: &Path) -> Result<()> {
        let result = self.symbol_table(path);
        self.finish(result, MEM_FILE_DUMP_SYM_TBL, "Dump symbol table", path)?;

        self.status.count_valid();
        self.status.record_filename(path.to_path_buf());
        self.events.info(
            MEM_FILE_DUMP_SYM_TBL,
            format!("Symbol Table Dump to File {} Completed", path.display()),
        );
        Ok(())
    }

    fn symbol_table(&mut self, path: &Path) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(MemError::EmptyFilename);
        }
        self.files
            .verify_dir_for_write(path)
            .map_err(file_check_error)?;
        SymbolProvider::dump_table(&*self.platform, path, MAX_SYMBOL_TABLE_BYTES).map_err(|err| {
            MemError::SymbolTableDump {
                path: path.to_path_buf(),
                message: err.to_string(),
            }
        })
    }

    fn finish<T>(&mut self, result: Result<T>, id: EventId, command: &str, path: &Path) -> Result<T> {
        self.phase = TransferPhase::Closed {
            success: result.is_ok(),
        };
        result.map_err(|err| {
            self.events.error(err.event_id(), err.to_string());
            self.events
                .error(id, format!("{command} command failed for {}", path.display()));
            self.status.count_failed();
            err
        })
    }
}

/// Block size rounded down to whole elements of `width`.
fn block_len(configured: usize, width: MemoryWidth) -> u32 {
    let elem = width.element_bytes();
    ((configured as u32) / elem).max(1) * elem
}

fn file_check_error(err: FileCheckError) -> MemError {
    match err {
        FileCheckError::EmptyPath => MemError::EmptyFilename,
        FileCheckError::DirNotWritable { path, reason } => MemError::DirNotWritable { path, reason },
        FileCheckError::NotReadable { path, reason } => MemError::FileNotReadable { path, reason },
    }
}

/// Writes all of `bytes`; a write that makes no progress is a short write.
pub(crate) fn write_fully<W: Write + ?Sized>(
    out: &mut W,
    bytes: &[u8],
    stage: FileStage,
    path: &Path,
) -> Result<()> {
    let mut written = 0;
    while written < bytes.len() {
        match out.write(&bytes[written..]) {
            Ok(0) => {
                return Err(MemError::ShortIo {
                    stage,
                    op: "write",
                    path: path.to_path_buf(),
                    expected: bytes.len() as u64,
                    actual: written as u64,
                })
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(MemError::io(stage, "write", path, &err)),
        }
    }
    Ok(())
}

/// Fills `buf`; reaching end of file first is a short read.
pub(crate) fn read_fully<R: Read + ?Sized>(
    input: &mut R,
    buf: &mut [u8],
    stage: FileStage,
    path: &Path,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(MemError::ShortIo {
                    stage,
                    op: "read",
                    path: path.to_path_buf(),
                    expected: buf.len() as u64,
                    actual: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(MemError::io(stage, "read", path, &err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct StuckWriter;

    impl Write for StuckWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn short_write_is_reported() {
        let err = write_fully(&mut StuckWriter, &[1, 2, 3], FileStage::DumpMemToFile, Path::new("f"))
            .unwrap_err();
        assert_eq!(
            err,
            MemError::ShortIo {
                stage: FileStage::DumpMemToFile,
                op: "write",
                path: PathBuf::from("f"),
                expected: 3,
                actual: 0,
            }
        );
    }

    #[test]
    fn short_read_is_reported() {
        let mut input = Cursor::new(vec![7u8; 5]);
        let mut buf = [0u8; 8];
        assert!(matches!(
            read_fully(&mut input, &mut buf, FileStage::LoadMemFromFile, Path::new("f")),
            Err(MemError::ShortIo { expected: 8, actual: 5, .. })
        ));
    }

    #[test]
    fn block_len_keeps_whole_elements() {
        assert_eq!(block_len(2048, MemoryWidth::Bits32), 2048);
        assert_eq!(block_len(1023, MemoryWidth::Bits32), 1020);
        assert_eq!(block_len(1, MemoryWidth::Bits16), 2);
        assert_eq!(block_len(7, MemoryWidth::Untyped), 7);
    }
}
