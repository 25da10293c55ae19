#![cfg(not(target_arch = "wasm32"))]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use memmgr_core::{
    calculate_crc, AddressSpec, CrcAlgorithm, FileStage, MemError, MemFunction, MemMgrConfig,
    MemoryOps, MemoryType, MemoryWidth,
};
use memmgr_file::{
    read_headers, DumpRequest, LoadRequest, TransferEngine, TransferOutcome, TransferPhase,
    TransferRequest, TransferWorker, FILE_HEADER_BYTES,
};
use memmgr_platform::{RecordingEventSink, RecordingYield, SimMemory, StdFileStore};

const SRC: u64 = 0x10_0000;
const DST: u64 = 0x20_0000;
const EEPROM: u64 = 0x30_0000;
const REGION: usize = 0x4000;

struct Harness {
    mem: Arc<SimMemory>,
    sink: Arc<RecordingEventSink>,
    yielder: Arc<RecordingYield>,
    ops: MemoryOps<SimMemory>,
    engine: TransferEngine<SimMemory>,
}

fn config() -> MemMgrConfig {
    MemMgrConfig {
        dump_block_size: 256,
        load_block_size: 256,
        task_block_limit: 4,
        task_block_delay_ms: 0,
        ..MemMgrConfig::default()
    }
}

fn harness() -> Harness {
    let mut sim = SimMemory::new();
    sim.add_ram(SRC, REGION).unwrap();
    sim.add_ram(DST, REGION).unwrap();
    sim.add_eeprom(EEPROM, REGION, 0).unwrap();
    sim.add_symbol("science_buf", SRC);
    let mem = Arc::new(sim);
    let sink = Arc::new(RecordingEventSink::new());
    let yielder = Arc::new(RecordingYield::new());
    let config = config();
    let ops = MemoryOps::new(Arc::clone(&mem), &config, sink.clone()).unwrap();
    let engine = TransferEngine::new(&ops, &config, StdFileStore, yielder.clone()).unwrap();
    Harness {
        mem,
        sink,
        yielder,
        ops,
        engine,
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

fn dump_request(path: &Path, byte_count: u32) -> DumpRequest {
    DumpRequest {
        source: AddressSpec::symbol("science_buf", 0),
        mem_type: MemoryType::Volatile,
        width: MemoryWidth::Bits32,
        byte_count,
        path: path.to_path_buf(),
    }
}

fn load_to(path: &Path, addr: u64) -> LoadRequest {
    LoadRequest {
        path: path.to_path_buf(),
        dest: Some(AddressSpec::absolute(addr)),
    }
}

#[test]
fn dump_then_load_into_another_region_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("science.dat");
    let mut h = harness();
    let data = pattern(5000);
    h.mem.seed(SRC, &data).unwrap();

    let dumped = h.engine.dump_to_file(&dump_request(&path, 5000)).unwrap();
    assert_eq!(dumped.blocks, 20);
    assert_eq!(
        fs::metadata(&path).unwrap().len(),
        5000 + FILE_HEADER_BYTES as u64
    );

    let (primary, secondary) = read_headers(&mut fs::File::open(&path).unwrap()).unwrap();
    assert_eq!(primary.description, "Memory dump file");
    assert_eq!(secondary.address, AddressSpec::symbol("science_buf", 0));
    assert_eq!(secondary.byte_count, 5000);
    assert_eq!(
        secondary.crc,
        calculate_crc(&data, 0, CrcAlgorithm::Crc16).unwrap()
    );

    let loaded = h.engine.load_from_file(&load_to(&path, DST)).unwrap();
    assert_eq!(loaded.crc, dumped.crc);
    assert_eq!(loaded.addr, DST);
    assert_eq!(h.mem.snapshot(DST, 5000).unwrap(), data);
    assert_eq!(h.engine.phase(), TransferPhase::Closed { success: true });

    let status = h.ops.status_board().snapshot();
    assert_eq!(status.function, MemFunction::LoadFromFile);
    assert_eq!(status.filename.as_deref(), Some(path.as_path()));
}

#[test]
fn load_without_override_uses_the_recorded_address() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("restore.dat");
    let mut h = harness();
    h.mem.seed(SRC, &[0xC3; 64]).unwrap();
    h.engine.dump_to_file(&dump_request(&path, 64)).unwrap();

    h.mem.seed(SRC, &[0; 64]).unwrap();
    let summary = h
        .engine
        .load_from_file(&LoadRequest {
            path: path.clone(),
            dest: None,
        })
        .unwrap();
    assert_eq!(summary.addr, SRC);
    assert_eq!(h.mem.snapshot(SRC, 64).unwrap(), vec![0xC3; 64]);
}

#[test]
fn tampered_payload_fails_crc_and_leaves_memory_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tampered.dat");
    let mut h = harness();
    h.mem.seed(SRC, &pattern(1024)).unwrap();
    h.engine.dump_to_file(&dump_request(&path, 1024)).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes[FILE_HEADER_BYTES + 10] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let writes_before = h.mem.write_count();
    let err = h.engine.load_from_file(&load_to(&path, DST)).unwrap_err();
    assert!(matches!(err, MemError::CrcMismatch { path: Some(_), .. }));
    assert_eq!(h.mem.write_count(), writes_before);
    assert_eq!(h.mem.snapshot(DST, 1024).unwrap(), vec![0; 1024]);
    assert_eq!(h.engine.phase(), TransferPhase::Closed { success: false });
    assert_eq!(h.ops.status_board().snapshot().function, MemFunction::DumpToFile);
}

#[test]
fn size_mismatch_is_detected_before_the_crc_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grown.dat");
    let mut h = harness();
    h.engine.dump_to_file(&dump_request(&path, 4096)).unwrap();
    OpenOptions::new()
        .append(true)
        .open(&path)
        .unwrap()
        .write_all(&[0])
        .unwrap();

    let delays_before = h.yielder.delays();
    let err = h.engine.load_from_file(&load_to(&path, DST)).unwrap_err();
    assert_eq!(
        err,
        MemError::SizeMismatch {
            path: path.clone(),
            expected: 4096 + FILE_HEADER_BYTES as u64,
            actual: 4097 + FILE_HEADER_BYTES as u64,
        }
    );
    // 16 blocks with a limit of 4 would pause during a CRC pass.
    assert_eq!(h.yielder.delays(), delays_before);
}

#[test]
fn throttle_pauses_between_blocks_of_each_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("throttled.dat");
    let mut h = harness();

    // 10 blocks: 9 inter-block pauses per pass, every 4th one sleeps.
    h.engine.dump_to_file(&dump_request(&path, 2560)).unwrap();
    assert_eq!(h.yielder.delays(), 2);
    assert_eq!(h.yielder.marker_pairs(), 2);

    h.engine.load_from_file(&load_to(&path, DST)).unwrap();
    assert_eq!(h.yielder.delays(), 2 + 2 + 2);
}

#[test]
fn file_precondition_failures() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = harness();

    let missing = dir.path().join("missing.dat");
    assert!(matches!(
        h.engine.load_from_file(&load_to(&missing, DST)),
        Err(MemError::FileNotReadable { .. })
    ));

    let orphan = dir.path().join("no_such_dir").join("out.dat");
    assert!(matches!(
        h.engine.dump_to_file(&dump_request(&orphan, 16)),
        Err(MemError::DirNotWritable { .. })
    ));

    let short = dir.path().join("short.dat");
    fs::write(&short, [0u8; 10]).unwrap();
    assert!(matches!(
        h.engine.load_from_file(&load_to(&short, DST)),
        Err(MemError::ShortIo {
            stage: FileStage::ProcessLoadFile,
            expected: 64,
            actual: 10,
            ..
        })
    ));

    let foreign = dir.path().join("foreign.dat");
    fs::write(&foreign, vec![0xEE; FILE_HEADER_BYTES + 4]).unwrap();
    assert!(matches!(
        h.engine.load_from_file(&load_to(&foreign, DST)),
        Err(MemError::InvalidHeader { .. })
    ));

    // Every failure produced a detail event and a generic one.
    assert_eq!(h.sink.events().len(), 8);
    assert_eq!(h.ops.status_board().counters(), (0, 4));
}

#[test]
fn dump_of_invalid_range_creates_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.dat");
    let mut h = harness();
    let req = DumpRequest {
        source: AddressSpec::absolute(SRC + REGION as u64 - 8),
        ..dump_request(&path, 64)
    };
    assert!(matches!(
        h.engine.dump_to_file(&req),
        Err(MemError::RangeOrAlignment { .. })
    ));
    assert!(!path.exists());
}

#[test]
fn eeprom_load_requires_write_enable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eeprom.dat");
    let mut h = harness();
    h.mem.seed(SRC, &pattern(512)).unwrap();
    h.engine.dump_to_file(&dump_request(&path, 512)).unwrap();

    let to_eeprom = LoadRequest {
        path: path.clone(),
        dest: Some(AddressSpec::absolute(EEPROM)),
    };
    // The file names RAM; the destination must be valid RAM too.
    assert!(matches!(
        h.engine.load_from_file(&to_eeprom),
        Err(MemError::RangeOrAlignment { .. })
    ));

    // Rewrite the header so the payload targets EEPROM.
    let durable = dir.path().join("durable.dat");
    let mut bytes = fs::read(&path).unwrap();
    bytes[64 + 72] = MemoryType::Durable.code();
    fs::write(&durable, bytes).unwrap();
    let to_eeprom = LoadRequest {
        path: durable,
        dest: Some(AddressSpec::absolute(EEPROM)),
    };
    assert!(matches!(
        h.engine.load_from_file(&to_eeprom),
        Err(MemError::DurableWriteDisabled { .. })
    ));

    h.ops.enable_durable_write(0).unwrap();
    h.engine.load_from_file(&to_eeprom).unwrap();
    assert_eq!(h.mem.snapshot(EEPROM, 512).unwrap(), pattern(512));
}

#[test]
fn symbol_table_dump() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("symbols.txt");
    let mut h = harness();

    h.engine.dump_symbol_table(&path).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "science_buf 0x00100000\n");
    assert_eq!(
        h.ops.status_board().snapshot().filename.as_deref(),
        Some(path.as_path())
    );
    assert_eq!(
        h.engine.dump_symbol_table(Path::new("")),
        Err(MemError::EmptyFilename)
    );
}

#[test]
fn worker_runs_transfers_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worker.dat");
    let h = harness();
    h.mem.seed(SRC, &pattern(300)).unwrap();

    let worker = TransferWorker::spawn(h.engine, "MEM_FILE").unwrap();
    let dump = worker
        .submit(TransferRequest::Dump(DumpRequest {
            width: MemoryWidth::Bits8,
            ..dump_request(&path, 300)
        }))
        .unwrap();
    let load = worker
        .submit(TransferRequest::Load(load_to(&path, DST)))
        .unwrap();

    assert!(matches!(dump.wait().unwrap(), TransferOutcome::Dumped(s) if s.byte_count == 300));
    assert!(matches!(load.wait().unwrap(), TransferOutcome::Loaded(s) if s.addr == DST));
    assert_eq!(h.mem.snapshot(DST, 300).unwrap(), pattern(300));
    assert_eq!(
        worker.execute(TransferRequest::ResetStatus).unwrap(),
        TransferOutcome::Reset
    );
    worker.shutdown();
}
