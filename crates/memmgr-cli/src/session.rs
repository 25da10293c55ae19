use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use memmgr_core::{MemError, MemoryOps};
use memmgr_file::{TransferEngine, TransferOutcome, TransferRequest, TransferWorker};
use memmgr_platform::{Event, RecordingEventSink, SimMemory, StdFileStore, ThreadYield};
use tracing::debug;

use crate::config::CliConfig;
use crate::image::TargetImage;

/// One CLI invocation against a simulated target.
pub struct Session {
    config: CliConfig,
    mem: Arc<SimMemory>,
    events: Arc<RecordingEventSink>,
    ops: MemoryOps<SimMemory>,
}

impl Session {
    pub fn open(config: CliConfig, image: &TargetImage) -> anyhow::Result<Self> {
        let mem = Arc::new(image.to_sim(&config)?);
        let events = Arc::new(RecordingEventSink::new());
        let ops = MemoryOps::new(Arc::clone(&mem), &config.memmgr, events.clone())
            .context("initialize memory operations")?;
        ops.durable_write_gate()
            .set_enabled(image.durable_write_enabled);
        ops.status_board().restore(image.status.clone());
        Ok(Self {
            config,
            mem,
            events,
            ops,
        })
    }

    pub fn ops(&self) -> &MemoryOps<SimMemory> {
        &self.ops
    }

    /// Runs one bulk transfer on a dedicated worker thread.
    pub fn transfer(&self, request: TransferRequest) -> Result<TransferOutcome, MemError> {
        let engine = TransferEngine::new(
            &self.ops,
            &self.config.memmgr,
            StdFileStore,
            Arc::new(ThreadYield),
        )?;
        let worker = TransferWorker::spawn(engine, &self.config.memmgr.worker_name)?;
        let outcome = worker.execute(request);
        worker.shutdown();
        outcome
    }

    /// Events raised since the last call.
    pub fn take_events(&self) -> Vec<Event> {
        self.events.take()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        debug!(path = %path.display(), "saving target image");
        TargetImage::capture(
            &self.mem,
            self.ops.durable_write_gate().is_enabled(),
            self.ops.status_board().export(),
        )
        .save(path)
    }
}
