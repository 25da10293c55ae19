use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use memmgr_core::{MemError, Result, TargetPlatform};
use memmgr_platform::FileStore;
use tracing::{debug, info, warn};

use crate::{DumpRequest, LoadRequest, TransferEngine, TransferSummary};

/// Bulk operations executed by the transfer worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferRequest {
    Dump(DumpRequest),
    Load(LoadRequest),
    DumpSymbolTable(PathBuf),
    ResetStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Dumped(TransferSummary),
    Loaded(TransferSummary),
    SymbolTableDumped(PathBuf),
    Reset,
}

type Job = (TransferRequest, Sender<Result<TransferOutcome>>);

/// Reply handle for a submitted transfer.
#[derive(Debug)]
pub struct PendingTransfer {
    reply: Receiver<Result<TransferOutcome>>,
}

impl PendingTransfer {
    /// Blocks until the worker finishes the transfer. There is no cancellation.
    pub fn wait(self) -> Result<TransferOutcome> {
        self.reply.recv().map_err(|_| MemError::WorkerUnavailable)?
    }
}

/// Dedicated thread that owns the [`TransferEngine`] and runs transfers one at a time, in
/// submission order.
pub struct TransferWorker {
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl TransferWorker {
    pub fn spawn<P, F>(engine: TransferEngine<P, F>, name: &str) -> Result<Self>
    where
        P: TargetPlatform + ?Sized + 'static,
        F: FileStore + 'static,
    {
        let (tx, rx) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(engine, rx))
            .map_err(|err| MemError::WorkerSpawn(format!("{name}: {err}")))?;
        info!(worker = name, "transfer worker started");
        Ok(Self {
            jobs: Some(tx),
            thread: Some(thread),
        })
    }

    pub fn submit(&self, request: TransferRequest) -> Result<PendingTransfer> {
        let jobs = self.jobs.as_ref().ok_or(MemError::WorkerUnavailable)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        jobs.send((request, reply_tx))
            .map_err(|_| MemError::WorkerUnavailable)?;
        Ok(PendingTransfer { reply: reply_rx })
    }

    /// Submits `request` and waits for its outcome.
    pub fn execute(&self, request: TransferRequest) -> Result<TransferOutcome> {
        self.submit(request)?.wait()
    }

    /// Lets queued transfers finish, then joins the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.jobs.take());
        if let Some(thread) = self.thread.take() {
            join_worker(thread);
        }
    }
}

impl Drop for TransferWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Returns false if the worker thread panicked.
fn join_worker(thread: JoinHandle<()>) -> bool {
    match thread.join() {
        Ok(()) => true,
        Err(_) => {
            warn!("transfer worker thread panicked");
            false
        }
    }
}

fn run<P, F>(mut engine: TransferEngine<P, F>, jobs: Receiver<Job>)
where
    P: TargetPlatform + ?Sized,
    F: FileStore,
{
    for (request, reply) in jobs {
        debug!(?request, "transfer request");
        let outcome = match request {
            TransferRequest::Dump(req) => engine.dump_to_file(&req).map(TransferOutcome::Dumped),
            TransferRequest::Load(req) => engine.load_from_file(&req).map(TransferOutcome::Loaded),
            TransferRequest::DumpSymbolTable(path) => engine
                .dump_symbol_table(&path)
                .map(|()| TransferOutcome::SymbolTableDumped(path)),
            TransferRequest::ResetStatus => {
                engine.reset_status();
                Ok(TransferOutcome::Reset)
            }
        };
        // The submitter may have stopped waiting.
        let _ = reply.send(outcome);
    }
    debug!("transfer worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joining_reports_a_panicked_worker() {
        assert!(join_worker(thread::spawn(|| {})));
        assert!(!join_worker(thread::spawn(|| panic!("transfer aborted"))));
    }
}
