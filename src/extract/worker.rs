//! Decode workers: competing consumers of the record channel.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, trace};

use crate::error::{ExtractError, Result};

use super::context::{PipelineContext, StageGroup};
use super::progress::ProgressReporter;
use super::record::{DecodedRecord, RawRecord};

/// Receiver end of the record channel, shared by every worker.
pub type SharedRecords = Arc<Mutex<mpsc::Receiver<RawRecord>>>;

/// Spawn `worker_count` decode workers into `group`.
///
/// Each worker owns a clone of `results`; the results channel therefore
/// cannot close before every worker has exited.
pub fn spawn_workers(
    group: &mut StageGroup,
    records: SharedRecords,
    results: &mpsc::Sender<DecodedRecord>,
    reporter: Arc<dyn ProgressReporter>,
    worker_count: usize,
) {
    for worker_id in 0..worker_count {
        let ctx = group.context().clone();
        let records = records.clone();
        let results = results.clone();
        let reporter = reporter.clone();
        group.spawn(
            "decode-worker",
            run_worker(worker_id, ctx, records, results, reporter),
        );
    }
}

/// Decode records until the record channel is closed and drained.
///
/// A decode failure ends the worker with a `DecodeError`; the record is
/// neither skipped nor retried.
pub async fn run_worker(
    worker_id: usize,
    ctx: PipelineContext,
    records: SharedRecords,
    results: mpsc::Sender<DecodedRecord>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<()> {
    let mut decoded_count = 0u64;

    loop {
        let record = match receive(&ctx, &records).await? {
            Some(record) => record,
            None => {
                debug!(
                    "Worker {} drained record channel after {} records",
                    worker_id, decoded_count
                );
                return Ok(());
            }
        };

        let decoded = record.decode()?;
        trace!("Worker {} decoded {}", worker_id, decoded.id);

        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ExtractError::Cancelled),
            sent = results.send(decoded) => {
                sent.map_err(|_| ExtractError::Cancelled)?;
            }
        }

        decoded_count += 1;
        ctx.record_processed();
        reporter.increment();

        // Exit early, even mid-page, once another stage has failed
        ctx.check()?;
    }
}

async fn receive(ctx: &PipelineContext, records: &SharedRecords) -> Result<Option<RawRecord>> {
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(ExtractError::Cancelled),
        record = async {
            let mut rx = records.lock().await;
            rx.recv().await
        } => Ok(record),
    }
}
