/// Background anchor submission.
///
/// Writes hand their fingerprint to a bounded queue and return at once.
/// One worker task per signing identity drains the queue in FIFO order and
/// submits each fingerprint, so submissions from this process are never
/// interleaved. Outcomes are only visible in the logs.
///
/// ```text
/// write path ──try_send──▶ [ mpsc (bounded) ] ──▶ worker ──▶ submit()
/// ```
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::connection::ChainContext;
use super::fingerprint::Fingerprint;
use super::submitter;
use crate::error::{AnchorError, Result};

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A fingerprint waiting to be anchored.
#[derive(Debug, Clone)]
pub struct AnchorJob {
    pub sensor_id: String,
    pub fingerprint: Fingerprint,
}

/// Totals reported by the worker when it stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub submitted: u64,
    pub failed: u64,
}

/// Sending side of the submission queue. Cheap to clone.
#[derive(Clone)]
pub struct AnchorQueue {
    tx: mpsc::Sender<AnchorJob>,
}

impl AnchorQueue {
    /// Start the worker for `ctx`'s signing identity.
    ///
    /// The worker stops when every `AnchorQueue` clone is dropped and the
    /// queue is drained, or immediately when `cancel` fires.
    pub fn spawn(
        ctx: Arc<ChainContext>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<WorkerStats>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(ctx, rx, cancel));
        (Self { tx }, handle)
    }

    /// Queue a job without waiting.
    pub fn enqueue(&self, job: AnchorJob) -> Result<()> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AnchorError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => AnchorError::QueueClosed,
        })
    }
}

async fn run_worker(
    ctx: Arc<ChainContext>,
    mut rx: mpsc::Receiver<AnchorJob>,
    cancel: CancellationToken,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    info!(sender = %ctx.sender(), "Anchor worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        match submitter::submit(&ctx, job.fingerprint, &cancel).await {
            Ok(receipt) => {
                stats.submitted += 1;
                info!(
                    sensor_id = %job.sensor_id,
                    fingerprint = %job.fingerprint,
                    tx_hash = %receipt.tx_hash,
                    "Reading anchored"
                );
            }
            Err(e) if e.is_codec_defect() => {
                stats.failed += 1;
                error!(
                    sensor_id = %job.sensor_id,
                    error_kind = e.kind(),
                    error = %e,
                    "Anchor call does not match the contract schema"
                );
            }
            Err(e) => {
                stats.failed += 1;
                warn!(
                    sensor_id = %job.sensor_id,
                    fingerprint = %job.fingerprint,
                    error_kind = e.kind(),
                    transient = e.is_transient(),
                    error = %e,
                    "Anchor submission failed"
                );
            }
        }
    }

    info!(
        submitted = stats.submitted,
        failed = stats.failed,
        "Anchor worker stopped"
    );
    stats
}
