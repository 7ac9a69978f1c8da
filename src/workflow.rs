/// Request-facing anchoring service.
///
/// Two entry points, both safe to call from concurrent request handlers:
///
/// 1. `on_write_committed`: after a reading is persisted, derive its
///    fingerprint and queue it for anchoring. Never waits on the ledger.
/// 2. `on_verify_requested`: load the latest reading, re-derive its
///    fingerprint and ask the contract. Always produces a verdict unless
///    the reading does not exist or the store itself fails.
///
/// Anchoring is optional. Without a chain context every reading verifies
/// as untrusted, and writes are accepted without an anchor.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::anchor::{
    is_anchored, AnchorJob, AnchorQueue, ChainConfig, ChainContext, Fingerprint, WorkerStats,
};
use crate::error::{AnchorError, Result};
use crate::state::ReadingStore;

pub const TRUSTED_LABEL: &str = "DATA VALID";
pub const UNTRUSTED_LABEL: &str = "DATA TAMPERED OR NOT FOUND";

/// Answer from the ledger, kept apart from the collapsed `is_trusted` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Anchored,
    NotAnchored,
    /// The ledger could not be asked; the answer is unknown.
    Indeterminate(String),
    Disabled,
}

impl AnchorStatus {
    pub fn is_trusted(&self) -> bool {
        matches!(self, AnchorStatus::Anchored)
    }
}

/// Trust verdict for the latest stored reading of a sensor.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub sensor_id: String,
    pub db_value: f64,
    pub timestamp: DateTime<Utc>,
    /// `None` when the stored value cannot be fingerprinted.
    pub fingerprint: Option<Fingerprint>,
    pub is_trusted: bool,
    pub verdict: &'static str,
    pub anchor_status: AnchorStatus,
}

/// What happened to a write's anchor request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorDispatch {
    Queued,
    Disabled,
    Rejected,
}

/// Shared handle used by request handlers.
#[derive(Clone)]
pub struct AnchorService {
    store: Arc<dyn ReadingStore>,
    chain: Option<Arc<ChainContext>>,
    queue: Option<AnchorQueue>,
    cancel: CancellationToken,
}

impl AnchorService {
    /// Service with anchoring turned off.
    pub fn disabled(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            store,
            chain: None,
            queue: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Service over `chain`, starting its submission worker when present.
    pub fn start(
        store: Arc<dyn ReadingStore>,
        chain: Option<Arc<ChainContext>>,
        queue_capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, Option<JoinHandle<WorkerStats>>) {
        let (queue, worker) = match &chain {
            Some(ctx) => {
                let (queue, handle) =
                    AnchorQueue::spawn(Arc::clone(ctx), queue_capacity, cancel.child_token());
                (Some(queue), Some(handle))
            }
            None => (None, None),
        };

        (
            Self {
                store,
                chain,
                queue,
                cancel,
            },
            worker,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.chain.is_some()
    }

    pub fn store(&self) -> &dyn ReadingStore {
        self.store.as_ref()
    }

    /// Queue the anchor for a reading that was just persisted.
    pub fn on_write_committed(&self, sensor_id: &str, value: f64) -> AnchorDispatch {
        let Some(queue) = &self.queue else {
            return AnchorDispatch::Disabled;
        };

        let fingerprint = match Fingerprint::derive(sensor_id, value) {
            Ok(fp) => fp,
            Err(e) => {
                warn!(sensor_id, error = %e, "Reading cannot be fingerprinted, not anchoring");
                return AnchorDispatch::Rejected;
            }
        };

        match queue.enqueue(AnchorJob {
            sensor_id: sensor_id.to_string(),
            fingerprint,
        }) {
            Ok(()) => AnchorDispatch::Queued,
            Err(e) => {
                warn!(
                    sensor_id,
                    %fingerprint,
                    error_kind = e.kind(),
                    error = %e,
                    "Anchor request dropped"
                );
                AnchorDispatch::Rejected
            }
        }
    }

    /// Verdict for the latest reading of `sensor_id`.
    pub async fn on_verify_requested(&self, sensor_id: &str) -> Result<Verdict> {
        let reading = self
            .store
            .load_latest(sensor_id)
            .await?
            .ok_or_else(|| AnchorError::NotFound(sensor_id.to_string()))?;

        // A stored value written by another client may not be fingerprintable;
        // that is still a verdict, never an error.
        let (fingerprint, status) = match Fingerprint::derive(&reading.sensor_id, reading.value) {
            Ok(fp) => (Some(fp), self.anchor_status(fp).await),
            Err(e) => (None, AnchorStatus::Indeterminate(format!("{}: {e}", e.kind()))),
        };

        match &status {
            AnchorStatus::Indeterminate(reason) => warn!(
                sensor_id,
                fingerprint = ?fingerprint,
                reason = %reason,
                "Anchor status unknown, reporting reading as untrusted"
            ),
            other => info!(sensor_id, fingerprint = ?fingerprint, status = ?other, "Reading verified"),
        }

        let is_trusted = status.is_trusted();
        Ok(Verdict {
            sensor_id: reading.sensor_id,
            db_value: reading.value,
            timestamp: reading.created_at,
            fingerprint,
            is_trusted,
            verdict: if is_trusted {
                TRUSTED_LABEL
            } else {
                UNTRUSTED_LABEL
            },
            anchor_status: status,
        })
    }

    /// Ask the ledger about `fingerprint`, folding failures into
    /// `Indeterminate`.
    pub async fn anchor_status(&self, fingerprint: Fingerprint) -> AnchorStatus {
        let Some(ctx) = &self.chain else {
            return AnchorStatus::Disabled;
        };

        match is_anchored(ctx, fingerprint, &self.cancel).await {
            Ok(true) => AnchorStatus::Anchored,
            Ok(false) => AnchorStatus::NotAnchored,
            Err(e) => {
                if e.is_codec_defect() {
                    error!(%fingerprint, error = %e, "Anchor query could not be encoded");
                }
                AnchorStatus::Indeterminate(format!("{}: {e}", e.kind()))
            }
        }
    }
}

/// Open the chain context, or explain why anchoring stays off.
///
/// Missing configuration and connection failures are logged and yield
/// `None`; neither stops the rest of the service.
pub async fn open_chain(
    config: Option<ChainConfig>,
    cancel: &CancellationToken,
) -> Option<Arc<ChainContext>> {
    let Some(config) = config else {
        warn!("Blockchain settings incomplete, anchoring disabled");
        return None;
    };

    match ChainContext::connect(&config, cancel).await {
        Ok(ctx) => Some(Arc::new(ctx)),
        Err(e) => {
            error!(
                rpc_url = %config.rpc_url,
                error_kind = e.kind(),
                error = %e,
                "Blockchain initialisation failed, anchoring disabled"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_anchored_is_trusted() {
        assert!(AnchorStatus::Anchored.is_trusted());
        assert!(!AnchorStatus::NotAnchored.is_trusted());
        assert!(!AnchorStatus::Indeterminate("query: down".into()).is_trusted());
        assert!(!AnchorStatus::Disabled.is_trusted());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(AnchorStatus::Indeterminate("timed_out".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "indeterminate": "timed_out" }));
        assert_eq!(
            serde_json::to_value(AnchorDispatch::Queued).unwrap(),
            serde_json::json!("queued")
        );
    }
}
