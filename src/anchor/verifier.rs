/// Read-only anchor lookups.
///
/// The presence queries are `eth_call`s against the latest state and the
/// event history comes from `eth_getLogs`: no transaction, no fee, no
/// signature. Any node, transport or decoding failure is a `Query` error.
/// A `Query` error is an unknown answer, never a "no".
use alloy::primitives::B256;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::codec::{self, AnchoredAtBlockCall, ContractCall, HashAnchoredEvent, IsAnchoredCall};
use super::connection::ChainContext;
use super::fingerprint::Fingerprint;
use crate::error::{AnchorError, Result};

/// Ask the contract whether `fingerprint` was ever anchored.
pub async fn is_anchored(
    ctx: &ChainContext,
    fingerprint: Fingerprint,
    cancel: &CancellationToken,
) -> Result<bool> {
    let anchored = query(
        ctx,
        &IsAnchoredCall {
            data_hash: fingerprint,
        },
        cancel,
    )
    .await?;
    debug!(%fingerprint, anchored, "Anchor lookup");
    Ok(anchored)
}

/// Block in which `fingerprint` was anchored, `None` if it never was.
pub async fn anchored_at_block(
    ctx: &ChainContext,
    fingerprint: Fingerprint,
    cancel: &CancellationToken,
) -> Result<Option<u64>> {
    let block = query(
        ctx,
        &AnchoredAtBlockCall {
            data_hash: fingerprint,
        },
        cancel,
    )
    .await?;
    if block.is_zero() {
        return Ok(None);
    }
    u64::try_from(block)
        .map(Some)
        .map_err(|_| AnchorError::Query(format!("block number {block} out of range")))
}

/// `HashAnchored` events the contract emitted for `fingerprint`, oldest
/// first as returned by the node.
pub async fn anchor_events(
    ctx: &ChainContext,
    fingerprint: Fingerprint,
    cancel: &CancellationToken,
) -> Result<Vec<HashAnchoredEvent>> {
    let topics = [
        codec::hash_anchored_topic(),
        B256::from(*fingerprint.as_bytes()),
    ];
    let logs = ctx
        .bounded(cancel, ctx.node().logs(ctx.contract(), &topics))
        .await?
        .map_err(|e| AnchorError::Query(format!("HashAnchored logs: {e}")))?;

    let events = logs
        .iter()
        .map(|log| codec::decode_hash_anchored(&log.topics, &log.data))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| {
            error!(%fingerprint, error = %e, "Contract log does not match the schema");
            AnchorError::Query(e.to_string())
        })?;
    debug!(%fingerprint, count = events.len(), "Anchor events");
    Ok(events)
}

async fn query<C: ContractCall>(
    ctx: &ChainContext,
    call: &C,
    cancel: &CancellationToken,
) -> Result<C::Return> {
    let data = codec::encode_call(call)?;
    let out = ctx
        .bounded(cancel, ctx.node().call(ctx.contract(), &data))
        .await?
        .map_err(|e| AnchorError::Query(format!("{}: {e}", C::NAME)))?;
    codec::decode_return::<C>(&out).map_err(|e| {
        error!(function = C::NAME, error = %e, "Contract return does not match the schema");
        AnchorError::Query(e.to_string())
    })
}
