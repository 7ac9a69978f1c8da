/// Anchor submission.
///
/// Builds, signs and broadcasts an `anchor(bytes32)` transaction:
///
/// ```text
/// encode ─▶ sender ─▶ [lane: nonce ─▶ gas price ─▶ sign ─▶ broadcast]
/// ```
///
/// The bracketed steps run while holding the identity's submission lane,
/// so concurrent submissions never read the same nonce. The nonce always
/// comes from the node's pending count; no local counter is kept, so a
/// transaction the node later drops leaves no gap behind. Success means
/// the node accepted the transaction into its pool; inclusion is not
/// awaited. Nothing is retried here.
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{TxKind, B256, U256};
use alloy::signers::Signer;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::codec::{self, AnchorCall};
use super::connection::ChainContext;
use super::fingerprint::Fingerprint;
use crate::error::{AnchorError, Result};

/// Gas allowance for one `anchor(bytes32)` call (storage write + event).
pub const ANCHOR_GAS_LIMIT: u64 = 150_000;

/// What remains of a submitted transaction once it has been broadcast.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub tx_hash: B256,
    pub nonce: u64,
    pub fingerprint: Fingerprint,
}

/// Submit `fingerprint` to the anchoring contract.
pub async fn submit(
    ctx: &ChainContext,
    fingerprint: Fingerprint,
    cancel: &CancellationToken,
) -> Result<SubmissionReceipt> {
    // 1. Encode the call
    let input = codec::encode_call(&AnchorCall {
        data_hash: fingerprint,
    })?;

    // 2. Sender
    let from = ctx.sender();

    let lane = ctx.lane().await;

    // 3. Nonce
    let nonce = ctx
        .bounded(cancel, ctx.node().pending_nonce(from))
        .await?
        .map_err(|e| AnchorError::Nonce(e.to_string()))?;

    // 4. Fee
    let gas_price = ctx
        .bounded(cancel, ctx.node().gas_price())
        .await?
        .map_err(|e| AnchorError::FeeEstimation(e.to_string()))?;

    debug!(%fingerprint, nonce, gas_price, "Built anchor transaction");

    // 5. Build and sign (EIP-155, chain id bound)
    let tx = TxLegacy {
        chain_id: Some(ctx.chain_id()),
        nonce,
        gas_price,
        gas_limit: ANCHOR_GAS_LIMIT,
        to: TxKind::Call(ctx.contract()),
        value: U256::ZERO,
        input,
    };

    let sig_hash = tx.signature_hash();
    let sig = ctx
        .signer()
        .sign_hash(&sig_hash)
        .await
        .map_err(|e| AnchorError::Signing(e.to_string()))?;

    let signed = TxEnvelope::Legacy(tx.into_signed(sig));
    let mut raw_tx = Vec::new();
    signed.encode_2718(&mut raw_tx);

    // 6. Broadcast
    let tx_hash = ctx
        .bounded(cancel, ctx.node().send_raw_transaction(&raw_tx))
        .await?
        .map_err(|e| AnchorError::Broadcast(e.to_string()))?;

    drop(lane);

    info!(
        %fingerprint,
        tx_hash = %tx_hash,
        nonce,
        "Anchor transaction broadcast"
    );

    Ok(SubmissionReceipt {
        tx_hash,
        nonce,
        fingerprint,
    })
}
