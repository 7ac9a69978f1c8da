/// Chain connection: one node, one signing identity, one contract.
///
/// A `ChainContext` is built once at startup and shared (behind an `Arc`)
/// by the submitter, the verifier and the submission worker. Its only
/// mutable part is the submission lane of the signing identity.
/// Opening it validates the key and contract address locally, then asks
/// the node for its chain id. Any failure aborts the open; there is no
/// partially connected state.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;
use zeroize::Zeroizing;

use super::rpc::{JsonRpcNode, LedgerNode};
use crate::error::{AnchorError, Result};

/// Per-call limits applied to every node request.
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Settings needed to reach the anchoring contract.
#[derive(Clone)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: String,
    /// Operator private key (hex, `0x` optional).
    pub private_key: Zeroizing<String>,
    /// Address of the deployed anchoring contract.
    pub contract_address: String,
    pub options: CallOptions,
}

impl std::fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("contract_address", &self.contract_address)
            .field("options", &self.options)
            .finish()
    }
}

/// Immutable context for all chain operations.
pub struct ChainContext {
    node: Arc<dyn LedgerNode>,
    signer: PrivateKeySigner,
    contract: Address,
    chain_id: u64,
    options: CallOptions,
    /// Held from the nonce read to the broadcast of each submission.
    lane: Mutex<()>,
}

impl ChainContext {
    /// Open a context over an existing node handle.
    pub async fn open(
        node: Arc<dyn LedgerNode>,
        signing_key_hex: &str,
        contract_address: &str,
        options: CallOptions,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = signing_key_hex
            .trim()
            .parse()
            .map_err(|_| AnchorError::Connection("malformed signing key".into()))?;

        let contract: Address = contract_address.trim().parse().map_err(|e| {
            AnchorError::Connection(format!("invalid contract address {contract_address}: {e}"))
        })?;

        let chain_id = bounded(cancel, options.timeout, node.chain_id())
            .await?
            .map_err(|e| AnchorError::Connection(format!("chain id lookup failed: {e}")))?;

        info!(
            chain_id,
            sender = %signer.address(),
            contract = %contract,
            "Chain connection established"
        );

        Ok(Self {
            node,
            signer,
            contract,
            chain_id,
            options,
            lane: Mutex::new(()),
        })
    }

    /// Open a context over a JSON-RPC node at `config.rpc_url`.
    pub async fn connect(config: &ChainConfig, cancel: &CancellationToken) -> Result<Self> {
        let node = JsonRpcNode::new(config.rpc_url.clone(), config.options.timeout)
            .map_err(|e| AnchorError::Connection(e.to_string()))?;
        Self::open(
            Arc::new(node),
            &config.private_key,
            &config.contract_address,
            config.options,
            cancel,
        )
        .await
    }

    pub fn node(&self) -> &dyn LedgerNode {
        self.node.as_ref()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Address of the signing identity.
    pub fn sender(&self) -> Address {
        self.signer.address()
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn options(&self) -> CallOptions {
        self.options
    }

    /// Acquire the submission lane of the signing identity.
    pub(crate) async fn lane(&self) -> MutexGuard<'_, ()> {
        self.lane.lock().await
    }

    /// Run a node call under this context's timeout and `cancel`.
    pub(crate) async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = T>,
    ) -> Result<T> {
        bounded(cancel, self.options.timeout, fut).await
    }
}

impl std::fmt::Debug for ChainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainContext")
            .field("sender", &self.sender())
            .field("contract", &self.contract)
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}

/// Cancellation and timeout are reported separately from node errors.
async fn bounded<T>(
    cancel: &CancellationToken,
    timeout: Duration,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AnchorError::Cancelled),
        res = tokio::time::timeout(timeout, fut) => res.map_err(|_| AnchorError::TimedOut(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_reports_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = bounded(&cancel, Duration::from_secs(5), std::future::pending::<()>()).await;
        assert!(matches!(res, Err(AnchorError::Cancelled)));
    }

    #[tokio::test]
    async fn test_bounded_reports_timeout() {
        let cancel = CancellationToken::new();
        let res = bounded(
            &cancel,
            Duration::from_millis(10),
            std::future::pending::<()>(),
        )
        .await;
        assert!(matches!(res, Err(AnchorError::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let cancel = CancellationToken::new();
        let res = bounded(&cancel, Duration::from_secs(1), async { 7 }).await;
        assert_eq!(res.unwrap(), 7);
    }
}
