/// Ledger anchoring for tamper-evident sensor readings.
///
/// A reading's fingerprint is written to an anchoring contract on an EVM
/// ledger. Later the fingerprint is re-derived from the stored reading and
/// the contract is asked whether it has seen it. A database edit changes
/// the fingerprint, so the contract answers "no".
///
/// ```text
/// Reading ─▶ fingerprint ─┬─▶ worker ─▶ submitter ─▶ anchor(bytes32)
///                         └─▶ verifier ─▶ isAnchored(bytes32)
/// ```
pub mod codec;
pub mod connection;
pub mod fingerprint;
pub mod rpc;
pub mod submitter;
pub mod verifier;
pub mod worker;

pub use connection::{CallOptions, ChainConfig, ChainContext};
pub use fingerprint::Fingerprint;
pub use rpc::{JsonRpcNode, LedgerNode, LogEntry, RpcError};
pub use submitter::{submit, SubmissionReceipt};
pub use verifier::{anchor_events, anchored_at_block, is_anchored};
pub use worker::{AnchorJob, AnchorQueue, WorkerStats};
