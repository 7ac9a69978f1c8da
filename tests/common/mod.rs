//! In-process ledger node for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use alloy::primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use eco_anchor::anchor::codec::{self, AbiValue};
use eco_anchor::anchor::{CallOptions, ChainContext, LedgerNode, LogEntry, RpcError};

/// Well-known development key (first account of local EVM dev nodes).
pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_SENDER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const TEST_CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const TEST_CHAIN_ID: u64 = 31337;

#[derive(Default)]
struct LedgerState {
    next_nonce: u64,
    /// Accepted but not yet mined anchors.
    pending: Vec<B256>,
    /// Mined anchors and their block numbers.
    anchored: HashMap<B256, u64>,
    block: u64,
    accepted_nonces: Vec<u64>,
    rejected: Vec<String>,
}

/// Mock node that checks what a real node would check for an anchoring
/// transaction: chain id, recipient, nonce order, and call data.
pub struct MockNode {
    chain_id: u64,
    contract: Address,
    state: Mutex<LedgerState>,
    offline: AtomicBool,
    reject_broadcast: AtomicBool,
    fail_gas_price: AtomicBool,
    hang: AtomicBool,
}

impl MockNode {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            chain_id: TEST_CHAIN_ID,
            contract: TEST_CONTRACT.parse().unwrap(),
            state: Mutex::new(LedgerState::default()),
            offline: AtomicBool::new(false),
            reject_broadcast: AtomicBool::new(false),
            fail_gas_price: AtomicBool::new(false),
            hang: AtomicBool::new(false),
        })
    }

    /// Include every pending anchor in a new block.
    pub fn mine(&self) {
        let mut state = self.state.lock().unwrap();
        state.block += 1;
        let block = state.block;
        let pending = std::mem::take(&mut state.pending);
        for hash in pending {
            state.anchored.entry(hash).or_insert(block);
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_reject_broadcast(&self, reject: bool) {
        self.reject_broadcast.store(reject, Ordering::SeqCst);
    }

    pub fn set_fail_gas_price(&self, fail: bool) {
        self.fail_gas_price.store(fail, Ordering::SeqCst);
    }

    /// Drop every pending transaction from the pool, as a node restart or
    /// mempool eviction would. The pending nonce falls back accordingly.
    pub fn evict_pending(&self) {
        let mut state = self.state.lock().unwrap();
        let evicted = std::mem::take(&mut state.pending);
        state.next_nonce -= evicted.len() as u64;
    }

    /// Make every call wait forever.
    pub fn set_hang(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    pub fn accepted_nonces(&self) -> Vec<u64> {
        self.state.lock().unwrap().accepted_nonces.clone()
    }

    pub fn rejected(&self) -> Vec<String> {
        self.state.lock().unwrap().rejected.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    async fn gate(&self) -> Result<(), RpcError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RpcError::Transport("connection refused".into()));
        }
        // Widen race windows between concurrent callers.
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(())
    }

    fn reject(&self, message: String) -> RpcError {
        self.state.lock().unwrap().rejected.push(message.clone());
        RpcError::Node {
            code: -32000,
            message,
        }
    }
}

#[async_trait]
impl LedgerNode for MockNode {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.gate().await?;
        Ok(self.chain_id)
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, RpcError> {
        self.gate().await?;
        Ok(self.state.lock().unwrap().next_nonce)
    }

    async fn gas_price(&self) -> Result<u128, RpcError> {
        self.gate().await?;
        if self.fail_gas_price.load(Ordering::SeqCst) {
            return Err(RpcError::Node {
                code: -32603,
                message: "fee history unavailable".into(),
            });
        }
        Ok(1_000_000_000)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcError> {
        self.gate().await?;
        if self.reject_broadcast.load(Ordering::SeqCst) {
            return Err(self.reject("insufficient funds for gas * price + value".into()));
        }

        let mut buf = raw;
        let envelope = TxEnvelope::decode_2718(&mut buf)
            .map_err(|e| self.reject(format!("undecodable transaction: {e}")))?;
        let TxEnvelope::Legacy(signed) = envelope else {
            return Err(self.reject("expected a legacy transaction".into()));
        };
        let tx = signed.tx();

        if tx.chain_id != Some(self.chain_id) {
            return Err(self.reject(format!("wrong chain id {:?}", tx.chain_id)));
        }
        if tx.to != TxKind::Call(self.contract) {
            return Err(self.reject("transaction not addressed to the contract".into()));
        }
        let (schema, args) = codec::decode_input(&tx.input)
            .map_err(|e| self.reject(format!("bad call data: {e}")))?;
        let hash = match (schema.name, args.as_slice()) {
            ("anchor", [AbiValue::Bytes32(h)]) => *h,
            _ => return Err(self.reject(format!("unexpected call {}", schema.name))),
        };

        let mut state = self.state.lock().unwrap();
        if tx.nonce != state.next_nonce {
            let message = format!("nonce {} but expected {}", tx.nonce, state.next_nonce);
            state.rejected.push(message.clone());
            return Err(RpcError::Node {
                code: -32000,
                message,
            });
        }
        state.next_nonce += 1;
        state.accepted_nonces.push(tx.nonce);
        state.pending.push(hash);
        Ok(keccak256(raw))
    }

    async fn call(&self, to: Address, data: &Bytes) -> Result<Bytes, RpcError> {
        self.gate().await?;
        if to != self.contract {
            return Ok(Bytes::new());
        }
        let (schema, args) = codec::decode_input(data).map_err(|e| RpcError::Node {
            code: 3,
            message: format!("execution reverted: {e}"),
        })?;
        let hash = match args.as_slice() {
            [AbiValue::Bytes32(h)] => *h,
            _ => {
                return Err(RpcError::Node {
                    code: 3,
                    message: "execution reverted".into(),
                })
            }
        };
        let block = self.state.lock().unwrap().anchored.get(&hash).copied();
        let word = match schema.name {
            "isAnchored" => U256::from(u8::from(block.is_some())),
            "anchoredAtBlock" => U256::from(block.unwrap_or(0)),
            other => {
                return Err(RpcError::Node {
                    code: 3,
                    message: format!("{other} is not a view"),
                })
            }
        };
        Ok(Bytes::from(word.to_be_bytes::<32>().to_vec()))
    }

    async fn logs(&self, address: Address, topics: &[B256]) -> Result<Vec<LogEntry>, RpcError> {
        self.gate().await?;
        if address != self.contract {
            return Ok(Vec::new());
        }
        let sender: Address = TEST_SENDER.parse().unwrap();
        let mut sender_topic = [0u8; 32];
        sender_topic[12..].copy_from_slice(sender.as_slice());

        let state = self.state.lock().unwrap();
        let mut logs: Vec<(u64, LogEntry)> = state
            .anchored
            .iter()
            .map(|(hash, block)| {
                let mut data = U256::from(*block).to_be_bytes::<32>().to_vec();
                data.extend_from_slice(&U256::from(1_700_000_000 + block).to_be_bytes::<32>());
                let entry = LogEntry {
                    topics: vec![codec::hash_anchored_topic(), *hash, B256::from(sender_topic)],
                    data: Bytes::from(data),
                };
                (*block, entry)
            })
            .filter(|(_, entry)| entry.topics.iter().zip(topics).all(|(a, b)| a == b))
            .collect();
        logs.sort_by_key(|(block, _)| *block);
        Ok(logs.into_iter().map(|(_, entry)| entry).collect())
    }
}

pub async fn open_context(node: Arc<MockNode>) -> Arc<ChainContext> {
    let ctx = ChainContext::open(
        node,
        TEST_KEY,
        TEST_CONTRACT,
        CallOptions {
            timeout: Duration::from_secs(5),
        },
        &CancellationToken::new(),
    )
    .await
    .expect("open chain context");
    Arc::new(ctx)
}
