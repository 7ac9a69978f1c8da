/// Contract codec for the anchoring contract.
///
/// The deployed contract exposes:
///
/// ```text
/// function anchor(bytes32 dataHash)                         nonpayable
/// function isAnchored(bytes32 dataHash) returns (bool)      view
/// function anchoredAtBlock(bytes32) returns (uint256)       view
/// event HashAnchored(bytes32 indexed dataHash, address indexed sender,
///                    uint256 blockNumber, uint256 timestamp)
/// ```
///
/// Calls are encoded as a 4-byte selector (first bytes of the keccak-256 of
/// the canonical signature) followed by one 32-byte word per static
/// argument. Only static word types are needed by this contract.
///
/// Two layers sit on top of the schema: a dynamic `encode`/`decode` keyed by
/// function name, and the typed `ContractCall` implementations whose
/// `Return` type fixes the decoded shape at compile time.
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};

use super::fingerprint::Fingerprint;
use crate::error::{AnchorError, Result};

const WORD: usize = 32;

/// Static ABI types used by the anchoring contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    Bytes32,
    Bool,
    Uint256,
    Address,
}

impl AbiType {
    pub fn name(&self) -> &'static str {
        match self {
            AbiType::Bytes32 => "bytes32",
            AbiType::Bool => "bool",
            AbiType::Uint256 => "uint256",
            AbiType::Address => "address",
        }
    }
}

/// A decoded or to-be-encoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Bytes32(B256),
    Bool(bool),
    Uint256(U256),
    Address(Address),
}

impl AbiValue {
    pub fn abi_type(&self) -> AbiType {
        match self {
            AbiValue::Bytes32(_) => AbiType::Bytes32,
            AbiValue::Bool(_) => AbiType::Bool,
            AbiValue::Uint256(_) => AbiType::Uint256,
            AbiValue::Address(_) => AbiType::Address,
        }
    }

    fn to_word(&self) -> [u8; WORD] {
        let mut word = [0u8; WORD];
        match self {
            AbiValue::Bytes32(b) => word.copy_from_slice(b.as_slice()),
            AbiValue::Bool(v) => word[WORD - 1] = u8::from(*v),
            AbiValue::Uint256(v) => word = v.to_be_bytes::<WORD>(),
            AbiValue::Address(a) => word[12..].copy_from_slice(a.as_slice()),
        }
        word
    }

    fn from_word(ty: AbiType, word: &[u8]) -> Result<Self> {
        match ty {
            AbiType::Bytes32 => Ok(AbiValue::Bytes32(B256::from_slice(word))),
            AbiType::Uint256 => Ok(AbiValue::Uint256(U256::from_be_slice(word))),
            AbiType::Bool => {
                if word[..WORD - 1].iter().any(|b| *b != 0) || word[WORD - 1] > 1 {
                    return Err(AnchorError::Decoding(format!(
                        "non-canonical bool word 0x{}",
                        hex::encode(word)
                    )));
                }
                Ok(AbiValue::Bool(word[WORD - 1] == 1))
            }
            AbiType::Address => {
                if word[..12].iter().any(|b| *b != 0) {
                    return Err(AnchorError::Decoding(format!(
                        "dirty address padding 0x{}",
                        hex::encode(word)
                    )));
                }
                Ok(AbiValue::Address(Address::from_slice(&word[12..])))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    NonPayable,
    View,
}

/// One function of the contract interface.
#[derive(Debug)]
pub struct FunctionSchema {
    pub name: &'static str,
    pub inputs: &'static [AbiType],
    pub outputs: &'static [AbiType],
    pub mutability: Mutability,
}

impl FunctionSchema {
    /// Canonical signature, e.g. `anchor(bytes32)`.
    pub fn signature(&self) -> String {
        canonical_signature(self.name, self.inputs)
    }

    pub fn selector(&self) -> [u8; 4] {
        selector(&self.signature())
    }
}

pub const CONTRACT_SCHEMA: &[FunctionSchema] = &[
    FunctionSchema {
        name: "anchor",
        inputs: &[AbiType::Bytes32],
        outputs: &[],
        mutability: Mutability::NonPayable,
    },
    FunctionSchema {
        name: "isAnchored",
        inputs: &[AbiType::Bytes32],
        outputs: &[AbiType::Bool],
        mutability: Mutability::View,
    },
    FunctionSchema {
        name: "anchoredAtBlock",
        inputs: &[AbiType::Bytes32],
        outputs: &[AbiType::Uint256],
        mutability: Mutability::View,
    },
];

/// Event emitted by `anchor(bytes32)`.
pub const HASH_ANCHORED_EVENT: &str = "HashAnchored(bytes32,address,uint256,uint256)";

fn canonical_signature(name: &str, inputs: &[AbiType]) -> String {
    let args: Vec<&str> = inputs.iter().map(AbiType::name).collect();
    format!("{name}({})", args.join(","))
}

/// First four bytes of keccak-256 over a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Look up a function by name.
pub fn function(name: &str) -> Result<&'static FunctionSchema> {
    CONTRACT_SCHEMA
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| AnchorError::Encoding(format!("unknown contract function `{name}`")))
}

/// Encode a call to `name` with `args`.
pub fn encode(name: &str, args: &[AbiValue]) -> Result<Bytes> {
    let schema = function(name)?;

    if args.len() != schema.inputs.len() {
        return Err(AnchorError::Encoding(format!(
            "`{}` takes {} argument(s), got {}",
            schema.signature(),
            schema.inputs.len(),
            args.len()
        )));
    }

    let mut out = Vec::with_capacity(4 + WORD * args.len());
    out.extend_from_slice(&schema.selector());
    for (i, (arg, expected)) in args.iter().zip(schema.inputs).enumerate() {
        if arg.abi_type() != *expected {
            return Err(AnchorError::Encoding(format!(
                "`{}` argument {i}: expected {}, got {}",
                schema.signature(),
                expected.name(),
                arg.abi_type().name()
            )));
        }
        out.extend_from_slice(&arg.to_word());
    }

    Ok(Bytes::from(out))
}

/// Decode the return data of `name` into its output values.
pub fn decode(name: &str, data: &[u8]) -> Result<Vec<AbiValue>> {
    let schema = function(name).map_err(|e| AnchorError::Decoding(e.to_string()))?;
    decode_words(schema.outputs, data)
        .map_err(|e| AnchorError::Decoding(format!("`{}` return: {e}", schema.name)))
}

/// Decode call data (selector + arguments) back into the function it targets.
pub fn decode_input(data: &[u8]) -> Result<(&'static FunctionSchema, Vec<AbiValue>)> {
    if data.len() < 4 {
        return Err(AnchorError::Decoding(format!(
            "call data too short for a selector ({} bytes)",
            data.len()
        )));
    }
    let schema = CONTRACT_SCHEMA
        .iter()
        .find(|f| f.selector() == data[..4])
        .ok_or_else(|| {
            AnchorError::Decoding(format!("unknown selector 0x{}", hex::encode(&data[..4])))
        })?;
    let args = decode_words(schema.inputs, &data[4..])?;
    Ok((schema, args))
}

fn decode_words(types: &[AbiType], data: &[u8]) -> Result<Vec<AbiValue>> {
    let expected = types.len() * WORD;
    if data.len() != expected {
        return Err(AnchorError::Decoding(format!(
            "expected {expected} bytes, got {}",
            data.len()
        )));
    }
    types
        .iter()
        .zip(data.chunks_exact(WORD))
        .map(|(ty, word)| AbiValue::from_word(*ty, word))
        .collect()
}

// ── Typed calls ──

/// A contract function with a fixed argument list and return shape.
pub trait ContractCall {
    const NAME: &'static str;
    type Return;

    fn args(&self) -> Vec<AbiValue>;

    fn from_outputs(outputs: Vec<AbiValue>) -> Result<Self::Return>;
}

pub fn encode_call<C: ContractCall>(call: &C) -> Result<Bytes> {
    encode(C::NAME, &call.args())
}

pub fn decode_return<C: ContractCall>(data: &[u8]) -> Result<C::Return> {
    C::from_outputs(decode(C::NAME, data)?)
}

fn shape_error(name: &str, outputs: &[AbiValue]) -> AnchorError {
    AnchorError::Decoding(format!("`{name}` returned unexpected shape {outputs:?}"))
}

/// `anchor(bytes32)`: state-changing, no return value.
#[derive(Debug, Clone, Copy)]
pub struct AnchorCall {
    pub data_hash: Fingerprint,
}

impl ContractCall for AnchorCall {
    const NAME: &'static str = "anchor";
    type Return = ();

    fn args(&self) -> Vec<AbiValue> {
        vec![AbiValue::Bytes32(B256::from(*self.data_hash.as_bytes()))]
    }

    fn from_outputs(outputs: Vec<AbiValue>) -> Result<()> {
        if outputs.is_empty() {
            Ok(())
        } else {
            Err(shape_error(Self::NAME, &outputs))
        }
    }
}

/// `isAnchored(bytes32) -> bool`.
#[derive(Debug, Clone, Copy)]
pub struct IsAnchoredCall {
    pub data_hash: Fingerprint,
}

impl ContractCall for IsAnchoredCall {
    const NAME: &'static str = "isAnchored";
    type Return = bool;

    fn args(&self) -> Vec<AbiValue> {
        vec![AbiValue::Bytes32(B256::from(*self.data_hash.as_bytes()))]
    }

    fn from_outputs(outputs: Vec<AbiValue>) -> Result<bool> {
        match outputs.as_slice() {
            [AbiValue::Bool(v)] => Ok(*v),
            _ => Err(shape_error(Self::NAME, &outputs)),
        }
    }
}

/// `anchoredAtBlock(bytes32) -> uint256`. Zero means never anchored.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredAtBlockCall {
    pub data_hash: Fingerprint,
}

impl ContractCall for AnchoredAtBlockCall {
    const NAME: &'static str = "anchoredAtBlock";
    type Return = U256;

    fn args(&self) -> Vec<AbiValue> {
        vec![AbiValue::Bytes32(B256::from(*self.data_hash.as_bytes()))]
    }

    fn from_outputs(outputs: Vec<AbiValue>) -> Result<U256> {
        match outputs.as_slice() {
            [AbiValue::Uint256(v)] => Ok(*v),
            _ => Err(shape_error(Self::NAME, &outputs)),
        }
    }
}

// ── Events ──

/// Decoded `HashAnchored` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashAnchoredEvent {
    pub data_hash: Fingerprint,
    pub sender: Address,
    pub block_number: U256,
    pub timestamp: U256,
}

pub fn hash_anchored_topic() -> B256 {
    keccak256(HASH_ANCHORED_EVENT.as_bytes())
}

/// Decode a `HashAnchored` log from its topics and data.
pub fn decode_hash_anchored(topics: &[B256], data: &[u8]) -> Result<HashAnchoredEvent> {
    let [topic0, data_hash, sender] = topics else {
        return Err(AnchorError::Decoding(format!(
            "HashAnchored has 3 topics, got {}",
            topics.len()
        )));
    };
    if *topic0 != hash_anchored_topic() {
        return Err(AnchorError::Decoding(format!(
            "log topic {topic0} is not HashAnchored"
        )));
    }

    let sender = match AbiValue::from_word(AbiType::Address, sender.as_slice())? {
        AbiValue::Address(a) => a,
        other => return Err(AnchorError::Decoding(format!("sender topic {other:?}"))),
    };
    let values = decode_words(&[AbiType::Uint256, AbiType::Uint256], data)?;
    let (block_number, timestamp) = match values.as_slice() {
        [AbiValue::Uint256(b), AbiValue::Uint256(t)] => (*b, *t),
        _ => return Err(shape_error("HashAnchored", &values)),
    };

    Ok(HashAnchoredEvent {
        data_hash: Fingerprint::from_bytes(data_hash.0),
        sender,
        block_number,
        timestamp,
    })
}
