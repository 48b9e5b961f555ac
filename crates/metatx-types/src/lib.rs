use alloy_primitives::{Address, B256, U256};
use thiserror::Error;

pub use alloy_primitives;
pub use alloy_sol_types;

mod request;

pub use request::{ForwardRequest, IForwarder, Signature, SigningDomain, SIGNATURE_LENGTH};

/// 0x-prefixed hex string (e.g. "0x1234...").
pub type Hex = String;

/// Transaction identifier returned by the ledger.
pub type TxHash = B256;

/// Meta-transaction error types.
#[derive(Debug, Error)]
pub enum MetaTxError {
    /// Cost estimation or payload assembly failed before any signature was produced.
    #[error("failed to build forward request: {0}")]
    BuildFailed(String),

    #[error("signature does not match sender {expected} (recovered {recovered:?})")]
    InvalidSignature {
        expected: Address,
        recovered: Option<Address>,
    },

    #[error("nonce mismatch for {from}: expected {expected}, got {actual}")]
    NonceMismatch {
        from: Address,
        expected: U256,
        actual: U256,
    },

    #[error("network error: {0}")]
    Network(String),

    /// The delegated call failed after the request was accepted; the nonce is consumed.
    #[error("inner call failed in transaction {tx_hash}: {reason}")]
    InnerCallFailed { tx_hash: TxHash, reason: String },

    #[error("balance of {address} changed during relay: {before} -> {after}")]
    BalanceInvariantViolated {
        address: Address,
        before: U256,
        after: U256,
    },

    #[error("value mismatch: request carries {expected}, transaction sent {actual}")]
    ValueMismatch { expected: U256, actual: U256 },

    #[error("insufficient gas: required {required}, provided {provided}")]
    InsufficientGas { required: u64, provided: u64 },

    #[error("insufficient funds for {address}: required {required}, available {available}")]
    InsufficientFunds {
        address: Address,
        required: U256,
        available: U256,
    },

    #[error("no contract deployed at {0}")]
    UnknownContract(Address),

    #[error("execution reverted: {0}")]
    ExecutionReverted(String),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("abi error: {0}")]
    Abi(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl MetaTxError {
    /// Whether a caller may try again by rebuilding the request from fresh reads.
    ///
    /// `InnerCallFailed` is not retryable: the nonce is spent and a new attempt
    /// is a new request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetaTxError::NonceMismatch { .. } | MetaTxError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, MetaTxError>;

/// Parse a hex string (with or without 0x prefix) to bytes.
pub fn hex_to_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    hex::decode(hex_str).map_err(|e| MetaTxError::InvalidHex(e.to_string()))
}

/// Convert bytes to a 0x-prefixed hex string.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Clamp a U256 gas quantity into the u64 range used by gas accounting.
pub fn saturating_u64(value: U256) -> u64 {
    value.saturating_to()
}
