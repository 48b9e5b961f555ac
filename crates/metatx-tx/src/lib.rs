//! Relayer-side submission of forward requests.
//!
//! - `Ledger`: the network a relayer reads from and submits to
//! - `MetaTxRelayer`: build, sign and submit a forward request
//! - `RpcLedger`: `Ledger` over Ethereum JSON-RPC
//! - `abi`: calldata for the forwarder's entry points

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use metatx_forwarder::CallOutcome;
use metatx_types::{ForwardRequest, Result, Signature, TxHash};
use serde::{Deserialize, Serialize};

pub mod abi;
pub mod config;
pub mod relay;
pub mod rpc_ledger;

pub use config::{RelayConfig, RpcLedgerConfig};
pub use relay::{MetaTxRelayer, RelayCall};
pub use rpc_ledger::RpcLedger;

/// A call as if sent directly by `from`, used for cost estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// A signed request sent to a forwarder's execute entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Funded account paying for the transaction.
    pub relayer: Address,
    pub forwarder: Address,
    pub request: ForwardRequest,
    pub signature: Signature,
    /// Outer gas limit; the ledger picks one when `None`.
    pub gas_limit: Option<u64>,
}

/// Result of a submission the forwarder accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// Gas charged for the whole transaction.
    pub gas_used: u64,
    pub effective_gas_price: U256,
    /// What the inner call did.
    pub outcome: CallOutcome,
}

impl TxReceipt {
    /// Fee paid by the relayer.
    pub fn fee(&self) -> U256 {
        U256::from(self.gas_used) * self.effective_gas_price
    }
}

/// The network as seen by a relayer.
///
/// `submit` returns `Err` when the forwarder rejects the request, and a
/// receipt whenever the request was accepted, even if the inner call failed.
/// Transport failures surface as `MetaTxError::Network`.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// The forwarder's next nonce for `sender`.
    async fn sequence_number(&self, forwarder: Address, sender: Address) -> Result<U256>;

    /// Gas the call would use if `call.from` sent it directly.
    async fn estimate_cost(&self, call: &CallRequest) -> Result<u64>;

    async fn submit(&self, submission: &Submission) -> Result<TxReceipt>;

    async fn balance(&self, address: Address) -> Result<U256>;
}
