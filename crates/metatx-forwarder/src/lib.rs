//! ERC-2771 forwarder and the trusted-forwarder recipient convention.
//!
//! - `Forwarder`: signature check, nonce advance, inner-call dispatch
//! - `TrustedForwarderContext`: originator recovery inside a service
//! - `CounterByAddress`: a small service attributing calls to their originator

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod context;
pub mod counter;
mod forwarder;

pub use config::ForwarderConfig;
pub use context::{append_sender, TrustedForwarderContext};
pub use counter::CounterByAddress;
pub use forwarder::Forwarder;

/// A call as seen by the receiving service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Immediate caller (the forwarder on the delegated path).
    pub caller: Address,
    pub value: U256,
    pub data: Bytes,
    /// Gas available to the callee.
    pub gas: u64,
}

/// Whether a call may change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallMode {
    Commit,
    /// Run the call and report its result and gas, leaving state untouched.
    Simulate,
}

/// Successful call result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Execution {
    pub return_data: Bytes,
    pub gas_used: u64,
}

/// Failed call result. State changes of the call are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revert {
    pub reason: String,
    pub gas_used: u64,
}

impl Revert {
    pub fn new(reason: impl Into<String>, gas_used: u64) -> Self {
        Self {
            reason: reason.into(),
            gas_used,
        }
    }
}

/// A service reachable through the ledger.
#[async_trait]
pub trait Contract: Send + Sync {
    async fn call(&self, message: &Message, mode: CallMode) -> Result<Execution, Revert>;
}

/// Inner call issued by a forwarder after a request is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerCall {
    pub caller: Address,
    pub to: Address,
    /// Request payload with the originator appended.
    pub data: Bytes,
    pub gas: u64,
    pub value: U256,
}

/// Result of an inner call as reported back to the forwarder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOutcome {
    pub success: bool,
    pub return_data: Bytes,
    /// Gas the inner call used. Ledgers that cannot observe it report the
    /// inner budget as an upper bound.
    pub gas_used: u64,
}

impl CallOutcome {
    pub fn success(execution: Execution) -> Self {
        Self {
            success: true,
            return_data: execution.return_data,
            gas_used: execution.gas_used,
        }
    }

    /// Failed outcome carrying the revert reason as its return data.
    pub fn failure(revert: Revert) -> Self {
        Self {
            success: false,
            return_data: Bytes::from(revert.reason.into_bytes()),
            gas_used: revert.gas_used,
        }
    }

    /// Revert reason as text, if the call failed.
    pub fn revert_reason(&self) -> Option<String> {
        if self.success {
            None
        } else {
            Some(String::from_utf8_lossy(&self.return_data).into_owned())
        }
    }
}

/// Routes a forwarder's inner call to the target service.
///
/// The ledger hosting the forwarder implements this; it may re-enter the
/// forwarder from inside `dispatch`.
#[async_trait]
pub trait CallDispatcher: Send + Sync {
    async fn dispatch(&self, call: InnerCall) -> CallOutcome;
}
