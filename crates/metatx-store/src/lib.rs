//! Per-sender nonce storage for forwarders.
//!
//! Defines the `NonceStore` trait every nonce backend implements.
//! Provides a `MemoryNonceStore` for in-process forwarders and tests.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use metatx_types::Result;
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::MemoryNonceStore;

/// Outcome of a compare-and-advance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NonceAdvance {
    /// The stored value matched and now holds `next`.
    Advanced { next: U256 },
    /// The stored value did not match; nothing changed.
    Mismatch { current: U256 },
}

impl NonceAdvance {
    pub fn is_advanced(&self) -> bool {
        matches!(self, NonceAdvance::Advanced { .. })
    }
}

/// Sender → sequence number map owned by one forwarder.
///
/// Values start at zero and only move forward by one per successful advance.
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Current value for `sender`; zero if never advanced.
    async fn get(&self, sender: Address) -> Result<U256>;

    /// Atomically advance `sender` from `expected` to `expected + 1`.
    ///
    /// Two concurrent calls with the same `expected` never both advance.
    async fn compare_and_advance(&self, sender: Address, expected: U256) -> Result<NonceAdvance>;
}
