//! In-memory nonce store.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use metatx_types::{MetaTxError, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

use crate::{NonceAdvance, NonceStore};

/// In-memory nonce store with one lock per sender.
///
/// The outer map lock is only held long enough to find or insert a sender's
/// slot; different senders advance in parallel. A slot is inserted only for an
/// advance from zero, so rejected attempts leave the map untouched.
#[derive(Default)]
pub struct MemoryNonceStore {
    slots: RwLock<HashMap<Address, Arc<Mutex<U256>>>>,
}

impl MemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of senders that have advanced at least once.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot(&self, sender: Address) -> Arc<Mutex<U256>> {
        if let Some(slot) = self.slots.read().await.get(&sender) {
            return slot.clone();
        }
        let mut slots = self.slots.write().await;
        slots
            .entry(sender)
            .or_insert_with(|| Arc::new(Mutex::new(U256::ZERO)))
            .clone()
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn get(&self, sender: Address) -> Result<U256> {
        let slot = self.slots.read().await.get(&sender).cloned();
        match slot {
            Some(slot) => Ok(*slot.lock().await),
            None => Ok(U256::ZERO),
        }
    }

    async fn compare_and_advance(&self, sender: Address, expected: U256) -> Result<NonceAdvance> {
        let existing = self.slots.read().await.get(&sender).cloned();
        let slot = match existing {
            Some(slot) => slot,
            None if !expected.is_zero() => {
                trace!(%sender, %expected, "nonce mismatch for unseen sender");
                return Ok(NonceAdvance::Mismatch { current: U256::ZERO });
            }
            None => self.slot(sender).await,
        };
        let mut current = slot.lock().await;
        if *current != expected {
            trace!(%sender, %expected, current = %*current, "nonce mismatch");
            return Ok(NonceAdvance::Mismatch { current: *current });
        }
        let next = current
            .checked_add(U256::from(1u64))
            .ok_or_else(|| MetaTxError::Other(format!("nonce overflow for {}", sender)))?;
        *current = next;
        trace!(%sender, %next, "nonce advanced");
        Ok(NonceAdvance::Advanced { next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_sender_reads_zero() {
        let store = MemoryNonceStore::new();
        let sender = Address::repeat_byte(0x11);
        assert_eq!(store.get(sender).await.unwrap(), U256::ZERO);
        // Reading twice without an advance is stable.
        assert_eq!(store.get(sender).await.unwrap(), U256::ZERO);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_advance_then_mismatch() {
        let store = MemoryNonceStore::new();
        let sender = Address::repeat_byte(0x11);

        let first = store.compare_and_advance(sender, U256::ZERO).await.unwrap();
        assert_eq!(first, NonceAdvance::Advanced { next: U256::from(1u64) });

        let replay = store.compare_and_advance(sender, U256::ZERO).await.unwrap();
        assert_eq!(replay, NonceAdvance::Mismatch { current: U256::from(1u64) });

        let ahead = store.compare_and_advance(sender, U256::from(5u64)).await.unwrap();
        assert!(!ahead.is_advanced());
        assert_eq!(store.get(sender).await.unwrap(), U256::from(1u64));
    }

    #[tokio::test]
    async fn test_mismatch_does_not_create_entry() {
        let store = MemoryNonceStore::new();
        let sender = Address::repeat_byte(0x22);
        let outcome = store.compare_and_advance(sender, U256::from(3u64)).await.unwrap();
        assert_eq!(outcome, NonceAdvance::Mismatch { current: U256::ZERO });
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejected_senders_leave_no_slots() {
        let store = MemoryNonceStore::new();
        for byte in 1..=64u8 {
            let sender = Address::repeat_byte(byte);
            let outcome = store
                .compare_and_advance(sender, U256::from(byte as u64))
                .await
                .unwrap();
            assert!(!outcome.is_advanced());
        }
        assert_eq!(store.len().await, 0);

        store
            .compare_and_advance(Address::repeat_byte(0x01), U256::ZERO)
            .await
            .unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_senders_are_independent() {
        let store = MemoryNonceStore::new();
        let a = Address::repeat_byte(0x01);
        let b = Address::repeat_byte(0x02);
        store.compare_and_advance(a, U256::ZERO).await.unwrap();
        store.compare_and_advance(a, U256::from(1u64)).await.unwrap();
        assert_eq!(store.get(a).await.unwrap(), U256::from(2u64));
        assert_eq!(store.get(b).await.unwrap(), U256::ZERO);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_advance_single_winner() {
        let store = Arc::new(MemoryNonceStore::new());
        let sender = Address::repeat_byte(0x33);

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.compare_and_advance(sender, U256::ZERO).await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_advanced() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.get(sender).await.unwrap(), U256::from(1u64));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sequential_nonces_under_contention() {
        let store = Arc::new(MemoryNonceStore::new());
        let sender = Address::repeat_byte(0x44);

        // Each task keeps retrying with the value it last observed.
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut wins = 0u32;
                let mut expected = U256::ZERO;
                while wins < 10 {
                    match store.compare_and_advance(sender, expected).await.unwrap() {
                        NonceAdvance::Advanced { next } => {
                            wins += 1;
                            expected = next;
                        }
                        NonceAdvance::Mismatch { current } => expected = current,
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get(sender).await.unwrap(), U256::from(80u64));
    }
}
