use std::sync::Arc;

use alloy_primitives::{Address, U256};
use metatx_crypto::{recover_signer, typed_data_digest};
use metatx_store::{MemoryNonceStore, NonceAdvance, NonceStore};
use metatx_types::{
    saturating_u64, ForwardRequest, MetaTxError, Result, Signature, SigningDomain,
};
use tracing::{debug, info, warn};

use crate::{append_sender, CallDispatcher, CallOutcome, ForwarderConfig, InnerCall};

/// Verifies signed forward requests and executes them on the sender's behalf.
///
/// The only state is the per-sender nonce map. A nonce is consumed before the
/// inner call runs and stays consumed whatever the inner call does.
pub struct Forwarder {
    address: Address,
    domain: SigningDomain,
    nonces: Arc<dyn NonceStore>,
}

impl Forwarder {
    /// Forwarder at `address` with an in-memory nonce map.
    pub fn new(address: Address, chain_id: u64, config: &ForwarderConfig) -> Self {
        Self::with_store(
            address,
            config.domain(chain_id, address),
            Arc::new(MemoryNonceStore::new()),
        )
    }

    pub fn with_store(address: Address, domain: SigningDomain, nonces: Arc<dyn NonceStore>) -> Self {
        Self {
            address,
            domain,
            nonces,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn domain(&self) -> &SigningDomain {
        &self.domain
    }

    /// Next nonce `from` must sign. Pure read.
    pub async fn get_nonce(&self, from: Address) -> Result<U256> {
        self.nonces.get(from).await
    }

    fn check_signature(&self, request: &ForwardRequest, signature: &Signature) -> Result<()> {
        let digest = typed_data_digest(&self.domain, request);
        let recovered = recover_signer(&digest, signature).ok();
        if recovered != Some(request.from) {
            warn!(from = %request.from, ?recovered, "signature rejected");
            return Err(MetaTxError::InvalidSignature {
                expected: request.from,
                recovered,
            });
        }
        Ok(())
    }

    /// Check a request against current state without consuming its nonce.
    pub async fn verify(&self, request: &ForwardRequest, signature: &Signature) -> Result<()> {
        self.check_signature(request, signature)?;
        let current = self.nonces.get(request.from).await?;
        if current != request.nonce {
            return Err(MetaTxError::NonceMismatch {
                from: request.from,
                expected: current,
                actual: request.nonce,
            });
        }
        Ok(())
    }

    /// Verify, consume the nonce and dispatch the inner call.
    ///
    /// Returns the inner call outcome on acceptance, successful or not.
    /// Rejections leave no trace.
    pub async fn execute(
        &self,
        dispatcher: &dyn CallDispatcher,
        caller: Address,
        request: &ForwardRequest,
        signature: &Signature,
        msg_value: U256,
    ) -> Result<CallOutcome> {
        self.check_signature(request, signature)?;

        if msg_value != request.value {
            return Err(MetaTxError::ValueMismatch {
                expected: request.value,
                actual: msg_value,
            });
        }

        match self
            .nonces
            .compare_and_advance(request.from, request.nonce)
            .await?
        {
            NonceAdvance::Advanced { next } => {
                debug!(from = %request.from, %next, %caller, "nonce advanced");
            }
            NonceAdvance::Mismatch { current } => {
                warn!(from = %request.from, expected = %current, actual = %request.nonce, "nonce mismatch");
                return Err(MetaTxError::NonceMismatch {
                    from: request.from,
                    expected: current,
                    actual: request.nonce,
                });
            }
        }

        let call = InnerCall {
            caller: self.address,
            to: request.to,
            data: append_sender(&request.data, request.from),
            gas: saturating_u64(request.gas),
            value: request.value,
        };
        let outcome = dispatcher.dispatch(call).await;
        info!(
            from = %request.from,
            to = %request.to,
            nonce = %request.nonce,
            success = outcome.success,
            gas_used = outcome.gas_used,
            "forward request executed"
        );
        Ok(outcome)
    }
}
