//! Relay submission: turn an intended call into an executed forward request.
//!
//! 1. Read the sender's balance and forwarder nonce
//! 2. Estimate the call as if the sender sent it; the estimate is the gas budget
//! 3. Sign the request under the forwarder's domain
//! 4. Submit through the relayer's funded account
//! 5. Check the sender's balance did not move
//!
//! Nothing here retries. A stale nonce surfaces as `NonceMismatch` and the
//! caller rebuilds from fresh reads.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use metatx_crypto::TypedDataSigner;
use metatx_types::{ForwardRequest, MetaTxError, Result, Signature, SigningDomain, TxHash};
use tracing::{debug, info, instrument, warn};

use crate::{CallRequest, Ledger, RelayConfig, Submission};

/// The call a sender wants executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCall {
    pub to: Address,
    pub data: Bytes,
    /// Value the relayer attaches on the sender's behalf.
    pub value: U256,
}

impl RelayCall {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

pub struct MetaTxRelayer {
    ledger: Arc<dyn Ledger>,
    relayer: Address,
    forwarder: Address,
    domain: SigningDomain,
}

impl MetaTxRelayer {
    /// Read the chain id once and fix the signing domain.
    pub async fn connect(ledger: Arc<dyn Ledger>, config: &RelayConfig) -> Result<Self> {
        let chain_id = ledger.chain_id().await?;
        let domain = config.domain.domain(chain_id, config.forwarder);
        debug!(chain_id, forwarder = %config.forwarder, "relayer connected");
        Ok(Self {
            ledger,
            relayer: config.relayer,
            forwarder: config.forwarder,
            domain,
        })
    }

    pub fn domain(&self) -> &SigningDomain {
        &self.domain
    }

    pub fn relayer(&self) -> Address {
        self.relayer
    }

    pub fn forwarder(&self) -> Address {
        self.forwarder
    }

    /// Assemble an unsigned request for `sender` from fresh reads.
    #[instrument(skip_all, fields(sender = %sender, to = %call.to))]
    pub async fn build_request(&self, sender: Address, call: &RelayCall) -> Result<ForwardRequest> {
        let nonce = self.ledger.sequence_number(self.forwarder, sender).await?;

        let estimate = CallRequest {
            from: sender,
            to: call.to,
            value: call.value,
            data: call.data.clone(),
        };
        let gas = match self.ledger.estimate_cost(&estimate).await {
            Ok(gas) => gas,
            Err(MetaTxError::Network(e)) => return Err(MetaTxError::Network(e)),
            Err(e) => {
                warn!(error = %e, "cost estimation failed");
                return Err(MetaTxError::BuildFailed(e.to_string()));
            }
        };

        let request = ForwardRequest {
            from: sender,
            to: call.to,
            value: call.value,
            gas: U256::from(gas),
            nonce,
            data: call.data.clone(),
        };
        debug!(%nonce, gas, "forward request built");
        Ok(request)
    }

    /// Build, sign and submit `call` on behalf of `signer`.
    #[instrument(skip_all, fields(sender = %signer.address(), to = %call.to))]
    pub async fn relay(&self, signer: &dyn TypedDataSigner, call: &RelayCall) -> Result<TxHash> {
        let sender = signer.address();
        let balance_before = self.ledger.balance(sender).await?;
        let request = self.build_request(sender, call).await?;
        let signature = signer.sign_request(&self.domain, &request)?;
        self.submit_with_baseline(&request, &signature, balance_before)
            .await
    }

    /// Submit a request signed elsewhere.
    #[instrument(skip_all, fields(sender = %request.from, nonce = %request.nonce))]
    pub async fn submit_signed(&self, request: &ForwardRequest, signature: &Signature) -> Result<TxHash> {
        let balance_before = self.ledger.balance(request.from).await?;
        self.submit_with_baseline(request, signature, balance_before)
            .await
    }

    async fn submit_with_baseline(
        &self,
        request: &ForwardRequest,
        signature: &Signature,
        balance_before: U256,
    ) -> Result<TxHash> {
        let submission = Submission {
            relayer: self.relayer,
            forwarder: self.forwarder,
            request: request.clone(),
            signature: *signature,
            gas_limit: None,
        };
        let receipt = self.ledger.submit(&submission).await?;
        debug!(tx_hash = %receipt.tx_hash, gas_used = receipt.gas_used, "submission landed");

        let balance_after = self.ledger.balance(request.from).await?;
        if balance_after != balance_before {
            warn!(
                sender = %request.from,
                before = %balance_before,
                after = %balance_after,
                "sender balance changed during relay"
            );
            return Err(MetaTxError::BalanceInvariantViolated {
                address: request.from,
                before: balance_before,
                after: balance_after,
            });
        }

        if let Some(reason) = receipt.outcome.revert_reason() {
            warn!(tx_hash = %receipt.tx_hash, %reason, "inner call failed");
            return Err(MetaTxError::InnerCallFailed {
                tx_hash: receipt.tx_hash,
                reason,
            });
        }

        info!(tx_hash = %receipt.tx_hash, fee = %receipt.fee(), "meta-transaction relayed");
        Ok(receipt.tx_hash)
    }
}
