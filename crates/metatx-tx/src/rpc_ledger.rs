//! `Ledger` over Ethereum JSON-RPC.
//!
//! Methods used:
//! - `eth_chainId`, `eth_getBalance`, `eth_estimateGas`
//! - `eth_call` for `getNonce` and to simulate `execute` before sending
//! - `eth_sendTransaction` from the node-managed relayer account
//! - `eth_getTransactionReceipt`, polled until mined

use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use metatx_forwarder::CallOutcome;
use metatx_types::{hex_to_bytes, saturating_u64, MetaTxError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{abi, CallRequest, Ledger, RpcLedgerConfig, Submission, TxReceipt};

#[derive(Debug, Clone, Serialize)]
struct JsonRpcRequest<T> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Revert payload attached to an execution error, if any.
    fn revert_data(&self) -> Option<Vec<u8>> {
        let raw = match &self.data {
            Some(serde_json::Value::String(raw)) => raw.as_str(),
            Some(serde_json::Value::Object(map)) => map.get("data")?.as_str()?,
            _ => return None,
        };
        hex_to_bytes(raw).ok()
    }

    fn is_revert(&self) -> bool {
        self.code == 3 || self.message.contains("revert")
    }

    fn into_error(self) -> MetaTxError {
        if self.is_revert() {
            let reason = match self.revert_data() {
                Some(data) if !data.is_empty() => abi::revert_reason(&data),
                _ => self.message,
            };
            MetaTxError::ExecutionReverted(reason)
        } else {
            MetaTxError::Other(format!("rpc error {}: {}", self.code, self.message))
        }
    }
}

enum RpcFailure {
    Transport(MetaTxError),
    Rpc(JsonRpcError),
}

impl RpcFailure {
    fn into_error(self) -> MetaTxError {
        match self {
            RpcFailure::Transport(e) => e,
            RpcFailure::Rpc(e) => e.into_error(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Address>,
    to: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas: Option<U256>,
    data: Bytes,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    status: Option<U256>,
    gas_used: U256,
    #[serde(default)]
    effective_gas_price: Option<U256>,
}

/// JSON-RPC ledger client.
pub struct RpcLedger {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    receipt_poll_attempts: u32,
    receipt_poll_interval: Duration,
}

impl RpcLedger {
    pub fn new(config: &RpcLedgerConfig) -> Self {
        let timeout = Duration::from_millis(config.timeout_ms);
        Self {
            url: config.url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            timeout,
            receipt_poll_attempts: config.receipt_poll_attempts,
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call_raw<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: P,
    ) -> std::result::Result<Option<R>, RpcFailure> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: 1,
        };
        trace!(method, url = %self.url, "rpc request");

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(MetaTxError::Network(format!("{} failed: {}", method, e))))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcFailure::Transport(MetaTxError::Network(format!(
                "{} returned status {}: {}",
                method, status, body
            ))));
        }

        let body: JsonRpcResponse<R> = resp.json().await.map_err(|e| {
            RpcFailure::Transport(MetaTxError::Network(format!(
                "failed to parse {} response: {}",
                method, e
            )))
        })?;

        if let Some(error) = body.error {
            return Err(RpcFailure::Rpc(error));
        }
        Ok(body.result)
    }

    async fn request<P: Serialize, R: DeserializeOwned>(&self, method: &'static str, params: P) -> Result<R> {
        self.call_raw(method, params)
            .await
            .map_err(RpcFailure::into_error)?
            .ok_or_else(|| MetaTxError::Network(format!("{} returned no result", method)))
    }

    async fn eth_call(&self, call: &RpcCall) -> std::result::Result<Bytes, RpcFailure> {
        let result: Option<Bytes> = self.call_raw("eth_call", (call, "latest")).await?;
        Ok(result.unwrap_or_default())
    }

    /// Poll for a mined receipt, waiting between attempts.
    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<RpcReceipt> {
        for attempt in 0..self.receipt_poll_attempts {
            let receipt: Option<RpcReceipt> = self
                .call_raw("eth_getTransactionReceipt", (tx_hash,))
                .await
                .map_err(RpcFailure::into_error)?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if attempt + 1 < self.receipt_poll_attempts {
                tokio::time::sleep(self.receipt_poll_interval).await;
            }
        }
        Err(MetaTxError::Network(format!(
            "receipt not available after {} attempts for {}",
            self.receipt_poll_attempts, tx_hash
        )))
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn chain_id(&self) -> Result<u64> {
        let id: U256 = self.request("eth_chainId", Vec::<()>::new()).await?;
        u64::try_from(id).map_err(|_| MetaTxError::Other(format!("chain id {} overflows u64", id)))
    }

    async fn sequence_number(&self, forwarder: Address, sender: Address) -> Result<U256> {
        let call = RpcCall {
            from: None,
            to: forwarder,
            value: None,
            gas: None,
            data: abi::encode_get_nonce(sender),
        };
        let raw = self
            .eth_call(&call)
            .await
            .map_err(RpcFailure::into_error)?;
        abi::decode_uint(&raw)
    }

    async fn estimate_cost(&self, call: &CallRequest) -> Result<u64> {
        let rpc_call = RpcCall {
            from: Some(call.from),
            to: call.to,
            value: (!call.value.is_zero()).then_some(call.value),
            gas: None,
            data: call.data.clone(),
        };
        let gas: U256 = self.request("eth_estimateGas", (rpc_call,)).await?;
        Ok(saturating_u64(gas))
    }

    async fn submit(&self, submission: &Submission) -> Result<TxReceipt> {
        let request = &submission.request;
        let call = RpcCall {
            from: Some(submission.relayer),
            to: submission.forwarder,
            value: (!request.value.is_zero()).then_some(request.value),
            gas: submission.gas_limit.map(U256::from),
            data: abi::encode_execute(request, &submission.signature),
        };

        // Forwarder rejections surface here, before anything is sent.
        let simulated = match self.eth_call(&call).await {
            Ok(raw) => raw,
            Err(RpcFailure::Rpc(error)) if error.is_revert() => {
                let data = error.revert_data().unwrap_or_default();
                let current = self
                    .sequence_number(submission.forwarder, request.from)
                    .await
                    .ok();
                return Err(abi::decode_forwarder_revert(&data, request, current));
            }
            Err(failure) => return Err(failure.into_error()),
        };
        let (success, return_data) = abi::decode_execute_result(&simulated)?;

        let tx_hash: B256 = self.request("eth_sendTransaction", (&call,)).await?;
        debug!(%tx_hash, relayer = %submission.relayer, "execute sent");

        let receipt = self.wait_for_receipt(tx_hash).await?;
        if receipt.status == Some(U256::ZERO) {
            return Err(MetaTxError::ExecutionReverted(format!(
                "transaction {} reverted on chain",
                tx_hash
            )));
        }

        let outcome = CallOutcome {
            success,
            return_data: if success {
                return_data
            } else {
                Bytes::from(abi::revert_reason(&return_data).into_bytes())
            },
            // Receipts do not report inner gas; this is an upper bound.
            gas_used: saturating_u64(request.gas.min(receipt.gas_used)),
        };
        Ok(TxReceipt {
            tx_hash: receipt.transaction_hash,
            gas_used: saturating_u64(receipt.gas_used),
            effective_gas_price: receipt.effective_gas_price.unwrap_or_default(),
            outcome,
        })
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.request("eth_getBalance", (address, "latest")).await
    }
}
