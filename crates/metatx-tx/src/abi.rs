//! Calldata for the forwarder's entry points and decoding of its reverts.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{Revert, SolCall, SolError, SolValue};
use metatx_types::IForwarder::{self, SignatureDoesNotMatch};
use metatx_types::{ForwardRequest, MetaTxError, Result, Signature};

pub const NONCE_MISMATCH_REASON: &str = "FWD: nonce mismatch";
pub const SIGNATURE_MISMATCH_REASON: &str = "FWD: signature mismatch";

fn abi_error(err: alloy_sol_types::Error) -> MetaTxError {
    MetaTxError::Abi(err.to_string())
}

pub fn encode_get_nonce(from: Address) -> Bytes {
    IForwarder::getNonceCall { from }.abi_encode().into()
}

pub fn encode_execute(request: &ForwardRequest, signature: &Signature) -> Bytes {
    IForwarder::executeCall {
        req: request.clone(),
        signature: Bytes::copy_from_slice(signature.as_bytes()),
    }
    .abi_encode()
    .into()
}

/// Decode a single `uint256` return value.
pub fn decode_uint(data: &[u8]) -> Result<U256> {
    U256::abi_decode(data).map_err(abi_error)
}

/// Decode the `(bool success, bytes ret)` result of `execute`.
pub fn decode_execute_result(data: &[u8]) -> Result<(bool, Bytes)> {
    let decoded = IForwarder::executeCall::abi_decode_returns(data).map_err(abi_error)?;
    Ok((decoded.success, decoded.ret))
}

pub fn encode_error_string(reason: &str) -> Bytes {
    Revert {
        reason: reason.to_string(),
    }
    .abi_encode()
    .into()
}

/// Human-readable reason from revert data.
///
/// `Error(string)` payloads are decoded; anything else is rendered as hex.
pub fn revert_reason(data: &[u8]) -> String {
    if let Ok(revert) = Revert::abi_decode(data) {
        return revert.reason;
    }
    if data.starts_with(&SignatureDoesNotMatch::SELECTOR) {
        return SignatureDoesNotMatch::SIGNATURE.to_string();
    }
    format!("0x{}", hex::encode(data))
}

/// Map a reverted `execute` call back to the forwarder rejection it encodes.
pub fn decode_forwarder_revert(data: &[u8], request: &ForwardRequest, current_nonce: Option<U256>) -> MetaTxError {
    let reason = revert_reason(data);
    if reason == SIGNATURE_MISMATCH_REASON || reason == SignatureDoesNotMatch::SIGNATURE {
        MetaTxError::InvalidSignature {
            expected: request.from,
            recovered: None,
        }
    } else if reason == NONCE_MISMATCH_REASON {
        MetaTxError::NonceMismatch {
            from: request.from,
            expected: current_nonce.unwrap_or(request.nonce),
            actual: request.nonce,
        }
    } else {
        MetaTxError::ExecutionReverted(reason)
    }
}
