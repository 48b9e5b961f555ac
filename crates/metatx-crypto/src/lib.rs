//! Signing primitives for forward requests.
//!
//! - EIP-712 typed-data hashing of `ForwardRequest` under a `SigningDomain`
//! - secp256k1 signing (`LocalSigner`) and signer recovery

pub mod eip712;
pub mod signer;

pub use alloy_primitives::keccak256;
pub use eip712::{typed_data_digest, FORWARD_REQUEST_TYPE};
pub use signer::{address_from_verifying_key, recover_signer, LocalSigner, TypedDataSigner};
