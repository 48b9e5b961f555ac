//! Forward request, signing domain and signature records.
//!
//! `ForwardRequest` and the forwarder's entry points are declared as Solidity
//! so typed-data hashing and calldata come from `alloy-sol-types`.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, Eip712Domain};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{bytes_to_hex, hex_to_bytes, MetaTxError, Result};

/// Length of an `r || s || v` signature.
pub const SIGNATURE_LENGTH: usize = 65;

sol! {
    /// A delegated call authorized by `from` and executed through a forwarder.
    ///
    /// Field order is part of the signed type string.
    #[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct ForwardRequest {
        address from;
        address to;
        uint256 value;
        uint256 gas;
        uint256 nonce;
        bytes data;
    }

    /// Entry points and custom errors of the trusted forwarder.
    interface IForwarder {
        error SignatureDoesNotMatch();

        function getNonce(address from) external view returns (uint256);

        function execute(ForwardRequest calldata req, bytes calldata signature)
            external
            payable
            returns (bool success, bytes memory ret);
    }
}

/// Scopes signatures to one forwarder on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl SigningDomain {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        chain_id: u64,
        verifying_contract: Address,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            chain_id,
            verifying_contract,
        }
    }

    /// The EIP-712 domain with `name`, `version`, `chainId` and `verifyingContract` set.
    pub fn eip712_domain(&self) -> Eip712Domain {
        Eip712Domain::new(
            Some(Cow::Owned(self.name.clone())),
            Some(Cow::Owned(self.version.clone())),
            Some(U256::from(self.chain_id)),
            Some(self.verifying_contract),
            None,
        )
    }
}

/// Recoverable secp256k1 signature in `r || s || v` layout.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn from_parts(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..32].copy_from_slice(&r);
        out[32..64].copy_from_slice(&s);
        out[64] = v;
        Self(out)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; SIGNATURE_LENGTH] = bytes.try_into().map_err(|_| {
            MetaTxError::MalformedSignature(format!(
                "expected {} bytes, got {}",
                SIGNATURE_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(raw))
    }

    pub fn r(&self) -> &[u8] {
        &self.0[..32]
    }

    pub fn s(&self) -> &[u8] {
        &self.0[32..64]
    }

    pub fn v(&self) -> u8 {
        self.0[64]
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = MetaTxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_slice(&hex_to_bytes(s)?)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
