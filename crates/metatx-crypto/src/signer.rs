//! secp256k1 signing and recovery over typed-data digests.
//!
//! Signatures are 65 bytes `r || s || v` with `v ∈ {27, 28}`. Recovery also
//! accepts `v ∈ {0, 1}` and rejects high-`s` signatures, so each authorization
//! has exactly one valid encoding.

use std::fmt;

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use metatx_types::{hex_to_bytes, ForwardRequest, MetaTxError, Result, Signature, SigningDomain};
use tracing::debug;

use crate::{eip712, keccak256};

/// A key holder able to authorize forward requests.
///
/// Implementations sign locally; key material never leaves the signer.
pub trait TypedDataSigner: Send + Sync {
    /// Address the signatures recover to.
    fn address(&self) -> Address;

    /// Sign the EIP-712 digest of `request` under `domain`.
    fn sign_request(&self, domain: &SigningDomain, request: &ForwardRequest) -> Result<Signature>;
}

/// Derive the Ethereum address of a public key.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    // Skip the 0x04 SEC1 tag.
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Recover the address that produced `signature` over `digest`.
pub fn recover_signer(digest: &B256, signature: &Signature) -> Result<Address> {
    let recovery_byte = match signature.v() {
        27 | 28 => signature.v() - 27,
        0 | 1 => signature.v(),
        other => {
            return Err(MetaTxError::MalformedSignature(format!(
                "unsupported recovery byte {}",
                other
            )))
        }
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)
        .ok_or_else(|| MetaTxError::MalformedSignature("invalid recovery id".into()))?;

    let sig = EcdsaSignature::from_slice(&signature.as_bytes()[..64])
        .map_err(|e| MetaTxError::MalformedSignature(e.to_string()))?;
    if sig.normalize_s().is_some() {
        return Err(MetaTxError::MalformedSignature("high s value".into()));
    }

    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|e| MetaTxError::MalformedSignature(e.to_string()))?;
    Ok(address_from_verifying_key(&key))
}

/// In-process secp256k1 signer.
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    /// Fresh random key, e.g. for a sender wallet with no funds.
    pub fn random() -> Self {
        Self::from_signing_key(SigningKey::random(&mut rand::rngs::OsRng))
    }

    pub fn from_bytes(secret: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(secret).map_err(|e| MetaTxError::Signing(e.to_string()))?;
        Ok(Self::from_signing_key(key))
    }

    /// Parse a 0x-prefixed 32-byte private key.
    pub fn from_hex(secret: &str) -> Result<Self> {
        Self::from_bytes(&hex_to_bytes(secret)?)
    }

    fn from_signing_key(key: SigningKey) -> Self {
        let address = address_from_verifying_key(key.verifying_key());
        Self { key, address }
    }

    /// Sign a 32-byte digest as-is.
    pub fn sign_digest(&self, digest: &B256) -> Result<Signature> {
        let (sig, recovery_id) = self
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| MetaTxError::Signing(e.to_string()))?;
        let (r, s) = sig.split_bytes();
        let mut r_bytes = [0u8; 32];
        let mut s_bytes = [0u8; 32];
        r_bytes.copy_from_slice(r.as_slice());
        s_bytes.copy_from_slice(s.as_slice());
        Ok(Signature::from_parts(r_bytes, s_bytes, 27 + recovery_id.to_byte()))
    }
}

impl TypedDataSigner for LocalSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign_request(&self, domain: &SigningDomain, request: &ForwardRequest) -> Result<Signature> {
        if request.from != self.address {
            return Err(MetaTxError::Signing(format!(
                "request sender {} is not the signer {}",
                request.from, self.address
            )));
        }
        let digest = eip712::typed_data_digest(domain, request);
        debug!(signer = %self.address, %digest, "signing forward request");
        self.sign_digest(&digest)
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}
