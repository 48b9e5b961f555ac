//! EIP-712 typed-data hashing for forward requests.
//!
//! digest = keccak256(0x19 || 0x01 || domainSeparator || structHash)
//!
//! The field order of `FORWARD_REQUEST_TYPE` is part of the protocol; a
//! forwarder compiled against a different order will reject every signature.

use alloy_primitives::B256;
use alloy_sol_types::SolStruct;
use metatx_types::{ForwardRequest, SigningDomain};

pub const FORWARD_REQUEST_TYPE: &str =
    "ForwardRequest(address from,address to,uint256 value,uint256 gas,uint256 nonce,bytes data)";

/// Hash of the domain record, binding signatures to one forwarder on one chain.
pub fn domain_separator(domain: &SigningDomain) -> B256 {
    domain.eip712_domain().separator()
}

/// `hashStruct(ForwardRequest)`; `data` is hashed as an opaque byte string.
pub fn request_struct_hash(request: &ForwardRequest) -> B256 {
    request.eip712_hash_struct()
}

/// The digest a sender signs and a forwarder recovers from.
pub fn typed_data_digest(domain: &SigningDomain, request: &ForwardRequest) -> B256 {
    request.eip712_signing_hash(&domain.eip712_domain())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{keccak256, Address, Bytes, U256};

    fn sample_domain() -> SigningDomain {
        SigningDomain::new("GSNv2 Forwarder", "0.0.1", 31337, Address::repeat_byte(0xf0))
    }

    fn sample_request() -> ForwardRequest {
        ForwardRequest {
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x02),
            value: U256::ZERO,
            gas: U256::from(30_000u64),
            nonce: U256::ZERO,
            data: Bytes::from(vec![0xd0, 0x9d, 0xe0, 0x8a]),
        }
    }

    #[test]
    fn test_type_strings() {
        assert_eq!(ForwardRequest::eip712_encode_type(), FORWARD_REQUEST_TYPE);
    }

    #[test]
    fn test_known_digest() {
        // Hashed field by field with an independent keccak implementation.
        assert_eq!(
            hex::encode(domain_separator(&sample_domain())),
            "eeba727ab1c331d03a58de7f199fb228c63f867383e4cd3661de3469a9b20b96"
        );
        assert_eq!(
            hex::encode(typed_data_digest(&sample_domain(), &sample_request())),
            "aa5e7b27e9f761ec24a3a39f3b1d72321391022dda563d33015c3df2312717f9"
        );
    }

    #[test]
    fn test_digest_layout() {
        let domain = sample_domain();
        let request = sample_request();
        let mut buf = Vec::with_capacity(66);
        buf.extend_from_slice(b"\x19\x01");
        buf.extend_from_slice(domain_separator(&domain).as_slice());
        buf.extend_from_slice(request_struct_hash(&request).as_slice());
        assert_eq!(keccak256(&buf), typed_data_digest(&domain, &request));
    }

    #[test]
    fn test_digest_is_deterministic() {
        let a = sample_request();
        // Same values assembled in a different order.
        let b = ForwardRequest {
            data: a.data.clone(),
            nonce: a.nonce,
            gas: a.gas,
            value: a.value,
            to: a.to,
            from: a.from,
        };
        assert_eq!(
            typed_data_digest(&sample_domain(), &a),
            typed_data_digest(&sample_domain(), &b)
        );
    }

    #[test]
    fn test_every_field_changes_digest() {
        let domain = sample_domain();
        let base = sample_request();
        let base_digest = typed_data_digest(&domain, &base);

        let mut variants = Vec::new();
        let mut r = base.clone();
        r.from = Address::repeat_byte(0x09);
        variants.push(("from", r));
        let mut r = base.clone();
        r.to = Address::repeat_byte(0x09);
        variants.push(("to", r));
        let mut r = base.clone();
        r.value = U256::from(1u64);
        variants.push(("value", r));
        let mut r = base.clone();
        r.gas = U256::from(30_001u64);
        variants.push(("gas", r));
        let mut r = base.clone();
        r.nonce = U256::from(1u64);
        variants.push(("nonce", r));
        let mut r = base.clone();
        r.data = Bytes::from(vec![0xd0, 0x9d, 0xe0, 0x8b]);
        variants.push(("data", r));

        for (field, variant) in variants {
            assert_ne!(
                typed_data_digest(&domain, &variant),
                base_digest,
                "changing {} must change the digest",
                field
            );
        }
    }

    #[test]
    fn test_domain_separation() {
        let request = sample_request();
        let domain = sample_domain();

        let mut other_chain = domain.clone();
        other_chain.chain_id = 1;
        let mut other_contract = domain.clone();
        other_contract.verifying_contract = Address::repeat_byte(0xf1);
        let mut other_version = domain.clone();
        other_version.version = "0.0.2".into();

        let digest = typed_data_digest(&domain, &request);
        assert_ne!(digest, typed_data_digest(&other_chain, &request));
        assert_ne!(digest, typed_data_digest(&other_contract, &request));
        assert_ne!(digest, typed_data_digest(&other_version, &request));
        assert_ne!(domain_separator(&domain), domain_separator(&other_chain));
    }

    #[test]
    fn test_empty_and_long_data() {
        let domain = sample_domain();
        let mut empty = sample_request();
        empty.data = Bytes::new();
        let mut long = sample_request();
        long.data = Bytes::from(vec![0x42; 200]);
        assert_ne!(
            typed_data_digest(&domain, &empty),
            typed_data_digest(&domain, &long)
        );
    }
}
