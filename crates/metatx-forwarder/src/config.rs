use alloy_primitives::Address;
use metatx_types::SigningDomain;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DOMAIN_NAME: &str = "GSNv2 Forwarder";
pub const DEFAULT_DOMAIN_VERSION: &str = "0.0.1";

/// Name and version a forwarder deployment signs under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub name: String,
    pub version: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DOMAIN_NAME.to_string(),
            version: DEFAULT_DOMAIN_VERSION.to_string(),
        }
    }
}

impl ForwarderConfig {
    /// Signing domain for a forwarder deployed at `verifying_contract`.
    pub fn domain(&self, chain_id: u64, verifying_contract: Address) -> SigningDomain {
        SigningDomain::new(&self.name, &self.version, chain_id, verifying_contract)
    }
}
