use alloy_primitives::Address;
use metatx_forwarder::ForwarderConfig;
use metatx_types::{MetaTxError, Result};
use serde::{Deserialize, Serialize};

/// Which forwarder a relayer submits to and from which funded account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    pub forwarder: Address,
    pub relayer: Address,
    /// Name and version the forwarder was deployed with.
    #[serde(default)]
    pub domain: ForwarderConfig,
}

impl RelayConfig {
    pub fn new(forwarder: Address, relayer: Address) -> Self {
        Self {
            forwarder,
            relayer,
            domain: ForwarderConfig::default(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| MetaTxError::Config(e.to_string()))
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_receipt_poll_attempts() -> u32 {
    60
}

fn default_receipt_poll_interval_ms() -> u64 {
    500
}

/// JSON-RPC endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcLedgerConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_receipt_poll_attempts")]
    pub receipt_poll_attempts: u32,
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

impl RpcLedgerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: default_timeout_ms(),
            receipt_poll_attempts: default_receipt_poll_attempts(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| MetaTxError::Config(e.to_string()))?;
        if config.receipt_poll_attempts == 0 {
            return Err(MetaTxError::Config("receipt_poll_attempts must be positive".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_defaults_domain() {
        let config = RelayConfig::from_json_str(
            r#"{
                "forwarder": "0x5fbdb2315678afecb367f032d93f642f64180aa3",
                "relayer": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
            }"#,
        )
        .unwrap();
        assert_eq!(config.domain, ForwarderConfig::default());
        assert_eq!(config.domain.name, "GSNv2 Forwarder");
    }

    #[test]
    fn test_relay_config_rejects_bad_address() {
        let err = RelayConfig::from_json_str(r#"{"forwarder": "0x12", "relayer": "0x34"}"#)
            .unwrap_err();
        assert!(matches!(err, MetaTxError::Config(_)));
    }

    #[test]
    fn test_rpc_config_defaults() {
        let config = RpcLedgerConfig::from_json_str(r#"{"url": "http://localhost:8545"}"#).unwrap();
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.receipt_poll_attempts, 60);
        assert_eq!(config, RpcLedgerConfig::new("http://localhost:8545"));

        assert!(RpcLedgerConfig::from_json_str(
            r#"{"url": "http://localhost:8545", "receipt_poll_attempts": 0}"#
        )
        .is_err());
    }
}
