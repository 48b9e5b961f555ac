use alloy_primitives::U256;
use metatx_types::{MetaTxError, Result};
use serde::{Deserialize, Serialize};

/// Chain parameters of a `LocalLedger`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalLedgerConfig {
    pub chain_id: u64,
    /// Price per unit of gas, in wei.
    pub gas_price: U256,
    pub block_gas_limit: u64,
}

impl Default for LocalLedgerConfig {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            gas_price: U256::from(1_000_000_000u64),
            block_gas_limit: 30_000_000,
        }
    }
}

impl LocalLedgerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| MetaTxError::Config(e.to_string()))?;
        if config.block_gas_limit == 0 {
            return Err(MetaTxError::Config("block_gas_limit must be positive".into()));
        }
        Ok(config)
    }
}
