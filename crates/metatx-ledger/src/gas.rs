//! Gas schedule of the local ledger.

pub const TX_BASE_GAS: u64 = 21_000;
pub const ZERO_BYTE_GAS: u64 = 4;
pub const NONZERO_BYTE_GAS: u64 = 16;

/// Signature recovery, nonce write and call setup inside `execute`.
pub const FORWARDER_OVERHEAD: u64 = 35_000;

/// Base cost of a transaction carrying `calldata`.
pub fn intrinsic_gas(calldata: &[u8]) -> u64 {
    calldata.iter().fold(TX_BASE_GAS, |acc, byte| {
        acc + if *byte == 0 {
            ZERO_BYTE_GAS
        } else {
            NONZERO_BYTE_GAS
        }
    })
}

/// Smallest outer gas limit that still leaves `inner_gas` for the inner call.
pub fn execute_gas_floor(calldata: &[u8], inner_gas: u64) -> u64 {
    intrinsic_gas(calldata)
        .saturating_add(FORWARDER_OVERHEAD)
        .saturating_add(inner_gas)
}
