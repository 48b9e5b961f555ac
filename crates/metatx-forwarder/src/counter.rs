//! Per-originator counter service.

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall, SolInterface, SolValue};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{CallMode, Contract, Execution, Message, Revert, TrustedForwarderContext};

sol! {
    interface ICounterByAddress {
        /// Adds one to the caller's counter.
        function increment() external;

        function getCounter(address account) external view returns (uint256);

        /// Always fails.
        function definitelyReverts() external pure;
    }
}

use ICounterByAddress::ICounterByAddressCalls;

pub const DEFINITELY_REVERTS_REASON: &str = "this function always reverts";

// Storage write costs: fresh slot vs. updating a non-zero slot.
const GAS_FIRST_INCREMENT: u64 = 22_100;
const GAS_INCREMENT: u64 = 5_000;
const GAS_READ: u64 = 2_600;
const GAS_DISPATCH: u64 = 300;

pub struct CounterByAddress {
    context: TrustedForwarderContext,
    counters: RwLock<HashMap<Address, U256>>,
}

impl CounterByAddress {
    pub fn new(trusted_forwarder: Address) -> Self {
        Self {
            context: TrustedForwarderContext::new(trusted_forwarder),
            counters: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &TrustedForwarderContext {
        &self.context
    }

    pub async fn counter_of(&self, address: Address) -> U256 {
        self.counters
            .read()
            .await
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn increment_calldata() -> Bytes {
        ICounterByAddress::incrementCall {}.abi_encode().into()
    }

    pub fn get_counter_calldata(account: Address) -> Bytes {
        ICounterByAddress::getCounterCall { account }.abi_encode().into()
    }

    pub fn definitely_reverts_calldata() -> Bytes {
        ICounterByAddress::definitelyRevertsCall {}.abi_encode().into()
    }

    async fn increment(&self, sender: Address, gas: u64, mode: CallMode) -> Result<Execution, Revert> {
        // Priced and applied under one write lock.
        let mut counters = self.counters.write().await;
        let current = counters.get(&sender).copied().unwrap_or(U256::ZERO);
        let cost = GAS_DISPATCH
            + if current.is_zero() {
                GAS_FIRST_INCREMENT
            } else {
                GAS_INCREMENT
            };
        if gas < cost {
            return Err(Revert::new("out of gas", gas));
        }
        if mode == CallMode::Commit {
            let next = current.saturating_add(U256::from(1u64));
            counters.insert(sender, next);
            debug!(%sender, counter = %next, "counter incremented");
        }
        Ok(Execution {
            return_data: Bytes::new(),
            gas_used: cost,
        })
    }

    async fn get_counter(&self, account: Address, gas: u64) -> Result<Execution, Revert> {
        let cost = GAS_DISPATCH + GAS_READ;
        if gas < cost {
            return Err(Revert::new("out of gas", gas));
        }
        let value = self.counter_of(account).await;
        Ok(Execution {
            return_data: value.abi_encode().into(),
            gas_used: cost,
        })
    }
}

#[async_trait]
impl Contract for CounterByAddress {
    async fn call(&self, message: &Message, mode: CallMode) -> Result<Execution, Revert> {
        let data = self.context.msg_data(message);
        let sender = self.context.msg_sender(message);
        let dispatch_gas = GAS_DISPATCH.min(message.gas);
        if data.len() < 4 {
            return Err(Revert::new("missing selector", dispatch_gas));
        }
        if !message.value.is_zero() {
            return Err(Revert::new("non-payable function", dispatch_gas));
        }

        let selector = [data[0], data[1], data[2], data[3]];
        if !ICounterByAddressCalls::valid_selector(selector) {
            return Err(Revert::new("unknown selector", dispatch_gas));
        }
        let call = ICounterByAddressCalls::abi_decode(data)
            .map_err(|e| Revert::new(format!("invalid calldata: {}", e), dispatch_gas))?;
        match call {
            ICounterByAddressCalls::increment(_) => self.increment(sender, message.gas, mode).await,
            ICounterByAddressCalls::getCounter(args) => self.get_counter(args.account, message.gas).await,
            ICounterByAddressCalls::definitelyReverts(_) => {
                Err(Revert::new(DEFINITELY_REVERTS_REASON, dispatch_gas))
            }
        }
    }
}
