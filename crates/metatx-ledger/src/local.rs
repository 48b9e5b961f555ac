use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use metatx_crypto::keccak256;
use metatx_forwarder::{
    CallDispatcher, CallMode, CallOutcome, Contract, Forwarder, ForwarderConfig, InnerCall,
    Message,
};
use metatx_tx::{abi, CallRequest, Ledger, Submission, TxReceipt};
use metatx_types::{saturating_u64, MetaTxError, Result};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::gas::{execute_gas_floor, intrinsic_gas};
use crate::LocalLedgerConfig;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Address, U256>,
    tx_counts: HashMap<Address, u64>,
    receipts: HashMap<B256, TxReceipt>,
    deployments: u64,
}

impl LedgerState {
    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn debit(&mut self, address: Address, amount: U256) -> Result<()> {
        let available = self.balance(address);
        if available < amount {
            return Err(MetaTxError::InsufficientFunds {
                address,
                required: amount,
                available,
            });
        }
        self.balances.insert(address, available - amount);
        Ok(())
    }

    /// Debit `gas_limit * gas_price + value` up front and return the gas part.
    ///
    /// A total that does not fit in a U256 can never be covered.
    fn reserve(&mut self, address: Address, gas_limit: u64, gas_price: U256, value: U256) -> Result<U256> {
        let cost = U256::from(gas_limit)
            .checked_mul(gas_price)
            .and_then(|gas| gas.checked_add(value).map(|total| (gas, total)));
        let Some((gas_cost, total)) = cost else {
            return Err(MetaTxError::InsufficientFunds {
                address,
                required: U256::MAX,
                available: self.balance(address),
            });
        };
        self.debit(address, total)?;
        Ok(gas_cost)
    }

    fn credit(&mut self, address: Address, amount: U256) {
        let entry = self.balances.entry(address).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Hash for the next transaction from `from`; bumps its counter.
    fn next_tx_hash(&mut self, from: Address, calldata: &[u8]) -> B256 {
        let count = self.tx_counts.entry(from).or_default();
        let mut seed = Vec::with_capacity(20 + 8 + calldata.len());
        seed.extend_from_slice(from.as_slice());
        seed.extend_from_slice(&count.to_be_bytes());
        seed.extend_from_slice(calldata);
        *count += 1;
        keccak256(&seed)
    }

    fn store_receipt(&mut self, receipt: &TxReceipt) {
        self.receipts.insert(receipt.tx_hash, receipt.clone());
    }
}

/// In-process ledger.
///
/// Forwarders are hosted natively; services are `Contract` implementations
/// registered with `deploy`. Fees are charged to whoever sends the outer
/// transaction.
pub struct LocalLedger {
    config: LocalLedgerConfig,
    state: Mutex<LedgerState>,
    forwarders: RwLock<HashMap<Address, Arc<Forwarder>>>,
    contracts: RwLock<HashMap<Address, Arc<dyn Contract>>>,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new(LocalLedgerConfig::default())
    }
}

impl LocalLedger {
    pub fn new(config: LocalLedgerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LedgerState::default()),
            forwarders: RwLock::new(HashMap::new()),
            contracts: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &LocalLedgerConfig {
        &self.config
    }

    pub async fn fund(&self, address: Address, amount: U256) {
        self.state.lock().await.credit(address, amount);
    }

    /// Number of transactions sent from `address`.
    pub async fn tx_count(&self, address: Address) -> u64 {
        self.state
            .lock()
            .await
            .tx_counts
            .get(&address)
            .copied()
            .unwrap_or_default()
    }

    pub async fn receipt(&self, tx_hash: B256) -> Option<TxReceipt> {
        self.state.lock().await.receipts.get(&tx_hash).cloned()
    }

    async fn next_address(&self) -> Address {
        let mut state = self.state.lock().await;
        state.deployments += 1;
        let mut seed = b"metatx-local-deployment".to_vec();
        seed.extend_from_slice(&state.deployments.to_be_bytes());
        Address::from_slice(&keccak256(&seed)[12..])
    }

    pub async fn deploy_forwarder(&self, config: &ForwarderConfig) -> Address {
        let address = self.next_address().await;
        let forwarder = Forwarder::new(address, self.config.chain_id, config);
        self.forwarders
            .write()
            .await
            .insert(address, Arc::new(forwarder));
        info!(%address, name = %config.name, version = %config.version, "forwarder deployed");
        address
    }

    pub async fn deploy(&self, contract: Arc<dyn Contract>) -> Address {
        let address = self.next_address().await;
        self.contracts.write().await.insert(address, contract);
        info!(%address, "contract deployed");
        address
    }

    pub async fn forwarder(&self, address: Address) -> Option<Arc<Forwarder>> {
        self.forwarders.read().await.get(&address).cloned()
    }

    async fn contract(&self, address: Address) -> Option<Arc<dyn Contract>> {
        self.contracts.read().await.get(&address).cloned()
    }

    async fn forwarder_at(&self, address: Address) -> Result<Arc<Forwarder>> {
        self.forwarder(address)
            .await
            .ok_or(MetaTxError::UnknownContract(address))
    }

    /// Read-only call; reverts surface as `ExecutionReverted`.
    pub async fn call_view(&self, to: Address, data: impl Into<Bytes>) -> Result<Bytes> {
        let contract = self
            .contract(to)
            .await
            .ok_or(MetaTxError::UnknownContract(to))?;
        let message = Message {
            caller: Address::ZERO,
            value: U256::ZERO,
            data: data.into(),
            gas: self.config.block_gas_limit,
        };
        contract
            .call(&message, CallMode::Simulate)
            .await
            .map(|execution| execution.return_data)
            .map_err(|revert| MetaTxError::ExecutionReverted(revert.reason))
    }

    /// Direct call from `from`, paying its own fee.
    ///
    /// Calls that would revert are refused before sending, the way a wallet
    /// refuses a transaction whose estimate fails.
    pub async fn send_call(
        &self,
        from: Address,
        to: Address,
        data: impl Into<Bytes>,
        value: U256,
    ) -> Result<TxReceipt> {
        let data = data.into();
        let contract = self
            .contract(to)
            .await
            .ok_or(MetaTxError::UnknownContract(to))?;
        let intrinsic = intrinsic_gas(&data);
        let mut message = Message {
            caller: from,
            value,
            data: data.clone(),
            gas: self.config.block_gas_limit.saturating_sub(intrinsic),
        };

        let estimate = contract
            .call(&message, CallMode::Simulate)
            .await
            .map_err(|revert| MetaTxError::ExecutionReverted(revert.reason))?;
        let gas_limit = intrinsic.saturating_add(estimate.gas_used);
        self.state
            .lock()
            .await
            .reserve(from, gas_limit, self.config.gas_price, value)?;

        message.gas = estimate.gas_used;
        let result = contract.call(&message, CallMode::Commit).await;

        let mut state = self.state.lock().await;
        let (outcome, inner_gas) = match result {
            Ok(execution) => {
                let gas = execution.gas_used;
                state.credit(to, value);
                (CallOutcome::success(execution), gas)
            }
            Err(revert) => {
                let gas = revert.gas_used;
                state.credit(from, value);
                (CallOutcome::failure(revert), gas)
            }
        };
        let gas_used = intrinsic.saturating_add(inner_gas.min(estimate.gas_used));
        state.credit(
            from,
            U256::from(gas_limit - gas_used) * self.config.gas_price,
        );

        let receipt = TxReceipt {
            tx_hash: state.next_tx_hash(from, &data),
            gas_used,
            effective_gas_price: self.config.gas_price,
            outcome,
        };
        state.store_receipt(&receipt);
        debug!(tx_hash = %receipt.tx_hash, %from, %to, gas_used, "direct call mined");
        Ok(receipt)
    }
}

#[async_trait]
impl CallDispatcher for LocalLedger {
    async fn dispatch(&self, call: InnerCall) -> CallOutcome {
        let Some(contract) = self.contract(call.to).await else {
            // Plain account: nothing to run, any value is simply received.
            return CallOutcome {
                success: true,
                return_data: Bytes::new(),
                gas_used: 0,
            };
        };
        let message = Message {
            caller: call.caller,
            value: call.value,
            data: call.data,
            gas: call.gas,
        };
        match contract.call(&message, CallMode::Commit).await {
            Ok(execution) => CallOutcome::success(execution),
            Err(revert) => CallOutcome::failure(revert),
        }
    }
}

#[async_trait]
impl Ledger for LocalLedger {
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.config.chain_id)
    }

    async fn sequence_number(&self, forwarder: Address, sender: Address) -> Result<U256> {
        self.forwarder_at(forwarder).await?.get_nonce(sender).await
    }

    async fn estimate_cost(&self, call: &CallRequest) -> Result<u64> {
        let intrinsic = intrinsic_gas(&call.data);
        let Some(contract) = self.contract(call.to).await else {
            return Ok(intrinsic);
        };
        let message = Message {
            caller: call.from,
            value: call.value,
            data: call.data.clone(),
            gas: self.config.block_gas_limit.saturating_sub(intrinsic),
        };
        match contract.call(&message, CallMode::Simulate).await {
            Ok(execution) => Ok(intrinsic.saturating_add(execution.gas_used)),
            Err(revert) => Err(MetaTxError::ExecutionReverted(revert.reason)),
        }
    }

    async fn submit(&self, submission: &Submission) -> Result<TxReceipt> {
        let request = &submission.request;
        let forwarder = self.forwarder_at(submission.forwarder).await?;
        let calldata = abi::encode_execute(request, &submission.signature);
        let inner_gas = saturating_u64(request.gas);
        let floor = execute_gas_floor(&calldata, inner_gas);
        let gas_limit = submission.gas_limit.unwrap_or(floor);

        if gas_limit < floor {
            return Err(MetaTxError::InsufficientGas {
                required: floor,
                provided: gas_limit,
            });
        }
        if gas_limit > self.config.block_gas_limit {
            return Err(MetaTxError::InsufficientGas {
                required: gas_limit,
                provided: self.config.block_gas_limit,
            });
        }

        // Buy all gas and escrow the value up front; settle after execution.
        let gas_price = self.config.gas_price;
        let reserved = self
            .state
            .lock()
            .await
            .reserve(submission.relayer, gas_limit, gas_price, request.value)?;

        let result = forwarder
            .execute(self, submission.relayer, request, &submission.signature, request.value)
            .await;

        let mut state = self.state.lock().await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                state.credit(submission.relayer, reserved);
                state.credit(submission.relayer, request.value);
                warn!(relayer = %submission.relayer, error = %e, "forwarder rejected request");
                return Err(e);
            }
        };

        if outcome.success {
            state.credit(request.to, request.value);
        } else {
            state.credit(submission.relayer, request.value);
        }
        let gas_used = (floor - inner_gas) + outcome.gas_used.min(inner_gas);
        state.credit(submission.relayer, U256::from(gas_limit - gas_used) * gas_price);

        let receipt = TxReceipt {
            tx_hash: state.next_tx_hash(submission.relayer, &calldata),
            gas_used,
            effective_gas_price: gas_price,
            outcome,
        };
        state.store_receipt(&receipt);
        debug!(tx_hash = %receipt.tx_hash, relayer = %submission.relayer, gas_used, "execute mined");
        Ok(receipt)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self.state.lock().await.balance(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::FORWARDER_OVERHEAD;
    use metatx_crypto::{LocalSigner, TypedDataSigner};
    use metatx_forwarder::CounterByAddress;
    use metatx_types::{ForwardRequest, Signature};

    const RELAYER: Address = Address::new([0xee; 20]);

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
    }

    struct Fixture {
        ledger: Arc<LocalLedger>,
        forwarder: Address,
        counter: Arc<CounterByAddress>,
        counter_address: Address,
    }

    async fn fixture() -> Fixture {
        let ledger = Arc::new(LocalLedger::default());
        ledger.fund(RELAYER, ether(100)).await;
        let forwarder = ledger.deploy_forwarder(&ForwarderConfig::default()).await;
        let counter = Arc::new(CounterByAddress::new(forwarder));
        let counter_address = ledger.deploy(counter.clone()).await;
        Fixture {
            ledger,
            forwarder,
            counter,
            counter_address,
        }
    }

    async fn signed_increment(f: &Fixture, sender: &LocalSigner, gas: u64) -> (ForwardRequest, Signature) {
        let forwarder = f.ledger.forwarder(f.forwarder).await.unwrap();
        let request = ForwardRequest {
            from: sender.address(),
            to: f.counter_address,
            value: U256::ZERO,
            gas: U256::from(gas),
            nonce: forwarder.get_nonce(sender.address()).await.unwrap(),
            data: CounterByAddress::increment_calldata(),
        };
        let signature = sender.sign_request(forwarder.domain(), &request).unwrap();
        (request, signature)
    }

    fn submission(f: &Fixture, request: ForwardRequest, signature: Signature) -> Submission {
        Submission {
            relayer: RELAYER,
            forwarder: f.forwarder,
            request,
            signature,
            gas_limit: None,
        }
    }

    #[tokio::test]
    async fn test_deployments_get_distinct_addresses() {
        let f = fixture().await;
        assert_ne!(f.forwarder, f.counter_address);
        assert!(f.ledger.forwarder(f.forwarder).await.is_some());
        assert!(f.ledger.forwarder(f.counter_address).await.is_none());
    }

    #[tokio::test]
    async fn test_submit_charges_relayer_exact_fee() {
        let f = fixture().await;
        let sender = LocalSigner::random();
        let (request, signature) = signed_increment(&f, &sender, 40_000).await;
        let calldata = abi::encode_execute(&request, &signature);

        let receipt = f
            .ledger
            .submit(&submission(&f, request, signature))
            .await
            .unwrap();
        assert!(receipt.outcome.success);
        assert_eq!(
            receipt.gas_used,
            intrinsic_gas(&calldata) + FORWARDER_OVERHEAD + receipt.outcome.gas_used
        );
        assert_eq!(
            f.ledger.balance(RELAYER).await.unwrap(),
            ether(100) - receipt.fee()
        );
        assert_eq!(f.ledger.tx_count(RELAYER).await, 1);
        assert_eq!(f.ledger.receipt(receipt.tx_hash).await, Some(receipt));
        assert_eq!(f.counter.counter_of(sender.address()).await, U256::from(1u64));
    }

    #[tokio::test]
    async fn test_gas_limit_below_floor_rejected() {
        let f = fixture().await;
        let sender = LocalSigner::random();
        let (request, signature) = signed_increment(&f, &sender, 40_000).await;
        let mut sub = submission(&f, request, signature);
        sub.gas_limit = Some(50_000);

        let err = f.ledger.submit(&sub).await.unwrap_err();
        assert!(matches!(err, MetaTxError::InsufficientGas { .. }));
        assert_eq!(
            f.ledger.sequence_number(f.forwarder, sender.address()).await.unwrap(),
            U256::ZERO
        );
        assert_eq!(f.ledger.balance(RELAYER).await.unwrap(), ether(100));
    }

    #[tokio::test]
    async fn test_rejection_charges_nothing() {
        let f = fixture().await;
        let sender = LocalSigner::random();
        let (request, signature) = signed_increment(&f, &sender, 40_000).await;
        f.ledger
            .submit(&submission(&f, request.clone(), signature))
            .await
            .unwrap();
        let after_first = f.ledger.balance(RELAYER).await.unwrap();

        let err = f
            .ledger
            .submit(&submission(&f, request, signature))
            .await
            .unwrap_err();
        assert!(matches!(err, MetaTxError::NonceMismatch { .. }));
        assert_eq!(f.ledger.balance(RELAYER).await.unwrap(), after_first);
        assert_eq!(f.ledger.tx_count(RELAYER).await, 1);
    }

    #[tokio::test]
    async fn test_unfunded_relayer() {
        let f = fixture().await;
        let sender = LocalSigner::random();
        let (request, signature) = signed_increment(&f, &sender, 40_000).await;
        let mut sub = submission(&f, request, signature);
        sub.relayer = Address::repeat_byte(0x99);

        let err = f.ledger.submit(&sub).await.unwrap_err();
        assert!(matches!(err, MetaTxError::InsufficientFunds { .. }));
        assert_eq!(f.counter.counter_of(sender.address()).await, U256::ZERO);
    }

    #[tokio::test]
    async fn test_value_overflowing_reservation_is_unaffordable() {
        let f = fixture().await;
        let sender = LocalSigner::random();
        let recipient = Address::repeat_byte(0x77);
        let forwarder = f.ledger.forwarder(f.forwarder).await.unwrap();
        let request = ForwardRequest {
            from: sender.address(),
            to: recipient,
            value: U256::MAX,
            gas: U256::from(10_000u64),
            nonce: U256::ZERO,
            data: Bytes::new(),
        };
        let signature = sender.sign_request(forwarder.domain(), &request).unwrap();

        let err = f
            .ledger
            .submit(&submission(&f, request, signature))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MetaTxError::InsufficientFunds { address, required, .. } if address == RELAYER && required == U256::MAX
        ));
        assert_eq!(f.ledger.balance(RELAYER).await.unwrap(), ether(100));
        assert_eq!(f.ledger.balance(recipient).await.unwrap(), U256::ZERO);
        assert_eq!(forwarder.get_nonce(sender.address()).await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn test_estimate_and_unknown_forwarder() {
        let f = fixture().await;
        let call = CallRequest {
            from: Address::repeat_byte(0x01),
            to: f.counter_address,
            value: U256::ZERO,
            data: CounterByAddress::increment_calldata(),
        };
        let estimate = f.ledger.estimate_cost(&call).await.unwrap();
        assert_eq!(estimate, 21_064 + 22_400);

        let reverting = CallRequest {
            data: CounterByAddress::definitely_reverts_calldata(),
            ..call
        };
        assert!(matches!(
            f.ledger.estimate_cost(&reverting).await,
            Err(MetaTxError::ExecutionReverted(_))
        ));

        assert!(matches!(
            f.ledger.sequence_number(Address::repeat_byte(0x42), Address::ZERO).await,
            Err(MetaTxError::UnknownContract(_))
        ));
    }
}
