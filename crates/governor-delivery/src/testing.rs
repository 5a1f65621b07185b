//! In-memory chain client for tests.
//!
//! [`MockDelivery`] records every submitted transaction, hands out
//! deterministic contract addresses for creations and answers read calls from
//! canned responses. Clones share state, so a test can keep one handle while
//! the code under test owns another.

use crate::{DeliveryError, DeliveryInterface};
use async_trait::async_trait;
use governor_types::{
	Address, Bytes, FeeData, Log, LogFilter, Transaction, TransactionHash, TransactionReceipt,
	B256, U256,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
	submissions: Vec<Transaction>,
	/// Number of upcoming submissions to reject.
	failures_left: usize,
	exact_calls: HashMap<(Address, Bytes), Bytes>,
	selector_calls: HashMap<(Address, [u8; 4]), Bytes>,
	storage: HashMap<(Address, U256), B256>,
	logs: Vec<Log>,
	fee_data: Option<FeeData>,
	block_timestamp: u64,
}

/// Recording chain client.
#[derive(Clone, Default)]
pub struct MockDelivery {
	state: Arc<Mutex<MockState>>,
}

/// Address assigned to the `n`th contract creation (1-based).
pub fn created_address(n: usize) -> Address {
	let mut bytes = [0u8; 20];
	bytes[0] = 0xc0;
	bytes[12..].copy_from_slice(&(n as u64).to_be_bytes());
	Address::from(bytes)
}

/// Sender reported on every receipt.
pub const MOCK_SENDER: Address = Address::repeat_byte(0x5e);

impl MockDelivery {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		// A panicking test poisons the lock; the data is still usable.
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Transactions submitted so far, in order.
	pub fn submissions(&self) -> Vec<Transaction> {
		self.state().submissions.clone()
	}

	/// Rejects the next `count` submissions with a network error.
	pub fn fail_submissions(&self, count: usize) {
		self.state().failures_left = count;
	}

	/// Answers calls to `to` with exactly `data`.
	pub fn set_call_response(&self, to: Address, data: Bytes, response: Bytes) {
		self.state().exact_calls.insert((to, data), response);
	}

	/// Answers any call to `to` starting with `selector`. Exact matches win.
	pub fn set_selector_response(&self, to: Address, selector: [u8; 4], response: Bytes) {
		self.state().selector_calls.insert((to, selector), response);
	}

	pub fn set_storage(&self, address: Address, slot: U256, value: B256) {
		self.state().storage.insert((address, slot), value);
	}

	pub fn push_log(&self, log: Log) {
		self.state().logs.push(log);
	}

	pub fn set_fee_data(&self, fee_data: FeeData) {
		self.state().fee_data = Some(fee_data);
	}

	pub fn set_block_timestamp(&self, timestamp: u64) {
		self.state().block_timestamp = timestamp;
	}
}

#[async_trait]
impl DeliveryInterface for MockDelivery {
	async fn submit(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError> {
		let mut state = self.state();
		if state.failures_left > 0 {
			state.failures_left -= 1;
			return Err(DeliveryError::Network("injected submission failure".into()));
		}
		state.submissions.push(tx);
		let n = state.submissions.len() as u64;
		Ok(TransactionHash(B256::from(U256::from(n))))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		_confirmations: u64,
	) -> Result<TransactionReceipt, DeliveryError> {
		let state = self.state();
		let index = usize::try_from(U256::from_be_bytes(hash.0 .0))
			.ok()
			.filter(|i| *i >= 1 && *i <= state.submissions.len())
			.ok_or_else(|| DeliveryError::Network(format!("Unknown transaction {}", hash)))?;

		let tx = &state.submissions[index - 1];
		let creations_so_far = state.submissions[..index]
			.iter()
			.filter(|t| t.to.is_none())
			.count();

		Ok(TransactionReceipt {
			hash: *hash,
			block_number: index as u64,
			success: true,
			contract_address: tx.to.is_none().then(|| created_address(creations_so_far)),
			from: MOCK_SENDER,
		})
	}

	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeliveryError> {
		let state = self.state();
		if let Some(response) = state.exact_calls.get(&(to, data.clone())) {
			return Ok(response.clone());
		}
		let selector: Option<[u8; 4]> = data.get(..4).and_then(|s| s.try_into().ok());
		selector
			.and_then(|selector| state.selector_calls.get(&(to, selector)).cloned())
			.ok_or_else(|| DeliveryError::Network(format!("Unexpected call to {}: {}", to, data)))
	}

	async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256, DeliveryError> {
		Ok(self
			.state()
			.storage
			.get(&(address, slot))
			.copied()
			.unwrap_or_default())
	}

	async fn get_fee_data(&self) -> Result<FeeData, DeliveryError> {
		Ok(self.state().fee_data.unwrap_or(FeeData {
			gas_price: 1_000_000_000,
			max_fee_per_gas: None,
			max_priority_fee_per_gas: None,
		}))
	}

	async fn get_block_timestamp(&self) -> Result<u64, DeliveryError> {
		Ok(self.state().block_timestamp)
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DeliveryError> {
		Ok(self
			.state()
			.logs
			.iter()
			.filter(|log| {
				log.address == filter.address
					&& log.topics.first() == Some(&filter.event_signature)
			})
			.cloned()
			.collect())
	}
}
