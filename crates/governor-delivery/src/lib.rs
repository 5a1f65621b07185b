//! Chain client for the governor tool.
//!
//! [`DeliveryInterface`] is the capability the rest of the workspace needs from
//! a chain: submit a transaction, wait for it, read contract state, the fee
//! market and event logs. [`DeliveryService`] binds one implementation to the
//! active network and attaches the run's [`FeeOverrides`] to every submission.

use async_trait::async_trait;
use governor_types::{
	Address, Bytes, FeeData, FeeOverrides, ImplementationRegistry, Log, LogFilter, NetworkConfig,
	SecretString, Transaction, TransactionHash, TransactionReceipt, B256, U256,
};
use thiserror::Error;

pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
}

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Errors that can occur during transaction delivery operations.
#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Chain access needed by deployment and governance flows.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Signs and broadcasts `tx`, returning its hash.
	async fn submit(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError>;

	/// Waits until `hash` is included with `confirmations` blocks on top.
	///
	/// A reverted transaction is an error.
	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, DeliveryError>;

	/// Read-only call against the latest block.
	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeliveryError>;

	async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256, DeliveryError>;

	async fn get_fee_data(&self) -> Result<FeeData, DeliveryError>;

	/// Timestamp of the latest block.
	async fn get_block_timestamp(&self) -> Result<u64, DeliveryError>;

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DeliveryError>;
}

/// Builds a chain client for one network, signing with `private_key`.
pub type DeliveryFactory =
	fn(&NetworkConfig, &SecretString) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

/// Registry trait for delivery implementations.
pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// Returns `(name, factory)` for every delivery implementation.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::evm::alloy;

	vec![(alloy::Registry::NAME, alloy::Registry::factory())]
}

/// Chain client bound to the active network.
pub struct DeliveryService {
	implementation: Box<dyn DeliveryInterface>,
	chain_id: u64,
	confirmations: u64,
	fees: FeeOverrides,
}

impl DeliveryService {
	pub fn new(implementation: Box<dyn DeliveryInterface>, chain_id: u64, confirmations: u64) -> Self {
		Self {
			implementation,
			chain_id,
			confirmations: confirmations.max(1),
			fees: FeeOverrides::None,
		}
	}

	pub fn chain_id(&self) -> u64 {
		self.chain_id
	}

	pub fn fee_overrides(&self) -> FeeOverrides {
		self.fees
	}

	/// Reads the fee market once and keeps the result for every later submission.
	pub async fn load_fee_overrides(&mut self, multiplier: u64) -> Result<FeeOverrides, DeliveryError> {
		let fee_data = self.implementation.get_fee_data().await?;
		self.fees = FeeOverrides::from_fee_data(&fee_data, multiplier);
		tracing::info!(fees = ?self.fees, "Loaded fee overrides");
		Ok(self.fees)
	}

	/// Submits `tx` with the fee overrides attached.
	pub async fn submit(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError> {
		let tx = tx.with_fees(&self.fees);
		self.implementation.submit(tx).await
	}

	pub async fn confirm(&self, hash: &TransactionHash) -> Result<TransactionReceipt, DeliveryError> {
		self.implementation
			.wait_for_confirmation(hash, self.confirmations)
			.await
	}

	/// Submits `tx` and waits for its confirmation.
	pub async fn send_and_confirm(
		&self,
		tx: Transaction,
	) -> Result<TransactionReceipt, DeliveryError> {
		let hash = self.submit(tx).await?;
		self.confirm(&hash).await
	}

	/// Calls `to` with `data` and waits for confirmation.
	pub async fn execute(&self, to: Address, data: Bytes) -> Result<TransactionReceipt, DeliveryError> {
		self.send_and_confirm(Transaction::call(to, data, self.chain_id))
			.await
	}

	pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeliveryError> {
		self.implementation.call(to, data).await
	}

	pub async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256, DeliveryError> {
		self.implementation.get_storage_at(address, slot).await
	}

	pub async fn get_block_timestamp(&self) -> Result<u64, DeliveryError> {
		self.implementation.get_block_timestamp().await
	}

	pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DeliveryError> {
		self.implementation.get_logs(filter).await
	}
}
