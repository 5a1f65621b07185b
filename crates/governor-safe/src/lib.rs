//! Multisig proposals for the governor tool.
//!
//! [`SafeInterface`] is the transaction service a Safe account's owners
//! coordinate through. [`SafeService`] builds, signs and proposes Safe
//! transactions on behalf of the deployer account, batching several calls
//! into multi-send proposals, and reads pending proposals back for review.

use alloy_primitives::keccak256;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor_account::AccountService;
use governor_types::utils::{compute_domain_hash, compute_final_digest, Eip712AbiEncoder, SAFE_TX_TYPE};
use governor_types::{
	Address, Bytes, ImplementationRegistry, MetaTransaction, Operation, TargetedCall, B256, U256,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

pub mod multisend;

pub mod implementations {
	pub mod http;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Default number of calls packed into one multi-send proposal.
pub const DEFAULT_CHUNK_SIZE: usize = 45;

/// Errors that can occur while talking to the multisig service.
#[derive(Debug, Error)]
pub enum SafeError {
	#[error("HTTP error: {0}")]
	Http(String),
	#[error("Service error: {0}")]
	Service(String),
	#[error("Signing error: {0}")]
	Signing(String),
	#[error("Encoding error: {0}")]
	Encoding(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// The Safe transaction members covered by the owners' signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeTransactionData {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	pub operation: Operation,
	pub safe_tx_gas: U256,
	pub base_gas: U256,
	pub gas_price: U256,
	pub gas_token: Address,
	pub refund_receiver: Address,
	pub nonce: u64,
}

impl SafeTransactionData {
	/// A zero-value transaction with no gas refund.
	pub fn new(to: Address, data: Bytes, operation: Operation, nonce: u64) -> Self {
		Self {
			to,
			value: U256::ZERO,
			data,
			operation,
			safe_tx_gas: U256::ZERO,
			base_gas: U256::ZERO,
			gas_price: U256::ZERO,
			gas_token: Address::ZERO,
			refund_receiver: Address::ZERO,
			nonce,
		}
	}

	/// EIP-712 hash of the transaction for the Safe at `safe` on `chain_id`.
	pub fn hash(&self, chain_id: u64, safe: &Address) -> B256 {
		let mut enc = Eip712AbiEncoder::new();
		enc.push_b256(&keccak256(SAFE_TX_TYPE.as_bytes()));
		enc.push_address(&self.to);
		enc.push_u256(self.value);
		enc.push_bytes_hash(&self.data);
		enc.push_u8(self.operation.as_u8());
		enc.push_u256(self.safe_tx_gas);
		enc.push_u256(self.base_gas);
		enc.push_u256(self.gas_price);
		enc.push_address(&self.gas_token);
		enc.push_address(&self.refund_receiver);
		enc.push_u256(U256::from(self.nonce));
		let struct_hash = keccak256(enc.finish());

		compute_final_digest(&compute_domain_hash(chain_id, safe), &struct_hash)
	}
}

/// A signed transaction ready to be proposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeProposal {
	pub safe: Address,
	pub transaction: SafeTransactionData,
	pub safe_tx_hash: B256,
	pub sender: Address,
	pub signature: Bytes,
	pub origin: Option<String>,
}

/// A proposal the service reports as not yet executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSafeTransaction {
	pub to: Address,
	pub data: Option<Bytes>,
	pub nonce: u64,
	pub submission_date: DateTime<Utc>,
	pub safe_tx_hash: Option<B256>,
}

/// Interface of a multisig transaction service.
#[async_trait]
pub trait SafeInterface: Send + Sync {
	/// Nonce the next proposal for `safe` should use, counting pending ones.
	async fn next_nonce(&self, safe: Address) -> Result<u64, SafeError>;

	/// Pre-flight estimate of `safeTxGas`.
	async fn estimate(
		&self,
		safe: Address,
		transaction: &SafeTransactionData,
	) -> Result<U256, SafeError>;

	async fn propose(&self, proposal: &SafeProposal) -> Result<(), SafeError>;

	/// Proposals not executed yet, in service order.
	async fn pending_transactions(
		&self,
		safe: Address,
	) -> Result<Vec<PendingSafeTransaction>, SafeError>;
}

/// Builds a service client for the given base URL.
pub type SafeFactory = fn(&str) -> Result<Box<dyn SafeInterface>, SafeError>;

/// Registry trait for multisig service implementations.
pub trait SafeRegistry: ImplementationRegistry<Factory = SafeFactory> {}

/// Returns `(name, factory)` for every multisig service implementation.
pub fn get_all_implementations() -> Vec<(&'static str, SafeFactory)> {
	use implementations::http;

	vec![(http::Registry::NAME, http::Registry::factory())]
}

/// Multisig parameters of the active network.
#[derive(Debug, Clone)]
pub struct SafeSettings {
	pub chain_id: u64,
	pub safe: Address,
	/// Target of batched proposals, called with `DelegateCall`.
	pub multisend: Address,
	/// Fixed starting nonce. Batches use `nonce + chunk index`.
	pub nonce_override: Option<u64>,
	pub chunk_size: usize,
}

/// Proposes transactions to one Safe.
pub struct SafeService {
	implementation: Box<dyn SafeInterface>,
	account: Arc<AccountService>,
	settings: SafeSettings,
}

impl SafeService {
	pub fn new(
		implementation: Box<dyn SafeInterface>,
		account: Arc<AccountService>,
		settings: SafeSettings,
	) -> Self {
		Self {
			implementation,
			account,
			settings,
		}
	}

	pub fn safe(&self) -> Address {
		self.settings.safe
	}

	pub fn multisend(&self) -> Address {
		self.settings.multisend
	}

	async fn nonce_for(&self, idx: u64) -> Result<u64, SafeError> {
		match self.settings.nonce_override {
			Some(nonce) => Ok(nonce + idx),
			None => self.implementation.next_nonce(self.settings.safe).await,
		}
	}

	/// Signs and proposes a single call.
	///
	/// `idx` offsets a configured nonce override so that consecutive
	/// proposals of one batch do not collide. The pre-flight estimate is
	/// diagnostic only; its failure never blocks the proposal.
	#[instrument(skip_all, fields(to = %to, idx))]
	pub async fn propose(
		&self,
		to: Address,
		data: Bytes,
		operation: Operation,
		idx: u64,
	) -> Result<B256, SafeError> {
		let nonce = self.nonce_for(idx).await?;
		let transaction = SafeTransactionData::new(to, data, operation, nonce);
		let safe_tx_hash = transaction.hash(self.settings.chain_id, &self.settings.safe);

		let signature = self
			.account
			.sign_hash(&safe_tx_hash)
			.await
			.map_err(|e| SafeError::Signing(e.to_string()))?;
		let sender = self
			.account
			.get_address()
			.await
			.map_err(|e| SafeError::Signing(e.to_string()))?;

		tracing::debug!(safe_tx_hash = %safe_tx_hash, nonce, "Signed safe transaction");

		match self
			.implementation
			.estimate(self.settings.safe, &transaction)
			.await
		{
			Ok(safe_tx_gas) => tracing::debug!(%safe_tx_gas, "Estimated safe transaction"),
			Err(e) => tracing::warn!(error = %e, "Safe transaction estimate failed"),
		}

		let proposal = SafeProposal {
			safe: self.settings.safe,
			transaction,
			safe_tx_hash,
			sender,
			signature,
			origin: None,
		};
		self.implementation.propose(&proposal).await?;

		tracing::info!(
			safe = %self.settings.safe,
			safe_tx_hash = %safe_tx_hash,
			nonce,
			"Proposed safe transaction"
		);
		Ok(safe_tx_hash)
	}

	/// Proposes `transactions` as multi-send batches of at most `chunk_size` calls.
	pub async fn propose_batch(
		&self,
		transactions: &[MetaTransaction],
	) -> Result<Vec<B256>, SafeError> {
		let chunk_size = self.settings.chunk_size.max(1);
		let mut hashes = Vec::new();
		for (idx, chunk) in transactions.chunks(chunk_size).enumerate() {
			let data = multisend::encode_multi_send(chunk);
			tracing::debug!(chunk = idx, calls = chunk.len(), "Proposing multi-send batch");
			let hash = self
				.propose(self.settings.multisend, data, Operation::DelegateCall, idx as u64)
				.await?;
			hashes.push(hash);
		}
		Ok(hashes)
	}

	/// Calls carried by the latest pending proposal of every nonce.
	///
	/// Multi-send proposals are expanded into their inner calls; proposals
	/// without data are dropped.
	pub async fn pending_calls(&self) -> Result<Vec<TargetedCall>, SafeError> {
		let pending = self
			.implementation
			.pending_transactions(self.settings.safe)
			.await?;

		let mut calls = Vec::new();
		for tx in latest_per_nonce(pending) {
			let Some(data) = tx.data.filter(|d| !d.is_empty()) else {
				continue;
			};

			if tx.to == self.settings.multisend && multisend::is_multi_send(&data) {
				calls.extend(
					multisend::decode_multi_send(&data)?
						.into_iter()
						.map(|inner| TargetedCall {
							target: inner.to,
							data: inner.data,
						}),
				);
			} else {
				calls.push(TargetedCall {
					target: tx.to,
					data,
				});
			}
		}
		Ok(calls)
	}
}

/// Sorts by nonce then submission date and keeps the last submission per nonce.
pub fn latest_per_nonce(mut pending: Vec<PendingSafeTransaction>) -> Vec<PendingSafeTransaction> {
	pending.sort_by(|a, b| {
		a.nonce
			.cmp(&b.nonce)
			.then(a.submission_date.cmp(&b.submission_date))
	});

	let mut latest: Vec<PendingSafeTransaction> = Vec::with_capacity(pending.len());
	for tx in pending {
		match latest.last_mut() {
			Some(last) if last.nonce == tx.nonce => *last = tx,
			_ => latest.push(tx),
		}
	}
	latest
}
