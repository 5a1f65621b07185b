//! Alloy JSON-RPC chain client.
//!
//! Transactions are signed by the provider's wallet filler, so the configured
//! private key never leaves this module once the provider is built.

use crate::{DeliveryError, DeliveryInterface};
use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::{BlockNumberOrTag, BlockTransactionsKind, Filter, TransactionRequest};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport_http::Http;
use async_trait::async_trait;
use governor_types::{
	FeeData, Log, LogFilter, NetworkConfig, SecretString, Transaction, TransactionHash,
	TransactionReceipt,
};
use std::sync::Arc;
use std::time::Duration;

/// Delay between receipt polls while waiting for confirmations.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

type HttpProvider = Arc<dyn Provider<Http<reqwest::Client>> + Send + Sync>;

/// Chain client over an HTTP JSON-RPC endpoint.
pub struct AlloyDelivery {
	provider: HttpProvider,
	chain_id: u64,
}

impl AlloyDelivery {
	pub fn new(network: &NetworkConfig, signer: PrivateKeySigner) -> Result<Self, DeliveryError> {
		let url = network.rpc_url.parse().map_err(|e| {
			DeliveryError::Configuration(format!("Invalid RPC URL '{}': {}", network.rpc_url, e))
		})?;

		let wallet = EthereumWallet::from(signer.with_chain_id(Some(network.chain_id)));
		let provider = ProviderBuilder::new()
			.with_recommended_fillers()
			.wallet(wallet)
			.on_http(url);

		Ok(Self {
			provider: Arc::new(provider),
			chain_id: network.chain_id,
		})
	}
}

/// Maps a tool transaction onto an RPC request. Unset fields are filled by the provider.
fn to_request(tx: Transaction) -> TransactionRequest {
	let mut request = TransactionRequest::default()
		.input(tx.data.into())
		.value(tx.value);
	request = match tx.to {
		Some(to) => request.to(to),
		None => request.into_create(),
	};
	request.chain_id = Some(tx.chain_id);
	request.nonce = tx.nonce;
	request.gas = tx.gas_limit;
	request.gas_price = tx.gas_price;
	request.max_fee_per_gas = tx.max_fee_per_gas;
	request.max_priority_fee_per_gas = tx.max_priority_fee_per_gas;
	request
}

#[async_trait]
impl DeliveryInterface for AlloyDelivery {
	async fn submit(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError> {
		let is_create = tx.to.is_none();
		let pending = self
			.provider
			.send_transaction(to_request(tx))
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to send transaction: {}", e)))?;

		let tx_hash = *pending.tx_hash();
		tracing::info!(
			tx_hash = %tx_hash,
			chain_id = self.chain_id,
			create = is_create,
			"Submitted transaction"
		);
		Ok(TransactionHash(tx_hash))
	}

	async fn wait_for_confirmation(
		&self,
		hash: &TransactionHash,
		confirmations: u64,
	) -> Result<TransactionReceipt, DeliveryError> {
		loop {
			let receipt = match self.provider.get_transaction_receipt(hash.0).await {
				Ok(Some(receipt)) => receipt,
				Ok(None) => {
					tracing::trace!(tx_hash = %hash, "Transaction not mined yet");
					tokio::time::sleep(POLL_INTERVAL).await;
					continue;
				},
				Err(e) => {
					return Err(DeliveryError::Network(format!(
						"Failed to get receipt: {}",
						e
					)))
				},
			};

			let tx_block = receipt.block_number.unwrap_or_default();
			let current_block = self.provider.get_block_number().await.map_err(|e| {
				DeliveryError::Network(format!("Failed to get block number: {}", e))
			})?;

			// The inclusion block counts as the first confirmation.
			let depth = current_block.saturating_sub(tx_block) + 1;
			if depth < confirmations {
				tracing::debug!(
					tx_hash = %hash,
					remaining = confirmations - depth,
					"Waiting for confirmations"
				);
				tokio::time::sleep(POLL_INTERVAL).await;
				continue;
			}

			if !receipt.status() {
				return Err(DeliveryError::TransactionFailed(format!(
					"Transaction {} reverted in block {}",
					hash, tx_block
				)));
			}

			return Ok(TransactionReceipt {
				hash: TransactionHash(receipt.transaction_hash),
				block_number: tx_block,
				success: true,
				contract_address: receipt.contract_address,
				from: receipt.from,
			});
		}
	}

	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, DeliveryError> {
		let request = TransactionRequest::default().to(to).input(data.into());
		self.provider
			.call(&request)
			.await
			.map_err(|e| DeliveryError::Network(format!("Call to {} failed: {}", to, e)))
	}

	async fn get_storage_at(&self, address: Address, slot: U256) -> Result<B256, DeliveryError> {
		let value = self
			.provider
			.get_storage_at(address, slot)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to read storage: {}", e)))?;
		Ok(B256::from(value.to_be_bytes::<32>()))
	}

	async fn get_fee_data(&self) -> Result<FeeData, DeliveryError> {
		let gas_price = self
			.provider
			.get_gas_price()
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get gas price: {}", e)))?;

		// Pre-London chains have no base fee; fall back to the legacy price.
		let eip1559 = match self.provider.estimate_eip1559_fees(None).await {
			Ok(estimate) => Some(estimate),
			Err(e) => {
				tracing::debug!(error = %e, "EIP-1559 fee estimation unavailable");
				None
			},
		};

		Ok(FeeData {
			gas_price,
			max_fee_per_gas: eip1559.as_ref().map(|e| e.max_fee_per_gas),
			max_priority_fee_per_gas: eip1559.as_ref().map(|e| e.max_priority_fee_per_gas),
		})
	}

	async fn get_block_timestamp(&self) -> Result<u64, DeliveryError> {
		let block = self
			.provider
			.get_block_by_number(BlockNumberOrTag::Latest, BlockTransactionsKind::Hashes)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get latest block: {}", e)))?
			.ok_or_else(|| DeliveryError::Network("Latest block not available".to_string()))?;
		Ok(block.header.timestamp)
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, DeliveryError> {
		let mut rpc_filter = Filter::new()
			.address(filter.address)
			.event_signature(filter.event_signature)
			.from_block(filter.from_block);
		if let Some(to_block) = filter.to_block {
			rpc_filter = rpc_filter.to_block(to_block);
		}

		let logs = self
			.provider
			.get_logs(&rpc_filter)
			.await
			.map_err(|e| DeliveryError::Network(format!("Failed to get logs: {}", e)))?;

		Ok(logs
			.into_iter()
			.map(|log| Log {
				address: log.inner.address,
				topics: log.inner.data.topics().to_vec(),
				data: log.inner.data.data.clone(),
				block_number: log.block_number,
			})
			.collect())
	}
}

/// Creates an alloy chain client for `network`.
pub fn create_http_delivery(
	network: &NetworkConfig,
	private_key: &SecretString,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	let signer: PrivateKeySigner = private_key.with_exposed(|key| {
		key.parse()
			.map_err(|_| DeliveryError::Configuration("Invalid private key format".to_string()))
	})?;

	Ok(Box::new(AlloyDelivery::new(network, signer)?))
}

/// Registry for the alloy delivery implementation.
pub struct Registry;

impl governor_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "evm_alloy";
	type Factory = crate::DeliveryFactory;

	fn factory() -> Self::Factory {
		create_http_delivery
	}
}

impl crate::DeliveryRegistry for Registry {}
