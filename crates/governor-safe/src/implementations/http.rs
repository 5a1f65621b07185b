//! Safe Transaction Service client.
//!
//! Talks to the hosted service's v1 REST API. Addresses are sent checksummed
//! because the service rejects lowercase ones.

use crate::{PendingSafeTransaction, SafeError, SafeInterface, SafeProposal, SafeTransactionData};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor_types::{Address, Bytes, B256, U256};
use reqwest::Client;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one service deployment.
pub struct SafeTransactionService {
	client: Client,
	base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateRequest {
	to: String,
	value: String,
	data: Option<String>,
	operation: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
	#[serde(deserialize_with = "number_or_string")]
	safe_tx_gas: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProposeRequest {
	to: String,
	value: String,
	data: Option<String>,
	operation: u8,
	safe_tx_gas: String,
	base_gas: String,
	gas_price: String,
	gas_token: String,
	refund_receiver: Option<String>,
	nonce: u64,
	contract_transaction_hash: String,
	sender: String,
	signature: String,
	origin: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SafeInfoResponse {
	#[serde(deserialize_with = "number_or_string")]
	nonce: u64,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
	next: Option<String>,
	results: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultisigTransactionResponse {
	to: Address,
	#[serde(default)]
	data: Option<Bytes>,
	#[serde(deserialize_with = "number_or_string")]
	nonce: u64,
	submission_date: String,
	#[serde(default)]
	safe_tx_hash: Option<B256>,
}

/// The service reports nonces and gas either as JSON numbers or strings.
fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
	match serde_json::Value::deserialize(deserializer)? {
		serde_json::Value::Number(n) => n
			.as_u64()
			.ok_or_else(|| de::Error::custom(format!("expected unsigned integer, got {}", n))),
		serde_json::Value::String(s) => s.parse().map_err(de::Error::custom),
		other => Err(de::Error::custom(format!(
			"expected number or string, got {}",
			other
		))),
	}
}

fn optional_data(data: &Bytes) -> Option<String> {
	(!data.is_empty()).then(|| data.to_string())
}

impl TryFrom<MultisigTransactionResponse> for PendingSafeTransaction {
	type Error = SafeError;

	fn try_from(tx: MultisigTransactionResponse) -> Result<Self, Self::Error> {
		let submission_date = DateTime::parse_from_rfc3339(&tx.submission_date)
			.map_err(|e| {
				SafeError::Service(format!(
					"Invalid submission date '{}': {}",
					tx.submission_date, e
				))
			})?
			.with_timezone(&Utc);

		Ok(Self {
			to: tx.to,
			data: tx.data,
			nonce: tx.nonce,
			submission_date,
			safe_tx_hash: tx.safe_tx_hash,
		})
	}
}

impl SafeTransactionService {
	pub fn new(base_url: &str) -> Result<Self, SafeError> {
		let base_url = base_url.trim_end_matches('/');
		if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
			return Err(SafeError::Configuration(format!(
				"Invalid Safe service URL '{}'",
				base_url
			)));
		}

		let client = Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| SafeError::Http(format!("Failed to create HTTP client: {}", e)))?;

		Ok(Self {
			client,
			base_url: base_url.to_string(),
		})
	}

	fn safe_url(&self, safe: Address, path: &str) -> String {
		format!(
			"{}/api/v1/safes/{}/{}",
			self.base_url,
			safe.to_checksum(None),
			path
		)
	}

	async fn check(response: reqwest::Response) -> Result<reqwest::Response, SafeError> {
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		let body = response.text().await.unwrap_or_default();
		Err(SafeError::Service(format!("{}: {}", status, body)))
	}

	async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, SafeError> {
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| SafeError::Http(format!("GET {} failed: {}", url, e)))?;
		Self::check(response)
			.await?
			.json::<T>()
			.await
			.map_err(|e| SafeError::Service(format!("Unexpected response from {}: {}", url, e)))
	}

	async fn post_json<B: Serialize>(
		&self,
		url: &str,
		body: &B,
	) -> Result<reqwest::Response, SafeError> {
		let response = self
			.client
			.post(url)
			.json(body)
			.send()
			.await
			.map_err(|e| SafeError::Http(format!("POST {} failed: {}", url, e)))?;
		Self::check(response).await
	}

	async fn safe_nonce(&self, safe: Address) -> Result<u64, SafeError> {
		let info: SafeInfoResponse = self.get_json(&self.safe_url(safe, "")).await?;
		Ok(info.nonce)
	}

	/// Follows pagination of the unexecuted transactions from `nonce` on.
	async fn unexecuted_from(
		&self,
		safe: Address,
		nonce: u64,
	) -> Result<Vec<PendingSafeTransaction>, SafeError> {
		let mut url = Some(format!(
			"{}?executed=false&nonce__gte={}",
			self.safe_url(safe, "multisig-transactions/"),
			nonce
		));

		let mut pending = Vec::new();
		while let Some(current) = url.take() {
			let page: Page<MultisigTransactionResponse> = self.get_json(&current).await?;
			for tx in page.results {
				pending.push(PendingSafeTransaction::try_from(tx)?);
			}
			url = page.next;
		}
		Ok(pending)
	}
}

#[async_trait]
impl SafeInterface for SafeTransactionService {
	async fn next_nonce(&self, safe: Address) -> Result<u64, SafeError> {
		let nonce = self.safe_nonce(safe).await?;
		let pending = self.unexecuted_from(safe, nonce).await?;
		Ok(pending
			.iter()
			.map(|tx| tx.nonce + 1)
			.max()
			.unwrap_or(nonce)
			.max(nonce))
	}

	async fn estimate(
		&self,
		safe: Address,
		transaction: &SafeTransactionData,
	) -> Result<U256, SafeError> {
		let body = EstimateRequest {
			to: transaction.to.to_checksum(None),
			value: transaction.value.to_string(),
			data: optional_data(&transaction.data),
			operation: transaction.operation.as_u8(),
		};
		let response = self
			.post_json(&self.safe_url(safe, "multisig-transactions/estimations/"), &body)
			.await?
			.json::<EstimateResponse>()
			.await
			.map_err(|e| SafeError::Service(format!("Unexpected estimate response: {}", e)))?;
		Ok(U256::from(response.safe_tx_gas))
	}

	async fn propose(&self, proposal: &SafeProposal) -> Result<(), SafeError> {
		let tx = &proposal.transaction;
		let body = ProposeRequest {
			to: tx.to.to_checksum(None),
			value: tx.value.to_string(),
			data: optional_data(&tx.data),
			operation: tx.operation.as_u8(),
			safe_tx_gas: tx.safe_tx_gas.to_string(),
			base_gas: tx.base_gas.to_string(),
			gas_price: tx.gas_price.to_string(),
			gas_token: tx.gas_token.to_checksum(None),
			refund_receiver: (tx.refund_receiver != Address::ZERO)
				.then(|| tx.refund_receiver.to_checksum(None)),
			nonce: tx.nonce,
			contract_transaction_hash: proposal.safe_tx_hash.to_string(),
			sender: proposal.sender.to_checksum(None),
			signature: proposal.signature.to_string(),
			origin: proposal.origin.clone(),
		};
		self.post_json(&self.safe_url(proposal.safe, "multisig-transactions/"), &body)
			.await?;
		Ok(())
	}

	async fn pending_transactions(
		&self,
		safe: Address,
	) -> Result<Vec<PendingSafeTransaction>, SafeError> {
		let nonce = self.safe_nonce(safe).await?;
		self.unexecuted_from(safe, nonce).await
	}
}

/// Creates a Safe Transaction Service client.
pub fn create_http_safe(base_url: &str) -> Result<Box<dyn SafeInterface>, SafeError> {
	Ok(Box::new(SafeTransactionService::new(base_url)?))
}

/// Registry for the HTTP multisig service implementation.
pub struct Registry;

impl governor_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::SafeFactory;

	fn factory() -> Self::Factory {
		create_http_safe
	}
}

impl crate::SafeRegistry for Registry {}
