//! Signing accounts.
//!
//! The deployer account signs every transaction the tool sends and, when
//! proposing to a multisig, the EIP-712 hash of the proposal.

use async_trait::async_trait;
use governor_types::{Address, Bytes, ConfigSchema, ImplementationRegistry, SecretString, B256};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// Interface of an account able to sign on behalf of the deployer.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	async fn address(&self) -> Result<Address, AccountError>;

	/// Signs a 32-byte digest without any prefix.
	///
	/// Returns the 65-byte `r || s || v` encoding with `v` in {27, 28}.
	async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError>;

	/// The private key, `0x` prefixed. Handed to the chain client's wallet.
	fn get_private_key(&self) -> SecretString;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

/// Registry trait for account implementations.
pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// Returns `(name, factory)` for every account implementation.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Service wrapping the configured account implementation.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	pub async fn sign_hash(&self, hash: &B256) -> Result<Bytes, AccountError> {
		self.implementation.sign_hash(hash).await
	}

	pub fn get_private_key(&self) -> SecretString {
		self.implementation.get_private_key()
	}
}
