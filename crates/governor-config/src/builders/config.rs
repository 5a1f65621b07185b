//! Configuration builder for tests.
//!
//! Produces a [`Config`] for a local `anvil` node with in-memory storage and
//! the well-known first anvil key, so tests only spell out what they care about.

use crate::{
	AccountConfig, ArtifactsConfig, Config, DeployerConfig, GovernanceConfig, StorageConfig,
	VerificationConfig,
};
use governor_types::{Address, NetworkConfig, SecretString, TimeLockOperation};
use std::collections::HashMap;

/// First private key of a default anvil node.
pub const ANVIL_PRIVATE_KEY: &str =
	"0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// Fluent builder for test configurations.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	network: String,
	chain_id: u64,
	live: bool,
	explorer_api_url: Option<String>,
	incremental: bool,
	max_retries: u32,
	retry_interval_ms: u64,
	storage_primary: String,
	governance: GovernanceConfig,
	verification: Option<VerificationConfig>,
	artifacts_path: String,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			network: "anvil".to_string(),
			chain_id: 31337,
			live: false,
			explorer_api_url: None,
			incremental: false,
			max_retries: 1,
			retry_interval_ms: 10,
			storage_primary: "memory".to_string(),
			governance: GovernanceConfig::default(),
			verification: None,
			artifacts_path: "./artifacts".to_string(),
		}
	}

	/// Renames the active network.
	pub fn network(mut self, name: &str, chain_id: u64) -> Self {
		self.network = name.to_string();
		self.chain_id = chain_id;
		self
	}

	pub fn live(mut self, live: bool) -> Self {
		self.live = live;
		self
	}

	pub fn explorer_api_url(mut self, url: &str) -> Self {
		self.explorer_api_url = Some(url.to_string());
		self
	}

	pub fn incremental(mut self, incremental: bool) -> Self {
		self.incremental = incremental;
		self
	}

	pub fn retries(mut self, max_retries: u32, interval_ms: u64) -> Self {
		self.max_retries = max_retries;
		self.retry_interval_ms = interval_ms;
		self
	}

	pub fn storage_primary(mut self, primary: &str) -> Self {
		self.storage_primary = primary.to_string();
		self
	}

	pub fn executor(mut self, executor: &str) -> Self {
		self.governance.executor = executor.to_string();
		self
	}

	pub fn multisig(mut self, multisig: Address, multisend: Address) -> Self {
		self.governance.multisig = Some(multisig);
		self.governance.multisend = Some(multisend);
		self
	}

	pub fn multisig_nonce(mut self, nonce: u64) -> Self {
		self.governance.multisig_nonce = Some(nonce);
		self
	}

	pub fn default_operation(mut self, operation: TimeLockOperation) -> Self {
		self.governance.default_operation = operation;
		self
	}

	/// Enables verification with a dummy API key and the given patterns.
	pub fn verification(mut self, contracts: Vec<String>) -> Self {
		self.verification = Some(VerificationConfig {
			provider: "forge".to_string(),
			api_key: Some(SecretString::from("test-api-key")),
			contracts,
			compiler_version: "0.8.10+commit.fc410830".to_string(),
			optimizer_runs: 200,
			jobs: 1,
		});
		self
	}

	pub fn artifacts_path(mut self, path: &str) -> Self {
		self.artifacts_path = path.to_string();
		self
	}

	pub fn build(self) -> Config {
		let mut networks = HashMap::new();
		networks.insert(
			self.network.clone(),
			NetworkConfig {
				chain_id: self.chain_id,
				rpc_url: "http://localhost:8545".to_string(),
				live: self.live,
				fee_multiplier: 1,
				explorer_api_url: self.explorer_api_url,
				safe_tx_service_url: None,
			},
		);

		let mut storage_implementations = HashMap::new();
		storage_implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::map::Map::new()),
		);

		let mut local = toml::map::Map::new();
		local.insert(
			"private_key".to_string(),
			toml::Value::String(ANVIL_PRIVATE_KEY.to_string()),
		);
		let mut account_implementations = HashMap::new();
		account_implementations.insert("local".to_string(), toml::Value::Table(local));

		Config {
			deployer: DeployerConfig {
				network: self.network,
				incremental: self.incremental,
				max_retries: self.max_retries,
				retry_interval_ms: self.retry_interval_ms,
				confirmations: 1,
				verify: false,
				package_version: None,
			},
			networks,
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations: storage_implementations,
			},
			account: AccountConfig {
				primary: "local".to_string(),
				implementations: account_implementations,
			},
			governance: self.governance,
			verification: self.verification,
			artifacts: ArtifactsConfig {
				path: self.artifacts_path,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_built_config_is_consistent() {
		let config = ConfigBuilder::new()
			.network("sepolia", 11155111)
			.executor("Safe")
			.incremental(true)
			.build();

		assert_eq!(config.active_network().unwrap().chain_id, 11155111);
		assert_eq!(config.governance.executor, "Safe");
		assert!(config.deployer.incremental);
		assert!(config.storage.implementations.contains_key("memory"));
		assert!(config.account.implementations.contains_key("local"));
	}
}
