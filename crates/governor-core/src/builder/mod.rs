//! Builder for the governor.
//!
//! Composes a [`Governor`] from the configuration and the factory functions
//! of every pluggable component: registry storage, deployer account, chain
//! delivery, multisig transaction service and source verifier.

use crate::artifacts::ArtifactStore;
use crate::deployer::{DeploySettings, Deployer};
use crate::router::{DispatchRouter, Executor, TimeLockSettings};
use crate::Governor;
use alloy_primitives::Address;
use governor_account::{AccountFactory, AccountService};
use governor_config::Config;
use governor_delivery::{DeliveryFactory, DeliveryInterface, DeliveryService};
use governor_safe::{SafeFactory, SafeInterface, SafeService, SafeSettings};
use governor_storage::{RegistryService, StorageFactory};
use governor_types::{NetworkConfig, SecretString, MULTI_SEND_ID};
use governor_verify::{
	VerificationService, VerificationSettings, VerifierFactory, VerifierInterface,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Delivery implementation used for every network.
const DEFAULT_DELIVERY: &str = "evm_alloy";
/// Multisig service implementation used when a multisig is configured.
const DEFAULT_SAFE_SERVICE: &str = "http";

/// Errors that can occur while building the governor.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every component, keyed by implementation name.
pub struct GovernorFactories {
	pub storage_factories: HashMap<String, StorageFactory>,
	pub account_factories: HashMap<String, AccountFactory>,
	pub delivery_factories: HashMap<String, DeliveryFactory>,
	pub safe_factories: HashMap<String, SafeFactory>,
	pub verifier_factories: HashMap<String, VerifierFactory>,
}

impl Default for GovernorFactories {
	/// Every implementation shipped with the workspace.
	fn default() -> Self {
		fn collect<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
			implementations
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect()
		}

		Self {
			storage_factories: collect(governor_storage::get_all_implementations()),
			account_factories: collect(governor_account::get_all_implementations()),
			delivery_factories: collect(governor_delivery::get_all_implementations()),
			safe_factories: collect(governor_safe::get_all_implementations()),
			verifier_factories: collect(governor_verify::get_all_implementations()),
		}
	}
}

/// Builder for constructing a [`Governor`] with pluggable implementations.
pub struct GovernorBuilder {
	config: Config,
	executor: Option<String>,
	delivery: Option<Box<dyn DeliveryInterface>>,
	safe: Option<Box<dyn SafeInterface>>,
	verifier: Option<Box<dyn VerifierInterface>>,
}

impl GovernorBuilder {
	pub fn new(config: Config) -> Self {
		Self {
			config,
			executor: None,
			delivery: None,
			safe: None,
			verifier: None,
		}
	}

	/// Overrides `governance.executor`.
	pub fn with_executor(mut self, executor: &str) -> Self {
		self.executor = Some(executor.to_string());
		self
	}

	/// Uses `delivery` instead of the delivery factory.
	pub fn with_delivery(mut self, delivery: Box<dyn DeliveryInterface>) -> Self {
		self.delivery = Some(delivery);
		self
	}

	/// Uses `safe` instead of the multisig service factory.
	pub fn with_safe(mut self, safe: Box<dyn SafeInterface>) -> Self {
		self.safe = Some(safe);
		self
	}

	/// Uses `verifier` instead of the configured verifier provider.
	pub fn with_verifier(mut self, verifier: Box<dyn VerifierInterface>) -> Self {
		self.verifier = Some(verifier);
		self
	}

	/// Builds the governor for the configured network.
	pub async fn build(self, factories: GovernorFactories) -> Result<Governor, BuilderError> {
		let config = self.config;
		let network_name = config.deployer.network.clone();
		let network = config
			.active_network()
			.map_err(|e| BuilderError::Config(e.to_string()))?
			.clone();

		// Registry storage
		let primary_storage = &config.storage.primary;
		let storage_config = config
			.storage
			.implementations
			.get(primary_storage)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary storage '{}' has no configuration",
					primary_storage
				))
			})?;
		let storage_factory = factories
			.storage_factories
			.get(primary_storage)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!("storage '{}'", primary_storage))
			})?;
		let storage_backend = storage_factory(storage_config).map_err(|e| {
			tracing::error!(
				component = "storage",
				implementation = %primary_storage,
				error = %e,
				"Failed to create storage implementation"
			);
			BuilderError::Config(format!(
				"Failed to create storage implementation '{}': {}",
				primary_storage, e
			))
		})?;
		tracing::info!(component = "storage", implementation = %primary_storage, "Loaded");
		let registry = Arc::new(RegistryService::new(storage_backend, network_name.clone()));

		// Deployer account
		let primary_account = &config.account.primary;
		let account_config = config
			.account
			.implementations
			.get(primary_account)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Primary account '{}' has no configuration",
					primary_account
				))
			})?;
		let account_factory = factories
			.account_factories
			.get(primary_account)
			.ok_or_else(|| {
				BuilderError::MissingComponent(format!("account '{}'", primary_account))
			})?;
		let account = Arc::new(AccountService::new(account_factory(account_config).map_err(
			|e| {
				BuilderError::Config(format!(
					"Failed to create account implementation '{}': {}",
					primary_account, e
				))
			},
		)?));
		let deployer_address = account
			.get_address()
			.await
			.map_err(|e| BuilderError::Config(format!("Failed to get deployer address: {}", e)))?;
		tracing::info!(component = "account", implementation = %primary_account, address = %deployer_address, "Loaded");

		// Chain delivery
		let delivery_impl = match self.delivery {
			Some(delivery) => delivery,
			None => {
				let factory = factories
					.delivery_factories
					.get(DEFAULT_DELIVERY)
					.ok_or_else(|| {
						BuilderError::MissingComponent(format!("delivery '{}'", DEFAULT_DELIVERY))
					})?;
				factory(&network, &account.get_private_key()).map_err(|e| {
					BuilderError::Config(format!(
						"Failed to create delivery for network '{}': {}",
						network_name, e
					))
				})?
			},
		};
		let mut delivery = DeliveryService::new(
			delivery_impl,
			network.chain_id,
			config.deployer.confirmations,
		);
		if network.live {
			delivery
				.load_fee_overrides(network.fee_multiplier)
				.await
				.map_err(|e| BuilderError::Config(format!("Failed to read fee data: {}", e)))?;
		}
		let delivery = Arc::new(delivery);
		tracing::info!(component = "delivery", network = %network_name, chain_id = network.chain_id, "Loaded");

		let verification = match &config.verification {
			Some(verification_config) => Some(Arc::new(build_verification(
				verification_config,
				&network,
				registry.clone(),
				self.verifier,
				&factories,
			)?)),
			None => None,
		};

		let safe = match config.governance.multisig {
			Some(multisig) => Some(Arc::new(
				build_safe(
					&config,
					&network,
					&network_name,
					multisig,
					&registry,
					account.clone(),
					self.safe,
					&factories,
				)
				.await?,
			)),
			None => None,
		};

		let artifacts = Arc::new(ArtifactStore::new(&config.artifacts.path));
		let deployer = Deployer::new(
			delivery.clone(),
			registry.clone(),
			artifacts.clone(),
			verification.clone(),
			DeploySettings {
				incremental: config.deployer.incremental,
				max_retries: config.deployer.max_retries,
				retry_interval: Duration::from_millis(config.deployer.retry_interval_ms),
				version: config.deployer.package_version.clone(),
			},
		);

		let executor = Executor::from(
			self.executor
				.as_deref()
				.unwrap_or(config.governance.executor.as_str()),
		);
		let router = DispatchRouter::new(
			executor,
			delivery.clone(),
			registry.clone(),
			safe,
			TimeLockSettings {
				buffering_time: config.governance.buffering_time,
				default_operation: config.governance.default_operation,
			},
		);
		tracing::info!(component = "governance", executor = %executor, "Loaded");

		Ok(Governor::new(
			config,
			registry,
			delivery,
			account,
			artifacts,
			verification,
			deployer,
			router,
		))
	}
}

fn build_verification(
	verification_config: &governor_config::VerificationConfig,
	network: &NetworkConfig,
	registry: Arc<RegistryService>,
	verifier: Option<Box<dyn VerifierInterface>>,
	factories: &GovernorFactories,
) -> Result<VerificationService, BuilderError> {
	let api_key = verification_config
		.api_key
		.clone()
		.unwrap_or_else(|| SecretString::from(""));
	let verifier = match verifier {
		Some(verifier) => verifier,
		None => {
			let provider = &verification_config.provider;
			let factory = factories.verifier_factories.get(provider).ok_or_else(|| {
				BuilderError::MissingComponent(format!("verifier '{}'", provider))
			})?;
			factory(&api_key).map_err(|e| {
				BuilderError::Config(format!("Failed to create verifier '{}': {}", provider, e))
			})?
		},
	};

	let service = VerificationService::new(
		verifier,
		registry,
		VerificationSettings {
			chain_id: network.chain_id,
			rpc_url: network.rpc_url.clone(),
			explorer_api_url: network.explorer_api_url.clone(),
			has_api_key: !api_key.is_empty(),
			contracts: verification_config.contracts.clone(),
			compiler_version: verification_config.compiler_version.clone(),
			optimizer_runs: verification_config.optimizer_runs,
			jobs: verification_config.jobs,
		},
	)
	.map_err(|e| BuilderError::Config(e.to_string()))?;

	tracing::info!(component = "verification", provider = %verification_config.provider, "Loaded");
	Ok(service)
}

#[allow(clippy::too_many_arguments)]
async fn build_safe(
	config: &Config,
	network: &NetworkConfig,
	network_name: &str,
	multisig: Address,
	registry: &RegistryService,
	account: Arc<AccountService>,
	safe: Option<Box<dyn SafeInterface>>,
	factories: &GovernorFactories,
) -> Result<SafeService, BuilderError> {
	let multisend = match config.governance.multisend {
		Some(multisend) => multisend,
		None => registry
			.get_address(MULTI_SEND_ID)
			.await
			.map_err(|e| BuilderError::Config(e.to_string()))?
			.and_then(|a| a.parse::<Address>().ok())
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"No multi-send address configured or registered as {} on {}",
					MULTI_SEND_ID, network_name
				))
			})?,
	};

	let implementation = match safe {
		Some(safe) => safe,
		None => {
			let url = network.safe_tx_service_url(network_name);
			let factory = factories
				.safe_factories
				.get(DEFAULT_SAFE_SERVICE)
				.ok_or_else(|| {
					BuilderError::MissingComponent(format!("safe '{}'", DEFAULT_SAFE_SERVICE))
				})?;
			factory(&url).map_err(|e| {
				BuilderError::Config(format!("Failed to create multisig service client: {}", e))
			})?
		},
	};

	tracing::info!(component = "safe", safe = %multisig, multisend = %multisend, "Loaded");
	Ok(SafeService::new(
		implementation,
		account,
		SafeSettings {
			chain_id: network.chain_id,
			safe: multisig,
			multisend,
			nonce_override: config.governance.multisig_nonce,
			chunk_size: config.governance.chunk_size,
		},
	))
}

#[cfg(test)]
mod tests {
	use super::*;
	use governor_config::builders::config::ConfigBuilder;
	use governor_delivery::testing::MockDelivery;
	use governor_safe::testing::MockSafe;
	use governor_types::FeeData;

	#[tokio::test]
	async fn test_builds_from_defaults() {
		let config = ConfigBuilder::new().executor("Run").build();
		let governor = GovernorBuilder::new(config)
			.with_delivery(Box::new(MockDelivery::new()))
			.build(GovernorFactories::default())
			.await
			.unwrap();

		assert_eq!(governor.network(), "anvil");
		assert_eq!(governor.executor(), Executor::Run);
		assert!(governor.summary().await.unwrap().entries.is_empty());
	}

	#[tokio::test]
	async fn test_executor_override() {
		let config = ConfigBuilder::new().executor("Run").build();
		let governor = GovernorBuilder::new(config)
			.with_executor("TimeLock")
			.with_delivery(Box::new(MockDelivery::new()))
			.build(GovernorFactories::default())
			.await
			.unwrap();
		assert_eq!(governor.executor(), Executor::TimeLock);
	}

	#[tokio::test]
	async fn test_live_network_loads_fee_overrides() {
		let mock = MockDelivery::new();
		mock.set_fee_data(FeeData {
			gas_price: 10,
			max_fee_per_gas: Some(40),
			max_priority_fee_per_gas: Some(2),
		});
		let config = ConfigBuilder::new().live(true).build();
		let governor = GovernorBuilder::new(config)
			.with_delivery(Box::new(mock))
			.build(GovernorFactories::default())
			.await
			.unwrap();
		assert_ne!(
			governor.delivery().fee_overrides(),
			governor_types::FeeOverrides::None
		);
	}

	#[tokio::test]
	async fn test_multisig_requires_multisend_address() {
		let mut config = ConfigBuilder::new().build();
		config.governance.multisig = Some(Address::repeat_byte(0x5a));
		let result = GovernorBuilder::new(config)
			.with_delivery(Box::new(MockDelivery::new()))
			.with_safe(Box::new(MockSafe::new()))
			.build(GovernorFactories::default())
			.await;
		assert!(matches!(result, Err(BuilderError::Config(_))));
	}

	#[tokio::test]
	async fn test_unknown_storage_is_missing_component() {
		let mut config = ConfigBuilder::new().build();
		config.storage.primary = "redis".to_string();
		config
			.storage
			.implementations
			.insert("redis".to_string(), toml::Value::Table(Default::default()));
		let result = GovernorBuilder::new(config)
			.with_delivery(Box::new(MockDelivery::new()))
			.build(GovernorFactories::default())
			.await;
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}
}
