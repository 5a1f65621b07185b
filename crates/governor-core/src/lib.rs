//! Core orchestration of the governor.
//!
//! [`Governor`] ties the registry, the deployer account, chain delivery, the
//! dispatch router and source verification together behind the operations
//! the command line exposes. Instances are assembled by
//! [`builder::GovernorBuilder`].

use alloy_primitives::Address;
use governor_account::AccountService;
use governor_config::Config;
use governor_delivery::{DeliveryError, DeliveryService};
use governor_storage::{RegistryService, StorageError};
use governor_timelock::BufferReport;
use governor_types::{Action, PendingAction, TargetedCall};
use governor_verify::{SweepSummary, VerificationService, VerifyError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod artifacts;
pub mod builder;
pub mod deployer;
pub mod linker;
pub mod proxy;
pub mod router;

pub use artifacts::{ArtifactError, ArtifactStore};
pub use builder::{BuilderError, GovernorBuilder, GovernorFactories};
pub use deployer::{DeployError, DeployRequest, Deployer};
pub use proxy::ProxyInfo;
pub use router::{DispatchCall, DispatchError, DispatchOutcome, DispatchRouter, Executor};

#[derive(Debug, Error)]
pub enum GovernorError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error(transparent)]
	Deploy(#[from] DeployError),
	#[error(transparent)]
	Dispatch(#[from] DispatchError),
	#[error("Verification error: {0}")]
	Verify(#[from] VerifyError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
}

/// Deployed contracts of the whole registry, headed by the active network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySummary {
	pub network: String,
	/// `(key, address)` for every record with an address.
	pub entries: Vec<(String, String)>,
}

impl fmt::Display for RegistrySummary {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "Contracts deployed at {}", self.network)?;
		writeln!(f, "---------------------------------")?;
		writeln!(f, "N# Contracts: {}", self.entries.len())?;
		for (key, address) in &self.entries {
			writeln!(f, "{}: {}", key, address)?;
		}
		Ok(())
	}
}

pub struct Governor {
	config: Config,
	registry: Arc<RegistryService>,
	delivery: Arc<DeliveryService>,
	account: Arc<AccountService>,
	artifacts: Arc<ArtifactStore>,
	verification: Option<Arc<VerificationService>>,
	deployer: Deployer,
	router: DispatchRouter,
}

impl Governor {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		config: Config,
		registry: Arc<RegistryService>,
		delivery: Arc<DeliveryService>,
		account: Arc<AccountService>,
		artifacts: Arc<ArtifactStore>,
		verification: Option<Arc<VerificationService>>,
		deployer: Deployer,
		router: DispatchRouter,
	) -> Self {
		Self {
			config,
			registry,
			delivery,
			account,
			artifacts,
			verification,
			deployer,
			router,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn network(&self) -> &str {
		self.registry.network()
	}

	pub fn executor(&self) -> Executor {
		self.router.executor()
	}

	pub fn registry(&self) -> &Arc<RegistryService> {
		&self.registry
	}

	pub fn delivery(&self) -> &Arc<DeliveryService> {
		&self.delivery
	}

	pub fn account(&self) -> &Arc<AccountService> {
		&self.account
	}

	pub async fn deploy(&self, request: &DeployRequest) -> Result<Address, GovernorError> {
		Ok(self.deployer.deploy(request).await?)
	}

	/// Records a contract deployed by other means.
	pub async fn register(
		&self,
		id: &str,
		address: Address,
		verifiable: bool,
	) -> Result<(), GovernorError> {
		Ok(self.deployer.register(id, address, verifiable).await?)
	}

	pub async fn dispatch(&self, call: DispatchCall) -> Result<DispatchOutcome, GovernorError> {
		Ok(self.router.dispatch(call).await?)
	}

	pub async fn dispatch_many(
		&self,
		calls: &[DispatchCall],
	) -> Result<DispatchOutcome, GovernorError> {
		Ok(self.router.dispatch_many(calls).await?)
	}

	pub async fn propose_buffered(&self) -> Result<DispatchOutcome, GovernorError> {
		Ok(self.router.propose_buffered().await?)
	}

	/// Queues every buffered action that is not on the executor yet.
	pub async fn queue_buffered(&self) -> Result<BufferReport, GovernorError> {
		let timelock = self.router.timelock().await?;
		Ok(timelock
			.queue_buffered()
			.await
			.map_err(DispatchError::from)?)
	}

	/// Executes every buffered action that is queued on the executor.
	pub async fn execute_buffered(&self) -> Result<BufferReport, GovernorError> {
		let timelock = self.router.timelock().await?;
		Ok(timelock
			.execute_buffered()
			.await
			.map_err(DispatchError::from)?)
	}

	/// Calls held in the local time-lock buffer.
	pub async fn decode_buffered(&self) -> Result<Vec<PendingAction>, GovernorError> {
		Ok(self.registry.pending_actions().await?)
	}

	/// Actions queued on the executor and still pending.
	pub async fn decode_queued(&self) -> Result<Vec<Action>, GovernorError> {
		let timelock = self.router.timelock().await?;
		Ok(timelock
			.queued_actions()
			.await
			.map_err(DispatchError::from)?)
	}

	pub async fn decode_safe(&self) -> Result<Vec<TargetedCall>, GovernorError> {
		Ok(self.router.decode_safe().await?)
	}

	/// Verifies every eligible contract that is not verified yet.
	pub async fn verify_all(&self) -> Result<SweepSummary, GovernorError> {
		let verification = self
			.verification
			.as_ref()
			.ok_or_else(|| GovernorError::Config("Verification is not configured".to_string()))?;
		Ok(verification.verify_all(self.artifacts.as_ref()).await?)
	}

	pub async fn proxy_info(&self, proxy: Address) -> Result<ProxyInfo, GovernorError> {
		Ok(proxy::proxy_info(&self.delivery, proxy).await?)
	}

	/// Removes every registry record of every network.
	pub async fn delete_db(&self) -> Result<(), GovernorError> {
		self.registry.clear().await?;
		tracing::info!(network = %self.network(), "Cleared registry");
		Ok(())
	}

	/// Every registry record with an address, whatever its network.
	pub async fn summary(&self) -> Result<RegistrySummary, GovernorError> {
		Ok(RegistrySummary {
			network: self.network().to_string(),
			entries: self.registry.summary().await?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_sol_types::{SolCall, SolValue};
	use governor_config::builders::config::ConfigBuilder;
	use governor_delivery::testing::MockDelivery;
	use governor_storage::implementations::file::FileStorage;
	use governor_timelock::codec::IExecutorWithTimelock::{
		getDelayCall, isActionQueuedCall, GRACE_PERIODCall,
	};
	use governor_types::{RegistryRecord, TIME_LOCK_ID, U256};

	const TIME_LOCK: Address = Address::repeat_byte(0x71);

	async fn governor(executor: &str, mock: MockDelivery) -> Governor {
		GovernorBuilder::new(ConfigBuilder::new().executor(executor).build())
			.with_delivery(Box::new(mock))
			.build(GovernorFactories::default())
			.await
			.unwrap()
	}

	fn timelock_responses(mock: &MockDelivery) {
		mock.set_block_timestamp(1_000_000);
		for (selector, value) in [
			(getDelayCall::SELECTOR, U256::from(86400).abi_encode()),
			(GRACE_PERIODCall::SELECTOR, U256::from(3600).abi_encode()),
			(isActionQueuedCall::SELECTOR, false.abi_encode()),
		] {
			mock.set_selector_response(TIME_LOCK, selector, value.into());
		}
	}

	#[test]
	fn test_summary_format() {
		let summary = RegistrySummary {
			network: "sepolia".to_string(),
			entries: vec![
				("Pool.sepolia".to_string(), "0x01".to_string()),
				("Oracle.sepolia".to_string(), "0x02".to_string()),
			],
		};
		assert_eq!(
			summary.to_string(),
			"Contracts deployed at sepolia\n\
			 ---------------------------------\n\
			 N# Contracts: 2\n\
			 Pool.sepolia: 0x01\n\
			 Oracle.sepolia: 0x02\n"
		);
	}

	#[tokio::test]
	async fn test_register_summary_and_delete() {
		let g = governor("", MockDelivery::new()).await;
		g.register("Pool", Address::repeat_byte(0x11), false)
			.await
			.unwrap();
		g.registry()
			.set("Empty", &RegistryRecord::default())
			.await
			.unwrap();

		let summary = g.summary().await.unwrap();
		assert_eq!(summary.entries.len(), 1);
		assert_eq!(
			summary.entries[0].1,
			Address::repeat_byte(0x11).to_checksum(None)
		);

		g.delete_db().await.unwrap();
		assert!(g.summary().await.unwrap().entries.is_empty());
	}

	#[tokio::test]
	async fn test_summary_spans_networks() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("deployed-contracts.json");
		let mut file = toml::map::Map::new();
		file.insert(
			"storage_path".to_string(),
			toml::Value::String(path.to_string_lossy().to_string()),
		);
		let mut config = ConfigBuilder::new().storage_primary("file").build();
		config
			.storage
			.implementations
			.insert("file".to_string(), toml::Value::Table(file));

		let g = GovernorBuilder::new(config)
			.with_delivery(Box::new(MockDelivery::new()))
			.build(GovernorFactories::default())
			.await
			.unwrap();
		g.register("Pool", Address::repeat_byte(0x11), false)
			.await
			.unwrap();

		let sepolia = RegistryService::new(Box::new(FileStorage::new(path)), "sepolia");
		sepolia
			.upsert("Oracle", &Address::repeat_byte(0x22).to_checksum(None), None, false)
			.await
			.unwrap();

		let summary = g.summary().await.unwrap();
		assert_eq!(summary.network, "anvil");
		let keys: Vec<&str> = summary.entries.iter().map(|(k, _)| k.as_str()).collect();
		assert_eq!(keys, vec!["Oracle.sepolia", "Pool.anvil"]);

		g.delete_db().await.unwrap();
		assert!(sepolia.list().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_buffered_flow_requires_timelock() {
		let g = governor("TimeLock", MockDelivery::new()).await;
		assert!(matches!(
			g.queue_buffered().await,
			Err(GovernorError::Dispatch(DispatchError::Invalid(_)))
		));
	}

	#[tokio::test]
	async fn test_dispatch_then_decode_buffered() {
		let mock = MockDelivery::new();
		timelock_responses(&mock);
		let g = governor("TimeLock", mock).await;
		g.register(TIME_LOCK_ID, TIME_LOCK, false).await.unwrap();

		let target = Address::repeat_byte(0xaa);
		g.dispatch(DispatchCall::new(target, vec![0x01, 0x02].into()))
			.await
			.unwrap();

		let buffered = g.decode_buffered().await.unwrap();
		assert_eq!(buffered.len(), 1);
		assert_eq!(buffered[0].action.target, target);
		assert_eq!(buffered[0].action.execution_time, 1_000_000 + 14400);
	}

	#[tokio::test]
	async fn test_verify_all_requires_configuration() {
		let g = governor("", MockDelivery::new()).await;
		assert!(matches!(g.verify_all().await, Err(GovernorError::Config(_))));
	}
}
