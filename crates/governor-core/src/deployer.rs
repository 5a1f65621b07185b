//! Contract deployment.
//!
//! A deployment links libraries, encodes constructor arguments, sends the
//! creation transaction and records the result in the registry. The whole
//! attempt is retried on transient failures; in incremental mode an address
//! already in the registry short-circuits the attempt, so a retry after a
//! recorded deployment never deploys twice.

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::linker::{self, LinkError};
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::{sol, SolCall};
use governor_delivery::{DeliveryError, DeliveryService};
use governor_storage::{RegistryService, StorageError};
use governor_types::{
	BuildArtifact, ConstructorArg, FunctionSignature, PackageMeta, RegistryRecord, Transaction,
};
use governor_verify::{VerificationService, VerifyError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

sol! {
	/// Initializer of the upgradeable proxies this tool deploys.
	function initialize(address implementation, bytes data);
}

#[derive(Debug, Error)]
pub enum DeployError {
	#[error("Artifact error: {0}")]
	Artifact(#[from] ArtifactError),
	#[error("Link error: {0}")]
	Link(#[from] LinkError),
	#[error("Encoding error: {0}")]
	Encoding(String),
	#[error("Invalid arguments: {0}")]
	InvalidArguments(String),
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Verification error: {0}")]
	Verification(#[from] VerifyError),
	#[error("Deployment of {0} returned no contract address")]
	MissingAddress(String),
}

impl DeployError {
	/// Whether another attempt could succeed.
	///
	/// Delivery, storage and missing-address failures retry the whole attempt.
	/// Linking, encoding and configuration problems fail the same way every
	/// time, so they are fatal and abort immediately instead of being retried.
	pub fn is_retryable(&self) -> bool {
		matches!(
			self,
			DeployError::Delivery(_) | DeployError::Storage(_) | DeployError::MissingAddress(_)
		)
	}
}

/// One contract to deploy.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
	/// Artifact name, `Contract` or `source:Contract`.
	pub artifact: String,
	/// Registry id. Usually the artifact name.
	pub id: String,
	pub args: Vec<ConstructorArg>,
	/// Treat the last two arguments as `(implementation, initData)` for `initialize`.
	pub proxy: bool,
	pub verify: bool,
	pub libraries: Option<BTreeMap<String, String>>,
	pub signatures: Option<Vec<FunctionSignature>>,
}

impl DeployRequest {
	pub fn new(id: &str, args: Vec<ConstructorArg>) -> Self {
		Self {
			artifact: id.to_string(),
			id: id.to_string(),
			args,
			..Default::default()
		}
	}
}

#[derive(Debug, Clone)]
pub struct DeploySettings {
	/// Reuse addresses already in the registry.
	pub incremental: bool,
	/// Total attempts, the first included.
	pub max_retries: u32,
	pub retry_interval: Duration,
	pub version: Option<String>,
}

/// Deploys contracts on the active network.
pub struct Deployer {
	delivery: Arc<DeliveryService>,
	registry: Arc<RegistryService>,
	artifacts: Arc<ArtifactStore>,
	verification: Option<Arc<VerificationService>>,
	settings: DeploySettings,
}

/// What a successful attempt produced.
struct Deployed {
	address: Address,
	/// Set only when a new contract was created.
	record: Option<RegistryRecord>,
}

impl Deployer {
	pub fn new(
		delivery: Arc<DeliveryService>,
		registry: Arc<RegistryService>,
		artifacts: Arc<ArtifactStore>,
		verification: Option<Arc<VerificationService>>,
		settings: DeploySettings,
	) -> Self {
		Self {
			delivery,
			registry,
			artifacts,
			verification,
			settings,
		}
	}

	/// Deploys `request` and returns the contract address.
	///
	/// Verification runs after a fresh deployment and is best-effort; a
	/// missing explorer API key is checked up front and is fatal.
	#[instrument(skip_all, fields(contract = %request.id))]
	pub async fn deploy(&self, request: &DeployRequest) -> Result<Address, DeployError> {
		let verifier = match &self.verification {
			Some(verification) if request.verify => {
				verification.is_verifiable(&request.id)?.then_some(verification)
			},
			_ => None,
		};

		let artifact = self.artifacts.load(&request.artifact).await?;
		let max_attempts = self.settings.max_retries.max(1);
		let mut attempt = 1;

		let deployed = loop {
			match self.try_deploy(request, &artifact).await {
				Ok(deployed) => break deployed,
				Err(e) if e.is_retryable() && attempt < max_attempts => {
					tracing::warn!(
						attempt,
						max_attempts,
						error = %e,
						"Deployment failed, retrying"
					);
					tokio::time::sleep(self.settings.retry_interval).await;
					attempt += 1;
				},
				Err(e) => return Err(e),
			}
		};

		if let (Some(verification), Some(record)) = (verifier, &deployed.record) {
			let libraries = match &record.libraries {
				Some(libraries) => {
					verification
						.library_refs(libraries, self.artifacts.as_ref())
						.await
				},
				None => Vec::new(),
			};
			let args = record.constructor_args.clone().unwrap_or_default();
			if let Err(e) = verification
				.verify_contract(&request.id, &record.address, &artifact, &args, libraries)
				.await
			{
				tracing::warn!(error = %e, "Verification failed");
			}
		}

		Ok(deployed.address)
	}

	async fn try_deploy(
		&self,
		request: &DeployRequest,
		artifact: &BuildArtifact,
	) -> Result<Deployed, DeployError> {
		if self.settings.incremental {
			if let Some(existing) = self.registry.get_address(&request.id).await? {
				let address = existing.parse::<Address>().map_err(|e| {
					DeployError::Encoding(format!("Registry address '{}': {}", existing, e))
				})?;
				tracing::info!(address = %address, "Contract already deployed, skipping");
				return Ok(Deployed {
					address,
					record: None,
				});
			}
		}

		let (constructor_args, initializer) = split_proxy_args(&request.args, request.proxy)?;
		let bytecode = linker::link(artifact, request.libraries.as_ref())?;
		let encoded_args = artifact
			.encode_constructor_args(&constructor_args)
			.map_err(DeployError::Encoding)?;

		let mut init_code = bytecode.to_vec();
		init_code.extend_from_slice(&encoded_args);
		let tx = Transaction::create(init_code.into(), self.delivery.chain_id());

		let receipt = self.delivery.send_and_confirm(tx).await?;
		let address = receipt
			.contract_address
			.ok_or_else(|| DeployError::MissingAddress(request.id.clone()))?;

		tracing::info!(
			address = %address,
			tx_hash = %receipt.hash,
			deployer = %receipt.from,
			network = %self.registry.network(),
			"Deployed contract"
		);

		let record = RegistryRecord {
			address: address.to_checksum(None),
			deployer: Some(receipt.from.to_checksum(None)),
			constructor_args: Some(constructor_args),
			verified: false,
			libraries: request.libraries.as_ref().map(linker::normalize_libraries),
			signatures: request.signatures.clone().filter(|s| !s.is_empty()),
			version: self.settings.version.clone(),
			package: Some(PackageMeta::current()),
		};
		self.registry.set(&request.id, &record).await?;

		if let Some((implementation, data)) = initializer {
			let call = initializeCall {
				implementation,
				data,
			};
			let receipt = self
				.delivery
				.execute(address, call.abi_encode().into())
				.await?;
			tracing::info!(
				implementation = %implementation,
				tx_hash = %receipt.hash,
				"Initialized proxy"
			);
		}

		Ok(Deployed {
			address,
			record: Some(record),
		})
	}

	/// Records an externally deployed contract.
	///
	/// `verifiable` makes the record eligible for the verification sweep.
	pub async fn register(
		&self,
		id: &str,
		address: Address,
		verifiable: bool,
	) -> Result<(), DeployError> {
		self.registry
			.upsert(
				id,
				&address.to_checksum(None),
				self.settings.version.as_deref(),
				verifiable,
			)
			.await?;
		tracing::info!(contract = %id, address = %address, "Registered contract");
		Ok(())
	}
}

/// Splits off the trailing `(implementation, initData)` of a proxy deployment.
fn split_proxy_args(
	args: &[ConstructorArg],
	proxy: bool,
) -> Result<(Vec<ConstructorArg>, Option<(Address, Bytes)>), DeployError> {
	if !proxy {
		return Ok((args.to_vec(), None));
	}

	let [head @ .., implementation, data] = args else {
		return Err(DeployError::InvalidArguments(format!(
			"Proxy deployment needs implementation and init data arguments, got {}",
			args.len()
		)));
	};

	let implementation = implementation
		.to_cli_string()
		.parse::<Address>()
		.map_err(|e| {
			DeployError::InvalidArguments(format!(
				"Invalid implementation '{}': {}",
				implementation, e
			))
		})?;
	let data = data
		.to_cli_string()
		.parse::<Bytes>()
		.map_err(|e| DeployError::InvalidArguments(format!("Invalid init data '{}': {}", data, e)))?;

	Ok((head.to_vec(), Some((implementation, data))))
}
