//! Source verification on block explorers.
//!
//! Verification is best-effort: a failed submission is logged and leaves the
//! registry record unverified so a later sweep can retry it. Only a missing
//! explorer API key for a contract that should be verified is fatal.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use governor_storage::RegistryService;
use governor_types::{
	normalize_library_name, BuildArtifact, Bytes, ConstructorArg,
	ImplementationRegistry, RegistryRecord, SecretString,
};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

pub mod implementations {
	pub mod forge;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Errors that can occur during verification.
#[derive(Debug, Error)]
pub enum VerifyError {
	#[error("Missing explorer API key, required to verify {0}")]
	MissingApiKey(String),
	#[error("Invalid contract pattern '{0}': {1}")]
	InvalidPattern(String, String),
	#[error("Command error: {0}")]
	Command(String),
	#[error("Verification failed: {0}")]
	Failed(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

/// A linked library, as passed to the verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryRef {
	pub source_name: String,
	pub name: String,
	pub address: String,
}

impl LibraryRef {
	/// `source:Name:address`.
	pub fn to_cli_string(&self) -> String {
		format!("{}:{}:{}", self.source_name, self.name, self.address)
	}
}

/// Everything a verifier needs for one contract.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
	pub contract_id: String,
	pub address: String,
	/// `source:Contract`.
	pub fully_qualified_name: String,
	/// ABI-encoded constructor arguments, empty when there are none.
	pub constructor_args: Bytes,
	pub libraries: Vec<LibraryRef>,
	pub chain_id: u64,
	pub rpc_url: String,
	pub explorer_api_url: String,
	pub compiler_version: String,
	pub optimizer_runs: u64,
}

/// Interface of a source verification backend.
#[async_trait]
pub trait VerifierInterface: Send + Sync {
	async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError>;
}

/// Builds a verifier using the explorer API key.
pub type VerifierFactory = fn(&SecretString) -> Result<Box<dyn VerifierInterface>, VerifyError>;

/// Registry trait for verifier implementations.
pub trait VerifierRegistry: ImplementationRegistry<Factory = VerifierFactory> {}

/// Returns `(name, factory)` for every verifier implementation.
pub fn get_all_implementations() -> Vec<(&'static str, VerifierFactory)> {
	use implementations::forge;

	vec![(forge::Registry::NAME, forge::Registry::factory())]
}

/// Compiled artifacts by contract name.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
	async fn load_artifact(&self, name: &str) -> Option<BuildArtifact>;
}

/// Translates a glob into an anchored regex.
///
/// `*` and `?` stay within one path segment, `**` crosses segments and
/// `{a,b}` alternates.
pub fn glob_to_regex(pattern: &str) -> Result<Regex, VerifyError> {
	let mut out = String::from("^");
	let mut chars = pattern.chars().peekable();
	let mut in_braces = false;

	while let Some(c) = chars.next() {
		match c {
			'*' if chars.peek() == Some(&'*') => {
				chars.next();
				out.push_str(".*");
			},
			'*' => out.push_str("[^/]*"),
			'?' => out.push_str("[^/]"),
			'{' if !in_braces => {
				in_braces = true;
				out.push('(');
			},
			'}' if in_braces => {
				in_braces = false;
				out.push(')');
			},
			',' if in_braces => out.push('|'),
			other => out.push_str(&regex::escape(&other.to_string())),
		}
	}
	if in_braces {
		return Err(VerifyError::InvalidPattern(
			pattern.to_string(),
			"unclosed '{'".to_string(),
		));
	}
	out.push('$');

	Regex::new(&out).map_err(|e| VerifyError::InvalidPattern(pattern.to_string(), e.to_string()))
}

/// Verification parameters of the active network.
#[derive(Debug, Clone)]
pub struct VerificationSettings {
	pub chain_id: u64,
	pub rpc_url: String,
	/// Networks without an explorer API are never verified.
	pub explorer_api_url: Option<String>,
	pub has_api_key: bool,
	/// Glob patterns over contract ids. Empty means every contract.
	pub contracts: Vec<String>,
	pub compiler_version: String,
	pub optimizer_runs: u64,
	/// Maximum verifications in flight during a sweep.
	pub jobs: usize,
}

/// Counts of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
	pub verified: usize,
	pub failed: usize,
}

/// Verifies deployed contracts and records the outcome in the registry.
pub struct VerificationService {
	implementation: Box<dyn VerifierInterface>,
	registry: Arc<RegistryService>,
	settings: VerificationSettings,
	patterns: Vec<Regex>,
}

impl VerificationService {
	pub fn new(
		implementation: Box<dyn VerifierInterface>,
		registry: Arc<RegistryService>,
		settings: VerificationSettings,
	) -> Result<Self, VerifyError> {
		let patterns = settings
			.contracts
			.iter()
			.map(|p| glob_to_regex(p))
			.collect::<Result<Vec<_>, _>>()?;

		Ok(Self {
			implementation,
			registry,
			settings,
			patterns,
		})
	}

	/// Whether `contract_id` should be verified on the active network.
	///
	/// Errors when it should but no API key is configured.
	pub fn is_verifiable(&self, contract_id: &str) -> Result<bool, VerifyError> {
		if self.settings.explorer_api_url.is_none() {
			return Ok(false);
		}
		if !self.patterns.is_empty() && !self.patterns.iter().any(|p| p.is_match(contract_id)) {
			return Ok(false);
		}
		if !self.settings.has_api_key {
			return Err(VerifyError::MissingApiKey(contract_id.to_string()));
		}
		Ok(true)
	}

	/// Submits one contract for verification and flags its record on success.
	///
	/// Returns whether verification succeeded. Failures are logged, not raised.
	#[instrument(skip_all, fields(contract = %contract_id, address = %address))]
	pub async fn verify_contract(
		&self,
		contract_id: &str,
		address: &str,
		artifact: &BuildArtifact,
		constructor_args: &[ConstructorArg],
		libraries: Vec<LibraryRef>,
	) -> Result<bool, VerifyError> {
		let Some(explorer_api_url) = self.settings.explorer_api_url.clone() else {
			return Ok(false);
		};

		let encoded = match artifact.encode_constructor_args(constructor_args) {
			Ok(encoded) => encoded,
			Err(e) => {
				tracing::warn!(error = %e, "Cannot encode constructor arguments, skipping verification");
				return Ok(false);
			},
		};

		let request = VerificationRequest {
			contract_id: contract_id.to_string(),
			address: address.to_string(),
			fully_qualified_name: artifact.fully_qualified_name(),
			constructor_args: encoded,
			libraries,
			chain_id: self.settings.chain_id,
			rpc_url: self.settings.rpc_url.clone(),
			explorer_api_url,
			compiler_version: self.settings.compiler_version.clone(),
			optimizer_runs: self.settings.optimizer_runs,
		};

		match self.implementation.verify(&request).await {
			Ok(()) => {
				self.registry
					.mark_verified(contract_id)
					.await
					.map_err(|e| VerifyError::Storage(e.to_string()))?;
				tracing::info!("Verified contract");
				Ok(true)
			},
			Err(e) => {
				tracing::warn!(error = %e, "Verification failed");
				Ok(false)
			},
		}
	}

	/// Resolves the source files of `libraries` through `artifacts`.
	///
	/// Libraries without an artifact get an empty source name.
	pub async fn library_refs(
		&self,
		libraries: &BTreeMap<String, String>,
		artifacts: &dyn ArtifactSource,
	) -> Vec<LibraryRef> {
		let mut refs = Vec::with_capacity(libraries.len());
		for (name, address) in libraries {
			let name = normalize_library_name(name);
			let source_name = artifacts
				.load_artifact(name)
				.await
				.map(|a| a.source_name)
				.unwrap_or_default();
			refs.push(LibraryRef {
				source_name,
				name: name.to_string(),
				address: address.clone(),
			});
		}
		refs
	}

	async fn verify_record(
		&self,
		id: &str,
		record: &RegistryRecord,
		artifacts: &dyn ArtifactSource,
	) -> Result<bool, VerifyError> {
		let Some(artifact) = artifacts.load_artifact(id).await else {
			tracing::warn!(contract = %id, "No artifact found, skipping verification");
			return Ok(false);
		};
		let libraries = match &record.libraries {
			Some(libraries) => self.library_refs(libraries, artifacts).await,
			None => Vec::new(),
		};
		let args = record.constructor_args.clone().unwrap_or_default();
		self.verify_contract(id, &record.address, &artifact, &args, libraries)
			.await
	}

	/// Verifies every eligible, unverified record of the active network.
	pub async fn verify_all(
		&self,
		artifacts: &dyn ArtifactSource,
	) -> Result<SweepSummary, VerifyError> {
		let records = self
			.registry
			.list()
			.await
			.map_err(|e| VerifyError::Storage(e.to_string()))?;

		let mut candidates = Vec::new();
		for (id, record) in records {
			if record.is_verification_eligible()
				&& !record.verified
				&& record.has_valid_address()
				&& self.is_verifiable(&id)?
			{
				candidates.push((id, record));
			}
		}
		tracing::info!(count = candidates.len(), jobs = self.settings.jobs, "Verifying contracts");

		let results: Vec<Result<bool, VerifyError>> = stream::iter(candidates.iter())
			.map(|(id, record)| self.verify_record(id, record, artifacts))
			.buffer_unordered(self.settings.jobs.max(1))
			.collect()
			.await;

		let mut summary = SweepSummary::default();
		for result in results {
			if result? {
				summary.verified += 1;
			} else {
				summary.failed += 1;
			}
		}
		Ok(summary)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use governor_storage::implementations::memory::MemoryStorage;
	use std::collections::HashMap;
	use testing::MockVerifier;

	const FOO: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
	const BAR: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";

	struct Artifacts(HashMap<String, BuildArtifact>);

	#[async_trait]
	impl ArtifactSource for Artifacts {
		async fn load_artifact(&self, name: &str) -> Option<BuildArtifact> {
			self.0.get(name).cloned()
		}
	}

	fn artifact(name: &str, source: &str, inputs: &str) -> BuildArtifact {
		serde_json::from_str(&format!(
			r#"{{"contractName": "{name}", "sourceName": "{source}", "abi": [{{"type": "constructor", "inputs": [{inputs}]}}], "bytecode": "0x"}}"#
		))
		.unwrap()
	}

	fn settings(contracts: &[&str], has_api_key: bool) -> VerificationSettings {
		VerificationSettings {
			chain_id: 11155111,
			rpc_url: "http://localhost:8545".to_string(),
			explorer_api_url: Some("https://api-sepolia.etherscan.io/api".to_string()),
			has_api_key,
			contracts: contracts.iter().map(|c| c.to_string()).collect(),
			compiler_version: "0.8.10+commit.fc410830".to_string(),
			optimizer_runs: 200,
			jobs: 2,
		}
	}

	fn service(
		mock: &MockVerifier,
		settings: VerificationSettings,
	) -> (VerificationService, Arc<RegistryService>) {
		let registry = Arc::new(RegistryService::new(Box::new(MemoryStorage::new()), "sepolia"));
		let service = VerificationService::new(Box::new(mock.clone()), registry.clone(), settings)
			.unwrap();
		(service, registry)
	}

	#[test]
	fn test_glob_matching() {
		let any_pool = glob_to_regex("*Pool*").unwrap();
		assert!(any_pool.is_match("PoolCore"));
		assert!(any_pool.is_match("NTokenPoolProxy"));
		assert!(!any_pool.is_match("Oracle"));

		let alternatives = glob_to_regex("{Oracle,Pool}?").unwrap();
		assert!(alternatives.is_match("Oracle1"));
		assert!(!alternatives.is_match("Oracle"));
		assert!(glob_to_regex("a.b").unwrap().is_match("a.b"));
		assert!(!glob_to_regex("a.b").unwrap().is_match("axb"));
		assert!(glob_to_regex("{a,b").is_err());
	}

	#[test]
	fn test_verifiability_policy() {
		let mock = MockVerifier::new();
		let (all, _) = service(&mock, settings(&[], true));
		assert!(all.is_verifiable("Anything").unwrap());

		let (filtered, _) = service(&mock, settings(&["Pool*"], true));
		assert!(filtered.is_verifiable("PoolCore").unwrap());
		assert!(!filtered.is_verifiable("Oracle").unwrap());

		let mut no_explorer = settings(&[], false);
		no_explorer.explorer_api_url = None;
		let (local, _) = service(&mock, no_explorer);
		assert!(!local.is_verifiable("PoolCore").unwrap());

		let (keyless, _) = service(&mock, settings(&["Pool*"], false));
		assert!(!keyless.is_verifiable("Oracle").unwrap());
		assert!(matches!(
			keyless.is_verifiable("PoolCore"),
			Err(VerifyError::MissingApiKey(_))
		));
	}

	#[tokio::test]
	async fn test_verify_contract_marks_record() {
		let mock = MockVerifier::new();
		let (service, registry) = service(&mock, settings(&[], true));
		registry.upsert("Foo", FOO, None, true).await.unwrap();

		let foo = artifact("Foo", "contracts/Foo.sol", r#"{"type": "uint256"}"#);
		let ok = service
			.verify_contract("Foo", FOO, &foo, &[7u64.into()], Vec::new())
			.await
			.unwrap();

		assert!(ok);
		assert!(registry.get("Foo").await.unwrap().unwrap().verified);
		let requests = mock.requests();
		assert_eq!(requests[0].fully_qualified_name, "contracts/Foo.sol:Foo");
		assert_eq!(requests[0].constructor_args.len(), 32);
		assert_eq!(requests[0].chain_id, 11155111);
	}

	#[tokio::test]
	async fn test_failed_verification_is_not_fatal() {
		let mock = MockVerifier::new();
		mock.fail_for("Foo");
		let (service, registry) = service(&mock, settings(&[], true));
		registry.upsert("Foo", FOO, None, true).await.unwrap();

		let foo = artifact("Foo", "contracts/Foo.sol", "");
		let ok = service
			.verify_contract("Foo", FOO, &foo, &[], Vec::new())
			.await
			.unwrap();

		assert!(!ok);
		assert!(!registry.get("Foo").await.unwrap().unwrap().verified);
	}

	#[tokio::test]
	async fn test_sweep_selects_pending_records() {
		let mock = MockVerifier::new();
		let (service, registry) = service(&mock, settings(&[], true));

		// Eligible and unverified.
		registry.upsert("Foo", FOO, None, true).await.unwrap();
		// Never eligible: no constructorArgs array.
		registry.upsert("Bar", BAR, None, false).await.unwrap();
		// Already verified.
		registry.upsert("Baz", BAR, None, true).await.unwrap();
		registry.mark_verified("Baz").await.unwrap();
		// Eligible, with a linked library.
		let lib_record = RegistryRecord {
			address: BAR.to_string(),
			constructor_args: Some(vec![]),
			libraries: Some(BTreeMap::from([(
				"contracts/Lib.sol:MathLib".to_string(),
				FOO.to_string(),
			)])),
			..Default::default()
		};
		registry.set("Linked", &lib_record).await.unwrap();

		let artifacts = Artifacts(HashMap::from([
			("Foo".to_string(), artifact("Foo", "contracts/Foo.sol", "")),
			("Linked".to_string(), artifact("Linked", "contracts/Linked.sol", "")),
			("MathLib".to_string(), artifact("MathLib", "contracts/Lib.sol", "")),
		]));

		let summary = service.verify_all(&artifacts).await.unwrap();
		assert_eq!(summary, SweepSummary { verified: 2, failed: 0 });

		let mut ids: Vec<_> = mock.requests().into_iter().map(|r| r.contract_id).collect();
		ids.sort();
		assert_eq!(ids, vec!["Foo", "Linked"]);

		let linked = mock
			.requests()
			.into_iter()
			.find(|r| r.contract_id == "Linked")
			.unwrap();
		assert_eq!(
			linked.libraries[0].to_cli_string(),
			format!("contracts/Lib.sol:MathLib:{}", FOO)
		);
		assert!(registry.get("Linked").await.unwrap().unwrap().verified);
		assert!(!registry.get("Bar").await.unwrap().unwrap().verified);
	}
}
