//! Configuration for the governor tool.
//!
//! Configuration is a TOML file that can be split across several files:
//! - `include = ["networks.toml", "secrets.toml"]` pulls in other files
//! - each top-level section must be unique across all files
//! - `${VAR}` and `${VAR:-default}` are replaced from the environment
//!
//! Pluggable implementations (`storage`, `account`) keep their own raw TOML
//! tables which are validated by the implementation's schema when it is built.

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders {
	pub mod config;
}

use governor_types::{Address, NetworkConfig, NetworksConfig, SecretString, TimeLockOperation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the input dump.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub deployer: DeployerConfig,
	pub networks: NetworksConfig,
	pub storage: StorageConfig,
	pub account: AccountConfig,
	#[serde(default)]
	pub governance: GovernanceConfig,
	pub verification: Option<VerificationConfig>,
	#[serde(default)]
	pub artifacts: ArtifactsConfig,
}

/// Deployment behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeployerConfig {
	/// Network to operate on unless overridden on the command line.
	pub network: String,
	/// Skip contracts that already have a valid address in the registry.
	#[serde(default)]
	pub incremental: bool,
	/// Total attempts per deployment, the first one included.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Fixed delay between attempts.
	#[serde(default = "default_retry_interval_ms")]
	pub retry_interval_ms: u64,
	/// Block depth to wait for after each submission.
	#[serde(default = "default_confirmations")]
	pub confirmations: u64,
	/// Verify contracts right after deployment.
	#[serde(default)]
	pub verify: bool,
	/// Version string written to registry records.
	pub package_version: Option<String>,
}

fn default_max_retries() -> u32 {
	6
}

fn default_retry_interval_ms() -> u64 {
	1500
}

fn default_confirmations() -> u64 {
	1
}

/// Storage backend selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Signer selection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Governance routing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GovernanceConfig {
	/// Backend token: "TimeLock", "Safe", "SafeWithTimeLock", "Run" or "".
	#[serde(default)]
	pub executor: String,
	/// Seconds added to the latest block time when no execution time is given.
	#[serde(default = "default_buffering_time")]
	pub buffering_time: u64,
	/// Time-lock transition forwarded to the multisig.
	#[serde(default)]
	pub default_operation: TimeLockOperation,
	/// Multisig account proposals are made for.
	pub multisig: Option<Address>,
	/// Multi-send contract used for batched proposals.
	pub multisend: Option<Address>,
	/// Fixed starting nonce, instead of asking the multisig service.
	pub multisig_nonce: Option<u64>,
	/// Maximum number of calls per multi-send proposal.
	#[serde(default = "default_chunk_size")]
	pub chunk_size: usize,
}

impl Default for GovernanceConfig {
	fn default() -> Self {
		Self {
			executor: String::new(),
			buffering_time: default_buffering_time(),
			default_operation: TimeLockOperation::Queue,
			multisig: None,
			multisend: None,
			multisig_nonce: None,
			chunk_size: default_chunk_size(),
		}
	}
}

fn default_buffering_time() -> u64 {
	14400
}

fn default_chunk_size() -> usize {
	45
}

/// Source verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerificationConfig {
	#[serde(default = "default_verification_provider")]
	pub provider: String,
	/// Explorer API key. Required before any verification starts.
	pub api_key: Option<SecretString>,
	/// Glob patterns of contract ids to verify. Empty means all.
	#[serde(default)]
	pub contracts: Vec<String>,
	pub compiler_version: String,
	#[serde(default = "default_optimizer_runs")]
	pub optimizer_runs: u64,
	/// Concurrent verifications in a bulk sweep.
	#[serde(default = "default_verification_jobs")]
	pub jobs: usize,
}

fn default_verification_provider() -> String {
	"forge".to_string()
}

fn default_optimizer_runs() -> u64 {
	200
}

fn default_verification_jobs() -> usize {
	1
}

/// Location of compiled artifacts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactsConfig {
	#[serde(default = "default_artifacts_path")]
	pub path: String,
}

impl Default for ArtifactsConfig {
	fn default() -> Self {
		Self {
			path: default_artifacts_path(),
		}
	}
}

fn default_artifacts_path() -> String {
	"./artifacts".to_string()
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, and supports defaults
/// with `${VAR_NAME:-default_value}`. Inputs are capped at 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)))
				},
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following include directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Settings of the named network.
	pub fn network(&self, name: &str) -> Result<&NetworkConfig, ConfigError> {
		self.networks.get(name).ok_or_else(|| {
			ConfigError::Validation(format!("Network '{}' not found in configuration", name))
		})
	}

	/// Settings of the network selected in `[deployer]`.
	pub fn active_network(&self) -> Result<&NetworkConfig, ConfigError> {
		self.network(&self.deployer.network)
	}

	fn validate(&self) -> Result<(), ConfigError> {
		if self.networks.is_empty() {
			return Err(ConfigError::Validation(
				"Networks configuration cannot be empty".into(),
			));
		}
		for (name, network) in &self.networks {
			if network.rpc_url.trim().is_empty() {
				return Err(ConfigError::Validation(format!(
					"Network '{}' must have an rpc_url",
					name
				)));
			}
			if network.fee_multiplier == 0 {
				return Err(ConfigError::Validation(format!(
					"Network '{}' fee_multiplier must be at least 1",
					name
				)));
			}
		}
		self.active_network()?;

		if self.deployer.max_retries == 0 {
			return Err(ConfigError::Validation(
				"deployer.max_retries must be at least 1".into(),
			));
		}
		if self.deployer.confirmations == 0 {
			return Err(ConfigError::Validation(
				"deployer.confirmations must be at least 1".into(),
			));
		}

		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if !self
			.account
			.implementations
			.contains_key(&self.account.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary account '{}' not found in implementations",
				self.account.primary
			)));
		}

		if self.governance.chunk_size == 0 {
			return Err(ConfigError::Validation(
				"governance.chunk_size must be at least 1".into(),
			));
		}

		if let Some(verification) = &self.verification {
			if verification.jobs == 0 {
				return Err(ConfigError::Validation(
					"verification.jobs must be at least 1".into(),
				));
			}
		}

		Ok(())
	}
}

/// Parses and validates a configuration string, resolving environment variables first.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
