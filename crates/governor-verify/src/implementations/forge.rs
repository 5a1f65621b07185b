//! Verification through `forge verify-contract`.
//!
//! The explorer credentials travel in the child's environment only; the
//! rendered command line that gets logged never contains them.

use crate::{VerificationRequest, VerifierInterface, VerifyError};
use async_trait::async_trait;
use governor_types::SecretString;
use std::fmt;
use tokio::process::Command;

/// A fully assembled `forge` invocation.
#[derive(Clone)]
pub struct ForgeCommand {
	pub program: String,
	pub args: Vec<String>,
	/// `(name, value)` pairs added to the child environment.
	env: Vec<(&'static str, String)>,
	api_key: SecretString,
}

impl ForgeCommand {
	pub fn build(program: &str, api_key: &SecretString, request: &VerificationRequest) -> Self {
		let mut args = vec![
			"verify-contract".to_string(),
			request.address.clone(),
			"--chain-id".to_string(),
			request.chain_id.to_string(),
			"--num-of-optimizations".to_string(),
			request.optimizer_runs.to_string(),
			"--watch".to_string(),
			request.fully_qualified_name.clone(),
		];

		if !request.constructor_args.is_empty() {
			args.push("--constructor-args".to_string());
			args.push(request.constructor_args.to_string());
		}
		for library in &request.libraries {
			args.push("--libraries".to_string());
			args.push(library.to_cli_string());
		}

		args.push("--compiler-version".to_string());
		args.push(format!("v{}", without_v(&request.compiler_version)));

		Self {
			program: program.to_string(),
			args,
			env: vec![
				("ETH_RPC_URL", request.rpc_url.clone()),
				("VERIFIER_URL", request.explorer_api_url.clone()),
			],
			api_key: api_key.clone(),
		}
	}

	fn to_command(&self) -> Command {
		let mut command = Command::new(&self.program);
		command.args(&self.args).kill_on_drop(true);
		for (name, value) in &self.env {
			command.env(name, value);
		}
		self.api_key.with_exposed(|key| {
			command.env("ETHERSCAN_API_KEY", key);
		});
		command
	}
}

impl fmt::Display for ForgeCommand {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {}", self.program, self.args.join(" "))
	}
}

fn without_v(version: &str) -> &str {
	version.strip_prefix('v').unwrap_or(version)
}

/// Verifier shelling out to a foundry installation.
pub struct ForgeVerifier {
	program: String,
	api_key: SecretString,
}

impl ForgeVerifier {
	pub fn new(api_key: SecretString) -> Self {
		Self {
			program: "forge".to_string(),
			api_key,
		}
	}
}

#[async_trait]
impl VerifierInterface for ForgeVerifier {
	async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError> {
		let command = ForgeCommand::build(&self.program, &self.api_key, request);
		tracing::info!(contract = %request.contract_id, command = %command, "Running verifier");

		let output = command
			.to_command()
			.output()
			.await
			.map_err(|e| VerifyError::Command(format!("Failed to run {}: {}", self.program, e)))?;

		if output.status.success() {
			return Ok(());
		}

		let stderr = String::from_utf8_lossy(&output.stderr);
		let stdout = String::from_utf8_lossy(&output.stdout);
		let message = if stderr.trim().is_empty() { stdout } else { stderr };
		Err(VerifyError::Failed(format!(
			"{} exited with {}: {}",
			request.contract_id,
			output.status,
			message.trim()
		)))
	}
}

/// Creates a forge verifier.
pub fn create_verifier(api_key: &SecretString) -> Result<Box<dyn VerifierInterface>, VerifyError> {
	Ok(Box::new(ForgeVerifier::new(api_key.clone())))
}

/// Registry for the forge verifier implementation.
pub struct Registry;

impl governor_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "forge";
	type Factory = crate::VerifierFactory;

	fn factory() -> Self::Factory {
		create_verifier
	}
}

impl crate::VerifierRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::LibraryRef;
	use governor_types::Bytes;

	fn request() -> VerificationRequest {
		VerificationRequest {
			contract_id: "PoolCore".to_string(),
			address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
			fully_qualified_name: "contracts/PoolCore.sol:PoolCore".to_string(),
			constructor_args: Bytes::from(vec![0x00, 0x2a]),
			libraries: vec![LibraryRef {
				source_name: "contracts/Lib.sol".to_string(),
				name: "Lib".to_string(),
				address: "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512".to_string(),
			}],
			chain_id: 1,
			rpc_url: "http://localhost:8545".to_string(),
			explorer_api_url: "https://api.etherscan.io/api".to_string(),
			compiler_version: "0.8.10+commit.fc410830".to_string(),
			optimizer_runs: 200,
		}
	}

	#[test]
	fn test_command_line() {
		let key = SecretString::from("super-secret");
		let command = ForgeCommand::build("forge", &key, &request());

		assert_eq!(
			command.to_string(),
			"forge verify-contract 0x5FbDB2315678afecb367f032d93F642f64180aa3 --chain-id 1 \
			--num-of-optimizations 200 --watch contracts/PoolCore.sol:PoolCore \
			--constructor-args 0x002a \
			--libraries contracts/Lib.sol:Lib:0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512 \
			--compiler-version v0.8.10+commit.fc410830"
		);
		assert!(!command.to_string().contains("super-secret"));
	}

	#[test]
	fn test_optional_flags_omitted() {
		let mut bare = request();
		bare.constructor_args = Bytes::new();
		bare.libraries.clear();
		bare.compiler_version = "v0.8.10".to_string();

		let command = ForgeCommand::build("forge", &SecretString::from("k"), &bare);
		assert!(!command.args.contains(&"--constructor-args".to_string()));
		assert!(!command.args.contains(&"--libraries".to_string()));
		assert_eq!(command.args.last().unwrap(), "v0.8.10");
	}

	#[tokio::test]
	async fn test_missing_binary_is_command_error() {
		let verifier = ForgeVerifier {
			program: "/nonexistent/forge".to_string(),
			api_key: SecretString::from("k"),
		};
		assert!(matches!(
			verifier.verify(&request()).await,
			Err(VerifyError::Command(_))
		));
	}
}
