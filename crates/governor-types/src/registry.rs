//! Deployment registry records.
//!
//! The registry is a single JSON document whose top-level keys are
//! `"<contractId>.<networkName>"`. Every deployed contract is described by a
//! [`RegistryRecord`]. The field names are camelCase so that documents written
//! by older tooling stay readable.

use crate::utils::is_valid_address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Contract identifier of the multi-send deployment. Its registry entry also
/// carries the pending time-lock queue.
pub const MULTI_SEND_ID: &str = "MultiSendCallOnly";

/// Contract identifier of the time-lock executor.
pub const TIME_LOCK_ID: &str = "ExecutorWithTimelock";

/// Builds the composite registry key for a contract on a network.
pub fn registry_key(contract_id: &str, network: &str) -> String {
	format!("{}.{}", contract_id, network)
}

/// A constructor argument as persisted in the registry.
///
/// Arguments are stored in their human-readable form so that verification can
/// re-encode them later against the artifact's constructor inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstructorArg {
	Bool(bool),
	Number(serde_json::Number),
	String(String),
	List(Vec<ConstructorArg>),
}

impl ConstructorArg {
	/// Renders the argument the way `cast abi-encode` expects it on a command line.
	pub fn to_cli_string(&self) -> String {
		match self {
			ConstructorArg::Bool(b) => b.to_string(),
			ConstructorArg::Number(n) => n.to_string(),
			ConstructorArg::String(s) => s.clone(),
			ConstructorArg::List(items) => format!(
				"[{}]",
				items
					.iter()
					.map(|i| i.to_cli_string())
					.collect::<Vec<_>>()
					.join(",")
			),
		}
	}
}

impl From<&str> for ConstructorArg {
	fn from(value: &str) -> Self {
		ConstructorArg::String(value.to_string())
	}
}

impl From<u64> for ConstructorArg {
	fn from(value: u64) -> Self {
		ConstructorArg::Number(value.into())
	}
}

impl From<bool> for ConstructorArg {
	fn from(value: bool) -> Self {
		ConstructorArg::Bool(value)
	}
}

impl fmt::Display for ConstructorArg {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_cli_string())
	}
}

/// Function signature descriptor kept alongside a deployment for decoding tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
	pub name: String,
	pub signature: String,
}

/// Build provenance written with every record. Never read back by logic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeta {
	pub name: String,
	pub version: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub commit: Option<String>,
}

impl PackageMeta {
	/// Provenance of the running binary.
	pub fn current() -> Self {
		Self {
			name: "governor".to_string(),
			version: env!("CARGO_PKG_VERSION").to_string(),
			commit: None,
		}
	}
}

/// One deployed contract on one network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryRecord {
	/// Deployed address, kept as written so malformed values can be detected.
	pub address: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deployer: Option<String>,
	/// Present as an array when the record is verification-eligible.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub constructor_args: Option<Vec<ConstructorArg>>,
	#[serde(default)]
	pub verified: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub libraries: Option<BTreeMap<String, String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub signatures: Option<Vec<FunctionSignature>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub package: Option<PackageMeta>,
}

impl RegistryRecord {
	/// Returns true when the stored address is well formed and not the zero address.
	pub fn has_valid_address(&self) -> bool {
		is_valid_address(&self.address)
	}

	/// A record is eligible for verification when its constructor arguments were recorded.
	pub fn is_verification_eligible(&self) -> bool {
		self.constructor_args.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_record_serializes_camel_case() {
		let record = RegistryRecord {
			address: "0x5FbDB2315678afecb367f032d93F642f64180aa3".to_string(),
			deployer: Some("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string()),
			constructor_args: Some(vec![42u64.into(), "bar".into()]),
			..Default::default()
		};

		let json = serde_json::to_value(&record).unwrap();
		assert_eq!(json["constructorArgs"], serde_json::json!([42, "bar"]));
		assert_eq!(json["verified"], serde_json::json!(false));
		assert!(json.get("libraries").is_none());
	}

	#[test]
	fn test_record_without_constructor_args_is_not_eligible() {
		let record: RegistryRecord =
			serde_json::from_str(r#"{"address":"0x5FbDB2315678afecb367f032d93F642f64180aa3"}"#)
				.unwrap();
		assert!(!record.is_verification_eligible());
		assert!(record.has_valid_address());
		assert!(!record.verified);
	}

	#[test]
	fn test_zero_or_malformed_address_is_invalid() {
		let zero = RegistryRecord {
			address: "0x0000000000000000000000000000000000000000".to_string(),
			..Default::default()
		};
		let garbage = RegistryRecord {
			address: "not-an-address".to_string(),
			..Default::default()
		};
		assert!(!zero.has_valid_address());
		assert!(!garbage.has_valid_address());
	}

	#[test]
	fn test_nested_constructor_args_cli_rendering() {
		let arg = ConstructorArg::List(vec![1u64.into(), 2u64.into()]);
		assert_eq!(arg.to_cli_string(), "[1,2]");
		assert_eq!(ConstructorArg::Bool(true).to_string(), "true");
	}
}
