//! Build artifact types.
//!
//! Artifacts are produced by the compiler toolchain and consumed as-is. Both
//! the flat layout (`"bytecode": "0x.."` with top-level `linkReferences`) and
//! the nested layout (`"bytecode": {"object": "0x..", "linkReferences": ..}`)
//! are accepted.

use crate::registry::ConstructorArg;
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Byte range of a library placeholder inside the bytecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOffset {
	pub start: usize,
	pub length: usize,
}

/// `source file -> library name -> placeholder offsets`.
pub type LinkReferences = BTreeMap<String, BTreeMap<String, Vec<LinkOffset>>>;

/// Bytecode as it appears in either artifact layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArtifactBytecode {
	Flat(String),
	Nested {
		object: String,
		#[serde(default, rename = "linkReferences")]
		link_references: LinkReferences,
	},
}

/// A compiled contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
	#[serde(default)]
	pub contract_name: String,
	#[serde(default)]
	pub source_name: String,
	/// The ABI kept as raw JSON; decoded on demand.
	#[serde(default)]
	pub abi: serde_json::Value,
	pub bytecode: ArtifactBytecode,
	#[serde(default)]
	pub link_references: LinkReferences,
}

impl BuildArtifact {
	/// Unlinked bytecode as a hex string.
	pub fn bytecode_hex(&self) -> &str {
		match &self.bytecode {
			ArtifactBytecode::Flat(code) => code,
			ArtifactBytecode::Nested { object, .. } => object,
		}
	}

	/// Link references from whichever layout carried them.
	pub fn link_references(&self) -> &LinkReferences {
		match &self.bytecode {
			ArtifactBytecode::Nested {
				link_references, ..
			} if !link_references.is_empty() => link_references,
			_ => &self.link_references,
		}
	}

	/// Parameter types of the constructor, e.g. `["address", "uint256[]"]`.
	pub fn constructor_input_types(&self) -> Vec<String> {
		self.abi
			.as_array()
			.and_then(|items| {
				items
					.iter()
					.find(|item| item.get("type").and_then(|t| t.as_str()) == Some("constructor"))
			})
			.and_then(|ctor| ctor.get("inputs"))
			.and_then(|inputs| inputs.as_array())
			.map(|inputs| {
				inputs
					.iter()
					.filter_map(|input| input.get("type").and_then(|t| t.as_str()))
					.map(str::to_string)
					.collect()
			})
			.unwrap_or_default()
	}

	/// `source:Contract`, the fully-qualified name verifiers expect.
	pub fn fully_qualified_name(&self) -> String {
		format!("{}:{}", self.source_name, self.contract_name)
	}

	/// ABI-encodes `args` against the constructor inputs.
	///
	/// Arguments are coerced from their command-line rendering, so `"42"`
	/// and `42` both encode as a `uint256`.
	pub fn encode_constructor_args(&self, args: &[ConstructorArg]) -> Result<Bytes, String> {
		let types = self.constructor_input_types();
		if types.len() != args.len() {
			return Err(format!(
				"{} expects {} constructor arguments, got {}",
				self.contract_name,
				types.len(),
				args.len()
			));
		}
		if args.is_empty() {
			return Ok(Bytes::new());
		}

		let values = types
			.iter()
			.zip(args)
			.map(|(ty, arg)| {
				let sol_type = DynSolType::parse(ty)
					.map_err(|e| format!("Unsupported constructor type '{}': {}", ty, e))?;
				sol_type
					.coerce_str(&arg.to_cli_string())
					.map_err(|e| format!("Argument '{}' is not a valid {}: {}", arg, ty, e))
			})
			.collect::<Result<Vec<_>, _>>()?;

		Ok(DynSolValue::Tuple(values).abi_encode_params().into())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_flat_artifact_layout() {
		let artifact: BuildArtifact = serde_json::from_str(
			r#"{
				"contractName": "Foo",
				"sourceName": "contracts/Foo.sol",
				"abi": [{"type": "constructor", "inputs": [{"name": "a", "type": "uint256"}, {"name": "b", "type": "string"}]}],
				"bytecode": "0x6080",
				"linkReferences": {"contracts/Lib.sol": {"Lib": [{"start": 1, "length": 20}]}}
			}"#,
		)
		.unwrap();

		assert_eq!(artifact.bytecode_hex(), "0x6080");
		assert_eq!(artifact.constructor_input_types(), vec!["uint256", "string"]);
		assert_eq!(artifact.link_references()["contracts/Lib.sol"]["Lib"][0].start, 1);
		assert_eq!(artifact.fully_qualified_name(), "contracts/Foo.sol:Foo");
	}

	#[test]
	fn test_constructor_args_encoding() {
		let artifact: BuildArtifact = serde_json::from_str(
			r#"{
				"contractName": "Foo",
				"abi": [{"type": "constructor", "inputs": [{"type": "uint256"}, {"type": "address[]"}]}],
				"bytecode": "0x"
			}"#,
		)
		.unwrap();

		let encoded = artifact
			.encode_constructor_args(&[
				ConstructorArg::String("42".to_string()),
				ConstructorArg::List(vec!["0x00000000000000000000000000000000000000aa".into()]),
			])
			.unwrap();

		// uint256, offset, length, one address word.
		assert_eq!(encoded.len(), 4 * 32);
		assert_eq!(encoded[31], 42);
		assert_eq!(encoded[63], 0x40);
		assert_eq!(encoded[95], 1);
		assert_eq!(encoded[127], 0xaa);

		assert!(artifact.encode_constructor_args(&[42u64.into()]).is_err());
		assert!(artifact
			.encode_constructor_args(&["x".into(), ConstructorArg::List(vec![])])
			.is_err());
	}

	#[test]
	fn test_nested_artifact_layout() {
		let artifact: BuildArtifact = serde_json::from_str(
			r#"{
				"abi": [],
				"bytecode": {"object": "0x6080", "linkReferences": {"src/L.sol": {"L": [{"start": 3, "length": 20}]}}}
			}"#,
		)
		.unwrap();

		assert_eq!(artifact.bytecode_hex(), "0x6080");
		assert!(artifact.constructor_input_types().is_empty());
		assert_eq!(artifact.link_references()["src/L.sol"]["L"][0].start, 3);
	}
}
