//! Library linking.
//!
//! Unlinked bytecode carries a 20-byte placeholder wherever a library address
//! goes. When the artifact lists the placeholder offsets they are patched
//! directly; otherwise the placeholder is located by its textual form,
//! `__$<34 hex chars>$__`, where the hex is a prefix of the keccak256 of the
//! library's fully-qualified name. A name written as `$token$` uses `token`
//! verbatim instead of the hash.

use alloy_primitives::{hex, keccak256, Address, Bytes};
use governor_types::{normalize_library_name, without_0x_prefix, BuildArtifact};
use std::collections::BTreeMap;
use thiserror::Error;

const ADDRESS_HEX_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum LinkError {
	#[error("Invalid address '{address}' for library {library}")]
	InvalidAddress { library: String, address: String },
	#[error("Can't link '{library}' ({placeholder}) in {contract}")]
	PlaceholderNotFound {
		library: String,
		placeholder: String,
		contract: String,
	},
	#[error("Link reference of {library} at byte {start} is out of range in {contract}")]
	InvalidReference {
		library: String,
		start: usize,
		contract: String,
	},
	#[error("Unlinked library placeholders remain in {0}")]
	Unlinked(String),
	#[error("Invalid bytecode in {contract}: {message}")]
	InvalidBytecode { contract: String, message: String },
}

/// Textual placeholder of a library, `__$...$__`.
pub fn placeholder(library: &str) -> String {
	let token = match library.strip_prefix('$').and_then(|l| l.strip_suffix('$')) {
		Some(token) => token.to_string(),
		None => hex::encode(keccak256(library.as_bytes()))[..34].to_string(),
	};
	format!("__${}$__", token)
}

/// `path:Name` keys reduced to `Name`.
pub fn normalize_libraries(libraries: &BTreeMap<String, String>) -> BTreeMap<String, String> {
	libraries
		.iter()
		.map(|(name, address)| (normalize_library_name(name).to_string(), address.clone()))
		.collect()
}

fn address_hex(library: &str, address: &str) -> Result<String, LinkError> {
	address
		.parse::<Address>()
		.map(|a| hex::encode(a.as_slice()))
		.map_err(|_| LinkError::InvalidAddress {
			library: library.to_string(),
			address: address.to_string(),
		})
}

/// Returns the deployable bytecode of `artifact` with `libraries` linked in.
///
/// Fails when a library has no placeholder or when any placeholder is left
/// unlinked, since such bytecode would not match the build.
pub fn link(
	artifact: &BuildArtifact,
	libraries: Option<&BTreeMap<String, String>>,
) -> Result<Bytes, LinkError> {
	let contract = artifact.contract_name.clone();
	let mut code = without_0x_prefix(artifact.bytecode_hex()).to_string();
	if !code.is_ascii() {
		return Err(LinkError::InvalidBytecode {
			contract,
			message: "non-ASCII characters".to_string(),
		});
	}

	if let Some(libraries) = libraries.filter(|l| !l.is_empty()) {
		let references = artifact.link_references();
		if references.is_empty() {
			for (library, address) in libraries {
				let target = placeholder(library);
				if !code.contains(&target) {
					return Err(LinkError::PlaceholderNotFound {
						library: library.clone(),
						placeholder: target,
						contract,
					});
				}
				code = code.replace(&target, &address_hex(library, address)?);
			}
		} else {
			let by_name = normalize_libraries(libraries);
			for file_references in references.values() {
				for (library, offsets) in file_references {
					let Some(address) = by_name.get(library) else {
						continue;
					};
					let replacement = address_hex(library, address)?;
					for offset in offsets {
						let start = offset.start * 2;
						let end = start + offset.length * 2;
						if offset.length * 2 != ADDRESS_HEX_LEN || end > code.len() {
							return Err(LinkError::InvalidReference {
								library: library.clone(),
								start: offset.start,
								contract,
							});
						}
						code.replace_range(start..end, &replacement);
					}
				}
			}
		}
	}

	if code.contains("__") {
		return Err(LinkError::Unlinked(contract));
	}

	hex::decode(&code)
		.map(Bytes::from)
		.map_err(|e| LinkError::InvalidBytecode {
			contract,
			message: e.to_string(),
		})
}
