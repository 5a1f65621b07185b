//! Small helpers used across crates.

use alloy_primitives::Address;

/// True for a well-formed, non-zero address string.
pub fn is_valid_address(value: &str) -> bool {
	value
		.parse::<Address>()
		.map(|address| address != Address::ZERO)
		.unwrap_or(false)
}

/// Strips the source path from a fully-qualified library name (`path:Name` -> `Name`).
pub fn normalize_library_name(name: &str) -> &str {
	name.rsplit(':').next().unwrap_or(name)
}
