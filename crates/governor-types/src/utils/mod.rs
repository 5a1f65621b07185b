//! Utility functions shared across the governor crates.

pub mod eip712;
pub mod formatting;
pub mod helpers;

pub use eip712::{
	compute_domain_hash, compute_final_digest, Eip712AbiEncoder, DOMAIN_TYPE, SAFE_TX_TYPE,
};
pub use formatting::{format_timestamp, with_0x_prefix, without_0x_prefix};
pub use helpers::{is_valid_address, normalize_library_name};
