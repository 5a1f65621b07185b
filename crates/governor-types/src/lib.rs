//! Common types for the governor deployment and governance tooling.
//!
//! This crate holds the data model shared by every other governor crate:
//! registry records, time-lock actions, transactions and fee overrides,
//! build artifacts, network settings and the configuration schema framework
//! used to validate pluggable implementations.

/// Build artifact types produced by the contract compiler.
pub mod artifact;
/// Transaction delivery types for blockchain interactions.
pub mod delivery;
/// Time-lock actions, pending queue entries and multisig payloads.
pub mod governance;
/// Self-registration trait for pluggable implementations.
pub mod implementation;
/// Network configuration types.
pub mod networks;
/// Deployment registry records.
pub mod registry;
/// Secure string type for sensitive configuration values.
pub mod secret_string;
/// Utility functions for formatting, hashing and EIP-712 encoding.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

pub use artifact::*;
pub use delivery::*;
pub use governance::*;
pub use implementation::ImplementationRegistry;
pub use networks::{NetworkConfig, NetworksConfig};
pub use registry::*;
pub use secret_string::SecretString;
pub use utils::{
	format_timestamp, is_valid_address, normalize_library_name, with_0x_prefix, without_0x_prefix,
};
pub use validation::*;

pub use alloy_primitives::{Address, Bytes, B256, U256};
