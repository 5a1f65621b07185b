//! Network configuration types.
//!
//! Networks are keyed by name (`mainnet`, `sepolia`, `anvil`, ...). The name
//! is part of every registry key and of the default multisig service URL.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for a single blockchain network.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
	pub chain_id: u64,
	/// HTTP(S) RPC endpoint.
	pub rpc_url: String,
	/// Public networks read the fee market at startup and attach fee overrides.
	#[serde(default)]
	pub live: bool,
	/// Multiplier applied to fee market reads, e.g. 2 on congested chains.
	#[serde(default = "default_fee_multiplier")]
	pub fee_multiplier: u64,
	/// Block explorer API used for source verification.
	pub explorer_api_url: Option<String>,
	/// Multisig transaction service. Defaults to the public hosted service.
	pub safe_tx_service_url: Option<String>,
}

fn default_fee_multiplier() -> u64 {
	1
}

impl NetworkConfig {
	/// Multisig transaction service URL for a network called `name`.
	pub fn safe_tx_service_url(&self, name: &str) -> String {
		self.safe_tx_service_url
			.clone()
			.unwrap_or_else(|| format!("https://safe-transaction-{}.safe.global", name))
	}
}

/// Networks keyed by name.
pub type NetworksConfig = HashMap<String, NetworkConfig>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_default_safe_service_url() {
		let network: NetworkConfig = toml::from_str(
			r#"
chain_id = 1
rpc_url = "http://localhost:8545"
"#,
		)
		.unwrap();
		assert_eq!(network.fee_multiplier, 1);
		assert!(!network.live);
		assert_eq!(
			network.safe_tx_service_url("mainnet"),
			"https://safe-transaction-mainnet.safe.global"
		);
	}
}
