//! Transaction delivery types.
//!
//! These types describe what is handed to a chain client: the transaction
//! itself, the hash it returns, the receipt observed after confirmation, fee
//! market data and event log queries.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A transaction to submit, either a call (`to` set) or a contract creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
	/// Recipient. `None` creates a contract from `data`.
	pub to: Option<Address>,
	pub data: Bytes,
	pub value: U256,
	pub chain_id: u64,
	pub nonce: Option<u64>,
	pub gas_limit: Option<u64>,
	/// Legacy gas price in wei.
	pub gas_price: Option<u128>,
	pub max_fee_per_gas: Option<u128>,
	pub max_priority_fee_per_gas: Option<u128>,
}

impl Transaction {
	/// A zero-value call to `to` with `data`.
	pub fn call(to: Address, data: Bytes, chain_id: u64) -> Self {
		Self {
			to: Some(to),
			data,
			chain_id,
			..Default::default()
		}
	}

	/// A contract creation with the given init code.
	pub fn create(init_code: Bytes, chain_id: u64) -> Self {
		Self {
			to: None,
			data: init_code,
			chain_id,
			..Default::default()
		}
	}

	/// Returns the transaction with the given fee overrides attached.
	pub fn with_fees(mut self, fees: &FeeOverrides) -> Self {
		match fees {
			FeeOverrides::None => {},
			FeeOverrides::Legacy { gas_price } => {
				self.gas_price = Some(*gas_price);
				self.max_fee_per_gas = None;
				self.max_priority_fee_per_gas = None;
			},
			FeeOverrides::Eip1559 {
				max_fee_per_gas,
				max_priority_fee_per_gas,
			} => {
				self.gas_price = None;
				self.max_fee_per_gas = Some(*max_fee_per_gas);
				self.max_priority_fee_per_gas = Some(*max_priority_fee_per_gas);
			},
		}
		self
	}
}

/// Blockchain transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHash(pub B256);

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Transaction receipt observed after inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
	pub hash: TransactionHash,
	pub block_number: u64,
	pub success: bool,
	/// Address of the created contract for creation transactions.
	pub contract_address: Option<Address>,
	/// Sender of the transaction.
	pub from: Address,
}

/// Snapshot of the chain's fee market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeData {
	pub gas_price: u128,
	/// Present on chains supporting EIP-1559.
	pub max_fee_per_gas: Option<u128>,
	pub max_priority_fee_per_gas: Option<u128>,
}

/// Fee fields attached to every submitted transaction.
///
/// Built once at startup from a fee market read and then passed, read-only,
/// to everything that submits transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeeOverrides {
	/// Let the chain client fill fees itself.
	#[default]
	None,
	/// Type 0 transactions with a fixed gas price.
	Legacy { gas_price: u128 },
	/// Type 2 transactions.
	Eip1559 {
		max_fee_per_gas: u128,
		max_priority_fee_per_gas: u128,
	},
}

impl FeeOverrides {
	/// Derives overrides from a fee market read, scaling every field by `multiplier`.
	///
	/// EIP-1559 fields win when the chain reports them, otherwise the legacy
	/// gas price is used.
	pub fn from_fee_data(fees: &FeeData, multiplier: u64) -> Self {
		let multiplier = u128::from(multiplier.max(1));
		match (fees.max_fee_per_gas, fees.max_priority_fee_per_gas) {
			(Some(max_fee), Some(priority_fee)) => FeeOverrides::Eip1559 {
				max_fee_per_gas: max_fee.saturating_mul(multiplier),
				max_priority_fee_per_gas: priority_fee.saturating_mul(multiplier),
			},
			_ => FeeOverrides::Legacy {
				gas_price: fees.gas_price.saturating_mul(multiplier),
			},
		}
	}
}

/// Event log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
	pub address: Address,
	/// First topic, the event signature hash.
	pub event_signature: B256,
	pub from_block: u64,
	/// `None` queries up to the latest block.
	pub to_block: Option<u64>,
}

/// A log entry returned by a [`LogFilter`] query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
	pub address: Address,
	pub topics: Vec<B256>,
	pub data: Bytes,
	pub block_number: Option<u64>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_eip1559_overrides_preferred_and_scaled() {
		let fees = FeeData {
			gas_price: 10,
			max_fee_per_gas: Some(30),
			max_priority_fee_per_gas: Some(2),
		};
		assert_eq!(
			FeeOverrides::from_fee_data(&fees, 2),
			FeeOverrides::Eip1559 {
				max_fee_per_gas: 60,
				max_priority_fee_per_gas: 4,
			}
		);
	}

	#[test]
	fn test_legacy_overrides_when_no_eip1559_data() {
		let fees = FeeData {
			gas_price: 7,
			max_fee_per_gas: None,
			max_priority_fee_per_gas: None,
		};
		assert_eq!(
			FeeOverrides::from_fee_data(&fees, 0),
			FeeOverrides::Legacy { gas_price: 7 }
		);
	}

	#[test]
	fn test_with_fees_replaces_previous_fee_fields() {
		let tx = Transaction::call(Address::ZERO, Bytes::new(), 1)
			.with_fees(&FeeOverrides::Legacy { gas_price: 5 })
			.with_fees(&FeeOverrides::Eip1559 {
				max_fee_per_gas: 9,
				max_priority_fee_per_gas: 1,
			});
		assert_eq!(tx.gas_price, None);
		assert_eq!(tx.max_fee_per_gas, Some(9));
		assert_eq!(tx.max_priority_fee_per_gas, Some(1));

		let untouched = Transaction::create(Bytes::from(vec![0x60]), 1).with_fees(&FeeOverrides::None);
		assert_eq!(untouched.gas_price, None);
		assert!(untouched.to.is_none());
	}
}
