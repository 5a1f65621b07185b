//! Multi-send batch codec.
//!
//! Each entry is packed as `uint8 operation, address to, uint256 value,
//! uint256 length, bytes data` with no padding, and the concatenation is the
//! single `bytes` argument of `multiSend(bytes)`.

use crate::SafeError;
use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use governor_types::{MetaTransaction, Operation};

sol! {
	function multiSend(bytes transactions) external payable;
}

/// Fixed-size prefix of one packed entry: operation, to, value, length.
const ENTRY_HEADER_LEN: usize = 1 + 20 + 32 + 32;

/// Packs `transactions` into the multi-send byte stream.
pub fn pack(transactions: &[MetaTransaction]) -> Vec<u8> {
	let mut out = Vec::with_capacity(
		transactions
			.iter()
			.map(|tx| ENTRY_HEADER_LEN + tx.data.len())
			.sum(),
	);
	for tx in transactions {
		out.push(tx.operation.as_u8());
		out.extend_from_slice(tx.to.as_slice());
		out.extend_from_slice(&tx.value.to_be_bytes::<32>());
		out.extend_from_slice(&U256::from(tx.data.len()).to_be_bytes::<32>());
		out.extend_from_slice(&tx.data);
	}
	out
}

/// Splits a packed stream back into its entries.
pub fn unpack(mut packed: &[u8]) -> Result<Vec<MetaTransaction>, SafeError> {
	let mut transactions = Vec::new();
	while !packed.is_empty() {
		if packed.len() < ENTRY_HEADER_LEN {
			return Err(SafeError::Encoding(format!(
				"Truncated multi-send entry: {} header bytes left",
				packed.len()
			)));
		}

		let operation = Operation::try_from(packed[0]).map_err(SafeError::Encoding)?;
		let to = Address::from_slice(&packed[1..21]);
		let value = U256::from_be_slice(&packed[21..53]);
		let length = usize::try_from(U256::from_be_slice(&packed[53..85]))
			.map_err(|e| SafeError::Encoding(format!("Invalid data length: {}", e)))?;

		let rest = &packed[ENTRY_HEADER_LEN..];
		if rest.len() < length {
			return Err(SafeError::Encoding(format!(
				"Multi-send entry declares {} data bytes, {} available",
				length,
				rest.len()
			)));
		}

		transactions.push(MetaTransaction {
			to,
			value,
			data: Bytes::copy_from_slice(&rest[..length]),
			operation,
		});
		packed = &rest[length..];
	}
	Ok(transactions)
}

/// Call data of `multiSend(pack(transactions))`.
pub fn encode_multi_send(transactions: &[MetaTransaction]) -> Bytes {
	multiSendCall {
		transactions: pack(transactions).into(),
	}
	.abi_encode()
	.into()
}

/// Whether `data` is a `multiSend(bytes)` call.
pub fn is_multi_send(data: &[u8]) -> bool {
	data.starts_with(&multiSendCall::SELECTOR)
}

/// Inner calls of a `multiSend(bytes)` payload.
pub fn decode_multi_send(data: &[u8]) -> Result<Vec<MetaTransaction>, SafeError> {
	let call = multiSendCall::abi_decode(data, true)
		.map_err(|e| SafeError::Encoding(format!("Invalid multiSend call: {}", e)))?;
	unpack(&call.transactions)
}
