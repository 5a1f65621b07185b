//! Time-lock executor ABI.
//!
//! Pure encoding of the three action transitions, the action hash and the
//! `QueuedAction` event. The hash must match the executor's
//! `keccak256(abi.encode(target, value, signature, data, executionTime, withDelegatecall))`
//! byte for byte, otherwise queued lookups silently miss.

use alloy_primitives::{keccak256, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent, SolValue};
use governor_types::{Action, Log, TimeLockOperation};

sol! {
	/// Subset of the executor-with-timelock interface used by the tool.
	interface IExecutorWithTimelock {
		function queueTransaction(address target, uint256 value, string signature, bytes data, uint256 executionTime, bool withDelegatecall) external returns (bytes32);
		function executeTransaction(address target, uint256 value, string signature, bytes data, uint256 executionTime, bool withDelegatecall) external payable returns (bytes);
		function cancelTransaction(address target, uint256 value, string signature, bytes data, uint256 executionTime, bool withDelegatecall) external returns (bytes32);
		function isActionQueued(bytes32 actionHash) external view returns (bool);
		function getDelay() external view returns (uint256);
		function GRACE_PERIOD() external view returns (uint256);

		event QueuedAction(bytes32 actionHash, address indexed target, uint256 value, string signature, bytes data, uint256 executionTime, bool withDelegatecall);
	}
}

use IExecutorWithTimelock::{
	cancelTransactionCall, executeTransactionCall, queueTransactionCall, QueuedAction,
};

/// Errors raised while decoding executor data.
#[derive(Debug, thiserror::Error)]
#[error("Failed to decode {what}: {message}")]
pub struct DecodeError {
	pub what: &'static str,
	pub message: String,
}

impl DecodeError {
	fn new(what: &'static str, err: impl std::fmt::Display) -> Self {
		Self {
			what,
			message: err.to_string(),
		}
	}
}

/// Identifier the executor derives for `action`.
pub fn action_hash(action: &Action) -> B256 {
	let encoded = (
		action.target,
		action.value,
		action.signature.clone(),
		action.data.clone(),
		U256::from(action.execution_time),
		action.with_delegatecall,
	)
		.abi_encode_params();
	keccak256(encoded)
}

pub fn encode_queue(action: &Action) -> Bytes {
	queueTransactionCall {
		target: action.target,
		value: action.value,
		signature: action.signature.clone(),
		data: action.data.clone(),
		executionTime: U256::from(action.execution_time),
		withDelegatecall: action.with_delegatecall,
	}
	.abi_encode()
	.into()
}

pub fn encode_execute(action: &Action) -> Bytes {
	executeTransactionCall {
		target: action.target,
		value: action.value,
		signature: action.signature.clone(),
		data: action.data.clone(),
		executionTime: U256::from(action.execution_time),
		withDelegatecall: action.with_delegatecall,
	}
	.abi_encode()
	.into()
}

pub fn encode_cancel(action: &Action) -> Bytes {
	cancelTransactionCall {
		target: action.target,
		value: action.value,
		signature: action.signature.clone(),
		data: action.data.clone(),
		executionTime: U256::from(action.execution_time),
		withDelegatecall: action.with_delegatecall,
	}
	.abi_encode()
	.into()
}

/// Payload of `operation` for `action`.
pub fn encode(operation: TimeLockOperation, action: &Action) -> Bytes {
	match operation {
		TimeLockOperation::Queue => encode_queue(action),
		TimeLockOperation::Execute => encode_execute(action),
		TimeLockOperation::Cancel => encode_cancel(action),
	}
}

fn execution_time(value: U256) -> Result<u64, DecodeError> {
	u64::try_from(value).map_err(|e| DecodeError::new("execution time", e))
}

/// Recognizes a queue, execute or cancel payload and returns its action.
///
/// Returns `Ok(None)` when the selector is none of the three.
pub fn decode_call(data: &[u8]) -> Result<Option<(TimeLockOperation, Action)>, DecodeError> {
	let Some(selector) = data.get(..4) else {
		return Ok(None);
	};

	let decoded = if selector == queueTransactionCall::SELECTOR {
		let c = queueTransactionCall::abi_decode(data, true)
			.map_err(|e| DecodeError::new("queueTransaction", e))?;
		let action = Action {
			target: c.target,
			value: c.value,
			signature: c.signature,
			data: c.data,
			execution_time: execution_time(c.executionTime)?,
			with_delegatecall: c.withDelegatecall,
		};
		(TimeLockOperation::Queue, action)
	} else if selector == executeTransactionCall::SELECTOR {
		let c = executeTransactionCall::abi_decode(data, true)
			.map_err(|e| DecodeError::new("executeTransaction", e))?;
		let action = Action {
			target: c.target,
			value: c.value,
			signature: c.signature,
			data: c.data,
			execution_time: execution_time(c.executionTime)?,
			with_delegatecall: c.withDelegatecall,
		};
		(TimeLockOperation::Execute, action)
	} else if selector == cancelTransactionCall::SELECTOR {
		let c = cancelTransactionCall::abi_decode(data, true)
			.map_err(|e| DecodeError::new("cancelTransaction", e))?;
		let action = Action {
			target: c.target,
			value: c.value,
			signature: c.signature,
			data: c.data,
			execution_time: execution_time(c.executionTime)?,
			with_delegatecall: c.withDelegatecall,
		};
		(TimeLockOperation::Cancel, action)
	} else {
		return Ok(None);
	};

	Ok(Some(decoded))
}

/// Topic of the `QueuedAction` event.
pub fn queued_action_topic() -> B256 {
	QueuedAction::SIGNATURE_HASH
}

/// Decodes a `QueuedAction` log into its action hash and action.
pub fn decode_queued_event(log: &Log) -> Result<(B256, Action), DecodeError> {
	let event = QueuedAction::decode_raw_log(log.topics.iter().copied(), &log.data, true)
		.map_err(|e| DecodeError::new("QueuedAction", e))?;

	let action = Action {
		target: event.target,
		value: event.value,
		signature: event.signature,
		data: event.data,
		execution_time: execution_time(event.executionTime)?,
		with_delegatecall: event.withDelegatecall,
	};
	Ok((event.actionHash, action))
}

pub fn encode_is_action_queued(action_hash: B256) -> Bytes {
	IExecutorWithTimelock::isActionQueuedCall {
		actionHash: action_hash,
	}
	.abi_encode()
	.into()
}

pub fn decode_bool(data: &[u8]) -> Result<bool, DecodeError> {
	bool::abi_decode(data, true).map_err(|e| DecodeError::new("bool", e))
}

pub fn encode_get_delay() -> Bytes {
	IExecutorWithTimelock::getDelayCall {}.abi_encode().into()
}

pub fn encode_grace_period() -> Bytes {
	IExecutorWithTimelock::GRACE_PERIODCall {}.abi_encode().into()
}

/// Decodes a `uint256` return that must fit a `u64` (delays, grace periods).
pub fn decode_seconds(data: &[u8]) -> Result<u64, DecodeError> {
	let value = U256::abi_decode(data, true).map_err(|e| DecodeError::new("uint256", e))?;
	u64::try_from(value).map_err(|e| DecodeError::new("seconds", e))
}

/// Log encoding of a `QueuedAction` event. Used to seed chain doubles.
#[cfg(test)]
pub(crate) fn queued_event_log(timelock: alloy_primitives::Address, action: &Action) -> Log {
	let event = QueuedAction {
		actionHash: action_hash(action),
		target: action.target,
		value: action.value,
		signature: action.signature.clone(),
		data: action.data.clone(),
		executionTime: U256::from(action.execution_time),
		withDelegatecall: action.with_delegatecall,
	};
	let encoded = event.encode_log_data();
	Log {
		address: timelock,
		topics: encoded.topics().to_vec(),
		data: encoded.data,
		block_number: None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_primitives::{address, bytes, hex};

	fn sample() -> Action {
		Action::call(
			address!("00000000000000000000000000000000000AAAAA"),
			bytes!("1234"),
			1000,
		)
	}

	#[test]
	fn test_selectors_match_executor() {
		assert_eq!(queueTransactionCall::SELECTOR, hex!("8d8fe2e3"));
		assert_eq!(executeTransactionCall::SELECTOR, hex!("8902ab65"));
		assert_eq!(cancelTransactionCall::SELECTOR, hex!("1dc40b51"));
	}

	#[test]
	fn test_action_hash_is_keccak_of_abi_encoded_tuple() {
		let action = sample();

		// abi.encode lays the six members out as a head of six words followed
		// by the two dynamic tails; built by hand here.
		let mut expected = Vec::new();
		let word = |v: U256| v.to_be_bytes::<32>().to_vec();
		let mut target = [0u8; 32];
		target[12..].copy_from_slice(action.target.as_slice());
		expected.extend_from_slice(&target);
		expected.extend(word(U256::ZERO));
		expected.extend(word(U256::from(6 * 32))); // signature offset
		expected.extend(word(U256::from(7 * 32))); // data offset
		expected.extend(word(U256::from(1000)));
		expected.extend(word(U256::ZERO));
		expected.extend(word(U256::ZERO)); // empty signature
		expected.extend(word(U256::from(2))); // data length
		let mut data_word = [0u8; 32];
		data_word[..2].copy_from_slice(&[0x12, 0x34]);
		expected.extend_from_slice(&data_word);

		assert_eq!(action_hash(&action), keccak256(&expected));
		assert_eq!(action_hash(&action), action_hash(&sample()));
	}

	#[test]
	fn test_hash_depends_on_every_member() {
		let base = sample();
		let mut later = sample();
		later.execution_time += 1;
		let mut named = sample();
		named.signature = "setFee(uint256)".to_string();
		let mut delegate = sample();
		delegate.with_delegatecall = true;

		for other in [later, named, delegate] {
			assert_ne!(action_hash(&base), action_hash(&other));
		}
	}

	#[test]
	fn test_payloads_decode_back() {
		let action = sample();
		for op in [
			TimeLockOperation::Queue,
			TimeLockOperation::Execute,
			TimeLockOperation::Cancel,
		] {
			let (decoded_op, decoded) = decode_call(&encode(op, &action)).unwrap().unwrap();
			assert_eq!(decoded_op, op);
			assert_eq!(decoded, action);
			// The empty signature survives.
			assert_eq!(decoded.signature, "");
		}
	}

	#[test]
	fn test_unrelated_calls_are_not_decoded() {
		assert!(decode_call(&hex!("a9059cbb")).unwrap().is_none());
		assert!(decode_call(&[0x8d]).unwrap().is_none());
		assert!(decode_call(&hex!("8d8fe2e3")).is_err());
	}

	#[test]
	fn test_queued_event_round_trip() {
		let timelock = address!("00000000000000000000000000000000000b0b0b");
		let log = queued_event_log(timelock, &sample());
		assert_eq!(log.topics[0], queued_action_topic());

		let (hash, action) = decode_queued_event(&log).unwrap();
		assert_eq!(hash, action_hash(&sample()));
		assert_eq!(action, sample());
	}

	#[test]
	fn test_return_decoding() {
		assert!(decode_bool(&true.abi_encode()).unwrap());
		assert_eq!(decode_seconds(&U256::from(86400).abi_encode()).unwrap(), 86400);
		assert!(decode_seconds(&U256::MAX.abi_encode()).is_err());
	}
}
