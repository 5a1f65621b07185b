//! Governance payload types.
//!
//! An [`Action`] is the 6-tuple understood by the time-lock executor. Once an
//! action has been hashed and its three call payloads encoded it becomes a
//! [`PendingAction`], which is what the registry keeps in its append-only
//! queue. [`MetaTransaction`] is one entry of a multi-send batch.

use crate::utils::format_timestamp;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A time-lock action: `(target, value, signature, data, executionTime, withDelegatecall)`.
///
/// An empty `signature` means `data` is the raw call payload. It must be kept
/// as the empty string, the executor hashes it as such.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
	pub target: Address,
	pub value: U256,
	pub signature: String,
	pub data: Bytes,
	pub execution_time: u64,
	pub with_delegatecall: bool,
}

impl Action {
	/// A plain call action: zero value, empty signature, no delegatecall.
	pub fn call(target: Address, data: Bytes, execution_time: u64) -> Self {
		Self {
			target,
			value: U256::ZERO,
			signature: String::new(),
			data,
			execution_time,
			with_delegatecall: false,
		}
	}
}

// Persisted as a JSON array so entries match the executor's argument order.
impl Serialize for Action {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		(
			self.target,
			self.value.to_string(),
			&self.signature,
			&self.data,
			self.execution_time.to_string(),
			self.with_delegatecall,
		)
			.serialize(serializer)
	}
}

impl<'de> Deserialize<'de> for Action {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let (target, value, signature, data, execution_time, with_delegatecall): (
			Address,
			NumberOrString,
			String,
			Bytes,
			NumberOrString,
			bool,
		) = Deserialize::deserialize(deserializer)?;

		let value = U256::from_str(&value.0).map_err(de::Error::custom)?;
		let execution_time = execution_time.0.parse::<u64>().map_err(de::Error::custom)?;

		Ok(Self {
			target,
			value,
			signature,
			data,
			execution_time,
			with_delegatecall,
		})
	}
}

/// Accepts `0` as well as `"0"` for numeric tuple members.
struct NumberOrString(String);

impl<'de> Deserialize<'de> for NumberOrString {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		match serde_json::Value::deserialize(deserializer)? {
			serde_json::Value::String(s) => Ok(Self(s)),
			serde_json::Value::Number(n) => Ok(Self(n.to_string())),
			other => Err(de::Error::custom(format!(
				"expected number or string, got {}",
				other
			))),
		}
	}
}

/// Timestamps derived from an action's execution time and the executor's settings.
///
/// Signed because `queue_expire_time` may fall before the epoch when the
/// delay exceeds the execution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryWindows {
	/// Earliest time the action can be executed.
	pub execute_time: i128,
	/// Time by which the action should have been queued.
	pub queue_expire_time: i128,
	/// After this the action can no longer be executed.
	pub execute_expire_time: i128,
}

impl ExpiryWindows {
	pub fn new(execution_time: u64, delay: u64, grace_period: u64) -> Self {
		let t = i128::from(execution_time);
		let d = i128::from(delay);
		Self {
			execute_time: t + d,
			queue_expire_time: t - d,
			execute_expire_time: t + i128::from(grace_period),
		}
	}

	/// Whether the action is past its execution window at `now`.
	pub fn is_expired_at(&self, now: u64) -> bool {
		i128::from(now) > self.execute_expire_time
	}
}

/// One of the three time-lock transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeLockOperation {
	#[default]
	Queue,
	Execute,
	Cancel,
}

impl FromStr for TimeLockOperation {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"queue" => Ok(Self::Queue),
			"execute" => Ok(Self::Execute),
			"cancel" => Ok(Self::Cancel),
			other => Err(format!("Unknown time-lock operation '{}'", other)),
		}
	}
}

impl fmt::Display for TimeLockOperation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Self::Queue => "queue",
			Self::Execute => "execute",
			Self::Cancel => "cancel",
		};
		write!(f, "{}", s)
	}
}

/// An entry of the per-network pending time-lock queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
	pub action: Action,
	pub action_hash: B256,
	pub queue_data: Bytes,
	pub execute_data: Bytes,
	pub cancel_data: Bytes,
	/// Human-readable timestamps, informational only.
	#[serde(default)]
	pub execute_time: String,
	#[serde(default)]
	pub queue_expire_time: String,
	#[serde(default)]
	pub execute_expire_time: String,
}

impl PendingAction {
	/// Builds a queue entry, rendering the windows as readable timestamps.
	pub fn new(
		action: Action,
		action_hash: B256,
		queue_data: Bytes,
		execute_data: Bytes,
		cancel_data: Bytes,
		windows: &ExpiryWindows,
	) -> Self {
		Self {
			action,
			action_hash,
			queue_data,
			execute_data,
			cancel_data,
			execute_time: format_timestamp(windows.execute_time),
			queue_expire_time: format_timestamp(windows.queue_expire_time),
			execute_expire_time: format_timestamp(windows.execute_expire_time),
		}
	}
}

/// Multisig call type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Operation {
	#[default]
	Call,
	DelegateCall,
}

impl Operation {
	pub fn as_u8(&self) -> u8 {
		match self {
			Operation::Call => 0,
			Operation::DelegateCall => 1,
		}
	}
}

impl TryFrom<u8> for Operation {
	type Error = String;

	fn try_from(value: u8) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(Operation::Call),
			1 => Ok(Operation::DelegateCall),
			other => Err(format!("Invalid operation {}", other)),
		}
	}
}

impl Serialize for Operation {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_u8(self.as_u8())
	}
}

impl<'de> Deserialize<'de> for Operation {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let value = u8::deserialize(deserializer)?;
		Operation::try_from(value).map_err(de::Error::custom)
	}
}

/// One call inside a multi-send batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
	pub to: Address,
	pub value: U256,
	pub data: Bytes,
	#[serde(default)]
	pub operation: Operation,
}

impl MetaTransaction {
	pub fn call(to: Address, data: Bytes) -> Self {
		Self {
			to,
			value: U256::ZERO,
			data,
			operation: Operation::Call,
		}
	}
}

/// A target and its call data, as printed by the inspection commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetedCall {
	pub target: Address,
	pub data: Bytes,
}

impl fmt::Display for TargetedCall {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "target: {}, data: {}", self.target, self.data)
	}
}
