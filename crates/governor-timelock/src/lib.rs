//! Time-lock governance for the governor tool.
//!
//! Wraps calls destined for governed contracts into executor actions, keeps
//! the per-network buffer of actions awaiting queueing, and drives the
//! operator flows over that buffer and over the executor's own event log.

use governor_delivery::{DeliveryError, DeliveryService};
use governor_storage::{RegistryService, StorageError};
use governor_types::{
	Action, Address, Bytes, ExpiryWindows, LogFilter, PendingAction, TimeLockOperation, B256,
};
use std::sync::Arc;
use thiserror::Error;

pub mod codec;

pub use codec::{action_hash, decode_call, DecodeError};

/// Default buffer between the latest block and an action's execution time.
pub const DEFAULT_BUFFERING_TIME: u64 = 14400;

/// Errors that can occur during time-lock operations.
#[derive(Debug, Error)]
pub enum TimeLockError {
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Decode error: {0}")]
	Decode(#[from] DecodeError),
}

/// Everything derived for one call routed through the executor.
#[derive(Debug, Clone)]
pub struct TimeLockData {
	pub pending: PendingAction,
	pub windows: ExpiryWindows,
	/// Whether the executor already holds this exact action.
	pub is_queued: bool,
	/// Address the wrapped call is sent to instead of the original target.
	pub new_target: Address,
	/// Payload of the configured default operation.
	pub new_data: Bytes,
}

impl TimeLockData {
	pub fn action(&self) -> &Action {
		&self.pending.action
	}

	pub fn action_hash(&self) -> B256 {
		self.pending.action_hash
	}

	/// Payload of `operation` for this action.
	pub fn payload(&self, operation: TimeLockOperation) -> Bytes {
		match operation {
			TimeLockOperation::Queue => self.pending.queue_data.clone(),
			TimeLockOperation::Execute => self.pending.execute_data.clone(),
			TimeLockOperation::Cancel => self.pending.cancel_data.clone(),
		}
	}
}

/// Outcome of one operator pass over the buffer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferReport {
	/// Actions a transaction was sent for.
	pub sent: Vec<B256>,
	pub skipped: Vec<B256>,
}

/// Time-lock executor bound to the active network.
pub struct TimeLockService {
	delivery: Arc<DeliveryService>,
	registry: Arc<RegistryService>,
	address: Address,
	buffering_time: u64,
	default_operation: TimeLockOperation,
}

impl TimeLockService {
	pub fn new(
		delivery: Arc<DeliveryService>,
		registry: Arc<RegistryService>,
		address: Address,
		buffering_time: u64,
		default_operation: TimeLockOperation,
	) -> Self {
		Self {
			delivery,
			registry,
			address,
			buffering_time,
			default_operation,
		}
	}

	/// Address of the executor.
	pub fn address(&self) -> Address {
		self.address
	}

	pub fn default_operation(&self) -> TimeLockOperation {
		self.default_operation
	}

	pub async fn delay(&self) -> Result<u64, TimeLockError> {
		let raw = self.delivery.call(self.address, codec::encode_get_delay()).await?;
		Ok(codec::decode_seconds(&raw)?)
	}

	pub async fn grace_period(&self) -> Result<u64, TimeLockError> {
		let raw = self
			.delivery
			.call(self.address, codec::encode_grace_period())
			.await?;
		Ok(codec::decode_seconds(&raw)?)
	}

	pub async fn is_queued(&self, action_hash: B256) -> Result<bool, TimeLockError> {
		let raw = self
			.delivery
			.call(self.address, codec::encode_is_action_queued(action_hash))
			.await?;
		Ok(codec::decode_bool(&raw)?)
	}

	/// Latest block timestamp plus the buffering time.
	pub async fn default_execution_time(&self) -> Result<u64, TimeLockError> {
		let now = self.delivery.get_block_timestamp().await?;
		Ok(now.saturating_add(self.buffering_time))
	}

	/// Wraps `data` for `target` into an executor action.
	///
	/// Without an explicit `execution_time` the action becomes executable
	/// `buffering_time` seconds after the latest block.
	pub async fn prepare(
		&self,
		target: Address,
		data: Bytes,
		execution_time: Option<u64>,
	) -> Result<TimeLockData, TimeLockError> {
		let execution_time = match execution_time {
			Some(time) => time,
			None => self.default_execution_time().await?,
		};

		let action = Action::call(target, data, execution_time);
		let hash = codec::action_hash(&action);
		let is_queued = self.is_queued(hash).await?;
		let grace_period = self.grace_period().await?;
		let delay = self.delay().await?;
		let windows = ExpiryWindows::new(execution_time, delay, grace_period);

		let pending = PendingAction::new(
			action.clone(),
			hash,
			codec::encode_queue(&action),
			codec::encode_execute(&action),
			codec::encode_cancel(&action),
			&windows,
		);

		let data = TimeLockData {
			new_target: self.address,
			new_data: codec::encode(self.default_operation, &action),
			pending,
			windows,
			is_queued,
		};

		tracing::debug!(
			target_contract = %target,
			action_hash = %hash,
			execution_time,
			is_queued,
			execute_time = %data.pending.execute_time,
			execute_expire_time = %data.pending.execute_expire_time,
			"Prepared time-lock action"
		);
		Ok(data)
	}

	/// Appends `data` to the pending buffer.
	///
	/// The buffer is append-only; buffering the same action twice keeps both
	/// entries.
	pub async fn buffer(&self, data: &TimeLockData) -> Result<(), TimeLockError> {
		self.registry.append_pending_action(&data.pending).await?;
		tracing::info!(action_hash = %data.action_hash(), "Buffered time-lock action");
		Ok(())
	}

	/// Buffered actions, oldest first.
	pub async fn buffered_actions(&self) -> Result<Vec<PendingAction>, TimeLockError> {
		Ok(self.registry.pending_actions().await?)
	}

	/// Actions still queued on the executor and not past their grace period.
	///
	/// Scans the executor's `QueuedAction` events from genesis.
	pub async fn queued_actions(&self) -> Result<Vec<Action>, TimeLockError> {
		let filter = LogFilter {
			address: self.address,
			event_signature: codec::queued_action_topic(),
			from_block: 0,
			to_block: None,
		};
		let logs = self.delivery.get_logs(&filter).await?;
		let now = self.delivery.get_block_timestamp().await?;
		let delay = self.delay().await?;
		let grace_period = self.grace_period().await?;

		let mut actions = Vec::new();
		for log in &logs {
			let (hash, action) = codec::decode_queued_event(log)?;
			if !self.is_queued(hash).await? {
				continue;
			}
			if ExpiryWindows::new(action.execution_time, delay, grace_period).is_expired_at(now) {
				tracing::debug!(action_hash = %hash, "Skipping expired queued action");
				continue;
			}
			actions.push(action);
		}

		tracing::info!(events = logs.len(), live = actions.len(), "Scanned queued actions");
		Ok(actions)
	}

	/// Sends `queueTransaction` for every buffered action not queued yet.
	pub async fn queue_buffered(&self) -> Result<BufferReport, TimeLockError> {
		let mut report = BufferReport::default();
		for entry in self.buffered_actions().await? {
			if self.is_queued(entry.action_hash).await? {
				tracing::info!(action_hash = %entry.action_hash, "Action already queued, skipping");
				report.skipped.push(entry.action_hash);
				continue;
			}

			let receipt = self
				.delivery
				.execute(self.address, entry.queue_data.clone())
				.await?;
			tracing::info!(
				action_hash = %entry.action_hash,
				tx_hash = %receipt.hash,
				"Queued action"
			);
			report.sent.push(entry.action_hash);
		}
		Ok(report)
	}

	/// Sends `executeTransaction` for every buffered action currently queued.
	pub async fn execute_buffered(&self) -> Result<BufferReport, TimeLockError> {
		let mut report = BufferReport::default();
		for entry in self.buffered_actions().await? {
			if !self.is_queued(entry.action_hash).await? {
				tracing::info!(action_hash = %entry.action_hash, "Action not queued, skipping");
				report.skipped.push(entry.action_hash);
				continue;
			}

			let receipt = self
				.delivery
				.execute(self.address, entry.execute_data.clone())
				.await?;
			tracing::info!(
				action_hash = %entry.action_hash,
				tx_hash = %receipt.hash,
				"Executed action"
			);
			report.sent.push(entry.action_hash);
		}
		Ok(report)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_sol_types::{SolCall, SolValue};
	use codec::IExecutorWithTimelock::{
		getDelayCall, isActionQueuedCall, GRACE_PERIODCall,
	};
	use governor_delivery::testing::MockDelivery;
	use governor_storage::implementations::memory::MemoryStorage;
	use governor_types::U256;

	const TIMELOCK: Address = Address::repeat_byte(0x71);
	const TARGET: Address = Address::repeat_byte(0xaa);
	const DELAY: u64 = 86400;
	const GRACE: u64 = 3600;

	struct Fixture {
		mock: MockDelivery,
		registry: Arc<RegistryService>,
		service: TimeLockService,
	}

	fn fixture(operation: TimeLockOperation) -> Fixture {
		let mock = MockDelivery::new();
		mock.set_block_timestamp(1_000_000);
		mock.set_selector_response(
			TIMELOCK,
			getDelayCall::SELECTOR,
			U256::from(DELAY).abi_encode().into(),
		);
		mock.set_selector_response(
			TIMELOCK,
			GRACE_PERIODCall::SELECTOR,
			U256::from(GRACE).abi_encode().into(),
		);
		mock.set_selector_response(
			TIMELOCK,
			isActionQueuedCall::SELECTOR,
			false.abi_encode().into(),
		);

		let delivery = Arc::new(DeliveryService::new(Box::new(mock.clone()), 31337, 1));
		let registry = Arc::new(RegistryService::new(Box::new(MemoryStorage::new()), "anvil"));
		let service = TimeLockService::new(
			delivery,
			registry.clone(),
			TIMELOCK,
			DEFAULT_BUFFERING_TIME,
			operation,
		);
		Fixture {
			mock,
			registry,
			service,
		}
	}

	fn mark_queued(mock: &MockDelivery, action: &Action) {
		mock.set_call_response(
			TIMELOCK,
			codec::encode_is_action_queued(action_hash(action)),
			true.abi_encode().into(),
		);
	}

	#[tokio::test]
	async fn test_prepare_uses_buffered_execution_time() {
		let f = fixture(TimeLockOperation::Queue);
		let data = f
			.service
			.prepare(TARGET, Bytes::from(vec![0x12, 0x34]), None)
			.await
			.unwrap();

		assert_eq!(data.action().execution_time, 1_000_000 + 14400);
		assert_eq!(data.action().signature, "");
		assert_eq!(data.action().value, U256::ZERO);
		assert!(!data.action().with_delegatecall);
		assert_eq!(data.new_target, TIMELOCK);
		assert_eq!(data.new_data, data.pending.queue_data);
		assert!(!data.is_queued);
		assert_eq!(data.windows.execute_time, i128::from(1_014_400 + DELAY));
		assert_eq!(data.windows.execute_expire_time, i128::from(1_014_400 + GRACE));
	}

	#[tokio::test]
	async fn test_prepare_honors_explicit_time_and_operation() {
		let f = fixture(TimeLockOperation::Execute);
		let action = Action::call(TARGET, Bytes::from(vec![1]), 5000);
		mark_queued(&f.mock, &action);

		let data = f
			.service
			.prepare(TARGET, Bytes::from(vec![1]), Some(5000))
			.await
			.unwrap();

		assert_eq!(data.action(), &action);
		assert!(data.is_queued);
		assert_eq!(data.new_data, codec::encode_execute(&action));
		assert_eq!(data.payload(TimeLockOperation::Cancel), codec::encode_cancel(&action));
		// Delay larger than the execution time pushes the queue deadline before the epoch.
		assert_eq!(data.windows.queue_expire_time, 5000 - i128::from(DELAY));
	}

	#[tokio::test]
	async fn test_buffer_appends_in_order() {
		let f = fixture(TimeLockOperation::Queue);
		for byte in [1u8, 2, 2] {
			let data = f
				.service
				.prepare(TARGET, Bytes::from(vec![byte]), Some(10))
				.await
				.unwrap();
			f.service.buffer(&data).await.unwrap();
		}

		let buffered = f.service.buffered_actions().await.unwrap();
		assert_eq!(buffered.len(), 3);
		assert_eq!(buffered[0].action.data, Bytes::from(vec![1]));
		assert_eq!(buffered[1], buffered[2]);
		assert_eq!(f.registry.pending_actions().await.unwrap().len(), 3);
	}

	#[tokio::test]
	async fn test_queue_buffered_skips_already_queued() {
		let f = fixture(TimeLockOperation::Queue);
		let first = f.service.prepare(TARGET, Bytes::from(vec![1]), Some(10)).await.unwrap();
		let second = f.service.prepare(TARGET, Bytes::from(vec![2]), Some(10)).await.unwrap();
		f.service.buffer(&first).await.unwrap();
		f.service.buffer(&second).await.unwrap();
		mark_queued(&f.mock, first.action());

		let report = f.service.queue_buffered().await.unwrap();
		assert_eq!(report.skipped, vec![first.action_hash()]);
		assert_eq!(report.sent, vec![second.action_hash()]);

		let sent = f.mock.submissions();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].to, Some(TIMELOCK));
		assert_eq!(sent[0].data, second.pending.queue_data);
	}

	#[tokio::test]
	async fn test_execute_buffered_only_sends_queued() {
		let f = fixture(TimeLockOperation::Queue);
		let first = f.service.prepare(TARGET, Bytes::from(vec![1]), Some(10)).await.unwrap();
		let second = f.service.prepare(TARGET, Bytes::from(vec![2]), Some(10)).await.unwrap();
		f.service.buffer(&first).await.unwrap();
		f.service.buffer(&second).await.unwrap();
		mark_queued(&f.mock, second.action());

		let report = f.service.execute_buffered().await.unwrap();
		assert_eq!(report.sent, vec![second.action_hash()]);

		let sent = f.mock.submissions();
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].data, second.pending.execute_data);
	}

	#[tokio::test]
	async fn test_queued_actions_filters_stale_and_expired() {
		let f = fixture(TimeLockOperation::Queue);
		let live = Action::call(TARGET, Bytes::from(vec![1]), 1_000_000);
		// Expires exactly now, still executable.
		let last_second = Action::call(TARGET, Bytes::from(vec![4]), 1_000_000 - GRACE);
		let expired = Action::call(TARGET, Bytes::from(vec![2]), 1_000_000 - GRACE - 1);
		let executed = Action::call(TARGET, Bytes::from(vec![3]), 1_000_000);

		for action in [&live, &last_second, &expired, &executed] {
			f.mock.push_log(codec::queued_event_log(TIMELOCK, action));
		}
		// Unrelated emitter is ignored by the filter.
		f.mock.push_log(codec::queued_event_log(TARGET, &live));
		mark_queued(&f.mock, &live);
		mark_queued(&f.mock, &last_second);
		mark_queued(&f.mock, &expired);

		let actions = f.service.queued_actions().await.unwrap();
		assert_eq!(actions, vec![live, last_second]);
	}
}
