//! Dispatch of administrative calls.
//!
//! The configured [`Executor`] decides what happens to a `(target, data)`
//! pair: buffered as a time-lock action, proposed to the multisig (wrapped in
//! a time-lock call or not), sent directly, or only printed.

use alloy_primitives::{Address, Bytes, B256};
use governor_delivery::{DeliveryError, DeliveryService};
use governor_safe::{SafeError, SafeService};
use governor_storage::{RegistryService, StorageError};
use governor_timelock::{decode_call, TimeLockError, TimeLockService};
use governor_types::{
	MetaTransaction, Operation, PendingAction, TargetedCall, TimeLockOperation, TransactionHash,
	TIME_LOCK_ID,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum DispatchError {
	#[error("Time-lock error: {0}")]
	TimeLock(#[from] TimeLockError),
	#[error("Safe error: {0}")]
	Safe(#[from] SafeError),
	#[error("Delivery error: {0}")]
	Delivery(#[from] DeliveryError),
	#[error("Storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("Invalid dispatch: {0}")]
	Invalid(String),
}

/// Governance backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Executor {
	/// Buffer time-lock actions locally for a later `queue_buffered`.
	TimeLock,
	/// Propose the raw calls to the multisig.
	Safe,
	/// Propose time-lock calls to the multisig.
	SafeWithTimeLock,
	/// Send the calls from the deployer account.
	Run,
	/// Print the calls only.
	#[default]
	None,
}

impl From<&str> for Executor {
	/// Unknown tokens fall back to printing.
	fn from(token: &str) -> Self {
		match token {
			"TimeLock" => Executor::TimeLock,
			"Safe" => Executor::Safe,
			"SafeWithTimeLock" => Executor::SafeWithTimeLock,
			"Run" => Executor::Run,
			"" => Executor::None,
			other => {
				tracing::warn!(executor = %other, "Unknown executor, calls will only be printed");
				Executor::None
			},
		}
	}
}

impl fmt::Display for Executor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Executor::TimeLock => "TimeLock",
			Executor::Safe => "Safe",
			Executor::SafeWithTimeLock => "SafeWithTimeLock",
			Executor::Run => "Run",
			Executor::None => "None",
		};
		write!(f, "{}", s)
	}
}

/// One logical action of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchCall {
	pub target: Address,
	pub data: Bytes,
	/// Time-lock execution time; defaults to the latest block plus the buffering time.
	pub execution_time: Option<u64>,
}

impl DispatchCall {
	pub fn new(target: Address, data: Bytes) -> Self {
		Self {
			target,
			data,
			execution_time: None,
		}
	}

	/// Pairs parallel lists of targets, data and execution times.
	pub fn zip(
		targets: Vec<Address>,
		datas: Vec<Bytes>,
		execution_times: Vec<Option<u64>>,
	) -> Result<Vec<Self>, DispatchError> {
		if targets.len() != datas.len() || targets.len() != execution_times.len() {
			return Err(DispatchError::Invalid(format!(
				"{} targets, {} data and {} execution times",
				targets.len(),
				datas.len(),
				execution_times.len()
			)));
		}
		Ok(targets
			.into_iter()
			.zip(datas)
			.zip(execution_times)
			.map(|((target, data), execution_time)| Self {
				target,
				data,
				execution_time,
			})
			.collect())
	}
}

/// What a dispatch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
	/// Hashes of the actions appended to the pending buffer.
	Buffered(Vec<B256>),
	/// Hashes of the multisig proposals.
	Proposed(Vec<B256>),
	Submitted(Vec<TransactionHash>),
	Printed(Vec<TargetedCall>),
}

/// Time-lock parameters, bound to the executor address at dispatch time.
#[derive(Debug, Clone, Copy)]
pub struct TimeLockSettings {
	pub buffering_time: u64,
	pub default_operation: TimeLockOperation,
}

pub struct DispatchRouter {
	executor: Executor,
	delivery: Arc<DeliveryService>,
	registry: Arc<RegistryService>,
	safe: Option<Arc<SafeService>>,
	timelock: TimeLockSettings,
}

impl DispatchRouter {
	pub fn new(
		executor: Executor,
		delivery: Arc<DeliveryService>,
		registry: Arc<RegistryService>,
		safe: Option<Arc<SafeService>>,
		timelock: TimeLockSettings,
	) -> Self {
		Self {
			executor,
			delivery,
			registry,
			safe,
			timelock,
		}
	}

	pub fn executor(&self) -> Executor {
		self.executor
	}

	/// The executor registered on the active network, if any.
	async fn registered_timelock(&self) -> Result<Option<TimeLockService>, DispatchError> {
		let Some(address) = self.registry.get_address(TIME_LOCK_ID).await? else {
			return Ok(None);
		};
		let address = address
			.parse::<Address>()
			.map_err(|e| DispatchError::Invalid(format!("Time-lock address: {}", e)))?;
		Ok(Some(TimeLockService::new(
			self.delivery.clone(),
			self.registry.clone(),
			address,
			self.timelock.buffering_time,
			self.timelock.default_operation,
		)))
	}

	/// The registered time-lock executor.
	pub async fn timelock(&self) -> Result<TimeLockService, DispatchError> {
		self.registered_timelock().await?.ok_or_else(|| {
			DispatchError::Invalid(format!(
				"{} is not deployed on {}",
				TIME_LOCK_ID,
				self.registry.network()
			))
		})
	}

	fn safe(&self) -> Result<&SafeService, DispatchError> {
		self.safe
			.as_deref()
			.ok_or_else(|| DispatchError::Invalid("No multisig configured".to_string()))
	}

	fn print(calls: &[DispatchCall]) -> DispatchOutcome {
		let calls: Vec<TargetedCall> = calls
			.iter()
			.map(|c| TargetedCall {
				target: c.target,
				data: c.data.clone(),
			})
			.collect();
		for call in &calls {
			tracing::info!(target_contract = %call.target, data = %call.data, "Dry run");
		}
		DispatchOutcome::Printed(calls)
	}

	/// Routes one call through the configured executor.
	pub async fn dispatch(&self, call: DispatchCall) -> Result<DispatchOutcome, DispatchError> {
		self.dispatch_many(std::slice::from_ref(&call)).await
	}

	/// Routes `calls` through the configured executor.
	///
	/// Multisig executors pack the calls into multi-send batches; the others
	/// handle them one by one, in order.
	#[instrument(skip_all, fields(executor = %self.executor, calls = calls.len()))]
	pub async fn dispatch_many(
		&self,
		calls: &[DispatchCall],
	) -> Result<DispatchOutcome, DispatchError> {
		match self.executor {
			Executor::TimeLock => {
				let Some(timelock) = self.registered_timelock().await? else {
					tracing::warn!("No time-lock executor registered, printing calls instead");
					return Ok(Self::print(calls));
				};
				let mut hashes = Vec::with_capacity(calls.len());
				for call in calls {
					let data = timelock
						.prepare(call.target, call.data.clone(), call.execution_time)
						.await?;
					timelock.buffer(&data).await?;
					hashes.push(data.action_hash());
				}
				Ok(DispatchOutcome::Buffered(hashes))
			},
			Executor::SafeWithTimeLock => {
				let timelock = self.timelock().await?;
				let safe = self.safe()?;
				let mut wrapped = Vec::with_capacity(calls.len());
				for call in calls {
					let data = timelock
						.prepare(call.target, call.data.clone(), call.execution_time)
						.await?;
					wrapped.push(MetaTransaction::call(data.new_target, data.new_data));
				}
				self.propose(safe, wrapped).await
			},
			Executor::Safe => {
				let safe = self.safe()?;
				let transactions = calls
					.iter()
					.map(|c| MetaTransaction::call(c.target, c.data.clone()))
					.collect();
				self.propose(safe, transactions).await
			},
			Executor::Run => {
				let mut hashes = Vec::with_capacity(calls.len());
				for call in calls {
					let receipt = self.delivery.execute(call.target, call.data.clone()).await?;
					tracing::info!(
						target_contract = %call.target,
						tx_hash = %receipt.hash,
						"Submitted transaction"
					);
					hashes.push(receipt.hash);
				}
				Ok(DispatchOutcome::Submitted(hashes))
			},
			Executor::None => Ok(Self::print(calls)),
		}
	}

	/// A single transaction is proposed as a plain `Call` to its target,
	/// without a one-element multi-send wrapper. Several go through multi-send.
	async fn propose(
		&self,
		safe: &SafeService,
		transactions: Vec<MetaTransaction>,
	) -> Result<DispatchOutcome, DispatchError> {
		let hashes = match transactions.as_slice() {
			[single] => vec![
				safe.propose(single.to, single.data.clone(), Operation::Call, 0)
					.await?,
			],
			_ => safe.propose_batch(&transactions).await?,
		};
		Ok(DispatchOutcome::Proposed(hashes))
	}

	/// Proposes every buffered action, wrapped for the default time-lock operation.
	pub async fn propose_buffered(&self) -> Result<DispatchOutcome, DispatchError> {
		let timelock = self.timelock().await?;
		let safe = self.safe()?;
		let operation = timelock.default_operation();

		let transactions: Vec<MetaTransaction> = timelock
			.buffered_actions()
			.await?
			.into_iter()
			.map(|entry| MetaTransaction::call(timelock.address(), payload(entry, operation)))
			.collect();
		if transactions.is_empty() {
			tracing::info!("No buffered actions to propose");
			return Ok(DispatchOutcome::Proposed(Vec::new()));
		}

		tracing::info!(
			actions = transactions.len(),
			operation = %operation,
			"Proposing buffered actions"
		);
		Ok(DispatchOutcome::Proposed(
			safe.propose_batch(&transactions).await?,
		))
	}

	/// Calls carried by the pending multisig proposals.
	///
	/// Calls to the time-lock executor are unwrapped into the call they queue,
	/// execute or cancel.
	pub async fn decode_safe(&self) -> Result<Vec<TargetedCall>, DispatchError> {
		let calls = self.safe()?.pending_calls().await?;
		let timelock = self.registered_timelock().await?.map(|t| t.address());

		let mut decoded = Vec::with_capacity(calls.len());
		for call in calls {
			if Some(call.target) == timelock {
				if let Some((_, action)) = decode_call(&call.data).map_err(TimeLockError::from)? {
					decoded.push(TargetedCall {
						target: action.target,
						data: action.data,
					});
					continue;
				}
			}
			decoded.push(call);
		}
		Ok(decoded)
	}
}

fn payload(entry: PendingAction, operation: TimeLockOperation) -> Bytes {
	match operation {
		TimeLockOperation::Queue => entry.queue_data,
		TimeLockOperation::Execute => entry.execute_data,
		TimeLockOperation::Cancel => entry.cancel_data,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_sol_types::{SolCall, SolValue};
	use governor_account::implementations::local::LocalWallet;
	use governor_account::AccountService;
	use governor_delivery::testing::MockDelivery;
	use governor_safe::testing::MockSafe;
	use governor_safe::{multisend, PendingSafeTransaction, SafeSettings};
	use governor_storage::implementations::memory::MemoryStorage;
	use governor_timelock::codec;
	use governor_timelock::codec::IExecutorWithTimelock::{
		getDelayCall, isActionQueuedCall, GRACE_PERIODCall,
	};
	use governor_types::{Action, RegistryRecord, SecretString, U256};

	const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const TIME_LOCK: Address = Address::repeat_byte(0x71);
	const SAFE: Address = Address::repeat_byte(0x5a);
	const MULTI_SEND: Address = Address::repeat_byte(0x3d);
	const TARGET: Address = Address::repeat_byte(0xaa);

	struct Harness {
		mock: MockDelivery,
		safe: MockSafe,
		registry: Arc<RegistryService>,
		delivery: Arc<DeliveryService>,
		safe_service: Arc<SafeService>,
	}

	impl Harness {
		async fn new(with_timelock: bool) -> Self {
			let mock = MockDelivery::new();
			mock.set_block_timestamp(1_000_000);
			mock.set_selector_response(
				TIME_LOCK,
				getDelayCall::SELECTOR,
				U256::from(86400).abi_encode().into(),
			);
			mock.set_selector_response(
				TIME_LOCK,
				GRACE_PERIODCall::SELECTOR,
				U256::from(3600).abi_encode().into(),
			);
			mock.set_selector_response(
				TIME_LOCK,
				isActionQueuedCall::SELECTOR,
				false.abi_encode().into(),
			);

			let registry = Arc::new(RegistryService::new(Box::new(MemoryStorage::new()), "anvil"));
			if with_timelock {
				registry
					.set(
						TIME_LOCK_ID,
						&RegistryRecord {
							address: TIME_LOCK.to_checksum(None),
							..Default::default()
						},
					)
					.await
					.unwrap();
			}

			let safe = MockSafe::new();
			safe.set_next_nonce(7);
			let account = Arc::new(AccountService::new(Box::new(
				LocalWallet::new(&SecretString::from(ANVIL_KEY)).unwrap(),
			)));
			let safe_service = Arc::new(SafeService::new(
				Box::new(safe.clone()),
				account,
				SafeSettings {
					chain_id: 31337,
					safe: SAFE,
					multisend: MULTI_SEND,
					nonce_override: None,
					chunk_size: 2,
				},
			));

			Self {
				delivery: Arc::new(DeliveryService::new(Box::new(mock.clone()), 31337, 1)),
				mock,
				safe,
				registry,
				safe_service,
			}
		}

		fn router(&self, executor: Executor) -> DispatchRouter {
			DispatchRouter::new(
				executor,
				self.delivery.clone(),
				self.registry.clone(),
				Some(self.safe_service.clone()),
				TimeLockSettings {
					buffering_time: 14400,
					default_operation: TimeLockOperation::Queue,
				},
			)
		}
	}

	fn call(byte: u8) -> DispatchCall {
		DispatchCall::new(TARGET, Bytes::from(vec![0x12, byte]))
	}

	#[test]
	fn test_executor_tokens() {
		assert_eq!(Executor::from("TimeLock"), Executor::TimeLock);
		assert_eq!(Executor::from("Safe"), Executor::Safe);
		assert_eq!(Executor::from("SafeWithTimeLock"), Executor::SafeWithTimeLock);
		assert_eq!(Executor::from("Run"), Executor::Run);
		assert_eq!(Executor::from(""), Executor::None);
		assert_eq!(Executor::from("Multisig"), Executor::None);
	}

	#[test]
	fn test_zip_requires_equal_lengths() {
		assert!(DispatchCall::zip(vec![TARGET], vec![], vec![None]).is_err());
		let calls = DispatchCall::zip(
			vec![TARGET, SAFE],
			vec![Bytes::new(), Bytes::from(vec![1])],
			vec![Some(5), None],
		)
		.unwrap();
		assert_eq!(calls[0].execution_time, Some(5));
		assert_eq!(calls[1].target, SAFE);
	}

	#[tokio::test]
	async fn test_timelock_buffers_pending_action() {
		let h = Harness::new(true).await;
		let mut c = DispatchCall::new(TARGET, Bytes::from(vec![0x12, 0x34]));
		c.execution_time = Some(1000);

		let outcome = h.router(Executor::TimeLock).dispatch(c).await.unwrap();

		let pending = h.registry.pending_actions().await.unwrap();
		assert_eq!(pending.len(), 1);
		assert_eq!(
			outcome,
			DispatchOutcome::Buffered(vec![pending[0].action_hash])
		);
		assert_eq!(pending[0].action.execution_time, 1000);
		assert_eq!(pending[0].execute_time, "1970-01-02 00:16:40 UTC");
		assert_eq!(pending[0].queue_expire_time, "1969-12-31 00:16:40 UTC");
		assert_eq!(pending[0].execute_expire_time, "1970-01-01 01:16:40 UTC");
		assert!(h.mock.submissions().is_empty());
	}

	#[tokio::test]
	async fn test_timelock_without_executor_prints() {
		let h = Harness::new(false).await;
		let outcome = h.router(Executor::TimeLock).dispatch(call(1)).await.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Printed(calls) if calls.len() == 1));
		assert!(h.registry.pending_actions().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_safe_with_timelock_proposes_queue_call() {
		let h = Harness::new(true).await;
		let outcome = h
			.router(Executor::SafeWithTimeLock)
			.dispatch(call(1))
			.await
			.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Proposed(ref hashes) if hashes.len() == 1));

		let proposals = h.safe.proposals();
		assert_eq!(proposals.len(), 1);
		let tx = &proposals[0].transaction;
		assert_eq!(tx.to, TIME_LOCK);
		assert_eq!(tx.operation, Operation::Call);
		assert_eq!(tx.nonce, 7);

		let (operation, action) = decode_call(&tx.data).unwrap().unwrap();
		assert_eq!(operation, TimeLockOperation::Queue);
		assert_eq!(action.target, TARGET);
		assert_eq!(action.execution_time, 1_000_000 + 14400);
		assert!(h.registry.pending_actions().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_safe_batches_in_chunks() {
		let h = Harness::new(false).await;
		let calls: Vec<DispatchCall> = (0..5).map(call).collect();
		let outcome = h.router(Executor::Safe).dispatch_many(&calls).await.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Proposed(ref hashes) if hashes.len() == 3));

		let proposals = h.safe.proposals();
		assert_eq!(proposals.len(), 3);
		let mut inner = Vec::new();
		for proposal in &proposals {
			assert_eq!(proposal.transaction.to, MULTI_SEND);
			assert_eq!(proposal.transaction.operation, Operation::DelegateCall);
			let batch = multisend::decode_multi_send(&proposal.transaction.data).unwrap();
			assert!(batch.len() <= 2);
			inner.extend(batch);
		}
		let datas: Vec<Bytes> = inner.into_iter().map(|t| t.data).collect();
		let expected: Vec<Bytes> = calls.into_iter().map(|c| c.data).collect();
		assert_eq!(datas, expected);
	}

	#[tokio::test]
	async fn test_run_submits_each_call() {
		let h = Harness::new(false).await;
		let outcome = h
			.router(Executor::Run)
			.dispatch_many(&[call(1), call(2)])
			.await
			.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Submitted(ref hashes) if hashes.len() == 2));

		let submissions = h.mock.submissions();
		assert_eq!(submissions.len(), 2);
		assert_eq!(submissions[1].to, Some(TARGET));
		assert_eq!(submissions[1].data, call(2).data);
	}

	#[tokio::test]
	async fn test_none_prints_without_side_effects() {
		let h = Harness::new(true).await;
		let outcome = h.router(Executor::None).dispatch(call(9)).await.unwrap();
		assert_eq!(
			outcome,
			DispatchOutcome::Printed(vec![TargetedCall {
				target: TARGET,
				data: call(9).data,
			}])
		);
		assert!(h.mock.submissions().is_empty());
		assert!(h.safe.proposals().is_empty());
	}

	#[tokio::test]
	async fn test_propose_buffered_wraps_default_operation() {
		let h = Harness::new(true).await;
		let router = h.router(Executor::TimeLock);
		router.dispatch_many(&[call(1), call(2)]).await.unwrap();

		let outcome = router.propose_buffered().await.unwrap();
		assert!(matches!(outcome, DispatchOutcome::Proposed(ref hashes) if hashes.len() == 1));

		let proposals = h.safe.proposals();
		let batch = multisend::decode_multi_send(&proposals[0].transaction.data).unwrap();
		assert_eq!(batch.len(), 2);
		assert!(batch.iter().all(|t| t.to == TIME_LOCK));
		let (operation, action) = decode_call(&batch[1].data).unwrap().unwrap();
		assert_eq!(operation, TimeLockOperation::Queue);
		assert_eq!(action.data, call(2).data);
	}

	#[tokio::test]
	async fn test_decode_safe_unwraps_timelock_calls() {
		let h = Harness::new(true).await;
		let action = Action::call(TARGET, Bytes::from(vec![0xbe, 0xef]), 5000);
		h.safe.push_pending(PendingSafeTransaction {
			to: TIME_LOCK,
			data: Some(codec::encode_execute(&action)),
			nonce: 7,
			submission_date: Default::default(),
			safe_tx_hash: None,
		});
		h.safe.push_pending(PendingSafeTransaction {
			to: SAFE,
			data: Some(Bytes::from(vec![0x01])),
			nonce: 8,
			submission_date: Default::default(),
			safe_tx_hash: None,
		});

		let calls = h.router(Executor::Safe).decode_safe().await.unwrap();
		assert_eq!(
			calls,
			vec![
				TargetedCall {
					target: TARGET,
					data: Bytes::from(vec![0xbe, 0xef]),
				},
				TargetedCall {
					target: SAFE,
					data: Bytes::from(vec![0x01]),
				},
			]
		);
	}

	#[tokio::test]
	async fn test_multisig_executors_need_a_safe() {
		let h = Harness::new(true).await;
		let router = DispatchRouter::new(
			Executor::Safe,
			h.delivery.clone(),
			h.registry.clone(),
			None,
			TimeLockSettings {
				buffering_time: 0,
				default_operation: TimeLockOperation::Queue,
			},
		);
		assert!(matches!(
			router.dispatch(call(1)).await,
			Err(DispatchError::Invalid(_))
		));
	}
}
