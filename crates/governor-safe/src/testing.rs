//! Recording multisig service for tests.

use crate::{PendingSafeTransaction, SafeError, SafeInterface, SafeProposal, SafeTransactionData};
use async_trait::async_trait;
use governor_types::{Address, U256};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
	next_nonce: u64,
	fail_estimates: bool,
	estimates: Vec<SafeTransactionData>,
	proposals: Vec<SafeProposal>,
	pending: Vec<PendingSafeTransaction>,
}

/// In-memory multisig service. Clones share state.
#[derive(Clone, Default)]
pub struct MockSafe {
	state: Arc<Mutex<MockState>>,
}

impl MockSafe {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn set_next_nonce(&self, nonce: u64) {
		self.state().next_nonce = nonce;
	}

	pub fn fail_estimates(&self, fail: bool) {
		self.state().fail_estimates = fail;
	}

	pub fn push_pending(&self, tx: PendingSafeTransaction) {
		self.state().pending.push(tx);
	}

	pub fn estimates(&self) -> Vec<SafeTransactionData> {
		self.state().estimates.clone()
	}

	/// Proposals received so far, in order.
	pub fn proposals(&self) -> Vec<SafeProposal> {
		self.state().proposals.clone()
	}
}

#[async_trait]
impl SafeInterface for MockSafe {
	async fn next_nonce(&self, _safe: Address) -> Result<u64, SafeError> {
		Ok(self.state().next_nonce)
	}

	async fn estimate(
		&self,
		_safe: Address,
		transaction: &SafeTransactionData,
	) -> Result<U256, SafeError> {
		let mut state = self.state();
		state.estimates.push(transaction.clone());
		if state.fail_estimates {
			return Err(SafeError::Service("estimation reverted".into()));
		}
		Ok(U256::from(50_000))
	}

	async fn propose(&self, proposal: &SafeProposal) -> Result<(), SafeError> {
		let mut state = self.state();
		state.proposals.push(proposal.clone());
		// The service counts the new proposal when handing out the next nonce.
		state.next_nonce = state.next_nonce.max(proposal.transaction.nonce + 1);
		Ok(())
	}

	async fn pending_transactions(
		&self,
		_safe: Address,
	) -> Result<Vec<PendingSafeTransaction>, SafeError> {
		Ok(self.state().pending.clone())
	}
}
