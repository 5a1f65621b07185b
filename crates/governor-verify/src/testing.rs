//! Recording verifier for tests.

use crate::{VerificationRequest, VerifierInterface, VerifyError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MockState {
	requests: Vec<VerificationRequest>,
	failing: HashSet<String>,
}

/// Verifier that accepts every request except those for failing ids.
#[derive(Clone, Default)]
pub struct MockVerifier {
	state: Arc<Mutex<MockState>>,
}

impl MockVerifier {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Rejects every request for `contract_id`.
	pub fn fail_for(&self, contract_id: &str) {
		self.state().failing.insert(contract_id.to_string());
	}

	/// Requests received so far, in arrival order.
	pub fn requests(&self) -> Vec<VerificationRequest> {
		self.state().requests.clone()
	}
}

#[async_trait]
impl VerifierInterface for MockVerifier {
	async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError> {
		let mut state = self.state();
		state.requests.push(request.clone());
		if state.failing.contains(&request.contract_id) {
			return Err(VerifyError::Failed(format!(
				"{} rejected by explorer",
				request.contract_id
			)));
		}
		Ok(())
	}
}
