//! The submitter-transaction state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::payment::Asset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitterTransactionState {
	Queued,
	Processing,
	Sent,
	Success,
	Error,
	Fatal,
}

impl SubmitterTransactionState {
	/// Allowed transitions out of each state.
	pub fn allowed_next(self) -> &'static [SubmitterTransactionState] {
		use SubmitterTransactionState::*;
		match self {
			Queued => &[Processing],
			Processing => &[Sent, Error],
			Sent => &[Success, Processing, Fatal],
			Success | Error | Fatal => &[],
		}
	}

	pub fn is_terminal(self) -> bool {
		self.allowed_next().is_empty()
	}

	/// Non-terminal states participate in the "at most one in-flight per
	/// external id" invariant.
	pub fn is_non_terminal(self) -> bool {
		!self.is_terminal()
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterTransaction {
	pub id: Uuid,
	pub external_id: String,
	pub tenant_id: Uuid,
	pub asset: Asset,
	pub amount: rust_decimal::Decimal,
	pub destination: String,
	pub state: SubmitterTransactionState,
	pub xdr_sent: Option<String>,
	pub xdr_received: Option<String>,
	pub sequence: Option<i64>,
	pub attempts: u32,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl SubmitterTransaction {
	pub fn transition(&mut self, next: SubmitterTransactionState, now: DateTime<Utc>) -> Result<(), CoreError> {
		if !self.state.allowed_next().contains(&next) {
			return Err(CoreError::validation(format!(
				"submitter transaction {} cannot transition {:?} -> {next:?}",
				self.id, self.state
			)));
		}
		self.state = next;
		self.updated_at = now;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sent_can_retry_back_to_processing() {
		assert!(SubmitterTransactionState::Sent.allowed_next().contains(&SubmitterTransactionState::Processing));
	}

	#[test]
	fn terminal_states_accept_nothing() {
		for s in [
			SubmitterTransactionState::Success,
			SubmitterTransactionState::Error,
			SubmitterTransactionState::Fatal,
		] {
			assert!(s.is_terminal());
			assert!(s.allowed_next().is_empty());
		}
	}
}
