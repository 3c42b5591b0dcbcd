//! The payment aggregate and its status DAG.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::amount::Amount;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Draft,
	Ready,
	Pending,
	Success,
	Failed,
}

impl PaymentStatus {
	/// Status advances monotonically through draft -> ready -> pending ->
	/// success, or to failed from ready or pending.
	pub fn allowed_next(self) -> &'static [PaymentStatus] {
		use PaymentStatus::*;
		match self {
			Draft => &[Ready],
			// A precondition violation moves a ready payment straight to
			// failed without a pending hop.
			Ready => &[Pending, Failed],
			Pending => &[Success, Failed],
			Success => &[],
			Failed => &[],
		}
	}

	pub fn is_terminal(self) -> bool {
		self.allowed_next().is_empty()
	}

	pub fn can_transition_to(self, next: PaymentStatus) -> bool {
		self.allowed_next().contains(&next)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
	pub code: String,
	/// Empty issuer means the native asset; nativity is fully determined
	/// by this field, there is no separate native/non-native flag to fall
	/// out of sync with it.
	pub issuer: String,
}

impl Asset {
	pub fn is_native(&self) -> bool {
		self.issuer.is_empty()
	}

	/// Asset code must be non-empty. Because nativity is *defined* as
	/// "issuer is empty", there is no third state where a native/non-native
	/// flag could disagree with issuer emptiness, so that's the only
	/// structural check needed here.
	pub fn validate(&self) -> Result<(), CoreError> {
		if self.code.is_empty() {
			return Err(CoreError::validation("asset code must not be empty"));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
	pub timestamp: DateTime<Utc>,
	pub status: PaymentStatus,
	pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
	pub id: Uuid,
	pub tenant_id: Uuid,
	pub disbursement_id: Uuid,
	pub external_id: String,
	pub asset: Asset,
	pub amount: Amount,
	pub receiver_wallet_id: Uuid,
	pub status: PaymentStatus,
	pub status_history: Vec<StatusHistoryEntry>,
	pub stellar_transaction_hash: Option<String>,
	pub message: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Payment {
	/// Appends a history entry and advances `status`, rejecting any
	/// transition outside the allowed DAG and any timestamp that would
	/// make the history non-monotonic.
	pub fn transition(
		&mut self,
		next: PaymentStatus,
		message: Option<String>,
		now: DateTime<Utc>,
	) -> Result<(), CoreError> {
		if !self.status.can_transition_to(next) {
			return Err(CoreError::validation(format!(
				"payment {} cannot transition {:?} -> {next:?}",
				self.id, self.status
			)));
		}
		if let Some(last) = self.status_history.last() {
			if now < last.timestamp {
				return Err(CoreError::invariant(format!(
					"payment {} status history timestamp would go backwards",
					self.id
				)));
			}
		}
		self.status_history.push(StatusHistoryEntry { timestamp: now, status: next, message: message.clone() });
		self.status = next;
		self.message = message;
		self.updated_at = now;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample(status: PaymentStatus) -> Payment {
		let now = Utc::now();
		Payment {
			id: Uuid::new_v4(),
			tenant_id: Uuid::new_v4(),
			disbursement_id: Uuid::new_v4(),
			external_id: "ext-1".into(),
			asset: Asset { code: "USDC".into(), issuer: "ISSUER".into() },
			amount: Amount::parse("10.0000000").unwrap(),
			receiver_wallet_id: Uuid::new_v4(),
			status,
			status_history: vec![StatusHistoryEntry { timestamp: now, status, message: None }],
			stellar_transaction_hash: None,
			message: None,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn ready_can_go_to_pending_or_failed_but_not_success() {
		assert!(PaymentStatus::Ready.can_transition_to(PaymentStatus::Pending));
		assert!(PaymentStatus::Ready.can_transition_to(PaymentStatus::Failed));
		assert!(!PaymentStatus::Ready.can_transition_to(PaymentStatus::Success));
	}

	#[test]
	fn terminal_statuses_have_no_outgoing_edges() {
		assert!(PaymentStatus::Success.is_terminal());
		assert!(PaymentStatus::Failed.is_terminal());
	}

	#[test]
	fn transition_appends_history_and_rejects_invalid_edges() {
		let mut p = sample(PaymentStatus::Ready);
		let t1 = p.status_history[0].timestamp + chrono::Duration::seconds(1);
		p.transition(PaymentStatus::Pending, None, t1).unwrap();
		assert_eq!(p.status, PaymentStatus::Pending);
		assert_eq!(p.status_history.len(), 2);

		let err = p.transition(PaymentStatus::Ready, None, t1).unwrap_err();
		assert!(matches!(err, CoreError::ValidationFailed { .. }));
	}

	#[test]
	fn empty_code_is_invalid_regardless_of_issuer() {
		let asset = Asset { code: String::new(), issuer: "G...".into() };
		assert!(asset.validate().is_err());
	}

	#[test]
	fn native_and_non_native_assets_are_both_valid_shapes() {
		let native = Asset { code: "XLM".into(), issuer: String::new() };
		let issued = Asset { code: "USDC".into(), issuer: "G...".into() };
		assert!(native.is_native());
		assert!(!issued.is_native());
		assert!(native.validate().is_ok());
		assert!(issued.validate().is_ok());
	}
}
