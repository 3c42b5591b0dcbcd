//! The disbursement grouping: a batch of payments sharing a wallet,
//! asset, and status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payment::{Asset, StatusHistoryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementStatus {
	Draft,
	Ready,
	Started,
	Paused,
	Completed,
}

impl DisbursementStatus {
	/// Whether a payment in this disbursement may transition to `pending`:
	/// only while the disbursement itself is actively running.
	pub fn allows_payment_dispatch(self) -> bool {
		matches!(self, Self::Started)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disbursement {
	pub id: Uuid,
	pub tenant_id: Uuid,
	pub name: String,
	pub status: DisbursementStatus,
	pub status_history: Vec<StatusHistoryEntry>,
	pub wallet_id: Uuid,
	pub asset: Asset,
	/// Disbursement-level invitation message template; organization-level
	/// fallback only applies when this is empty.
	pub registration_message_template: Option<String>,
	pub verification_field: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Disbursement {
	/// Resolves the registration message template to use, falling back
	/// to the organization-level template when the disbursement one is
	/// empty. This is a fallback, not an override: a non-empty
	/// disbursement template always wins.
	pub fn resolve_registration_template<'a>(&'a self, organization_template: &'a str) -> &'a str {
		match self.registration_message_template.as_deref() {
			Some(t) if !t.is_empty() => t,
			_ => organization_template,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_started_allows_dispatch() {
		assert!(DisbursementStatus::Started.allows_payment_dispatch());
		for status in [
			DisbursementStatus::Draft,
			DisbursementStatus::Ready,
			DisbursementStatus::Paused,
			DisbursementStatus::Completed,
		] {
			assert!(!status.allows_payment_dispatch());
		}
	}

	#[test]
	fn organization_template_is_a_fallback_not_an_override() {
		let mut d = Disbursement {
			id: Uuid::new_v4(),
			tenant_id: Uuid::new_v4(),
			name: "batch-1".into(),
			status: DisbursementStatus::Started,
			status_history: vec![],
			wallet_id: Uuid::new_v4(),
			asset: Asset { code: "USDC".into(), issuer: "G...".into() },
			registration_message_template: Some("disbursement template".into()),
			verification_field: None,
			created_at: Utc::now(),
			updated_at: Utc::now(),
		};
		assert_eq!(d.resolve_registration_template("org template"), "disbursement template");

		d.registration_message_template = None;
		assert_eq!(d.resolve_registration_template("org template"), "org template");

		d.registration_message_template = Some(String::new());
		assert_eq!(d.resolve_registration_template("org template"), "org template");
	}
}
