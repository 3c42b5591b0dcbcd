//! Custodial transfer request: tracks a payment's handoff to an external
//! custodial provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustodialTransferStatus {
	Pending,
	Complete,
	Failed,
}

impl CustodialTransferStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Complete | Self::Failed)
	}
}

/// Links a payment to a remote provider's transfer/payout id. The row id
/// doubles as the idempotency key sent to the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircleTransferRequest {
	pub id: Uuid,
	pub payment_id: Uuid,
	pub source_wallet_id: String,
	pub provider_transfer_id: Option<String>,
	pub provider_payout_id: Option<String>,
	pub status: CustodialTransferStatus,
	pub sync_attempts: u32,
	pub last_sync_attempt_at: Option<DateTime<Utc>>,
	pub response_body: Option<Value>,
	pub completed_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}
