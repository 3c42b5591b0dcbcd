//! Receiver wallet: links a receiver identity to one wallet provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverWalletStatus {
	Ready,
	Registered,
}

impl ReceiverWalletStatus {
	/// Whether a payment targeting this wallet may transition to `pending`.
	pub fn allows_payment_dispatch(self) -> bool {
		matches!(self, Self::Registered)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverWallet {
	pub id: Uuid,
	pub receiver_id: Uuid,
	pub tenant_id: Uuid,
	pub status: ReceiverWalletStatus,
	/// Ledger address of the wallet; empty until the out-of-band
	/// registration flow (external to this core) completes.
	pub ledger_address: String,
	pub invitation_sent_at: Option<DateTime<Utc>>,
	pub invitation_resend_count: u32,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn only_registered_allows_dispatch() {
		assert!(ReceiverWalletStatus::Registered.allows_payment_dispatch());
		assert!(!ReceiverWalletStatus::Ready.allows_payment_dispatch());
	}
}
