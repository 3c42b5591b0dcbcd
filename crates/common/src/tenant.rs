//! Tenant/organization configuration consumed by the core.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which dispatch back-end a tenant's distribution account uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPlatform {
	Ledger,
	Custodial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
	pub id: Uuid,
	pub organization_id: Uuid,
	pub name: String,
	pub distribution_platform: DistributionPlatform,
	pub distribution_account_address: String,
	pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
	pub id: Uuid,
	pub name: String,
	pub registration_message_template: String,
}
