//! Transaction accounts and the account-type enumeration the signer
//! router dispatches on.
//!
//! `AccountType` is modeled only in its closed, five-valued form — the
//! one the signer router keys its strategy table on. A looser
//! three-valued {role, platform} grouping exists conceptually but is not
//! modeled as a separate type, since every dispatch decision needs the
//! storage dimension too.

use serde::{Deserialize, Serialize};

/// Which role a transaction account plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
	Host,
	Channel,
	Distribution,
}

/// Which dispatch back-end the account is used on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountPlatform {
	Ledger,
	Custodial,
}

/// Where the account's secret material lives, which determines who owns
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStorage {
	/// Supplied at process start, held in memory only.
	Env,
	/// Encrypted inline with the account row.
	Db,
	/// Encrypted in a dedicated vault table.
	DbVault,
}

/// The three-part qualifier {role, platform, storage} that tags a
/// transaction account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTag {
	pub role: AccountRole,
	pub platform: AccountPlatform,
	pub storage: AccountStorage,
}

/// The closed, five-valued enumeration the signer router keys its
/// strategy table on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountType {
	HostEnv,
	ChannelDb,
	DistributionEnv,
	DistributionDbVault,
	DistributionCustodialVault,
}

impl AccountType {
	/// Maps the three-part tag onto the closed enum the router
	/// understands, where such a mapping exists.
	pub fn from_tag(tag: AccountTag) -> Option<Self> {
		use AccountPlatform::*;
		use AccountRole::*;
		use AccountStorage::*;

		match (tag.role, tag.platform, tag.storage) {
			(Host, Ledger, Env) => Some(Self::HostEnv),
			(Channel, Ledger, Db) => Some(Self::ChannelDb),
			(Distribution, Ledger, Env) => Some(Self::DistributionEnv),
			(Distribution, Ledger, DbVault) => Some(Self::DistributionDbVault),
			(Distribution, Custodial, DbVault) => Some(Self::DistributionCustodialVault),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
	Active,
	Removed,
}

/// A tagged record {address, type, status}.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAccount {
	pub address: String,
	pub tag: AccountTag,
	pub status: AccountStatus,
}

/// A transaction account of role=channel: a sponsoring ledger account
/// whose lease expiration is expressed as a ledger height, not wall
/// clock. At most one worker may hold a non-expired lease at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
	pub public_key: String,
	pub encrypted_private_key: String,
	pub locked_until_ledger_number: Option<i64>,
	pub locked_by: Option<String>,
}

impl ChannelAccount {
	/// A lease is available for a new worker once it has never been
	/// locked, or the ledger height it was locked until has passed.
	pub fn is_available(&self, current_ledger: i64) -> bool {
		match self.locked_until_ledger_number {
			None => true,
			Some(until) => until <= current_ledger,
		}
	}
}

#[cfg(test)]
mod channel_account_tests {
	use super::*;

	#[test]
	fn unlocked_account_is_available() {
		let account = ChannelAccount {
			public_key: "GABC".into(),
			encrypted_private_key: "enc".into(),
			locked_until_ledger_number: None,
			locked_by: None,
		};
		assert!(account.is_available(100));
	}

	#[test]
	fn expired_lease_is_available_again() {
		let account = ChannelAccount {
			public_key: "GABC".into(),
			encrypted_private_key: "enc".into(),
			locked_until_ledger_number: Some(50),
			locked_by: Some("worker-1".into()),
		};
		assert!(account.is_available(50));
		assert!(!ChannelAccount { locked_until_ledger_number: Some(51), ..account }.is_available(50));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn channel_db_is_the_only_mapping_for_channel_role() {
		let tag = AccountTag {
			role: AccountRole::Channel,
			platform: AccountPlatform::Ledger,
			storage: AccountStorage::Db,
		};
		assert_eq!(AccountType::from_tag(tag), Some(AccountType::ChannelDb));
	}

	#[test]
	fn unsupported_combination_has_no_mapping() {
		let tag = AccountTag {
			role: AccountRole::Channel,
			platform: AccountPlatform::Custodial,
			storage: AccountStorage::Db,
		};
		assert_eq!(AccountType::from_tag(tag), None);
	}
}
