//! Layered configuration: a `config/default.toml` file overridden by
//! `DISB_`-prefixed environment variables, the way the teacher's
//! `engine/src/settings.rs` loads `config/default.toml` and merges
//! environment overrides on top.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Stores {
	pub application_database_url: String,
	pub submitter_database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Ledger {
	pub node_url: String,
	pub network_passphrase: String,
	pub host_address: String,
	pub distribution_address: String,
	/// Seconds a cached ledger height is trusted before refetching.
	pub max_age_secs: u64,
	pub lookahead: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Custodial {
	pub base_url: String,
	pub api_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Pool {
	pub starting_balance: String,
	pub lease_window: i64,
	pub lease_wait_secs: u64,
	pub max_bootstrap_attempts: u32,
	/// Number of channel accounts `ensure`d at startup.
	pub warm_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Submitter {
	pub base_fee: u32,
	pub max_base_fee: u32,
	pub max_attempts: u32,
	pub backoff_initial_secs: u64,
	pub backoff_max_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Vault {
	/// Passphrase the channel-account and vault-secret encrypters derive
	/// their AES-256-GCM key from.
	pub passphrase: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Signer {
	/// Hex-encoded Ed25519 seed for the host account, supplied at process
	/// start per the `host-env` strategy; never written to disk.
	pub host_seed_hex: String,
	/// One of `distribution-env`, `distribution-db-vault`,
	/// `distribution-custodial-vault`, selecting which strategy signs on
	/// behalf of the tenant's distribution account.
	pub distribution_account_type: String,
	/// Only present when `distribution_account_type` is `distribution-env`.
	pub distribution_seed_hex: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Dispatcher {
	pub batch_limit: i64,
	pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Reconciler {
	pub batch_limit: i64,
	pub poll_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Bind {
	pub hostname: String,
	pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
	pub stores: Stores,
	pub ledger: Ledger,
	pub custodial: Custodial,
	pub pool: Pool,
	pub submitter: Submitter,
	pub vault: Vault,
	pub signer: Signer,
	pub dispatcher: Dispatcher,
	pub reconciler: Reconciler,
	pub health: Bind,
	pub metrics: Bind,
	/// Seconds allowed for in-flight work to finish after a shutdown
	/// signal before abandoning non-cooperative tasks.
	#[serde(default = "default_shutdown_grace_secs")]
	pub shutdown_grace_secs: u64,
}

fn default_shutdown_grace_secs() -> u64 {
	50
}

impl Settings {
	pub fn new() -> Result<Self, ConfigError> {
		Self::from_file("config/default.toml")
	}

	pub fn from_file(path: &str) -> Result<Self, ConfigError> {
		Config::builder()
			.add_source(File::with_name(path).required(false))
			.add_source(Environment::with_prefix("DISB").separator("__"))
			.build()?
			.try_deserialize()
	}

	pub fn lease_wait(&self) -> Duration {
		Duration::from_secs(self.pool.lease_wait_secs)
	}

	pub fn shutdown_grace(&self) -> Duration {
		Duration::from_secs(self.shutdown_grace_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_file_falls_back_to_environment_only() {
		std::env::set_var("DISB__STORES__APPLICATION_DATABASE_URL", "postgres://app");
		std::env::set_var("DISB__STORES__SUBMITTER_DATABASE_URL", "postgres://submitter");
		std::env::set_var("DISB__LEDGER__NODE_URL", "https://ledger.example");
		std::env::set_var("DISB__LEDGER__NETWORK_PASSPHRASE", "Test Network ; July 2026");
		std::env::set_var("DISB__LEDGER__HOST_ADDRESS", "GHOST");
		std::env::set_var("DISB__LEDGER__DISTRIBUTION_ADDRESS", "GDIST");
		std::env::set_var("DISB__LEDGER__MAX_AGE_SECS", "6");
		std::env::set_var("DISB__LEDGER__LOOKAHEAD", "10");
		std::env::set_var("DISB__CUSTODIAL__BASE_URL", "https://custodial.example");
		std::env::set_var("DISB__CUSTODIAL__API_KEY", "key");
		std::env::set_var("DISB__POOL__STARTING_BALANCE", "2.0000000");
		std::env::set_var("DISB__POOL__LEASE_WINDOW", "120");
		std::env::set_var("DISB__POOL__LEASE_WAIT_SECS", "5");
		std::env::set_var("DISB__POOL__MAX_BOOTSTRAP_ATTEMPTS", "3");
		std::env::set_var("DISB__POOL__WARM_SIZE", "5");
		std::env::set_var("DISB__SUBMITTER__BASE_FEE", "100");
		std::env::set_var("DISB__SUBMITTER__MAX_BASE_FEE", "10000");
		std::env::set_var("DISB__SUBMITTER__MAX_ATTEMPTS", "5");
		std::env::set_var("DISB__SUBMITTER__BACKOFF_INITIAL_SECS", "1");
		std::env::set_var("DISB__SUBMITTER__BACKOFF_MAX_SECS", "30");
		std::env::set_var("DISB__VAULT__PASSPHRASE", "super-secret");
		std::env::set_var(
			"DISB__SIGNER__HOST_SEED_HEX",
			"0000000000000000000000000000000000000000000000000000000000000000",
		);
		std::env::set_var("DISB__SIGNER__DISTRIBUTION_ACCOUNT_TYPE", "distribution-env");
		std::env::set_var(
			"DISB__SIGNER__DISTRIBUTION_SEED_HEX",
			"0101010101010101010101010101010101010101010101010101010101010101",
		);
		std::env::set_var("DISB__DISPATCHER__BATCH_LIMIT", "50");
		std::env::set_var("DISB__DISPATCHER__POLL_INTERVAL_SECS", "5");
		std::env::set_var("DISB__RECONCILER__BATCH_LIMIT", "50");
		std::env::set_var("DISB__RECONCILER__POLL_INTERVAL_SECS", "30");
		std::env::set_var("DISB__HEALTH__HOSTNAME", "0.0.0.0");
		std::env::set_var("DISB__HEALTH__PORT", "8080");
		std::env::set_var("DISB__METRICS__HOSTNAME", "0.0.0.0");
		std::env::set_var("DISB__METRICS__PORT", "9090");

		let settings = Settings::from_file("config/does-not-exist.toml").expect("environment-only settings should load");
		assert_eq!(settings.ledger.host_address, "GHOST");
		assert_eq!(settings.shutdown_grace_secs, 50);
	}
}
