use std::sync::Arc;
use std::time::{Duration, Instant};

use disb_common::{AccountType, ChannelAccount, CoreError};
use disb_ledger::{LedgerClient, LedgerTracker, Operation, TransactionEnvelope};
use disb_signer::SignerRouter;
use disb_store::SubmitterStore;
use tracing::{info, warn};

/// Hard cap on create-account operations per bootstrap transaction,
/// matching the envelope operation-count ceiling the ledger enforces.
pub const MAX_CREATE_ACCOUNT_OPS: u32 = 19;

#[derive(Debug, Clone)]
pub struct PoolConfig {
	pub host_address: String,
	pub network_passphrase: String,
	pub starting_balance: String,
	pub lease_window: i64,
	pub lease_wait: Duration,
	pub max_bootstrap_attempts: u32,
}

pub struct ChannelLease {
	pub account: ChannelAccount,
}

pub struct ChannelAccountPool {
	store: Arc<SubmitterStore>,
	ledger_tracker: Arc<LedgerTracker>,
	ledger_client: Arc<dyn LedgerClient>,
	signer: Arc<SignerRouter>,
	config: PoolConfig,
}

impl ChannelAccountPool {
	pub fn new(
		store: Arc<SubmitterStore>,
		ledger_tracker: Arc<LedgerTracker>,
		ledger_client: Arc<dyn LedgerClient>,
		signer: Arc<SignerRouter>,
		config: PoolConfig,
	) -> Self {
		Self { store, ledger_tracker, ledger_client, signer, config }
	}

	/// Guarantees at least `n` channel accounts exist, creating whatever
	/// is missing in batches of at most `MAX_CREATE_ACCOUNT_OPS`.
	pub async fn ensure(&self, n: u32) -> Result<(), CoreError> {
		let existing = self.store.count_channel_accounts().await?;
		let missing = (n as i64 - existing).max(0) as u32;
		if missing == 0 {
			return Ok(());
		}

		let mut remaining = missing;
		while remaining > 0 {
			let batch = remaining.min(MAX_CREATE_ACCOUNT_OPS);
			self.bootstrap_batch(batch).await?;
			remaining -= batch;
		}
		Ok(())
	}

	async fn bootstrap_batch(&self, n: u32) -> Result<(), CoreError> {
		validate_bootstrap_size(n)?;

		let new_accounts = self.signer.batch_insert(AccountType::ChannelDb, n).await?;

		let mut attempt = 0;
		loop {
			let bounds = self.ledger_tracker.ledger_bounds().await?;
			let account_detail = self
				.ledger_client
				.account_detail(&self.config.host_address)
				.await
				.map_err(|error| CoreError::transient("fetching host account sequence", error))?;

			let operations = new_accounts
				.iter()
				.map(|account| Operation::CreateAccount {
					destination: account.address.clone(),
					starting_balance: self.config.starting_balance.clone(),
				})
				.collect();

			let envelope = TransactionEnvelope {
				source_account: self.config.host_address.clone(),
				sequence: account_detail.sequence + 1,
				operations,
				base_fee: 100,
				ledger_bounds: bounds,
				memo: None,
			};

			let digest = disb_ledger::signature_base(&self.config.network_passphrase, &envelope);

			let mut signers = vec![(AccountType::HostEnv, self.config.host_address.clone())];
			signers.extend(new_accounts.iter().map(|a| (AccountType::ChannelDb, a.address.clone())));
			let signature_result = self.signer.sign_transaction(&signers, &digest).await;

			if signature_result.is_err() {
				return Err(CoreError::invariant("bootstrap signing failed: joint sponsorship requires every signer"));
			}

			let signed_xdr = disb_ledger::encode_envelope(&envelope);
			match self.ledger_client.submit_transaction(&signed_xdr).await {
				Ok(_) => {
					let accounts: Vec<ChannelAccount> = new_accounts
						.iter()
						.map(|a| ChannelAccount {
							public_key: a.address.clone(),
							encrypted_private_key: a.encrypted_secret.clone().unwrap_or_default(),
							locked_until_ledger_number: None,
							locked_by: None,
						})
						.collect();
					let mut tx = self.store.begin().await?;
					self.store.insert_channel_accounts(&mut tx, &accounts).await?;
					tx.commit().await.map_err(|error| disb_store::map_sqlx_error("committing bootstrap", error))?;
					info!(count = accounts.len(), "channel account bootstrap succeeded");
					return Ok(());
				}
				Err(error) if attempt + 1 < self.config.max_bootstrap_attempts => {
					warn!(%error, attempt, "channel account bootstrap submission failed, retrying with fresh bounds");
					attempt += 1;
					continue;
				}
				Err(error) => return Err(CoreError::terminal("bootstrapping channel accounts", error.to_string())),
			}
		}
	}

	/// Blocks for at most `lease_wait` trying to claim an account whose
	/// lease has expired, polling at a short fixed interval. Fails with
	/// `PoolExhausted` on expiry.
	pub async fn lease(&self, worker_id: &str) -> Result<ChannelLease, CoreError> {
		let deadline = Instant::now() + self.config.lease_wait;
		loop {
			let current_ledger = self.ledger_tracker.current_ledger().await? as i64;
			if let Some(account) =
				self.store.lease_channel_account(current_ledger, self.config.lease_window, worker_id).await?
			{
				return Ok(ChannelLease { account });
			}

			if Instant::now() >= deadline {
				return Err(CoreError::PoolExhausted);
			}
			tokio::time::sleep(Duration::from_millis(100)).await;
		}
	}

	pub async fn release(&self, lease: ChannelLease) -> Result<(), CoreError> {
		self.store.release_channel_account(&lease.account.public_key).await
	}

	/// Submits an account-merge back to the host, signed by the channel,
	/// and deletes the row once the merge succeeds.
	pub async fn remove(&self, account: ChannelAccount) -> Result<(), CoreError> {
		let bounds = self.ledger_tracker.ledger_bounds().await?;
		let account_detail = self
			.ledger_client
			.account_detail(&account.public_key)
			.await
			.map_err(|error| CoreError::transient("fetching channel account sequence for removal", error))?;

		let envelope = TransactionEnvelope {
			source_account: account.public_key.clone(),
			sequence: account_detail.sequence + 1,
			operations: vec![Operation::AccountMerge { destination: self.config.host_address.clone() }],
			base_fee: 100,
			ledger_bounds: bounds,
			memo: None,
		};

		let digest = disb_ledger::signature_base(&self.config.network_passphrase, &envelope);

		self.signer.sign_transaction(&[(AccountType::ChannelDb, account.public_key.clone())], &digest).await?;

		let signed_xdr = disb_ledger::encode_envelope(&envelope);
		self.ledger_client
			.submit_transaction(&signed_xdr)
			.await
			.map_err(|error| CoreError::terminal("merging channel account back to host", error.to_string()))?;

		self.store.remove_channel_account(&account.public_key).await
	}
}

/// Validates a single bootstrap transaction's account count against the
/// ledger's per-envelope operation cap, before any signer or ledger call
/// is made. `n=0` has nothing to sponsor; `n` above the cap cannot fit in
/// one joint-signed transaction (`ensure` is responsible for splitting a
/// larger request into batches of at most `MAX_CREATE_ACCOUNT_OPS`).
fn validate_bootstrap_size(n: u32) -> Result<(), CoreError> {
	if n == 0 {
		return Err(CoreError::validation("cannot bootstrap zero channel accounts"));
	}
	if n > MAX_CREATE_ACCOUNT_OPS {
		return Err(CoreError::validation(format!(
			"bootstrap batch of {n} exceeds the {MAX_CREATE_ACCOUNT_OPS}-operation cap"
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_accounts_is_rejected() {
		assert!(validate_bootstrap_size(0).is_err());
	}

	#[test]
	fn twenty_accounts_exceeds_the_cap() {
		assert!(validate_bootstrap_size(20).is_err());
	}

	#[test]
	fn nineteen_accounts_is_the_largest_accepted_batch() {
		assert!(validate_bootstrap_size(19).is_ok());
		assert_eq!(MAX_CREATE_ACCOUNT_OPS, 19);
	}
}
