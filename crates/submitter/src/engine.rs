//! The transaction submitter engine (C4). Drives one queued
//! submitter-transaction at a time through build, sign, submit, and the
//! §4.4 response-classification table to a terminal state, leasing a
//! single channel account from the pool for the whole drive so retries
//! within one submission cycle reuse the same channel.
//!
//! Also carries the account-creation/change-trust/fund-distribution
//! flows (§4.4 "Account creation / trustline operations"), which reuse
//! the same build/sign/submit shape against a host- or
//! distribution-sourced envelope instead of a channel-leased one.

use std::sync::Arc;

use chrono::Utc;
use disb_channel_pool::{ChannelAccountPool, ChannelLease, MAX_CREATE_ACCOUNT_OPS};
use disb_common::{AccountType, CoreError, PaymentStatus, SubmitterTransaction, SubmitterTransactionState};
use disb_events::{EventBus, Message};
use disb_ledger::client::SubmitOutcome;
use disb_ledger::{LedgerClient, LedgerTracker, Operation, TransactionEnvelope};
use disb_signer::SignerRouter;
use disb_store::{ApplicationStore, SubmitterStore};
use disb_utilities::Backoff;
use serde_json::json;
use tracing::{info, warn};

use crate::retry::{classify_for_retry, RetryAction};

/// Event published when a submitter transaction reaches `success`; C6
/// consumes this to update the payment.
pub const PAYMENT_COMPLETED_TOPIC: &str = "payment-completed";
/// Event published when a submitter transaction is exhausted (state
/// `error`), annotated with enough to diagnose without re-deriving it
/// from the row.
pub const SUBMITTER_DLQ_TOPIC: &str = "submitter-transaction.dlq";

/// Ledger text memos are capped at 28 bytes; longer external ids are
/// truncated rather than rejected; the full id remains on the payment and
/// submitter-transaction rows regardless of what fits in the memo.
const MEMO_MAX_BYTES: usize = 28;

#[derive(Debug, Clone)]
pub struct SubmitterEngineConfig {
	pub network_passphrase: String,
	pub host_address: String,
	pub distribution_account: String,
	pub distribution_account_type: AccountType,
	/// Starting base fee for a fresh build; escalated toward
	/// `max_base_fee` on an `insufficient fee` response.
	pub base_fee: u32,
	pub max_base_fee: u32,
	pub max_attempts: u32,
	pub backoff: Backoff,
}

/// Builds, signs, submits, and tracks ledger transactions for one payment
/// at a time (C4).
pub struct SubmitterEngine {
	submitter_store: Arc<SubmitterStore>,
	application_store: Arc<ApplicationStore>,
	channel_pool: Arc<ChannelAccountPool>,
	ledger_tracker: Arc<LedgerTracker>,
	ledger_client: Arc<dyn LedgerClient>,
	signer: Arc<SignerRouter>,
	event_bus: Arc<dyn EventBus>,
	config: SubmitterEngineConfig,
}

impl SubmitterEngine {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		submitter_store: Arc<SubmitterStore>,
		application_store: Arc<ApplicationStore>,
		channel_pool: Arc<ChannelAccountPool>,
		ledger_tracker: Arc<LedgerTracker>,
		ledger_client: Arc<dyn LedgerClient>,
		signer: Arc<SignerRouter>,
		event_bus: Arc<dyn EventBus>,
		config: SubmitterEngineConfig,
	) -> Self {
		Self { submitter_store, application_store, channel_pool, ledger_tracker, ledger_client, signer, event_bus, config }
	}

	/// Claims and fully drives one queued submitter transaction, if one
	/// is available. Returns `false` when the queue was empty, so a
	/// poll-loop caller can back off before calling again.
	pub async fn process_next(&self, worker_id: &str) -> Result<bool, CoreError> {
		let Some(mut transaction) = self.claim_next().await? else {
			return Ok(false);
		};
		self.drive(&mut transaction, worker_id).await?;
		Ok(true)
	}

	/// Row-locks one *queued* transaction and transitions it to
	/// *processing* inside the same store transaction, so at most one
	/// worker ever picks a given external id.
	async fn claim_next(&self) -> Result<Option<SubmitterTransaction>, CoreError> {
		let mut tx = self.submitter_store.begin().await?;
		let mut candidates = self.submitter_store.lock_queued_transactions(&mut tx, 1).await?;
		let Some(mut transaction) = candidates.pop() else {
			tx.commit().await.map_err(|error| disb_store::map_sqlx_error("committing empty claim", error))?;
			return Ok(None);
		};

		transaction.transition(SubmitterTransactionState::Processing, Utc::now())?;
		self.submitter_store.update_submitter_transaction(&mut tx, &transaction).await?;
		tx.commit().await.map_err(|error| disb_store::map_sqlx_error("committing submitter transaction claim", error))?;
		Ok(Some(transaction))
	}

	/// Leases a channel account for the lifetime of the drive and
	/// releases it on every exit path, per the pool's release contract.
	async fn drive(&self, transaction: &mut SubmitterTransaction, worker_id: &str) -> Result<(), CoreError> {
		let lease = self.channel_pool.lease(worker_id).await?;
		let result = self.drive_with_lease(transaction, &lease).await;
		if let Err(release_error) = self.channel_pool.release(lease).await {
			warn!(error = %release_error, external_id = %transaction.external_id, "failed to release channel account after drive");
		}
		result
	}

	async fn drive_with_lease(&self, transaction: &mut SubmitterTransaction, lease: &ChannelLease) -> Result<(), CoreError> {
		let mut base_fee = self.config.base_fee;
		let mut rate_limit_attempt = 0u32;

		'rebuild: loop {
			if transaction.attempts >= self.config.max_attempts {
				return self.finalize_error(transaction).await;
			}

			let (envelope, is_fee_bump) = self.build_envelope(transaction, lease, base_fee).await?;
			self.sign_envelope(&envelope, lease, is_fee_bump).await?;
			let xdr = disb_ledger::encode_envelope(&envelope);

			transaction.sequence = Some(envelope.sequence);
			transaction.xdr_sent = Some(xdr.clone());
			transaction.transition(SubmitterTransactionState::Sent, Utc::now())?;
			self.persist(transaction).await?;

			loop {
				match self.ledger_client.submit_transaction(&xdr).await {
					Ok(outcome) => return self.finalize_success(transaction, outcome).await,
					Err(error) => {
						warn!(error = %error, external_id = %transaction.external_id, attempt = transaction.attempts, "ledger submission failed");
						match classify_for_retry(&error) {
							RetryAction::Success => unreachable!("Ok(outcome) is handled above"),
							RetryAction::KeepSent => return Ok(()),
							RetryAction::Fatal => return self.finalize_fatal(transaction, &error.to_string()).await,
							RetryAction::RebuildWithFreshSequence => {
								transaction.attempts += 1;
								transaction.transition(SubmitterTransactionState::Processing, Utc::now())?;
								self.persist(transaction).await?;
								continue 'rebuild;
							}
							RetryAction::IncreaseFee => {
								base_fee = base_fee.saturating_mul(2).min(self.config.max_base_fee);
								transaction.attempts += 1;
								transaction.transition(SubmitterTransactionState::Processing, Utc::now())?;
								self.persist(transaction).await?;
								continue 'rebuild;
							}
							RetryAction::BackOffSameAttempt => {
								let delay = self.config.backoff.delay_for_attempt(rate_limit_attempt);
								rate_limit_attempt = rate_limit_attempt.saturating_add(1);
								tokio::time::sleep(delay).await;
								continue;
							}
							RetryAction::RetryWithBackoff => {
								let delay = self.config.backoff.delay_for_attempt(transaction.attempts);
								transaction.attempts += 1;
								transaction.transition(SubmitterTransactionState::Processing, Utc::now())?;
								self.persist(transaction).await?;
								tokio::time::sleep(delay).await;
								continue 'rebuild;
							}
						}
					}
				}
			}
		}
	}

	async fn build_envelope(
		&self,
		transaction: &SubmitterTransaction,
		lease: &ChannelLease,
		base_fee: u32,
	) -> Result<(TransactionEnvelope, bool), CoreError> {
		let account_detail = self
			.ledger_client
			.account_detail(&lease.account.public_key)
			.await
			.map_err(|error| CoreError::transient("fetching channel account sequence", error))?;
		let bounds = self.ledger_tracker.ledger_bounds().await?;

		let envelope = TransactionEnvelope {
			source_account: self.config.distribution_account.clone(),
			sequence: account_detail.sequence + 1,
			operations: vec![Operation::Payment {
				destination: transaction.destination.clone(),
				asset_code: transaction.asset.code.clone(),
				asset_issuer: transaction.asset.issuer.clone(),
				amount: format!("{:.7}", transaction.amount),
			}],
			base_fee,
			ledger_bounds: bounds,
			memo: Some(memo_for(&transaction.external_id)),
		};

		let is_fee_bump = base_fee > self.config.base_fee;
		Ok((envelope, is_fee_bump))
	}

	/// Signs over [distribution-account, channel]. A fee-escalated
	/// rebuild additionally takes the fee-bump path: the distribution
	/// account alone re-signs as the fee source, on top of the ordinary
	/// joint signature, matching §4.3's "sign fee-bump transaction over
	/// one account".
	async fn sign_envelope(&self, envelope: &TransactionEnvelope, lease: &ChannelLease, is_fee_bump: bool) -> Result<(), CoreError> {
		let digest = disb_ledger::signature_base(&self.config.network_passphrase, envelope);
		let signers = [
			(self.config.distribution_account_type, self.config.distribution_account.clone()),
			(AccountType::ChannelDb, lease.account.public_key.clone()),
		];
		self.signer.sign_transaction(&signers, &digest).await?;

		if is_fee_bump {
			self.signer
				.sign_fee_bump(self.config.distribution_account_type, &self.config.distribution_account, &digest)
				.await?;
		}
		Ok(())
	}

	async fn persist(&self, transaction: &SubmitterTransaction) -> Result<(), CoreError> {
		let mut tx = self.submitter_store.begin().await?;
		self.submitter_store.update_submitter_transaction(&mut tx, transaction).await?;
		tx.commit().await.map_err(|error| disb_store::map_sqlx_error("persisting submitter transaction", error))
	}

	async fn finalize_success(&self, transaction: &mut SubmitterTransaction, outcome: SubmitOutcome) -> Result<(), CoreError> {
		transaction.xdr_received = Some(outcome.result_xdr);
		transaction.transition(SubmitterTransactionState::Success, Utc::now())?;
		self.persist(transaction).await?;

		let mut payment = self.application_store.fetch_payment_by_external_id(&transaction.external_id).await?;
		payment.stellar_transaction_hash = Some(outcome.transaction_hash.clone());
		payment.transition(PaymentStatus::Success, None, Utc::now())?;
		self.application_store.update_payment_standalone(&payment).await?;

		info!(external_id = %transaction.external_id, hash = %outcome.transaction_hash, "payment submitted successfully");
		self.event_bus
			.publish(Message::new(
				payment.id.to_string(),
				PAYMENT_COMPLETED_TOPIC,
				json!({"payment_id": payment.id, "external_id": transaction.external_id, "transaction_hash": outcome.transaction_hash}),
			))
			.await
			.map_err(|error| CoreError::transient("publishing payment-completed event", error))?;
		Ok(())
	}

	async fn finalize_fatal(&self, transaction: &mut SubmitterTransaction, reason: &str) -> Result<(), CoreError> {
		transaction.transition(SubmitterTransactionState::Fatal, Utc::now())?;
		self.persist(transaction).await?;

		let mut payment = self.application_store.fetch_payment_by_external_id(&transaction.external_id).await?;
		payment.transition(PaymentStatus::Failed, Some(reason.to_string()), Utc::now())?;
		self.application_store.update_payment_standalone(&payment).await?;
		warn!(external_id = %transaction.external_id, reason, "payment submission terminally failed");
		Ok(())
	}

	async fn finalize_error(&self, transaction: &mut SubmitterTransaction) -> Result<(), CoreError> {
		transaction.transition(SubmitterTransactionState::Error, Utc::now())?;
		self.persist(transaction).await?;
		warn!(external_id = %transaction.external_id, attempts = transaction.attempts, "submitter transaction exhausted retries, moving to dead letter");
		self.event_bus
			.publish(Message::new(
				transaction.external_id.clone(),
				SUBMITTER_DLQ_TOPIC,
				json!({"external_id": transaction.external_id, "attempts": transaction.attempts}),
			))
			.await
			.map_err(|error| CoreError::transient("publishing submitter dead-letter event", error))?;
		Ok(())
	}

	/// Host-sponsored bulk account creation, analogous to C3's own
	/// bootstrap but for accounts the caller (not the pool) owns.
	pub async fn create_accounts(
		&self,
		new_addresses: &[String],
		starting_balance: &str,
		max_attempts: u32,
	) -> Result<SubmitOutcome, CoreError> {
		if new_addresses.is_empty() {
			return Err(CoreError::validation("cannot create zero accounts"));
		}
		if new_addresses.len() as u32 > MAX_CREATE_ACCOUNT_OPS {
			return Err(CoreError::validation(format!(
				"cannot create more than {MAX_CREATE_ACCOUNT_OPS} accounts in one bootstrap transaction"
			)));
		}

		let operations: Vec<Operation> = new_addresses
			.iter()
			.map(|address| Operation::CreateAccount { destination: address.clone(), starting_balance: starting_balance.to_string() })
			.collect();

		self.submit_sponsored_envelope(self.config.host_address.clone(), AccountType::HostEnv, operations, &[], max_attempts)
			.await
	}

	/// Adds a trustline from the distribution account, skipping assets it
	/// already trusts.
	pub async fn change_trust(
		&self,
		asset_code: &str,
		asset_issuer: &str,
		max_attempts: u32,
	) -> Result<Option<SubmitOutcome>, CoreError> {
		let account_detail = self
			.ledger_client
			.account_detail(&self.config.distribution_account)
			.await
			.map_err(|error| CoreError::transient("fetching distribution account trustlines", error))?;

		if account_detail.has_trustline(asset_code, asset_issuer) {
			return Ok(None);
		}

		let operations = vec![Operation::ChangeTrust { asset_code: asset_code.to_string(), asset_issuer: asset_issuer.to_string() }];
		let outcome = self
			.submit_sponsored_envelope(
				self.config.distribution_account.clone(),
				self.config.distribution_account_type,
				operations,
				&[],
				max_attempts,
			)
			.await?;
		Ok(Some(outcome))
	}

	/// Host-sponsored payment funding a tenant's distribution account.
	pub async fn fund_distribution_account(
		&self,
		amount: &str,
		asset_code: &str,
		asset_issuer: &str,
		max_attempts: u32,
	) -> Result<SubmitOutcome, CoreError> {
		let operations = vec![Operation::Payment {
			destination: self.config.distribution_account.clone(),
			asset_code: asset_code.to_string(),
			asset_issuer: asset_issuer.to_string(),
			amount: amount.to_string(),
		}];
		self.submit_sponsored_envelope(self.config.host_address.clone(), AccountType::HostEnv, operations, &[], max_attempts).await
	}

	/// Shared build/sign/submit for the account-creation/change-trust/
	/// fund-distribution flows: same machinery as payment submission, a
	/// different operation set, and a flat retry count rather than the
	/// full §4.4 classification table — on exhaustion the caller sees
	/// `maximum-retries-reached`.
	async fn submit_sponsored_envelope(
		&self,
		source_account: String,
		source_account_type: AccountType,
		operations: Vec<Operation>,
		extra_signers: &[(AccountType, String)],
		max_attempts: u32,
	) -> Result<SubmitOutcome, CoreError> {
		let mut attempt = 0u32;
		loop {
			let account_detail = self
				.ledger_client
				.account_detail(&source_account)
				.await
				.map_err(|error| CoreError::transient("fetching sponsor account sequence", error))?;
			let bounds = self.ledger_tracker.ledger_bounds().await?;

			let envelope = TransactionEnvelope {
				source_account: source_account.clone(),
				sequence: account_detail.sequence + 1,
				operations: operations.clone(),
				base_fee: self.config.base_fee,
				ledger_bounds: bounds,
				memo: None,
			};

			let digest = disb_ledger::signature_base(&self.config.network_passphrase, &envelope);
			let mut signers = vec![(source_account_type, source_account.clone())];
			signers.extend_from_slice(extra_signers);
			self.signer.sign_transaction(&signers, &digest).await?;

			let xdr = disb_ledger::encode_envelope(&envelope);
			match self.ledger_client.submit_transaction(&xdr).await {
				Ok(outcome) => return Ok(outcome),
				Err(error) if attempt + 1 < max_attempts => {
					warn!(%error, attempt, %source_account, "sponsored submission failed, retrying with fresh bounds");
					attempt += 1;
					continue;
				}
				Err(error) => {
					return Err(CoreError::terminal(
						format!("sponsored submission from {source_account}"),
						format!("maximum-retries-reached: {error}"),
					))
				}
			}
		}
	}
}

/// Truncates `external_id` to the ledger's 28-byte text memo limit on a
/// UTF-8 character boundary. The full id is unaffected on the payment and
/// submitter-transaction rows; only the on-chain memo is shortened.
fn memo_for(external_id: &str) -> String {
	if external_id.len() <= MEMO_MAX_BYTES {
		return external_id.to_string();
	}
	let mut end = MEMO_MAX_BYTES;
	while !external_id.is_char_boundary(end) {
		end -= 1;
	}
	external_id[..end].to_string()
}

// `AccountDetail` is re-exported for callers that need to pre-inspect
// trustlines without going through `change_trust`.
pub use disb_ledger::client::AccountDetail as SponsorAccountDetail;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn short_external_id_is_unchanged() {
		assert_eq!(memo_for("payment-1"), "payment-1");
	}

	#[test]
	fn long_external_id_is_truncated_to_the_memo_limit() {
		let long_id = "a".repeat(40);
		let memo = memo_for(&long_id);
		assert_eq!(memo.len(), MEMO_MAX_BYTES);
		assert!(long_id.starts_with(&memo));
	}

	#[test]
	fn truncation_respects_utf8_boundaries() {
		// 27 ASCII bytes followed by a 3-byte character straddling the
		// 28-byte cut point; the truncation must back off to byte 27.
		let mut id = "a".repeat(27);
		id.push('€');
		let memo = memo_for(&id);
		assert!(id.is_char_boundary(memo.len()));
		assert!(memo.len() <= MEMO_MAX_BYTES);
	}
}
