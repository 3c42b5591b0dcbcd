//! Payment dispatcher (C5): validates the per-payment precondition set and
//! routes the remainder to the ledger or custodial path, per the tenant's
//! configured distribution platform.
//!
//! Both entrypoints — the event-triggered one (a specific batch of payment
//! ids) and the periodic batch job (the next *N* ready payments for a
//! tenant) — share [`PaymentDispatcher::dispatch`], the precondition check
//! and per-platform routing logic.

use std::sync::Arc;

use chrono::Utc;
use disb_common::{CoreError, CustodialTransferStatus, Disbursement, DistributionPlatform, Payment, PaymentStatus, ReceiverWallet, SubmitterTransaction, SubmitterTransactionState, Tenant};
use disb_custodial::{CustodialClient, CustodialError, SendPaymentRequest};
use disb_store::{ApplicationStore, SubmitterStore};
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
	/// How many ready payments a periodic batch-job call pulls for one tenant.
	pub batch_limit: i64,
}

#[derive(Debug, Default)]
pub struct DispatchSummary {
	pub dispatched: u32,
	pub failed_precondition: u32,
	/// Payments the caller named that were no longer *ready* by the time
	/// this call locked them — a benign race with a concurrent dispatch.
	pub skipped_not_ready: u32,
}

pub struct PaymentDispatcher {
	application_store: Arc<ApplicationStore>,
	submitter_store: Arc<SubmitterStore>,
	custodial_client: Arc<dyn CustodialClient>,
	config: DispatcherConfig,
}

impl PaymentDispatcher {
	pub fn new(
		application_store: Arc<ApplicationStore>,
		submitter_store: Arc<SubmitterStore>,
		custodial_client: Arc<dyn CustodialClient>,
		config: DispatcherConfig,
	) -> Self {
		Self { application_store, submitter_store, custodial_client, config }
	}

	/// Event-triggered entrypoint: dispatches exactly the named payments.
	/// Idempotent on payment ids — a payment already moved out of *ready*
	/// (by an earlier delivery of the same event, or a concurrent batch
	/// job) is counted as skipped rather than re-processed.
	pub async fn dispatch_payment_ids(&self, tenant_id: Uuid, payment_ids: &[Uuid]) -> Result<DispatchSummary, CoreError> {
		let mut app_tx = self.application_store.begin().await?;
		let mut payments = Vec::with_capacity(payment_ids.len());
		for id in payment_ids {
			payments.push(self.application_store.fetch_payment(&mut app_tx, *id).await?);
		}
		let summary = self.dispatch(&mut app_tx, tenant_id, payments).await?;
		app_tx.commit().await.map_err(|error| disb_store::map_sqlx_error("committing dispatcher batch", error))?;
		Ok(summary)
	}

	/// Periodic batch-job entrypoint: pulls and row-locks the next `N`
	/// *ready* payments for `tenant_id`. The row lock means two concurrent
	/// calls over the same tenant see disjoint batches.
	pub async fn dispatch_ready_batch(&self, tenant_id: Uuid) -> Result<DispatchSummary, CoreError> {
		let mut app_tx = self.application_store.begin().await?;
		let payments = self.application_store.lock_ready_payments(&mut app_tx, tenant_id, self.config.batch_limit).await?;
		let summary = self.dispatch(&mut app_tx, tenant_id, payments).await?;
		app_tx.commit().await.map_err(|error| disb_store::map_sqlx_error("committing dispatcher batch", error))?;
		Ok(summary)
	}

	/// Validates preconditions for every payment, then routes the ones
	/// that pass to the tenant's configured platform. The caller commits
	/// `app_tx`; for the ledger path this function also opens and commits
	/// the inner submitter-store transaction before returning, so the
	/// commit order is inner-then-outer as required.
	async fn dispatch(
		&self,
		app_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		tenant_id: Uuid,
		payments: Vec<Payment>,
	) -> Result<DispatchSummary, CoreError> {
		let tenant = self.application_store.fetch_tenant(app_tx, tenant_id).await?;
		let mut summary = DispatchSummary::default();
		let mut eligible = Vec::new();

		for mut payment in payments {
			if payment.status != PaymentStatus::Ready {
				warn!(payment_id = %payment.id, status = ?payment.status, "dispatcher skipped a payment that was no longer ready");
				summary.skipped_not_ready += 1;
				continue;
			}
			match self.validate_preconditions(app_tx, &payment).await {
				Ok(wallet) => eligible.push((payment, wallet)),
				Err(reason) => {
					payment.transition(PaymentStatus::Failed, Some(reason), Utc::now())?;
					self.application_store.update_payment(app_tx, &payment).await?;
					summary.failed_precondition += 1;
				}
			}
		}

		if eligible.is_empty() {
			return Ok(summary);
		}

		summary.dispatched = eligible.len() as u32;
		match tenant.distribution_platform {
			DistributionPlatform::Ledger => self.dispatch_ledger_path(app_tx, &tenant, eligible).await?,
			DistributionPlatform::Custodial => self.dispatch_custodial_path(app_tx, &tenant, eligible).await?,
		}
		Ok(summary)
	}

	/// Checks the seven dispatch preconditions for one payment, returning
	/// its receiver wallet (needed by both platforms for the destination
	/// address) on success or a human-readable rejection reason.
	async fn validate_preconditions(
		&self,
		tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		payment: &Payment,
	) -> Result<ReceiverWallet, String> {
		if payment.status != PaymentStatus::Ready {
			return Err("payment status is not ready".into());
		}

		let wallet = self
			.application_store
			.fetch_receiver_wallet(tx, payment.receiver_wallet_id)
			.await
			.map_err(|error| error.to_string())?;
		if !wallet.status.allows_payment_dispatch() {
			return Err(format!("receiver wallet status {:?} does not allow dispatch", wallet.status));
		}

		let disbursement: Disbursement = self
			.application_store
			.fetch_disbursement(tx, payment.disbursement_id)
			.await
			.map_err(|error| error.to_string())?;
		if !disbursement.status.allows_payment_dispatch() {
			return Err(format!("disbursement status {:?} does not allow dispatch", disbursement.status));
		}

		if payment.external_id.is_empty() {
			return Err("external id must not be empty".into());
		}
		payment.asset.validate().map_err(|error| error.to_string())?;
		if !payment.asset.is_native() && payment.asset.issuer.is_empty() {
			return Err("non-native asset must have a non-empty issuer".into());
		}
		// Amount's own parser already rejects non-positive values at load
		// time, so this is a defensive re-check rather than one that can
		// actually fail for a payment that made it this far.
		if payment.amount.as_decimal() <= rust_decimal::Decimal::ZERO {
			return Err("amount must be positive".into());
		}
		if wallet.ledger_address.is_empty() {
			return Err("receiver wallet ledger address must not be empty".into());
		}

		Ok(wallet)
	}

	/// Inserts one queued submitter-transaction per payment inside a
	/// single inner transaction, committing it before marking the
	/// payments *pending* in the (still-open, caller-committed) outer
	/// transaction — inner-then-outer, per the nested-transaction
	/// contract.
	async fn dispatch_ledger_path(
		&self,
		app_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		_tenant: &Tenant,
		eligible: Vec<(Payment, ReceiverWallet)>,
	) -> Result<(), CoreError> {
		let now = Utc::now();
		let mut sub_tx = self.submitter_store.begin().await?;
		for (payment, wallet) in &eligible {
			let transaction = SubmitterTransaction {
				id: Uuid::new_v4(),
				external_id: payment.external_id.clone(),
				tenant_id: payment.tenant_id,
				asset: payment.asset.clone(),
				amount: payment.amount.as_decimal(),
				destination: wallet.ledger_address.clone(),
				state: SubmitterTransactionState::Queued,
				xdr_sent: None,
				xdr_received: None,
				sequence: None,
				attempts: 0,
				created_at: now,
				updated_at: now,
			};
			self.submitter_store.insert_submitter_transaction(&mut sub_tx, &transaction).await?;
		}
		sub_tx.commit().await.map_err(|error| disb_store::map_sqlx_error("committing dispatcher submitter batch", error))?;

		for (mut payment, _wallet) in eligible {
			payment.transition(PaymentStatus::Pending, None, now)?;
			self.application_store.update_payment(app_tx, &payment).await?;
		}
		Ok(())
	}

	/// Per spec: the submitter store is never opened on this path. Each
	/// payment's custodial-transfer-request upsert and provider call
	/// happen with only the outer (application-store) transaction held.
	async fn dispatch_custodial_path(
		&self,
		app_tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
		tenant: &Tenant,
		eligible: Vec<(Payment, ReceiverWallet)>,
	) -> Result<(), CoreError> {
		for (mut payment, wallet) in eligible {
			let mut request = self
				.application_store
				.upsert_custodial_transfer_request(app_tx, payment.id, &tenant.distribution_account_address)
				.await?;

			let send_result = self
				.custodial_client
				.send_payment(SendPaymentRequest {
					source_wallet_id: tenant.distribution_account_address.clone(),
					destination_address: wallet.ledger_address.clone(),
					amount: payment.amount.to_string(),
					asset_code: payment.asset.code.clone(),
					idempotency_key: request.id.to_string(),
				})
				.await;

			match send_result {
				Ok(object) => {
					request.provider_transfer_id = Some(object.id.clone());
					request.status = object.status;
					request.response_body = Some(object.raw.clone());
					request.sync_attempts += 1;
					request.last_sync_attempt_at = Some(Utc::now());
					if object.status.is_terminal() {
						request.completed_at = Some(Utc::now());
					}
					self.application_store.update_custodial_transfer_request(app_tx, &request).await?;

					payment.transition(PaymentStatus::Pending, None, Utc::now())?;
					self.application_store.update_payment(app_tx, &payment).await?;

					match object.status {
						CustodialTransferStatus::Pending => {}
						CustodialTransferStatus::Complete => {
							payment.stellar_transaction_hash = object.transaction_hash.clone();
							payment.transition(PaymentStatus::Success, None, Utc::now())?;
							self.application_store.update_payment(app_tx, &payment).await?;
						}
						CustodialTransferStatus::Failed => {
							let reason = object.error_code.clone().unwrap_or_else(|| "custodial provider reported failure".into());
							payment.transition(PaymentStatus::Failed, Some(reason), Utc::now())?;
							self.application_store.update_payment(app_tx, &payment).await?;
						}
					}
				}
				Err(CustodialError::BadRequest(detail)) => {
					payment.transition(PaymentStatus::Failed, Some(detail), Utc::now())?;
					self.application_store.update_payment(app_tx, &payment).await?;
				}
				Err(CustodialError::Transient(error)) => {
					return Err(CoreError::transient("dispatching custodial payment", error));
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use disb_common::{Asset, Payment, PaymentStatus, StatusHistoryEntry};
	use uuid::Uuid;

	fn sample_payment(status: PaymentStatus) -> Payment {
		let now = chrono::Utc::now();
		Payment {
			id: Uuid::new_v4(),
			tenant_id: Uuid::new_v4(),
			disbursement_id: Uuid::new_v4(),
			external_id: "ext-1".into(),
			asset: Asset { code: "USDC".into(), issuer: "ISSUER".into() },
			amount: disb_common::Amount::parse("10.0000000").unwrap(),
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
	fn ready_payment_can_reach_pending_but_not_success_directly() {
		let mut payment = sample_payment(PaymentStatus::Ready);
		assert!(payment.transition(PaymentStatus::Pending, None, chrono::Utc::now()).is_ok());
		assert_eq!(payment.status, PaymentStatus::Pending);
	}

	#[test]
	fn ready_payment_rejects_direct_failure_to_success() {
		let payment = sample_payment(PaymentStatus::Ready);
		assert!(!payment.status.can_transition_to(PaymentStatus::Success));
	}
}
