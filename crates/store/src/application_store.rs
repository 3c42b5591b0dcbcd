use chrono::{DateTime, Utc};
use disb_common::{
	Asset, CircleTransferRequest, CoreError, CustodialTransferStatus, Disbursement, DisbursementStatus,
	DistributionPlatform, Payment, PaymentStatus, ReceiverWallet, ReceiverWalletStatus, StatusHistoryEntry, Tenant,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::map_sqlx_error;

/// Connection pool and queries over the `payments`, `disbursements`,
/// `receiver_wallets`, and `circle_transfer_requests` tables.
#[derive(Clone)]
pub struct ApplicationStore {
	pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
	id: Uuid,
	tenant_id: Uuid,
	disbursement_id: Uuid,
	external_id: String,
	asset_code: String,
	asset_issuer: String,
	amount: rust_decimal::Decimal,
	receiver_wallet_id: Uuid,
	status: String,
	status_history: serde_json::Value,
	stellar_transaction_hash: Option<String>,
	message: Option<String>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
	type Error = CoreError;

	fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
		let status = parse_payment_status(&row.status)?;
		let status_history: Vec<StatusHistoryEntry> = serde_json::from_value(row.status_history)
			.map_err(|error| CoreError::invariant(format!("payment {} has malformed status history: {error}", row.id)))?;
		let amount = disb_common::Amount::parse(&format!("{:.7}", row.amount))
			.map_err(|error| CoreError::invariant(format!("payment {} has an unparseable amount: {error}", row.id)))?;
		Ok(Payment {
			id: row.id,
			tenant_id: row.tenant_id,
			disbursement_id: row.disbursement_id,
			external_id: row.external_id,
			asset: Asset { code: row.asset_code, issuer: row.asset_issuer },
			amount,
			receiver_wallet_id: row.receiver_wallet_id,
			status,
			status_history,
			stellar_transaction_hash: row.stellar_transaction_hash,
			message: row.message,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, CoreError> {
	match raw {
		"draft" => Ok(PaymentStatus::Draft),
		"ready" => Ok(PaymentStatus::Ready),
		"pending" => Ok(PaymentStatus::Pending),
		"success" => Ok(PaymentStatus::Success),
		"failed" => Ok(PaymentStatus::Failed),
		other => Err(CoreError::invariant(format!("unknown payment status {other:?}"))),
	}
}

fn payment_status_str(status: PaymentStatus) -> &'static str {
	match status {
		PaymentStatus::Draft => "draft",
		PaymentStatus::Ready => "ready",
		PaymentStatus::Pending => "pending",
		PaymentStatus::Success => "success",
		PaymentStatus::Failed => "failed",
	}
}

fn parse_disbursement_status(raw: &str) -> Result<DisbursementStatus, CoreError> {
	match raw {
		"draft" => Ok(DisbursementStatus::Draft),
		"ready" => Ok(DisbursementStatus::Ready),
		"started" => Ok(DisbursementStatus::Started),
		"paused" => Ok(DisbursementStatus::Paused),
		"completed" => Ok(DisbursementStatus::Completed),
		other => Err(CoreError::invariant(format!("unknown disbursement status {other:?}"))),
	}
}

fn parse_receiver_wallet_status(raw: &str) -> Result<ReceiverWalletStatus, CoreError> {
	match raw {
		"ready" => Ok(ReceiverWalletStatus::Ready),
		"registered" => Ok(ReceiverWalletStatus::Registered),
		other => Err(CoreError::invariant(format!("unknown receiver wallet status {other:?}"))),
	}
}

fn parse_distribution_platform(raw: &str) -> Result<DistributionPlatform, CoreError> {
	match raw {
		"ledger" => Ok(DistributionPlatform::Ledger),
		"custodial" => Ok(DistributionPlatform::Custodial),
		other => Err(CoreError::invariant(format!("unknown distribution platform {other:?}"))),
	}
}

fn parse_custodial_status(raw: &str) -> Result<CustodialTransferStatus, CoreError> {
	match raw {
		"pending" => Ok(CustodialTransferStatus::Pending),
		"complete" => Ok(CustodialTransferStatus::Complete),
		"failed" => Ok(CustodialTransferStatus::Failed),
		other => Err(CoreError::invariant(format!("unknown custodial transfer status {other:?}"))),
	}
}

fn custodial_status_str(status: CustodialTransferStatus) -> &'static str {
	match status {
		CustodialTransferStatus::Pending => "pending",
		CustodialTransferStatus::Complete => "complete",
		CustodialTransferStatus::Failed => "failed",
	}
}

#[derive(sqlx::FromRow)]
struct DisbursementRow {
	id: Uuid,
	tenant_id: Uuid,
	name: String,
	status: String,
	status_history: serde_json::Value,
	wallet_id: Uuid,
	asset_code: String,
	asset_issuer: String,
	registration_message_template: Option<String>,
	verification_field: Option<String>,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

impl TryFrom<DisbursementRow> for Disbursement {
	type Error = CoreError;

	fn try_from(row: DisbursementRow) -> Result<Self, Self::Error> {
		let status = parse_disbursement_status(&row.status)?;
		let status_history: Vec<StatusHistoryEntry> = serde_json::from_value(row.status_history).map_err(|error| {
			CoreError::invariant(format!("disbursement {} has malformed status history: {error}", row.id))
		})?;
		Ok(Disbursement {
			id: row.id,
			tenant_id: row.tenant_id,
			name: row.name,
			status,
			status_history,
			wallet_id: row.wallet_id,
			asset: Asset { code: row.asset_code, issuer: row.asset_issuer },
			registration_message_template: row.registration_message_template,
			verification_field: row.verification_field,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(sqlx::FromRow)]
struct ReceiverWalletRow {
	id: Uuid,
	receiver_id: Uuid,
	tenant_id: Uuid,
	status: String,
	ledger_address: String,
	invitation_sent_at: Option<DateTime<Utc>>,
	invitation_resend_count: i32,
}

impl TryFrom<ReceiverWalletRow> for ReceiverWallet {
	type Error = CoreError;

	fn try_from(row: ReceiverWalletRow) -> Result<Self, Self::Error> {
		Ok(ReceiverWallet {
			id: row.id,
			receiver_id: row.receiver_id,
			tenant_id: row.tenant_id,
			status: parse_receiver_wallet_status(&row.status)?,
			ledger_address: row.ledger_address,
			invitation_sent_at: row.invitation_sent_at,
			invitation_resend_count: row.invitation_resend_count.max(0) as u32,
		})
	}
}

#[derive(sqlx::FromRow)]
struct TenantRow {
	id: Uuid,
	organization_id: Uuid,
	name: String,
	distribution_platform: String,
	distribution_account_address: String,
	is_active: bool,
}

impl TryFrom<TenantRow> for Tenant {
	type Error = CoreError;

	fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
		Ok(Tenant {
			id: row.id,
			organization_id: row.organization_id,
			name: row.name,
			distribution_platform: parse_distribution_platform(&row.distribution_platform)?,
			distribution_account_address: row.distribution_account_address,
			is_active: row.is_active,
		})
	}
}

#[derive(sqlx::FromRow)]
struct CircleTransferRequestRow {
	id: Uuid,
	payment_id: Uuid,
	source_wallet_id: String,
	circle_transfer_id: Option<String>,
	circle_payout_id: Option<String>,
	status: String,
	sync_attempts: i32,
	last_sync_attempt_at: Option<DateTime<Utc>>,
	response_body: Option<serde_json::Value>,
	completed_at: Option<DateTime<Utc>>,
	created_at: DateTime<Utc>,
}

impl TryFrom<CircleTransferRequestRow> for CircleTransferRequest {
	type Error = CoreError;

	fn try_from(row: CircleTransferRequestRow) -> Result<Self, Self::Error> {
		Ok(CircleTransferRequest {
			id: row.id,
			payment_id: row.payment_id,
			source_wallet_id: row.source_wallet_id,
			provider_transfer_id: row.circle_transfer_id,
			provider_payout_id: row.circle_payout_id,
			status: parse_custodial_status(&row.status)?,
			sync_attempts: row.sync_attempts.max(0) as u32,
			last_sync_attempt_at: row.last_sync_attempt_at,
			response_body: row.response_body,
			completed_at: row.completed_at,
			created_at: row.created_at,
		})
	}
}

impl ApplicationStore {
	pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
		let pool = PgPoolOptions::new()
			.max_connections(max_connections)
			.connect(database_url)
			.await
			.map_err(|error| map_sqlx_error("connecting to application store", error))?;
		Ok(Self { pool })
	}

	pub fn from_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, CoreError> {
		self.pool.begin().await.map_err(|error| map_sqlx_error("beginning application store transaction", error))
	}

	/// Fetches one payment by its `external_id`, the key submitter
	/// transactions and custodial transfer requests carry instead of the
	/// payment's own row id.
	pub async fn fetch_payment_by_external_id(&self, external_id: &str) -> Result<Payment, CoreError> {
		let row = sqlx::query_as::<_, PaymentRow>(
			"SELECT id, tenant_id, disbursement_id, external_id, asset_code, asset_issuer, amount, \
			 receiver_wallet_id, status, status_history, stellar_transaction_hash, message, created_at, updated_at \
			 FROM payments WHERE external_id = $1",
		)
		.bind(external_id)
		.fetch_one(&self.pool)
		.await
		.map_err(|error| map_sqlx_error("fetching payment by external id", error))?;
		Payment::try_from(row)
	}

	/// Convenience wrapper over [`Self::update_payment`] for callers that
	/// are not already inside an application-store transaction (C4, C7),
	/// as opposed to C5's dispatcher which updates the payment as part of
	/// its own two-store transaction.
	pub async fn update_payment_standalone(&self, payment: &Payment) -> Result<(), CoreError> {
		let mut tx = self.begin().await?;
		self.update_payment(&mut tx, payment).await?;
		tx.commit().await.map_err(|error| map_sqlx_error("committing standalone payment update", error))
	}

	/// Selects up to `limit` *ready* payments for `tenant_id`, taking a
	/// row lock that skips rows already locked by a concurrent dispatcher
	/// run so two overlapping dispatcher calls never select the same
	/// payment.
	pub async fn lock_ready_payments(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		tenant_id: Uuid,
		limit: i64,
	) -> Result<Vec<Payment>, CoreError> {
		let rows = sqlx::query_as::<_, PaymentRow>(
			"SELECT id, tenant_id, disbursement_id, external_id, asset_code, asset_issuer, amount, \
			 receiver_wallet_id, status, status_history, stellar_transaction_hash, message, created_at, updated_at \
			 FROM payments WHERE tenant_id = $1 AND status = 'ready' \
			 ORDER BY created_at LIMIT $2 FOR UPDATE SKIP LOCKED",
		)
		.bind(tenant_id)
		.bind(limit)
		.fetch_all(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("locking ready payments", error))?;

		rows.into_iter().map(Payment::try_from).collect()
	}

	pub async fn fetch_disbursement(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		id: Uuid,
	) -> Result<Disbursement, CoreError> {
		let row = sqlx::query_as::<_, DisbursementRow>(
			"SELECT id, tenant_id, name, status, status_history, wallet_id, asset_code, asset_issuer, \
			 registration_message_template, verification_field, created_at, updated_at \
			 FROM disbursements WHERE id = $1",
		)
		.bind(id)
		.fetch_one(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("fetching disbursement", error))?;
		Disbursement::try_from(row)
	}

	/// Fetches one payment by its own row id, within an already-open
	/// transaction (used by C7, which reconciles inside a single store
	/// transaction rather than the standalone helpers C4 uses).
	pub async fn fetch_payment(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Payment, CoreError> {
		let row = sqlx::query_as::<_, PaymentRow>(
			"SELECT id, tenant_id, disbursement_id, external_id, asset_code, asset_issuer, amount, \
			 receiver_wallet_id, status, status_history, stellar_transaction_hash, message, created_at, updated_at \
			 FROM payments WHERE id = $1",
		)
		.bind(id)
		.fetch_one(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("fetching payment", error))?;
		Payment::try_from(row)
	}

	/// Every active tenant's id, for the periodic batch-job entrypoint
	/// that sweeps ready payments tenant by tenant (the event-triggered
	/// entrypoint already knows its tenant id from the event).
	pub async fn list_active_tenant_ids(&self) -> Result<Vec<Uuid>, CoreError> {
		let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tenants WHERE is_active = true")
			.fetch_all(&self.pool)
			.await
			.map_err(|error| map_sqlx_error("listing active tenants", error))?;
		Ok(rows.into_iter().map(|(id,)| id).collect())
	}

	pub async fn fetch_tenant(&self, tx: &mut Transaction<'_, Postgres>, id: Uuid) -> Result<Tenant, CoreError> {
		let row = sqlx::query_as::<_, TenantRow>(
			"SELECT id, organization_id, name, distribution_platform, distribution_account_address, is_active \
			 FROM tenants WHERE id = $1",
		)
		.bind(id)
		.fetch_one(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("fetching tenant", error))?;
		Tenant::try_from(row)
	}

	pub async fn fetch_receiver_wallet(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		id: Uuid,
	) -> Result<ReceiverWallet, CoreError> {
		let row = sqlx::query_as::<_, ReceiverWalletRow>(
			"SELECT id, receiver_id, tenant_id, status, ledger_address, invitation_sent_at, invitation_resend_count \
			 FROM receiver_wallets WHERE id = $1",
		)
		.bind(id)
		.fetch_one(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("fetching receiver wallet", error))?;
		ReceiverWallet::try_from(row)
	}

	/// Persists the full mutable surface of a payment: status, history,
	/// message, and ledger transaction hash. Called after every
	/// `Payment::transition`.
	pub async fn update_payment(&self, tx: &mut Transaction<'_, Postgres>, payment: &Payment) -> Result<(), CoreError> {
		let history = serde_json::to_value(&payment.status_history)
			.map_err(|error| CoreError::invariant(format!("serializing status history: {error}")))?;
		sqlx::query(
			"UPDATE payments SET status = $2, status_history = $3, stellar_transaction_hash = $4, message = $5, \
			 updated_at = $6 WHERE id = $1",
		)
		.bind(payment.id)
		.bind(payment_status_str(payment.status))
		.bind(history)
		.bind(&payment.stellar_transaction_hash)
		.bind(&payment.message)
		.bind(payment.updated_at)
		.execute(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("updating payment", error))?;
		Ok(())
	}

	/// Inserts a new transfer-request row if one does not already exist
	/// for `payment_id`, keyed so a replayed dispatch reuses the same
	/// idempotency key instead of creating a second request.
	pub async fn upsert_custodial_transfer_request(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		payment_id: Uuid,
		source_wallet_id: &str,
	) -> Result<CircleTransferRequest, CoreError> {
		let row = sqlx::query_as::<_, CircleTransferRequestRow>(
			"INSERT INTO circle_transfer_requests (id, payment_id, source_wallet_id, status, sync_attempts, created_at) \
			 VALUES (gen_random_uuid(), $1, $2, 'pending', 0, now()) \
			 ON CONFLICT (payment_id) DO UPDATE SET payment_id = EXCLUDED.payment_id \
			 RETURNING id, payment_id, source_wallet_id, circle_transfer_id, circle_payout_id, status, sync_attempts, \
			 last_sync_attempt_at, response_body, completed_at, created_at",
		)
		.bind(payment_id)
		.bind(source_wallet_id)
		.fetch_one(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("upserting custodial transfer request", error))?;
		CircleTransferRequest::try_from(row)
	}

	pub async fn update_custodial_transfer_request(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		request: &CircleTransferRequest,
	) -> Result<(), CoreError> {
		sqlx::query(
			"UPDATE circle_transfer_requests SET circle_transfer_id = $2, circle_payout_id = $3, status = $4, \
			 sync_attempts = $5, last_sync_attempt_at = $6, response_body = $7, completed_at = $8 WHERE id = $1",
		)
		.bind(request.id)
		.bind(&request.provider_transfer_id)
		.bind(&request.provider_payout_id)
		.bind(custodial_status_str(request.status))
		.bind(request.sync_attempts as i32)
		.bind(request.last_sync_attempt_at)
		.bind(&request.response_body)
		.bind(request.completed_at)
		.execute(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("updating custodial transfer request", error))?;
		Ok(())
	}

	/// Used by the reconciler: every *pending* transfer request across
	/// all custodial-platform tenants, oldest first.
	pub async fn lock_pending_custodial_transfer_requests(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		limit: i64,
	) -> Result<Vec<CircleTransferRequest>, CoreError> {
		let rows = sqlx::query_as::<_, CircleTransferRequestRow>(
			"SELECT id, payment_id, source_wallet_id, circle_transfer_id, circle_payout_id, status, sync_attempts, \
			 last_sync_attempt_at, response_body, completed_at, created_at FROM circle_transfer_requests \
			 WHERE status = 'pending' ORDER BY created_at LIMIT $1 FOR UPDATE SKIP LOCKED",
		)
		.bind(limit)
		.fetch_all(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("locking pending custodial transfer requests", error))?;
		rows.into_iter().map(CircleTransferRequest::try_from).collect()
	}
}
