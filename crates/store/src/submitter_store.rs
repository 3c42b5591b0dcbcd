use chrono::{DateTime, Utc};
use disb_common::{Asset, ChannelAccount, CoreError, SubmitterTransaction, SubmitterTransactionState};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::map_sqlx_error;

/// Connection pool and queries over the `submitter_transactions`,
/// `channel_accounts`, and `vault` tables.
#[derive(Clone)]
pub struct SubmitterStore {
	pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SubmitterTransactionRow {
	id: Uuid,
	external_id: String,
	tenant_id: Uuid,
	asset_code: String,
	asset_issuer: String,
	amount: rust_decimal::Decimal,
	destination: String,
	state: String,
	xdr_sent: Option<String>,
	xdr_received: Option<String>,
	sequence: Option<i64>,
	attempts: i32,
	created_at: DateTime<Utc>,
	updated_at: DateTime<Utc>,
}

fn parse_state(raw: &str) -> Result<SubmitterTransactionState, CoreError> {
	use SubmitterTransactionState::*;
	match raw {
		"queued" => Ok(Queued),
		"processing" => Ok(Processing),
		"sent" => Ok(Sent),
		"success" => Ok(Success),
		"error" => Ok(Error),
		"fatal" => Ok(Fatal),
		other => Err(CoreError::invariant(format!("unknown submitter transaction state {other:?}"))),
	}
}

fn state_str(state: SubmitterTransactionState) -> &'static str {
	use SubmitterTransactionState::*;
	match state {
		Queued => "queued",
		Processing => "processing",
		Sent => "sent",
		Success => "success",
		Error => "error",
		Fatal => "fatal",
	}
}

impl TryFrom<SubmitterTransactionRow> for SubmitterTransaction {
	type Error = CoreError;

	fn try_from(row: SubmitterTransactionRow) -> Result<Self, Self::Error> {
		Ok(SubmitterTransaction {
			id: row.id,
			external_id: row.external_id,
			tenant_id: row.tenant_id,
			asset: Asset { code: row.asset_code, issuer: row.asset_issuer },
			amount: row.amount,
			destination: row.destination,
			state: parse_state(&row.state)?,
			xdr_sent: row.xdr_sent,
			xdr_received: row.xdr_received,
			sequence: row.sequence,
			attempts: row.attempts.max(0) as u32,
			created_at: row.created_at,
			updated_at: row.updated_at,
		})
	}
}

#[derive(sqlx::FromRow)]
struct ChannelAccountRow {
	public_key: String,
	encrypted_private_key: String,
	locked_until_ledger_number: Option<i64>,
	locked_by: Option<String>,
}

impl From<ChannelAccountRow> for ChannelAccount {
	fn from(row: ChannelAccountRow) -> Self {
		ChannelAccount {
			public_key: row.public_key,
			encrypted_private_key: row.encrypted_private_key,
			locked_until_ledger_number: row.locked_until_ledger_number,
			locked_by: row.locked_by,
		}
	}
}

impl SubmitterStore {
	pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
		let pool = PgPoolOptions::new()
			.max_connections(max_connections)
			.connect(database_url)
			.await
			.map_err(|error| map_sqlx_error("connecting to submitter store", error))?;
		Ok(Self { pool })
	}

	pub fn from_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, CoreError> {
		self.pool.begin().await.map_err(|error| map_sqlx_error("beginning submitter store transaction", error))
	}

	pub async fn insert_submitter_transaction(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		transaction: &SubmitterTransaction,
	) -> Result<(), CoreError> {
		sqlx::query(
			"INSERT INTO submitter_transactions (id, external_id, tenant_id, asset_code, asset_issuer, amount, \
			 destination, state, attempts, created_at, updated_at) \
			 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
		)
		.bind(transaction.id)
		.bind(&transaction.external_id)
		.bind(transaction.tenant_id)
		.bind(&transaction.asset.code)
		.bind(&transaction.asset.issuer)
		.bind(transaction.amount)
		.bind(&transaction.destination)
		.bind(state_str(transaction.state))
		.bind(transaction.attempts as i32)
		.bind(transaction.created_at)
		.bind(transaction.updated_at)
		.execute(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("inserting submitter transaction", error))?;
		Ok(())
	}

	/// Row-locks up to `limit` *queued* transactions so only one worker
	/// ever picks a given external id: the lock is held until the caller
	/// commits after transitioning the row to *processing*.
	pub async fn lock_queued_transactions(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		limit: i64,
	) -> Result<Vec<SubmitterTransaction>, CoreError> {
		let rows = sqlx::query_as::<_, SubmitterTransactionRow>(
			"SELECT id, external_id, tenant_id, asset_code, asset_issuer, amount, destination, state, xdr_sent, \
			 xdr_received, sequence, attempts, created_at, updated_at FROM submitter_transactions \
			 WHERE state = 'queued' ORDER BY created_at LIMIT $1 FOR UPDATE SKIP LOCKED",
		)
		.bind(limit)
		.fetch_all(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("locking queued submitter transactions", error))?;
		rows.into_iter().map(SubmitterTransaction::try_from).collect()
	}

	pub async fn update_submitter_transaction(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		transaction: &SubmitterTransaction,
	) -> Result<(), CoreError> {
		sqlx::query(
			"UPDATE submitter_transactions SET state = $2, xdr_sent = $3, xdr_received = $4, sequence = $5, \
			 attempts = $6, updated_at = $7 WHERE id = $1",
		)
		.bind(transaction.id)
		.bind(state_str(transaction.state))
		.bind(&transaction.xdr_sent)
		.bind(&transaction.xdr_received)
		.bind(transaction.sequence)
		.bind(transaction.attempts as i32)
		.bind(transaction.updated_at)
		.execute(&mut **tx)
		.await
		.map_err(|error| map_sqlx_error("updating submitter transaction", error))?;
		Ok(())
	}

	/// Atomically claims one channel account whose lease has expired by
	/// `current_ledger`, preferring the one that has gone longest without
	/// a lease, and marks it locked to `worker_id` until
	/// `current_ledger + lease_window`.
	pub async fn lease_channel_account(
		&self,
		current_ledger: i64,
		lease_window: i64,
		worker_id: &str,
	) -> Result<Option<ChannelAccount>, CoreError> {
		let mut tx = self.begin().await?;
		let candidate = sqlx::query_as::<_, ChannelAccountRow>(
			"SELECT public_key, encrypted_private_key, locked_until_ledger_number, locked_by FROM channel_accounts \
			 WHERE locked_until_ledger_number IS NULL OR locked_until_ledger_number <= $1 \
			 ORDER BY locked_until_ledger_number NULLS FIRST LIMIT 1 FOR UPDATE SKIP LOCKED",
		)
		.bind(current_ledger)
		.fetch_optional(&mut *tx)
		.await
		.map_err(|error| map_sqlx_error("selecting a leasable channel account", error))?;

		let Some(candidate) = candidate else {
			tx.commit().await.map_err(|error| map_sqlx_error("committing empty lease attempt", error))?;
			return Ok(None);
		};

		sqlx::query("UPDATE channel_accounts SET locked_until_ledger_number = $2, locked_by = $3, updated_at = now() WHERE public_key = $1")
			.bind(&candidate.public_key)
			.bind(current_ledger + lease_window)
			.bind(worker_id)
			.execute(&mut *tx)
			.await
			.map_err(|error| map_sqlx_error("leasing channel account", error))?;

		tx.commit().await.map_err(|error| map_sqlx_error("committing channel account lease", error))?;

		Ok(Some(ChannelAccount {
			public_key: candidate.public_key,
			encrypted_private_key: candidate.encrypted_private_key,
			locked_until_ledger_number: Some(current_ledger + lease_window),
			locked_by: Some(worker_id.to_string()),
		}))
	}

	/// Clears the lock fields. Must be called on every exit path by the
	/// lease holder; an abnormal exit is tolerated because the lease
	/// expires in ledger-height space and is reclaimed by the next call
	/// to `lease_channel_account`.
	pub async fn release_channel_account(&self, public_key: &str) -> Result<(), CoreError> {
		sqlx::query("UPDATE channel_accounts SET locked_until_ledger_number = NULL, locked_by = NULL, updated_at = now() WHERE public_key = $1")
			.bind(public_key)
			.execute(&self.pool)
			.await
			.map_err(|error| map_sqlx_error("releasing channel account", error))?;
		Ok(())
	}

	pub async fn insert_channel_accounts(
		&self,
		tx: &mut Transaction<'_, Postgres>,
		accounts: &[ChannelAccount],
	) -> Result<(), CoreError> {
		for account in accounts {
			sqlx::query(
				"INSERT INTO channel_accounts (public_key, encrypted_private_key, updated_at) VALUES ($1, $2, now())",
			)
			.bind(&account.public_key)
			.bind(&account.encrypted_private_key)
			.execute(&mut **tx)
			.await
			.map_err(|error| map_sqlx_error("inserting channel account", error))?;
		}
		Ok(())
	}

	pub async fn remove_channel_account(&self, public_key: &str) -> Result<(), CoreError> {
		sqlx::query("DELETE FROM channel_accounts WHERE public_key = $1")
			.bind(public_key)
			.execute(&self.pool)
			.await
			.map_err(|error| map_sqlx_error("removing channel account", error))?;
		Ok(())
	}

	pub async fn count_channel_accounts(&self) -> Result<i64, CoreError> {
		let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM channel_accounts")
			.fetch_one(&self.pool)
			.await
			.map_err(|error| map_sqlx_error("counting channel accounts", error))?;
		Ok(count)
	}

	/// Reads the inline-encrypted secret off a `channel_accounts` row,
	/// as opposed to [`Self::get_vault_secret`] which reads the separate
	/// `vault` table used by `distribution-db-vault` accounts.
	pub async fn get_channel_account_secret(&self, public_key: &str) -> Result<Option<String>, CoreError> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT encrypted_private_key FROM channel_accounts WHERE public_key = $1")
				.bind(public_key)
				.fetch_optional(&self.pool)
				.await
				.map_err(|error| map_sqlx_error("reading channel account secret", error))?;
		Ok(row.map(|(key,)| key))
	}

	pub async fn put_vault_secret(&self, public_key: &str, encrypted_private_key: &str) -> Result<(), CoreError> {
		sqlx::query(
			"INSERT INTO vault (public_key, encrypted_private_key, created_at) VALUES ($1, $2, now()) \
			 ON CONFLICT (public_key) DO UPDATE SET encrypted_private_key = EXCLUDED.encrypted_private_key",
		)
		.bind(public_key)
		.bind(encrypted_private_key)
		.execute(&self.pool)
		.await
		.map_err(|error| map_sqlx_error("writing vault secret", error))?;
		Ok(())
	}

	pub async fn get_vault_secret(&self, public_key: &str) -> Result<Option<String>, CoreError> {
		let row: Option<(String,)> = sqlx::query_as("SELECT encrypted_private_key FROM vault WHERE public_key = $1")
			.bind(public_key)
			.fetch_optional(&self.pool)
			.await
			.map_err(|error| map_sqlx_error("reading vault secret", error))?;
		Ok(row.map(|(key,)| key))
	}
}
