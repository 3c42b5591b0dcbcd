use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Sequence number and trustlines for one ledger account.
#[derive(Debug, Clone)]
pub struct AccountDetail {
	pub sequence: i64,
	pub balances: Vec<Balance>,
}

#[derive(Debug, Clone)]
pub struct Balance {
	pub asset_code: String,
	pub asset_issuer: String,
}

impl AccountDetail {
	pub fn has_trustline(&self, asset_code: &str, asset_issuer: &str) -> bool {
		asset_issuer.is_empty()
			|| self.balances.iter().any(|b| b.asset_code == asset_code && b.asset_issuer == asset_issuer)
	}
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
	pub transaction_hash: String,
	pub result_xdr: String,
}

/// The response classification table: each variant is one row.
#[derive(Debug, Error)]
pub enum LedgerSubmitError {
	#[error("request timed out")]
	Timeout,
	#[error("bad sequence number")]
	BadSequence,
	#[error("insufficient fee")]
	InsufficientFee,
	#[error("insufficient balance")]
	InsufficientBalance,
	#[error("trustline missing")]
	TrustlineMissing,
	#[error("destination account does not exist")]
	OpNoDestination,
	#[error("rate limited")]
	RateLimited,
	#[error("ledger submission failed: {status} {detail}")]
	Other { status: u16, detail: String },
	#[error("transport error: {0}")]
	Transport(#[from] anyhow::Error),
}

impl LedgerSubmitError {
	/// Terminal errors move the payment straight to `failed`; everything
	/// else participates in the retry table.
	pub fn is_terminal(&self) -> bool {
		matches!(self, Self::InsufficientBalance | Self::TrustlineMissing | Self::OpNoDestination)
	}
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
	async fn root(&self) -> anyhow::Result<u64>;
	async fn account_detail(&self, address: &str) -> anyhow::Result<AccountDetail>;
	async fn submit_transaction(&self, envelope_xdr: &str) -> Result<SubmitOutcome, LedgerSubmitError>;
}

pub struct ReqwestLedgerClient {
	http: reqwest::Client,
	base_url: String,
}

impl ReqwestLedgerClient {
	pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
		Self { http, base_url: base_url.into() }
	}
}

#[derive(Deserialize)]
struct RootResponse {
	history_latest_ledger: u64,
}

#[derive(Deserialize)]
struct AccountResponse {
	sequence: String,
	balances: Vec<BalanceResponse>,
}

#[derive(Deserialize)]
struct BalanceResponse {
	asset_code: Option<String>,
	asset_issuer: Option<String>,
}

#[derive(Deserialize)]
struct SubmitErrorExtras {
	result_codes: ResultCodes,
}

#[derive(Deserialize)]
struct ResultCodes {
	transaction: String,
	#[serde(default)]
	operations: Vec<String>,
}

#[derive(Deserialize)]
struct SubmitErrorBody {
	status: u16,
	#[serde(default)]
	extras: Option<SubmitErrorExtras>,
}

#[async_trait]
impl LedgerClient for ReqwestLedgerClient {
	async fn root(&self) -> anyhow::Result<u64> {
		let response: RootResponse = self.http.get(&self.base_url).send().await?.error_for_status()?.json().await?;
		Ok(response.history_latest_ledger)
	}

	async fn account_detail(&self, address: &str) -> anyhow::Result<AccountDetail> {
		let url = format!("{}/accounts/{address}", self.base_url);
		let response: AccountResponse = self.http.get(&url).send().await?.error_for_status()?.json().await?;
		Ok(AccountDetail {
			sequence: response.sequence.parse()?,
			balances: response
				.balances
				.into_iter()
				.filter_map(|b| Some(Balance { asset_code: b.asset_code?, asset_issuer: b.asset_issuer.unwrap_or_default() }))
				.collect(),
		})
	}

	async fn submit_transaction(&self, envelope_xdr: &str) -> Result<SubmitOutcome, LedgerSubmitError> {
		let url = format!("{}/transactions?skip_memo_check=true", self.base_url);
		let response = self
			.http
			.post(&url)
			.form(&[("tx", envelope_xdr)])
			.send()
			.await
			.map_err(|error| LedgerSubmitError::Transport(error.into()))?;

		let status = response.status();
		if status.is_success() {
			#[derive(Deserialize)]
			struct SuccessBody {
				hash: String,
				result_xdr: String,
			}
			let body: SuccessBody =
				response.json().await.map_err(|error| LedgerSubmitError::Transport(error.into()))?;
			return Ok(SubmitOutcome { transaction_hash: body.hash, result_xdr: body.result_xdr });
		}

		if status.as_u16() == 408 {
			return Err(LedgerSubmitError::Timeout);
		}
		if status.as_u16() == 429 {
			return Err(LedgerSubmitError::RateLimited);
		}

		let body: SubmitErrorBody =
			response.json().await.map_err(|error| LedgerSubmitError::Transport(error.into()))?;
		Err(classify_error_body(status.as_u16(), body))
	}
}

fn classify_error_body(status: u16, body: SubmitErrorBody) -> LedgerSubmitError {
	let Some(extras) = body.extras else {
		return LedgerSubmitError::Other { status, detail: "no result codes in response".into() };
	};

	match extras.result_codes.transaction.as_str() {
		"tx_bad_seq" => LedgerSubmitError::BadSequence,
		"tx_insufficient_fee" => LedgerSubmitError::InsufficientFee,
		"tx_insufficient_balance" => LedgerSubmitError::InsufficientBalance,
		"tx_failed" if extras.result_codes.operations.iter().any(|op| op == "op_no_trust") => {
			LedgerSubmitError::TrustlineMissing
		}
		"tx_failed" if extras.result_codes.operations.iter().any(|op| op == "op_no_destination") => {
			LedgerSubmitError::OpNoDestination
		}
		other => LedgerSubmitError::Other { status, detail: other.to_string() },
	}
}
