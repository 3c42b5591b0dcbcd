//! §6 "Custodial provider": a REST API keyed by an API key, used both to
//! dispatch a payment synchronously (C5) and to poll transfer/payout
//! status (C7).

use async_trait::async_trait;
use disb_common::CustodialTransferStatus;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct SendPaymentRequest {
	pub source_wallet_id: String,
	pub destination_address: String,
	pub amount: String,
	pub asset_code: String,
	/// The local transfer-request id; the provider de-duplicates replayed
	/// requests carrying the same key.
	pub idempotency_key: String,
}

/// A transfer or payout object as returned by the provider, normalized to
/// the fields the core actually reads.
#[derive(Debug, Clone)]
pub struct TransferObject {
	pub id: String,
	pub status: CustodialTransferStatus,
	pub error_code: Option<String>,
	pub transaction_hash: Option<String>,
	pub raw: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum CustodialError {
	/// The provider returned 400; the caller increments the sync-attempt
	/// counter and moves on rather than treating this as transient.
	#[error("custodial provider rejected the request: {0}")]
	BadRequest(String),
	#[error("transient custodial provider error")]
	Transient(#[from] anyhow::Error),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustodialClient: Send + Sync {
	async fn send_payment(&self, request: SendPaymentRequest) -> Result<TransferObject, CustodialError>;
	async fn get_transfer(&self, id: &str) -> Result<TransferObject, CustodialError>;
	async fn get_payout(&self, id: &str) -> Result<TransferObject, CustodialError>;
	async fn get_wallet(&self, id: &str) -> Result<serde_json::Value, CustodialError>;
}

pub struct ReqwestCustodialClient {
	http: reqwest::Client,
	base_url: String,
	api_key: String,
}

impl ReqwestCustodialClient {
	pub fn new(http: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
		Self { http, base_url: base_url.into(), api_key: api_key.into() }
	}

	fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		builder.bearer_auth(&self.api_key)
	}
}

#[derive(Deserialize)]
struct TransferResponse {
	id: String,
	status: String,
	#[serde(default)]
	error_code: Option<String>,
	#[serde(default)]
	transaction_hash: Option<String>,
}

fn parse_status(raw: &str) -> Result<CustodialTransferStatus, CustodialError> {
	match raw {
		"pending" => Ok(CustodialTransferStatus::Pending),
		"complete" => Ok(CustodialTransferStatus::Complete),
		"failed" => Ok(CustodialTransferStatus::Failed),
		other => Err(CustodialError::BadRequest(format!("unrecognized transfer status {other:?}"))),
	}
}

async fn into_transfer_object(response: reqwest::Response) -> Result<TransferObject, CustodialError> {
	let status = response.status();
	let raw: serde_json::Value =
		response.json().await.map_err(|error| CustodialError::Transient(error.into()))?;

	if status.as_u16() == 400 {
		return Err(CustodialError::BadRequest(raw.to_string()));
	}
	if !status.is_success() {
		return Err(CustodialError::Transient(anyhow::anyhow!("custodial provider returned {status}")));
	}

	let body: TransferResponse = serde_json::from_value(raw.clone())
		.map_err(|error| CustodialError::Transient(error.into()))?;
	Ok(TransferObject {
		id: body.id,
		status: parse_status(&body.status)?,
		error_code: body.error_code,
		transaction_hash: body.transaction_hash,
		raw,
	})
}

#[async_trait]
impl CustodialClient for ReqwestCustodialClient {
	async fn send_payment(&self, request: SendPaymentRequest) -> Result<TransferObject, CustodialError> {
		let url = format!("{}/transfers", self.base_url);
		let response = self
			.authorized(self.http.post(&url))
			.header("Idempotency-Key", &request.idempotency_key)
			.json(&serde_json::json!({
				"source_wallet_id": request.source_wallet_id,
				"destination_address": request.destination_address,
				"amount": request.amount,
				"asset_code": request.asset_code,
			}))
			.send()
			.await
			.map_err(|error| CustodialError::Transient(error.into()))?;
		into_transfer_object(response).await
	}

	async fn get_transfer(&self, id: &str) -> Result<TransferObject, CustodialError> {
		let url = format!("{}/transfers/{id}", self.base_url);
		let response = self
			.authorized(self.http.get(&url))
			.send()
			.await
			.map_err(|error| CustodialError::Transient(error.into()))?;
		into_transfer_object(response).await
	}

	async fn get_payout(&self, id: &str) -> Result<TransferObject, CustodialError> {
		let url = format!("{}/payouts/{id}", self.base_url);
		let response = self
			.authorized(self.http.get(&url))
			.send()
			.await
			.map_err(|error| CustodialError::Transient(error.into()))?;
		into_transfer_object(response).await
	}

	async fn get_wallet(&self, id: &str) -> Result<serde_json::Value, CustodialError> {
		let url = format!("{}/wallets/{id}", self.base_url);
		let response = self
			.authorized(self.http.get(&url))
			.send()
			.await
			.map_err(|error| CustodialError::Transient(error.into()))?;
		if !response.status().is_success() {
			return Err(CustodialError::Transient(anyhow::anyhow!("custodial provider returned {}", response.status())));
		}
		response.json().await.map_err(|error| CustodialError::Transient(error.into()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unrecognized_status_is_a_bad_request() {
		assert!(matches!(parse_status("unknown"), Err(CustodialError::BadRequest(_))));
	}

	#[test]
	fn known_statuses_parse() {
		assert_eq!(parse_status("pending").unwrap(), CustodialTransferStatus::Pending);
		assert_eq!(parse_status("complete").unwrap(), CustodialTransferStatus::Complete);
		assert_eq!(parse_status("failed").unwrap(), CustodialTransferStatus::Failed);
	}
}
