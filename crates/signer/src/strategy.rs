use async_trait::async_trait;
use disb_common::CoreError;
use ed25519_dalek::{Signature, SigningKey};

/// A newly provisioned signing account. `secret` is populated only for
/// strategies that hand the caller the key material directly (`env`
/// strategies are in-memory-only and never persist it); other
/// strategies return it encrypted via their own persistence path and
/// leave this `None`.
pub struct NewAccount {
	pub address: String,
	pub encrypted_secret: Option<String>,
}

#[async_trait]
pub trait SigningStrategy: Send + Sync {
	/// Signs `digest` (already hashed per the envelope signature base)
	/// for the account at `address`.
	async fn sign(&self, address: &str, digest: &[u8]) -> Result<Signature, CoreError>;

	/// Generates `n` new accounts of this strategy's type. `env`
	/// strategies return the generated addresses (with `encrypted_secret:
	/// None`, since nothing is persisted) and log an unsupported-command
	/// warning rather than erroring — there's no persistent store to
	/// insert into, but the addresses are still part of the contract.
	async fn batch_insert(&self, n: u32) -> Result<Vec<NewAccount>, CoreError>;

	/// Deletes an account's secret material by address. `env` strategies
	/// reject this the same way `batch_insert` does.
	async fn delete(&self, address: &str) -> Result<(), CoreError>;
}

pub(crate) fn unsupported_for_env(operation: &str) -> CoreError {
	CoreError::validation(format!("{operation} is unsupported for env-backed accounts: no persistent store to mutate"))
}

pub(crate) fn generate_keypair() -> SigningKey {
	SigningKey::generate(&mut rand::rngs::OsRng)
}

/// Deterministic address string for a verifying key. Not a StrKey
/// encoding of the target ledger protocol — just a stable identifier
/// derived from the public key bytes, which is all the account tables
/// need to key on.
pub(crate) fn address_for(key: &SigningKey) -> String {
	format!("G{}", hex::encode_upper(key.verifying_key().to_bytes()))
}
