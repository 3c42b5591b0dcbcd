use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use disb_common::{redact_secret, CoreError};
use disb_store::SubmitterStore;
use ed25519_dalek::{Signature, Signer, SigningKey};
use zeroize::Zeroizing;

use crate::encrypter::SecretEncrypter;
use crate::strategy::{address_for, generate_keypair, unsupported_for_env, NewAccount, SigningStrategy};

/// `host-env` / `distribution-env`: secret supplied at process start,
/// held in memory for the process lifetime, zeroized on drop.
pub struct EnvStrategy {
	keys: HashMap<String, Zeroizing<SigningKey>>,
}

impl EnvStrategy {
	pub fn new(keys: HashMap<String, SigningKey>) -> Self {
		Self { keys: keys.into_iter().map(|(address, key)| (address, Zeroizing::new(key))).collect() }
	}
}

#[async_trait]
impl SigningStrategy for EnvStrategy {
	async fn sign(&self, address: &str, digest: &[u8]) -> Result<Signature, CoreError> {
		let key = self
			.keys
			.get(address)
			.ok_or_else(|| CoreError::validation(format!("no env-configured key for account {address}")))?;
		Ok(key.sign(digest))
	}

	/// Generates `n` addresses in memory and returns them; nothing is
	/// persisted, so `encrypted_secret` is always `None`. The addresses
	/// are real output the caller needs (e.g. to fund them), even though
	/// no store insert happened — only `delete` has no addresses to hand
	/// back and is rejected outright.
	async fn batch_insert(&self, n: u32) -> Result<Vec<NewAccount>, CoreError> {
		tracing::warn!(n, "batch_insert is unsupported for env-backed accounts: returning in-memory addresses with no persistent insert");
		Ok((0..n).map(|_| NewAccount { address: address_for(&generate_keypair()), encrypted_secret: None }).collect())
	}

	async fn delete(&self, _address: &str) -> Result<(), CoreError> {
		Err(unsupported_for_env("delete"))
	}
}

pub type HostEnvStrategy = EnvStrategy;
pub type DistributionEnvStrategy = EnvStrategy;

/// `channel-db`: secret decrypted from `channel_accounts.encrypted_private_key`
/// using the configured encrypter.
pub struct ChannelDbStrategy {
	store: Arc<SubmitterStore>,
	encrypter: Arc<dyn SecretEncrypter>,
}

impl ChannelDbStrategy {
	pub fn new(store: Arc<SubmitterStore>, encrypter: Arc<dyn SecretEncrypter>) -> Self {
		Self { store, encrypter }
	}
}

#[async_trait]
impl SigningStrategy for ChannelDbStrategy {
	async fn sign(&self, address: &str, digest: &[u8]) -> Result<Signature, CoreError> {
		let encrypted = self
			.store
			.get_channel_account_secret(address)
			.await?
			.ok_or_else(|| CoreError::validation(format!("no channel account secret stored for {address}")))?;
		let seed = self.encrypter.decrypt(&encrypted)?;
		let signing_key = decode_seed(&seed)?;
		Ok(signing_key.sign(digest))
	}

	async fn batch_insert(&self, n: u32) -> Result<Vec<NewAccount>, CoreError> {
		let mut accounts = Vec::with_capacity(n as usize);
		for _ in 0..n {
			let key = generate_keypair();
			let address = address_for(&key);
			let encrypted = self.encrypter.encrypt(&hex::encode(key.to_bytes()))?;
			accounts.push(NewAccount { address, encrypted_secret: Some(encrypted) });
		}
		Ok(accounts)
	}

	async fn delete(&self, address: &str) -> Result<(), CoreError> {
		self.store.remove_channel_account(address).await
	}
}

/// `distribution-db-vault`: secret decrypted from the dedicated vault
/// table, keyed separately from `channel_accounts` since distribution
/// accounts are not channel accounts.
pub struct DistributionDbVaultStrategy {
	store: Arc<SubmitterStore>,
	encrypter: Arc<dyn SecretEncrypter>,
}

impl DistributionDbVaultStrategy {
	pub fn new(store: Arc<SubmitterStore>, encrypter: Arc<dyn SecretEncrypter>) -> Self {
		Self { store, encrypter }
	}
}

#[async_trait]
impl SigningStrategy for DistributionDbVaultStrategy {
	async fn sign(&self, address: &str, digest: &[u8]) -> Result<Signature, CoreError> {
		let encrypted = self
			.store
			.get_vault_secret(address)
			.await?
			.ok_or_else(|| CoreError::validation(format!("no vault secret stored for {address}")))?;
		let seed = self.encrypter.decrypt(&encrypted)?;
		let signing_key = decode_seed(&seed)?;
		Ok(signing_key.sign(digest))
	}

	async fn batch_insert(&self, n: u32) -> Result<Vec<NewAccount>, CoreError> {
		let mut accounts = Vec::with_capacity(n as usize);
		for _ in 0..n {
			let key = generate_keypair();
			let address = address_for(&key);
			let encrypted = self.encrypter.encrypt(&hex::encode(key.to_bytes()))?;
			self.store.put_vault_secret(&address, &encrypted).await?;
			accounts.push(NewAccount { address, encrypted_secret: Some(encrypted) });
		}
		Ok(accounts)
	}

	async fn delete(&self, _address: &str) -> Result<(), CoreError> {
		// Vault rows for distribution accounts outlive any single pool
		// operation; there's nothing analogous to channel-account
		// removal to trigger this from yet.
		Err(CoreError::validation("distribution-db-vault accounts are not deleted through the signer router"))
	}
}

/// `distribution-custodial-vault`: no ledger signature is ever produced;
/// signing is delegated to the custodial provider's own API out of band.
pub struct DistributionCustodialVaultStrategy;

#[async_trait]
impl SigningStrategy for DistributionCustodialVaultStrategy {
	async fn sign(&self, address: &str, _digest: &[u8]) -> Result<Signature, CoreError> {
		Err(CoreError::validation(format!(
			"account {address} is custodial-vault backed: signing is delegated to the custodial provider, not performed locally"
		)))
	}

	async fn batch_insert(&self, _n: u32) -> Result<Vec<NewAccount>, CoreError> {
		Err(CoreError::validation("custodial-vault accounts are provisioned by the custodial provider, not the signer router"))
	}

	async fn delete(&self, _address: &str) -> Result<(), CoreError> {
		Err(CoreError::validation("custodial-vault accounts are retired by the custodial provider, not the signer router"))
	}
}

/// Decodes a decrypted hex seed into a signing key. Diagnostic messages
/// embed only `redact_secret(seed_hex)` — never the full value — so a
/// malformed-seed alert never carries enough of the secret to replay it.
fn decode_seed(seed_hex: &str) -> Result<SigningKey, CoreError> {
	let redacted = redact_secret(seed_hex);
	let bytes = hex::decode(seed_hex.trim())
		.map_err(|error| CoreError::invariant(format!("stored seed '{redacted}' is not valid hex: {error}")))?;
	let array: [u8; 32] =
		bytes.try_into().map_err(|_| CoreError::invariant(format!("stored seed '{redacted}' is not 32 bytes")))?;
	Ok(SigningKey::from_bytes(&array))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn env_strategy_returns_in_memory_addresses_from_batch_insert_but_refuses_delete() {
		let strategy = EnvStrategy::new(HashMap::new());
		let accounts = strategy.batch_insert(3).await.unwrap();
		assert_eq!(accounts.len(), 3);
		assert!(accounts.iter().all(|account| account.encrypted_secret.is_none()));
		assert!(strategy.delete("G...").await.is_err());
	}

	#[tokio::test]
	async fn env_strategy_signs_with_the_configured_key() {
		let key = generate_keypair();
		let address = address_for(&key);
		let strategy = EnvStrategy::new(HashMap::from([(address.clone(), key)]));
		assert!(strategy.sign(&address, b"digest").await.is_ok());
		assert!(strategy.sign("unknown-address", b"digest").await.is_err());
	}

	#[test]
	fn decode_seed_error_embeds_only_the_redacted_prefix() {
		let secret_looking_garbage = "SUPERSECRETNOTHEX";
		let error = decode_seed(secret_looking_garbage).unwrap_err().to_string();
		assert!(error.contains("SUP***"));
		assert!(!error.contains(secret_looking_garbage));
	}

	#[tokio::test]
	async fn custodial_vault_strategy_never_signs_locally() {
		let strategy = DistributionCustodialVaultStrategy;
		assert!(strategy.sign("G...", b"digest").await.is_err());
	}
}
