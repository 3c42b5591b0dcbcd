use std::collections::HashMap;
use std::sync::Arc;

use disb_common::{AccountType, CoreError};
use ed25519_dalek::Signature;

use crate::strategy::{NewAccount, SigningStrategy};

/// Maps `AccountType` to the strategy registered for it at startup.
/// Strategies are only registered for the account types the operator
/// actually configured secrets for.
pub struct SignerRouter {
	strategies: HashMap<AccountType, Arc<dyn SigningStrategy>>,
}

impl SignerRouter {
	pub fn new() -> Self {
		Self { strategies: HashMap::new() }
	}

	pub fn register(&mut self, account_type: AccountType, strategy: Arc<dyn SigningStrategy>) {
		self.strategies.insert(account_type, strategy);
	}

	fn strategy_for(&self, account_type: AccountType) -> Result<&Arc<dyn SigningStrategy>, CoreError> {
		self.strategies
			.get(&account_type)
			.ok_or_else(|| CoreError::validation(format!("no signing strategy registered for {account_type:?}")))
	}

	/// Signs `digest` over every `(account_type, address)` pair in order.
	/// Partial failure is fatal: if any account fails to sign, no
	/// signatures are returned at all, so a caller never builds a
	/// transaction with a subset of the required signers.
	pub async fn sign_transaction(
		&self,
		accounts: &[(AccountType, String)],
		digest: &[u8],
	) -> Result<Vec<Signature>, CoreError> {
		let mut signatures = Vec::with_capacity(accounts.len());
		for (account_type, address) in accounts {
			let strategy = self.strategy_for(*account_type)?;
			signatures.push(strategy.sign(address, digest).await?);
		}
		Ok(signatures)
	}

	/// Signs a fee-bump transaction, which carries exactly one signer.
	pub async fn sign_fee_bump(
		&self,
		account_type: AccountType,
		address: &str,
		digest: &[u8],
	) -> Result<Signature, CoreError> {
		self.strategy_for(account_type)?.sign(address, digest).await
	}

	pub async fn batch_insert(&self, account_type: AccountType, n: u32) -> Result<Vec<NewAccount>, CoreError> {
		self.strategy_for(account_type)?.batch_insert(n).await
	}

	pub async fn delete(&self, account_type: AccountType, address: &str) -> Result<(), CoreError> {
		self.strategy_for(account_type)?.delete(address).await
	}
}

impl Default for SignerRouter {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;

	struct AlwaysFails;

	#[async_trait]
	impl SigningStrategy for AlwaysFails {
		async fn sign(&self, _address: &str, _digest: &[u8]) -> Result<Signature, CoreError> {
			Err(CoreError::validation("simulated signature failure"))
		}

		async fn batch_insert(&self, _n: u32) -> Result<Vec<NewAccount>, CoreError> {
			unimplemented!()
		}

		async fn delete(&self, _address: &str) -> Result<(), CoreError> {
			unimplemented!()
		}
	}

	#[tokio::test]
	async fn missing_strategy_is_a_validation_error() {
		let router = SignerRouter::new();
		let result = router.sign_transaction(&[(AccountType::HostEnv, "G1".into())], b"digest").await;
		assert!(result.is_err());
	}

	#[tokio::test]
	async fn one_failing_account_aborts_the_whole_call() {
		let mut router = SignerRouter::new();
		router.register(AccountType::HostEnv, Arc::new(AlwaysFails));
		let result = router
			.sign_transaction(&[(AccountType::HostEnv, "G1".into()), (AccountType::ChannelDb, "G2".into())], b"digest")
			.await;
		assert!(result.is_err());
	}
}
