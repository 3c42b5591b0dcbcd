//! The ledger height cache (C1). Many workers call `current_ledger`
//! concurrently; the write-lock acquisition below is the single-flight
//! point — a caller that loses the race to refresh simply reads the
//! value the winner just stored instead of issuing its own fetch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use disb_common::CoreError;
use tokio::sync::RwLock;

use crate::client::LedgerClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerBounds {
	pub min_ledger: u64,
	pub max_ledger: u64,
}

pub struct LedgerTracker {
	client: Arc<dyn LedgerClient>,
	max_age: Duration,
	lookahead: u64,
	cached: RwLock<Option<(u64, Instant)>>,
}

impl LedgerTracker {
	pub fn new(client: Arc<dyn LedgerClient>, max_age: Duration, lookahead: u64) -> Self {
		Self { client, max_age, lookahead, cached: RwLock::new(None) }
	}

	pub fn with_defaults(client: Arc<dyn LedgerClient>) -> Self {
		Self::new(client, Duration::from_secs(6), 10)
	}

	/// Returns the cached height if its age is below `max_age`; otherwise
	/// fetches from the ledger node and updates the cache.
	pub async fn current_ledger(&self) -> Result<u64, CoreError> {
		if let Some(height) = self.fresh_cached_height().await {
			return Ok(height);
		}

		let mut cache = self.cached.write().await;
		if let Some((height, fetched_at)) = *cache {
			if fetched_at.elapsed() < self.max_age {
				return Ok(height);
			}
		}

		let height = self
			.client
			.root()
			.await
			.map_err(|error| CoreError::transient("fetching current ledger height", error))?;
		*cache = Some((height, Instant::now()));
		Ok(height)
	}

	async fn fresh_cached_height(&self) -> Option<u64> {
		let cache = self.cached.read().await;
		cache.and_then(|(height, fetched_at)| (fetched_at.elapsed() < self.max_age).then_some(height))
	}

	pub async fn ledger_bounds(&self) -> Result<LedgerBounds, CoreError> {
		let current = self.current_ledger().await?;
		Ok(LedgerBounds { min_ledger: current, max_ledger: current + self.lookahead })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::client::AccountDetail;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct CountingClient {
		calls: AtomicU32,
		height: u64,
	}

	#[async_trait]
	impl LedgerClient for CountingClient {
		async fn root(&self) -> anyhow::Result<u64> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(self.height)
		}

		async fn account_detail(&self, _address: &str) -> anyhow::Result<AccountDetail> {
			unimplemented!("not exercised by tracker tests")
		}

		async fn submit_transaction(
			&self,
			_envelope_xdr: &str,
		) -> Result<crate::client::SubmitOutcome, crate::client::LedgerSubmitError> {
			unimplemented!("not exercised by tracker tests")
		}
	}

	#[tokio::test]
	async fn repeated_calls_within_max_age_hit_the_cache_once() {
		let client = Arc::new(CountingClient { calls: AtomicU32::new(0), height: 100 });
		let counter = client.clone();
		let tracker = LedgerTracker::new(client as Arc<dyn LedgerClient>, Duration::from_secs(60), 10);

		for _ in 0..5 {
			assert_eq!(tracker.current_ledger().await.unwrap(), 100);
		}
		assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn ledger_bounds_adds_the_lookahead() {
		let client: Arc<dyn LedgerClient> = Arc::new(CountingClient { calls: AtomicU32::new(0), height: 50 });
		let tracker = LedgerTracker::new(client, Duration::from_secs(60), 10);

		let bounds = tracker.ledger_bounds().await.unwrap();
		assert_eq!(bounds.min_ledger, 50);
		assert_eq!(bounds.max_ledger, 60);
	}

	#[tokio::test]
	async fn a_root_fetch_failure_surfaces_as_a_transient_core_error() {
		use crate::client::MockLedgerClient;

		let mut mock = MockLedgerClient::new();
		mock.expect_root().times(1).returning(|| Err(anyhow::anyhow!("ledger node unreachable")));
		let tracker = LedgerTracker::new(Arc::new(mock), Duration::from_secs(60), 10);

		let error = tracker.current_ledger().await.unwrap_err();
		assert!(matches!(error, CoreError::TransientProviderError { .. }));
	}
}
