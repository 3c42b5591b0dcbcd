//! A cancellation-aware spawn registry: one cancellation token threaded
//! through every task spawned from a scope, so a single `cancel()` call
//! reaches every suspension point (network call, database operation,
//! explicit delay) that was built to observe it.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Tracks every task spawned from it and the single cancellation token
/// that should flow through every network call, database operation, and
/// explicit delay.
pub struct TaskScope {
	token: CancellationToken,
	tasks: JoinSet<anyhow::Result<()>>,
}

impl TaskScope {
	pub fn new() -> Self {
		Self { token: CancellationToken::new(), tasks: JoinSet::new() }
	}

	pub fn cancellation_token(&self) -> CancellationToken {
		self.token.clone()
	}

	/// Spawns a future onto the scope. A task that returns `Err` is
	/// treated as fatal to the scope by callers of `wait`.
	pub fn spawn<F>(&mut self, fut: F)
	where
		F: Future<Output = anyhow::Result<()>> + Send + 'static,
	{
		self.tasks.spawn(fut);
	}

	/// Requests cancellation; every suspension point registered against
	/// `cancellation_token()` observes this on its next poll.
	pub fn cancel(&self) {
		self.token.cancel();
	}

	/// Cancels the scope and waits up to `grace` for tasks to finish
	/// cooperatively; anything still running past `grace` is abandoned.
	pub async fn shutdown(mut self, grace: Duration) {
		self.cancel();
		let _ = tokio::time::timeout(grace, async {
			while let Some(result) = self.tasks.join_next().await {
				if let Ok(Err(error)) = result {
					tracing::error!(%error, "task exited with an error during shutdown");
				}
			}
		})
		.await;
	}

	/// Runs until the cancellation token fires or any spawned task
	/// returns, whichever happens first, surfacing the first task error
	/// (if any).
	pub async fn run_until_cancelled(&mut self) -> anyhow::Result<()> {
		loop {
			tokio::select! {
				_ = self.token.cancelled() => return Ok(()),
				Some(result) = self.tasks.join_next(), if !self.tasks.is_empty() => {
					match result {
						Ok(Ok(())) => continue,
						Ok(Err(error)) => {
							self.cancel();
							return Err(error);
						},
						Err(join_error) => {
							self.cancel();
							return Err(anyhow::anyhow!(join_error));
						},
					}
				},
				else => return Ok(()),
			}
		}
	}
}

impl Default for TaskScope {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicBool, Ordering};
	use std::sync::Arc;

	#[tokio::test]
	async fn cancellation_token_propagates_to_spawned_tasks() {
		let mut scope = TaskScope::new();
		let observed = Arc::new(AtomicBool::new(false));
		let token = scope.cancellation_token();
		let observed_clone = observed.clone();
		scope.spawn(async move {
			token.cancelled().await;
			observed_clone.store(true, Ordering::SeqCst);
			Ok(())
		});

		scope.cancel();
		scope.shutdown(Duration::from_secs(1)).await;
		assert!(observed.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn a_failing_task_is_surfaced_by_run_until_cancelled() {
		let mut scope = TaskScope::new();
		scope.spawn(async { Err(anyhow::anyhow!("boom")) });
		let result = scope.run_until_cancelled().await;
		assert!(result.is_err());
	}
}
