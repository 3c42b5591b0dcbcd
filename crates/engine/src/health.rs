//! Liveness endpoint, shaped after the teacher's `metrics.rs` warp
//! binding rather than its slog/raw-TCP `health.rs` (that hand-rolled
//! HTTP parser has no counterpart in a `warp`-based stack).

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use disb_utilities::task_scope::TaskScope;
use tracing::info;
use warp::Filter;

/// Flipped once every subsystem has completed its first successful
/// round; `/health` reports unready until then.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
	pub fn new() -> Self {
		Self(Arc::new(AtomicBool::new(false)))
	}

	pub fn mark_ready(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_ready(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

#[tracing::instrument(name = "health", skip_all)]
pub async fn start(scope: &mut TaskScope, readiness: Readiness, hostname: String, port: u16) -> anyhow::Result<()> {
	info!("starting health server");

	let route = warp::path("health").and(warp::path::end()).map(move || {
		if readiness.is_ready() {
			warp::reply::with_status("ok", warp::http::StatusCode::OK)
		} else {
			warp::reply::with_status("starting", warp::http::StatusCode::SERVICE_UNAVAILABLE)
		}
	});

	let future = warp::serve(route).bind((hostname.parse::<IpAddr>()?, port));

	scope.spawn(async move {
		future.await;
		Ok(())
	});

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn readiness_starts_false() {
		let readiness = Readiness::new();
		assert!(!readiness.is_ready());
		readiness.mark_ready();
		assert!(readiness.is_ready());
	}
}
