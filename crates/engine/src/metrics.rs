//! Prometheus metrics server, directly grounded on the teacher's
//! `engine/src/metrics.rs`: a `lazy_static` registry, a `warp` endpoint
//! serving the text-encoded scrape, bound to the configured address and
//! spawned onto a scope.

use std::net::IpAddr;

use disb_utilities::task_scope::TaskScope;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::info;
use warp::Filter;

lazy_static::lazy_static! {
	static ref REGISTRY: Registry = Registry::new();

	pub static ref SUBMITTER_ATTEMPTS: IntCounterVec = IntCounterVec::new(
		Opts::new("submitter_attempts_total", "Count of submitter transaction attempts by outcome"),
		&["outcome"],
	).expect("metric is well formed");

	pub static ref DISPATCH_OUTCOMES: IntCounterVec = IntCounterVec::new(
		Opts::new("dispatch_outcomes_total", "Count of payment dispatch outcomes"),
		&["outcome"],
	).expect("metric is well formed");

	pub static ref HANDLER_FAILURES: IntCounterVec = IntCounterVec::new(
		Opts::new("event_handler_failures_total", "Count of event handler failures by topic"),
		&["topic"],
	).expect("metric is well formed");

	pub static ref RECONCILER_ERRORS: IntCounterVec = IntCounterVec::new(
		Opts::new("reconciler_errors_total", "Count of custodial reconciler sync errors"),
		&["reason"],
	).expect("metric is well formed");

	pub static ref CHANNEL_POOL_LEASED: IntGauge = IntGauge::new(
		"channel_pool_leased_accounts", "Number of channel accounts currently leased",
	).expect("metric is well formed");
}

pub fn register_metrics() {
	REGISTRY.register(Box::new(SUBMITTER_ATTEMPTS.clone())).expect("metric registers once");
	REGISTRY.register(Box::new(DISPATCH_OUTCOMES.clone())).expect("metric registers once");
	REGISTRY.register(Box::new(HANDLER_FAILURES.clone())).expect("metric registers once");
	REGISTRY.register(Box::new(RECONCILER_ERRORS.clone())).expect("metric registers once");
	REGISTRY.register(Box::new(CHANNEL_POOL_LEASED.clone())).expect("metric registers once");
}

#[tracing::instrument(name = "metrics", skip_all)]
pub async fn start(scope: &mut TaskScope, hostname: String, port: u16) -> anyhow::Result<()> {
	info!("starting metrics server");
	const PATH: &str = "metrics";

	let future = warp::serve(
		warp::any()
			.and(warp::path(PATH))
			.and(warp::path::end())
			.map(metrics_handler),
	)
	.bind((hostname.parse::<IpAddr>()?, port));

	scope.spawn(async move {
		future.await;
		Ok(())
	});

	Ok(())
}

fn metrics_handler() -> String {
	let encoder = TextEncoder::new();
	let mut buffer = Vec::new();
	if let Err(error) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
		eprintln!("could not encode metrics: {error}");
	}
	String::from_utf8(buffer).unwrap_or_default()
}
