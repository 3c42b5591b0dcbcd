//! Builds every component from [`crate::settings::Settings`] and spawns
//! the long-running loops (submitter workers, dispatcher sweep, event
//! consumers, reconciler) onto one [`TaskScope`], mirroring the way the
//! teacher's `main.rs` wires its eth/state-chain observers onto one
//! `tokio::join!`.

use std::sync::Arc;
use std::time::Duration;

use disb_channel_pool::{ChannelAccountPool, PoolConfig};
use disb_common::{AccountType, CoreError};
use disb_custodial::{CustodialReconciler, ReconcilerConfig, ReqwestCustodialClient};
use disb_dispatcher::{DispatcherConfig, PaymentDispatcher};
use disb_events::{EventBus, Handler, InProcessEventBus, Message};
use disb_ledger::{LedgerTracker, ReqwestLedgerClient};
use disb_signer::{
	AesGcmEncrypter, ChannelDbStrategy, DistributionCustodialVaultStrategy, DistributionDbVaultStrategy,
	DistributionEnvStrategy, HostEnvStrategy, SignerRouter,
};
use disb_store::{ApplicationStore, SubmitterStore};
use disb_submitter::{SubmitterEngine, SubmitterEngineConfig, PAYMENT_COMPLETED_TOPIC, SUBMITTER_DLQ_TOPIC};
use disb_utilities::{Backoff, TaskScope};
use ed25519_dalek::SigningKey;
use tracing::{error, info, warn};

use crate::health::Readiness;
use crate::metrics;
use crate::settings::Settings;

/// Every component needed to run the disbursement core, already wired to
/// each other. Owns nothing the caller needs back except through the
/// stores/clients it hands to [`Self::run`].
pub struct App {
	settings: Settings,
	application_store: Arc<ApplicationStore>,
	submitter_store: Arc<SubmitterStore>,
	ledger_tracker: Arc<LedgerTracker>,
	channel_pool: Arc<ChannelAccountPool>,
	submitter_engine: Arc<SubmitterEngine>,
	dispatcher: Arc<PaymentDispatcher>,
	reconciler: Arc<CustodialReconciler>,
	event_bus: Arc<dyn EventBus>,
}

fn decode_seed(hex_seed: &str) -> anyhow::Result<SigningKey> {
	let bytes = hex::decode(hex_seed.trim())?;
	let array: [u8; 32] = bytes.try_into().map_err(|_| anyhow::anyhow!("seed must be 32 bytes"))?;
	Ok(SigningKey::from_bytes(&array))
}

fn parse_distribution_account_type(raw: &str) -> anyhow::Result<AccountType> {
	match raw {
		"distribution-env" => Ok(AccountType::DistributionEnv),
		"distribution-db-vault" => Ok(AccountType::DistributionDbVault),
		"distribution-custodial-vault" => Ok(AccountType::DistributionCustodialVault),
		other => Err(anyhow::anyhow!("unrecognized distribution account type {other:?}")),
	}
}

/// Logs a payment-completed notification; stands in for the downstream
/// consumers (messenger receipts, analytics) that are external to this
/// core per spec.md's scope, while still exercising C6's per-handler
/// idempotency contract against the real topic C4 publishes to.
struct PaymentCompletedLogger;

#[async_trait::async_trait]
impl Handler for PaymentCompletedLogger {
	fn id(&self) -> &str {
		"payment-completed-logger"
	}

	async fn handle(&self, message: &Message) -> anyhow::Result<()> {
		info!(payload = %message.payload, "payment completed");
		Ok(())
	}
}

/// Logs a submitter dead-letter notification and bumps the DLQ metric;
/// a real deployment would also page an operator here.
struct SubmitterDlqLogger;

#[async_trait::async_trait]
impl Handler for SubmitterDlqLogger {
	fn id(&self) -> &str {
		"submitter-dlq-logger"
	}

	async fn handle(&self, message: &Message) -> anyhow::Result<()> {
		let reason = message.payload["external_id"].as_str().unwrap_or("unknown");
		metrics::RECONCILER_ERRORS.with_label_values(&["submitter-dead-letter"]).inc();
		warn!(external_id = reason, "submitter transaction moved to the dead letter topic");
		Ok(())
	}
}

impl App {
	pub async fn build(settings: Settings) -> anyhow::Result<Self> {
		let application_store =
			Arc::new(ApplicationStore::connect(&settings.stores.application_database_url, 10).await?);
		let submitter_store = Arc::new(SubmitterStore::connect(&settings.stores.submitter_database_url, 10).await?);

		let http = reqwest::Client::new();
		let ledger_client: Arc<dyn disb_ledger::LedgerClient> =
			Arc::new(ReqwestLedgerClient::new(http.clone(), settings.ledger.node_url.clone()));
		let ledger_tracker = Arc::new(LedgerTracker::new(
			ledger_client.clone(),
			Duration::from_secs(settings.ledger.max_age_secs),
			settings.ledger.lookahead,
		));

		let distribution_account_type = parse_distribution_account_type(&settings.signer.distribution_account_type)?;
		let signer = Arc::new(Self::build_signer_router(&settings, submitter_store.clone(), distribution_account_type)?);

		let channel_pool = Arc::new(ChannelAccountPool::new(
			submitter_store.clone(),
			ledger_tracker.clone(),
			ledger_client.clone(),
			signer.clone(),
			PoolConfig {
				host_address: settings.ledger.host_address.clone(),
				network_passphrase: settings.ledger.network_passphrase.clone(),
				starting_balance: settings.pool.starting_balance.clone(),
				lease_window: settings.pool.lease_window,
				lease_wait: settings.lease_wait(),
				max_bootstrap_attempts: settings.pool.max_bootstrap_attempts,
			},
		));

		let event_bus: Arc<dyn EventBus> = Arc::new(InProcessEventBus::new());

		let submitter_engine = Arc::new(SubmitterEngine::new(
			submitter_store.clone(),
			application_store.clone(),
			channel_pool.clone(),
			ledger_tracker.clone(),
			ledger_client.clone(),
			signer.clone(),
			event_bus.clone(),
			SubmitterEngineConfig {
				network_passphrase: settings.ledger.network_passphrase.clone(),
				host_address: settings.ledger.host_address.clone(),
				distribution_account: settings.ledger.distribution_address.clone(),
				distribution_account_type,
				base_fee: settings.submitter.base_fee,
				max_base_fee: settings.submitter.max_base_fee,
				max_attempts: settings.submitter.max_attempts,
				backoff: Backoff::new(
					Duration::from_secs(settings.submitter.backoff_initial_secs),
					Duration::from_secs(settings.submitter.backoff_max_secs),
				),
			},
		));

		let custodial_client: Arc<dyn disb_custodial::CustodialClient> = Arc::new(ReqwestCustodialClient::new(
			http,
			settings.custodial.base_url.clone(),
			settings.custodial.api_key.clone(),
		));

		let dispatcher = Arc::new(PaymentDispatcher::new(
			application_store.clone(),
			submitter_store.clone(),
			custodial_client.clone(),
			DispatcherConfig { batch_limit: settings.dispatcher.batch_limit },
		));

		let reconciler = Arc::new(CustodialReconciler::new(
			application_store.clone(),
			custodial_client,
			ReconcilerConfig { batch_limit: settings.reconciler.batch_limit },
		));

		Ok(Self {
			settings,
			application_store,
			submitter_store,
			ledger_tracker,
			channel_pool,
			submitter_engine,
			dispatcher,
			reconciler,
			event_bus,
		})
	}

	fn build_signer_router(
		settings: &Settings,
		submitter_store: Arc<SubmitterStore>,
		distribution_account_type: AccountType,
	) -> anyhow::Result<SignerRouter> {
		let mut router = SignerRouter::new();

		let host_key = decode_seed(&settings.signer.host_seed_hex)?;
		let host_address = settings.ledger.host_address.clone();
		router.register(AccountType::HostEnv, Arc::new(HostEnvStrategy::new(std::collections::HashMap::from([(host_address, host_key)]))));

		let encrypter = Arc::new(AesGcmEncrypter::new(&settings.vault.passphrase));
		router.register(AccountType::ChannelDb, Arc::new(ChannelDbStrategy::new(submitter_store.clone(), encrypter.clone())));

		match distribution_account_type {
			AccountType::DistributionEnv => {
				let seed_hex = settings
					.signer
					.distribution_seed_hex
					.as_deref()
					.ok_or_else(|| anyhow::anyhow!("distribution_account_type is distribution-env but no distribution_seed_hex was configured"))?;
				let key = decode_seed(seed_hex)?;
				let address = settings.ledger.distribution_address.clone();
				router.register(
					AccountType::DistributionEnv,
					Arc::new(DistributionEnvStrategy::new(std::collections::HashMap::from([(address, key)]))),
				);
			}
			AccountType::DistributionDbVault => {
				router.register(
					AccountType::DistributionDbVault,
					Arc::new(DistributionDbVaultStrategy::new(submitter_store, encrypter)),
				);
			}
			AccountType::DistributionCustodialVault => {
				router.register(AccountType::DistributionCustodialVault, Arc::new(DistributionCustodialVaultStrategy));
			}
			AccountType::ChannelDb | AccountType::HostEnv => {
				anyhow::bail!("distribution_account_type must be a distribution-* variant")
			}
		}

		Ok(router)
	}

	/// Spawns every long-running loop onto `scope` and runs until the
	/// scope's cancellation token fires, then drives the configured
	/// shutdown grace period before returning.
	pub async fn run(self, scope: &mut TaskScope, readiness: Readiness) -> anyhow::Result<()> {
		let cancellation = scope.cancellation_token();

		crate::health::start(scope, readiness.clone(), self.settings.health.hostname.clone(), self.settings.health.port)
			.await?;
		crate::metrics::start(scope, self.settings.metrics.hostname.clone(), self.settings.metrics.port).await?;

		self.channel_pool.ensure(self.settings.pool.warm_size).await?;
		readiness.mark_ready();

		self.spawn_submitter_workers(scope, cancellation.clone());
		self.spawn_dispatcher_loop(scope, cancellation.clone());
		self.spawn_reconciler_loop(scope, cancellation.clone());
		self.spawn_event_consumers(scope, cancellation.clone());

		scope.run_until_cancelled().await
	}

	fn spawn_submitter_workers(&self, scope: &mut TaskScope, cancellation: tokio_util::sync::CancellationToken) {
		const WORKER_COUNT: usize = 4;
		for worker_index in 0..WORKER_COUNT {
			let engine = self.submitter_engine.clone();
			let cancellation = cancellation.clone();
			let worker_id = format!("submitter-worker-{worker_index}");
			scope.spawn(async move {
				loop {
					if cancellation.is_cancelled() {
						return Ok(());
					}
					match engine.process_next(&worker_id).await {
						Ok(true) => continue,
						Ok(false) => {}
						Err(error) => error!(%error, worker_id, "submitter worker iteration failed"),
					}
					tokio::select! {
						_ = cancellation.cancelled() => return Ok(()),
						_ = tokio::time::sleep(Duration::from_millis(500)) => {}
					}
				}
			});
		}
	}

	fn spawn_dispatcher_loop(&self, scope: &mut TaskScope, cancellation: tokio_util::sync::CancellationToken) {
		let dispatcher = self.dispatcher.clone();
		let application_store = self.application_store.clone();
		let poll_interval = Duration::from_secs(self.settings.dispatcher.poll_interval_secs);
		scope.spawn(async move {
			loop {
				match application_store.list_active_tenant_ids().await {
					Ok(tenant_ids) => {
						for tenant_id in tenant_ids {
							if let Err(error) = dispatcher.dispatch_ready_batch(tenant_id).await {
								error!(%error, %tenant_id, "periodic dispatcher sweep failed for tenant");
							}
						}
					}
					Err(error) => error!(%error, "failed to list active tenants for dispatcher sweep"),
				}
				tokio::select! {
					_ = cancellation.cancelled() => return Ok(()),
					_ = tokio::time::sleep(poll_interval) => {}
				}
			}
		});
	}

	fn spawn_reconciler_loop(&self, scope: &mut TaskScope, cancellation: tokio_util::sync::CancellationToken) {
		let reconciler = self.reconciler.clone();
		let poll_interval = Duration::from_secs(self.settings.reconciler.poll_interval_secs);
		scope.spawn(async move {
			loop {
				match reconciler.run_once().await {
					Ok(summary) if !summary.errors.is_empty() => {
						warn!(errors = ?summary.errors, "custodial reconciler run completed with errors")
					}
					Ok(_) => {}
					Err(error) => error!(%error, "custodial reconciler run failed"),
				}
				tokio::select! {
					_ = cancellation.cancelled() => return Ok(()),
					_ = tokio::time::sleep(poll_interval) => {}
				}
			}
		});
	}

	fn spawn_event_consumers(&self, scope: &mut TaskScope, cancellation: tokio_util::sync::CancellationToken) {
		let read_backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(self.settings.submitter.backoff_max_secs));
		let handler_backoff = read_backoff;
		let consumer_config = disb_events::ConsumerConfig { read_backoff, handler_backoff };

		let payment_completed = disb_events::EventConsumer::new(
			self.event_bus.clone(),
			PAYMENT_COMPLETED_TOPIC,
			vec![Arc::new(PaymentCompletedLogger) as Arc<dyn Handler>],
			consumer_config,
		);
		let dlq_consumer = disb_events::EventConsumer::new(
			self.event_bus.clone(),
			SUBMITTER_DLQ_TOPIC,
			vec![Arc::new(SubmitterDlqLogger) as Arc<dyn Handler>],
			consumer_config,
		);

		let token = cancellation.clone();
		scope.spawn(async move { payment_completed.run(token).await });
		let token = cancellation;
		scope.spawn(async move { dlq_consumer.run(token).await });
	}
}

/// Surfaces an invariant breach the way §7 prescribes: logged and
/// counted, never auto-corrected.
pub fn report_invariant_violation(context: impl Into<String>) -> CoreError {
	let error = CoreError::invariant(context);
	error!(%error, "internal invariant broken");
	error
}
