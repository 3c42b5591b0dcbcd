//! Process entrypoint: parses CLI options, loads [`disb_engine::settings::Settings`],
//! builds the wired [`disb_engine::App`], and runs it until a shutdown
//! signal arrives.

use clap::Parser;
use disb_engine::health::Readiness;
use disb_engine::logging::LogFormat;
use disb_engine::settings::Settings;
use disb_engine::{app, logging, metrics};
use disb_utilities::TaskScope;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "disb-engine", about = "Disbursement core: submitter, dispatcher, event consumer, and reconciler")]
struct Cli {
	/// Path to a config file merged under `DISB_`-prefixed environment
	/// variables; missing files fall back to environment-only settings.
	#[arg(long, env = "DISB_CONFIG_PATH", default_value = "config/default.toml")]
	config: String,

	/// Log output shape: `json` for production, `pretty` for a terminal.
	#[arg(long, env = "DISB_LOG_FORMAT", default_value = "json")]
	log_format: String,
}

fn parse_log_format(raw: &str) -> LogFormat {
	match raw {
		"pretty" => LogFormat::Pretty,
		_ => LogFormat::Json,
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	logging::init(parse_log_format(&cli.log_format));
	metrics::register_metrics();

	let settings = Settings::from_file(&cli.config)?;
	let shutdown_grace = settings.shutdown_grace();

	let app = app::App::build(settings).await?;
	let mut scope = TaskScope::new();
	let readiness = Readiness::new();

	let cancellation = scope.cancellation_token();
	scope.spawn(async move {
		wait_for_shutdown_signal().await;
		info!("shutdown signal received");
		cancellation.cancel();
		Ok(())
	});

	let result = app.run(&mut scope, readiness).await;
	if let Err(error) = &result {
		error!(%error, "engine exited with an error");
	}

	scope.shutdown(shutdown_grace).await;
	result
}

async fn wait_for_shutdown_signal() {
	let ctrl_c = async {
		let _ = tokio::signal::ctrl_c().await;
	};

	#[cfg(unix)]
	let terminate = async {
		let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install SIGTERM handler");
		signal.recv().await;
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}
