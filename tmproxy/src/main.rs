mod config;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use forwarder::errors::ForwarderError;
use metrics_exporter_statsd::StatsdBuilder;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const METRICS_PREFIX: &str = "tmproxy";

#[derive(Parser)]
#[command(version, about = "Credential-shielding proxy for the ARC and IRRMS telemetry services")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the forwarding and admin listeners
    Run {
        #[arg(long)]
        config_path: Option<PathBuf>,
    },
    /// Load and validate the configuration, then exit
    CheckConfig {
        #[arg(long)]
        config_path: Option<PathBuf>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Forwarder(#[from] ForwarderError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::Run { config_path } => run(config_path),
        CliCommand::CheckConfig { config_path } => {
            Config::load(config_path.as_deref(), std::env::vars())
                .map(|_| println!("config ok"))
                .map_err(CliError::from)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "tmproxy exited");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config_path: Option<PathBuf>) -> Result<(), CliError> {
    let config = Config::load(config_path.as_deref(), std::env::vars())?;

    let logging = config.common.logging.unwrap_or_default();
    let _sentry = init_logging(&logging);

    if let Some(metrics) = &config.common.metrics {
        init_metrics(metrics)?;
    }

    tracing::info!(
        listener = %format!("{}:{}", config.forwarder.listener.host, config.forwarder.listener.port),
        admin = %format!("{}:{}", config.forwarder.admin_listener.host, config.forwarder.admin_listener.port),
        "starting tmproxy"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(forwarder::run(config.forwarder))?;

    Ok(())
}

/// Returns the Sentry guard, which must outlive the process' work.
fn init_logging(logging: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let level = logging.level.as_deref().unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let guard = logging.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    guard
}

fn init_metrics(metrics: &MetricsConfig) -> Result<(), CliError> {
    let recorder = StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some(METRICS_PREFIX))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(forwarder::metrics_defs::ALL_METRICS);
    Ok(())
}
