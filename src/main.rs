//! runway service binary.
//!
//! # Startup
//!
//! ```text
//!   load config (file + RUNWAY_* env) ──▶ logging ──▶ feature provider
//!                                                         │
//!        ┌────────────────────────────────────────────────┘
//!        ▼
//!   telemetry setup (traces → metrics → logs)
//!        │
//!        ▼
//!   Runner: register routes ──▶ serve ──▶ signal / failure ──▶ timed shutdown
//!        │
//!        ▼
//!   telemetry teardown (logs → metrics → traces), bounded by server.shutdown_timeout
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Extension, Json};
use clap::Parser;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use runway::config::keys::SERVER_SHUTDOWN_TIMEOUT;
use runway::config::{load_config, Config, DEFAULT_ENV_PREFIX};
use runway::error::BoxError;
use runway::features::{select_provider, EvaluationContext, FeatureProvider};
use runway::http::{register_bundles, ClientIp, RouteRegistry};
use runway::lifecycle::Runner;
use runway::observability::init_logging;
use runway::telemetry::{self, LogBridge};

const FALLBACK_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "runway")]
#[command(about = "HTTP service with ordered startup and bounded shutdown", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prefix of environment variables that override configuration
    #[arg(long, default_value = DEFAULT_ENV_PREFIX)]
    env_prefix: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is not up yet, so configuration errors go to stderr.
    let config = match load_config(cli.config.as_deref(), &cli.env_prefix) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("runway: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let bridge = LogBridge::new();
    if let Err(e) = init_logging(&config, bridge.clone()) {
        eprintln!("runway: {}", e);
        return ExitCode::FAILURE;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), keys = config.len(), "runway starting");

    match run(config, bridge).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "runway exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, bridge: LogBridge) -> Result<(), BoxError> {
    let features = select_provider(&config)?;

    let root = CancellationToken::new();
    let mut telemetry = telemetry::setup(&root, &config, bridge).await?;

    let result = Runner::new(config.clone())
        .with_features(features)
        .with_telemetry(telemetry.handles.clone())
        .run(root, |config: &Config, routes: &mut RouteRegistry| {
            register_bundles(config, routes, &[&demo_routes])
        })
        .await;

    // Telemetry outlives the listener so shutdown logs still get exported.
    let budget = config
        .duration_secs(&SERVER_SHUTDOWN_TIMEOUT)
        .unwrap_or(FALLBACK_TEARDOWN_TIMEOUT);
    let teardown = telemetry.teardown.run_within(budget).await;

    result?;
    teardown?;
    Ok(())
}

fn demo_routes(_config: &Config, routes: &mut RouteRegistry) -> Result<(), BoxError> {
    routes.route("/hello", get(hello))?;
    routes.route("/health", get(health))?;
    Ok(())
}

async fn hello(
    Extension(features): Extension<Arc<dyn FeatureProvider>>,
    Extension(client): Extension<ClientIp>,
) -> String {
    let ctx = EvaluationContext::new(client.display());
    features.string_value("hello-greeting", "Hello, World!", &ctx).await
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
