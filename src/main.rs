//! Gatehouse server
//!
//! Classifies requests into bot trust tiers and applies tier-dependent
//! rate limits before they reach the application routes.

use anyhow::Result;
use axum::extract::State;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gatehouse::middleware::{gate_middleware, security_headers_middleware};
use gatehouse::{Gate, GateStats, GatehouseConfig, GatehouseError};

#[derive(Parser, Debug)]
#[command(name = "gatehouse")]
#[command(author, version, about = "Request classification and adaptive rate limiting")]
struct Args {
    /// Path to configuration file (JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(json: bool, level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gatehouse",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn index() -> &'static str {
    "gatehouse"
}

async fn stats(State(gate): State<Arc<Gate>>) -> Json<GateStats> {
    Json(gate.stats().await)
}

fn router(gate: Arc<Gate>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(index))
        .route("/stats", get(stats))
        .layer(from_fn_with_state(gate.clone(), gate_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(gate)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, &args.log_level);

    let mut config = if let Some(config_path) = &args.config {
        GatehouseConfig::load(config_path)?
    } else {
        GatehouseConfig::default()
    };
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }

    let bind_addr = config.server.bind_addr.clone();
    let gate = Arc::new(Gate::new(config)?);

    info!(
        addr = %bind_addr,
        site = %gate.config().site_name,
        distributed_limiting = !gate.config().rate_limit.kv.api_token.is_empty(),
        "Starting gatehouse"
    );

    let app = router(gate);

    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|_| GatehouseError::BindAddr(bind_addr.clone()))?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
