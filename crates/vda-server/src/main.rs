// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vda_server::config::Config;
use vda_server::{build_router, AppState};
use vda_store::Store;

#[derive(Parser, Debug)]
#[command(name = "vda-server", version, about = "Violet deterministic API server")]
struct ServerCliArgs {
    #[arg(long, default_value_t = false)]
    print_effective_config: bool,
    #[arg(long, default_value_t = false)]
    validate_config: bool,
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("VDA_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(err) => {
                error!(%err, "failed to register SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(sig) => sig,
            Err(err) => {
                error!(%err, "failed to register SIGINT handler");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "failed to register ctrl-c handler");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = ServerCliArgs::parse();
    init_tracing();

    let cfg = Config::load();
    if cli.validate_config {
        info!("configuration validated");
        return Ok(());
    }
    if cli.print_effective_config {
        println!(
            "{}",
            serde_json::to_string_pretty(&cfg.redacted())
                .map_err(|err| format!("render effective config: {err}"))?
        );
        return Ok(());
    }

    let store = Arc::new(
        Store::open(
            &cfg.database_url,
            cfg.idempotency_ttl_seconds,
            cfg.idempotency_cleanup_seconds,
        )
        .map_err(|err| format!("store open failed: {err}"))?,
    );
    let cleanup = store.spawn_idempotency_cleanup();

    let port = cfg.port.clone();
    let state = AppState::build(cfg, store);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|err| format!("bind {addr} failed: {err}"))?;
    info!("{} listening on :{port}", vda_server::SERVICE_NAME);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|err| format!("server failed: {err}"));

    // The cleanup loop dies with the process; stop it explicitly so
    // shutdown is quiet.
    cleanup.abort();
    result
}
