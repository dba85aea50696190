//! distfiles -- checksum-verified upload server.
//!
//! Crash-only design: a commit is a sequence of fsync'd renames, so there
//! is no recovery step at startup.  SIGTERM/SIGINT handlers only stop
//! accepting connections and wait for in-flight requests, with a timeout.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the distfiles server.
#[derive(Parser, Debug)]
#[command(
    name = "distfiles",
    version,
    about = "Checksum-verified upload server for versioned distribution files"
)]
struct Cli {
    /// Path to the YAML configuration file (falls back to $DISTFILES_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Read before any worker touches the filesystem.
    distfiles::storage::process_umask();

    let cli = Cli::parse();
    let config = distfiles::config::load(cli.config.as_deref())?;

    init_tracing(&config.logging);

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);

    if config.observability.metrics {
        distfiles::metrics::init_metrics()?;
        distfiles::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let state = distfiles::AppState::new(config)?;
    if state.tokens.is_empty() {
        warn!("No upload tokens configured; every upload will be rejected");
    }
    info!(
        "Distfiles tree at {} (file mode {:03o}, {} token(s))",
        state.store.basedir().display(),
        state.store.file_mode(),
        state.tokens.len()
    );

    let app = distfiles::server::app(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("distfiles listening on {}", bind_addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::select! {
        result = server => result?,
        _ = async {
            // Only reached after a shutdown signal; bounds the drain.
            shutdown_requested().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("Shutdown timeout of {:?} elapsed, exiting", shutdown_timeout);
        }
    }

    info!("distfiles shut down");
    Ok(())
}

fn init_tracing(logging: &distfiles::config::LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    shutdown_requested().await;
    info!("Shutdown signal received, draining connections");
}

async fn shutdown_requested() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
