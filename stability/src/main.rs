//! stability demo - drives a flaky simulated backend through the decorator stack
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! cargo run
//!
//! # Trip the breaker quickly and watch the decisions
//! STABILITY_FAILURE_THRESHOLD=1 STABILITY_LOG_LEVEL=debug cargo run
//! ```
//!
//! ## Environment Variables
//!
//! - `STABILITY_FAILURE_THRESHOLD`: consecutive failures before fail-fast (default: 3)
//! - `STABILITY_MAX_ATTEMPTS`: retry attempts per call (default: 3)
//! - `STABILITY_MAX_CALLS`: throttle tokens per interval (default: 10)
//! - `STABILITY_DEBOUNCE_WINDOW_MS`: debounce window, 0 disables (default: 0)
//! - `STABILITY_CALL_TIMEOUT_MS`: per-call deadline (default: 500)
//! - `STABILITY_LOG_LEVEL`: log level (default: "info")
//! - `STABILITY_LOG_FORMAT`: "json" or "pretty" (default: "pretty")

use stability::config::{Config, LogFormat};
use stability::metrics::{self, Metrics};
use stability::{CallContext, RemoteOperation, ResilientOperation, SimulatedOperation};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_CALLS: u32 = 30;
const CALL_SPACING: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config);
    Metrics::init()?;

    info!(
        failure_threshold = config.failure_threshold,
        max_attempts = config.max_attempts,
        max_calls = config.max_calls,
        call_timeout_ms = config.call_timeout_ms,
        "Starting stability demo"
    );

    let backend = SimulatedOperation::new("inventory")
        .with_latency(Duration::from_millis(20))
        .failing_every(4);

    let mut builder = ResilientOperation::wrap(backend)
        .with_retry(config.retry())
        .with_circuit_breaker(config.circuit_breaker())
        .with_throttle(config.throttle());
    if let Some(window) = config.debounce_window() {
        builder = builder.with_debounce_first(window);
    }
    let resilient = builder.build();

    let root = CallContext::background();
    let signal_task = tokio::spawn(shutdown_signal(root.clone()));

    // Background tasks follow the first caller's context, so bind them to the root
    if let Err(e) = resilient.call(&root).await {
        warn!(error = %e, "warm-up call failed");
    }

    for call in 1..=DEMO_CALLS {
        if root.is_done() {
            break;
        }

        let ctx = root.with_timeout(config.call_timeout());
        match resilient.call(&ctx).await {
            Ok(value) => info!(call, %value, "call succeeded"),
            Err(e) => warn!(call, error = %e, synthetic = e.is_synthetic(), "call failed"),
        }

        tokio::time::sleep(CALL_SPACING).await;
    }

    root.cancel();
    signal_task.abort();

    print!("{}", metrics::gather());
    info!("stability demo complete");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn shutdown_signal(root: CallContext) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = ?e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }

    root.cancel();
}
