//! Unified Feed Service — Binary Entrypoint
//! Boots the Axum HTTP server, wiring routes, shared state, and middleware.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use shuttle_runtime::SecretStore;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_aggregator::aggregator::Aggregator;
use feed_aggregator::api::{self, AppState};
use feed_aggregator::cache::{DATASET_TTL, MEMORY_TTL};
use feed_aggregator::env::{RuntimeEnv, KNOWN_KEYS};
use feed_aggregator::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - AGGREGATOR_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("AGGREGATOR_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_aggregator=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum(#[shuttle_runtime::Secrets] secrets: SecretStore) -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This lets the
    // adapter configuration keys come from .env when running locally.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    // Host-injected secrets become the resolver's injected layer; process
    // env stays as the last fallback.
    let mut injected = std::collections::HashMap::new();
    for key in KNOWN_KEYS {
        if let Some(v) = secrets.get(key) {
            injected.insert(key.to_string(), v);
        }
    }
    let env = RuntimeEnv::with_injected(injected);

    let metrics = Metrics::init(MEMORY_TTL, DATASET_TTL);

    let state = AppState {
        aggregator: Arc::new(Aggregator::new(env)),
    };
    let router = api::create_router(state).merge(metrics.router());

    Ok(router.into())
}
