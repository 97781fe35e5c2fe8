//! HTTP ingress for the bot framework kernel.

mod bootstrap;
mod dispatcher;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use bf_config::AppConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let logging = bf_common::logging::init_logging();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load configuration, exiting");
            std::process::exit(1);
        }
    };

    let addr = format!("{}:{}", config.ingress.host, config.ingress.port);
    let callback_path = config.ingress.callback_path.clone();

    let state = bootstrap::bootstrap(config, &logging).await;

    let app = Router::new()
        .route(&callback_path, post(ingress))
        .route("/healthz", get(healthz))
        .with_state(state);

    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind ingress listener");
    axum::serve(listener, app).await.expect("server exited unexpectedly");
}

/// Always returns 200 with a trivial body, regardless of internal outcome —
/// the gateway protocol has no failure signaling at this layer. Dispatch
/// runs on an independent task so the dispatcher's own timeout, not this
/// response, governs handler lifetime.
async fn ingress(State(state): State<Arc<bootstrap::AppState>>, Json(raw_event): Json<Value>) -> Json<Value> {
    tokio::spawn(dispatcher::dispatch(state, raw_event));
    Json(json!({}))
}

async fn healthz() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "bootstrapped": bootstrap::is_bootstrapped(),
    }))
}
