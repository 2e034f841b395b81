//! `coldchain serve`: HTTP JSON API over the supply chain ledger.
//!
//! Endpoints:
//! - GET  /health                        - Server status
//! - POST /participants                  - Register a participant (owner)
//! - GET  /participants?role=            - List participants
//! - GET  /participants/{identity}/role  - `checkRole`
//! - POST /cold-drinks                   - `addColdDrink` (owner)
//! - POST /cold-drinks/admit             - Classify a label, then add (owner)
//! - GET  /cold-drinks?stage=            - List cold drinks
//! - GET  /cold-drinks/{id}              - One cold drink
//! - GET  /cold-drinks/{id}/history      - Transition history and chain check
//! - POST /cold-drinks/{id}/{action}     - Apply a lifecycle transition
//! - GET  /actions/{identity}            - Action space for an identity
//! - POST /process-ingredients           - Classify a label with local rules
//!
//! Mutating requests name their caller in the `X-Caller-Identity` header.
//! When `server.api_key` (or `COLDCHAIN_API_KEY`) is set, every endpoint
//! except /health also requires `Authorization: Bearer <key>` or
//! `X-API-Key: <key>`; the caller header is only trusted behind that key.

mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use coldchain_ledger::SupplyChain;
use coldchain_storage::MemoryStorage;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use self::handlers::{
    handle_actions, handle_add_cold_drink, handle_add_participant, handle_admit_cold_drink,
    handle_check_role, handle_get_cold_drink, handle_health, handle_history,
    handle_list_cold_drinks, handle_list_participants, handle_not_found,
    handle_process_ingredients, handle_transition,
};
use self::middleware::{auth_middleware, caller_middleware};
use self::state::AppState;
use crate::config::Config;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// JSON error body: `{"error": message, "kind": kind}`.
fn json_error(status: StatusCode, kind: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({ "error": message, "kind": kind })),
    )
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/participants",
            get(handle_list_participants).post(handle_add_participant),
        )
        .route("/participants/{identity}/role", get(handle_check_role))
        .route(
            "/cold-drinks",
            get(handle_list_cold_drinks).post(handle_add_cold_drink),
        )
        .route("/cold-drinks/admit", post(handle_admit_cold_drink))
        .route("/cold-drinks/{id}", get(handle_get_cold_drink))
        .route("/cold-drinks/{id}/history", get(handle_history))
        .route("/cold-drinks/{id}/{action}", post(handle_transition))
        .route("/actions/{identity}", get(handle_actions))
        .route("/process-ingredients", post(handle_process_ingredients))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn(caller_middleware))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server on `config.server.port` with an empty in-memory ledger.
pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let owner = config.owner_identity()?;
    let chain = SupplyChain::new(Arc::new(MemoryStorage::new()), owner, config.policy);
    let classifier = config.classifier.build();
    info!(
        owner = %chain.owner(),
        classifier = classifier.classifier_id(),
        re_registration = ?config.policy.re_registration,
        sell = ?config.policy.sell,
        "ledger ready"
    );
    if config.server.api_key.is_some() {
        info!("API key authentication enabled");
    } else {
        warn!("no API key configured: X-Caller-Identity is trusted as sent");
    }

    let state = Arc::new(AppState {
        chain,
        classifier,
        label_rules: config.classifier.label_rules(),
        api_key: config.server.api_key.clone(),
    });
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("Cold chain ledger listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    eprintln!("\nServer shut down.");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
    eprintln!("\nReceived shutdown signal...");
}
