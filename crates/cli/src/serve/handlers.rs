//! HTTP route handlers: registry, cold drinks, lifecycle, classification.

use std::str::FromStr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use coldchain_core::{ChainError, ColdDrinkDraft, ErrorKind, Identity, Role, Stage, Transition};
use coldchain_ledger::SupplyChainError;
use serde::Deserialize;

use super::json_error;
use super::state::{AppState, Caller};

/// Map a service error onto its status code and `{"error", "kind"}` body.
fn service_error(err: SupplyChainError) -> Response {
    let status = match err.kind() {
        Some(ErrorKind::Unauthorized) => StatusCode::FORBIDDEN,
        Some(ErrorKind::InvalidStage) => StatusCode::CONFLICT,
        Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorKind::InvalidArgument) => StatusCode::BAD_REQUEST,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.code(), &err.to_string()).into_response()
}

fn bad_request(message: &str) -> Response {
    json_error(StatusCode::BAD_REQUEST, ErrorKind::InvalidArgument.code(), message).into_response()
}

fn parse_id(raw: &str) -> Result<u64, Response> {
    raw.parse::<u64>()
        .map_err(|_| bad_request(&format!("'{raw}' is not a cold drink id")))
}

fn parse_identity(raw: &str) -> Result<Identity, Response> {
    Identity::new(raw).map_err(|e| bad_request(&e.to_string()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, Response> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| bad_request(&rejection.body_text()))
}

/// Roles arrive either as a code (`1`) or as a name (`"Manufacturer"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RoleInput {
    Code(u8),
    Name(String),
}

impl RoleInput {
    fn resolve(&self) -> Result<Role, ChainError> {
        match self {
            RoleInput::Code(code) => Role::from_code(*code),
            RoleInput::Name(name) => Role::from_str(name),
        }
    }
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, ErrorKind::NotFound.code(), "not found")
}

/// GET /health
pub(crate) async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "owner": state.chain.owner(),
    });
    (StatusCode::OK, Json(response))
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct NewParticipant {
    identity: String,
    role: RoleInput,
}

/// POST /participants
pub(crate) async fn handle_add_participant(
    State(state): State<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    payload: Result<Json<NewParticipant>, JsonRejection>,
) -> Response {
    let request = match body(payload) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let identity = match parse_identity(&request.identity) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let role = match request.role.resolve() {
        Ok(r) => r,
        Err(e) => return service_error(e.into()),
    };
    match state.chain.add_participant(&caller, &identity, role).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => service_error(e),
    }
}

/// GET /participants/{identity}/role
pub(crate) async fn handle_check_role(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Response {
    let identity = match parse_identity(&identity) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match state.chain.check_role_name(&identity).await {
        Ok(role) => (
            StatusCode::OK,
            Json(serde_json::json!({ "identity": identity, "role": role })),
        )
            .into_response(),
        Err(e) => service_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RoleFilter {
    role: Option<String>,
}

/// GET /participants?role=
pub(crate) async fn handle_list_participants(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RoleFilter>,
) -> Response {
    let role = match filter.role.as_deref().map(Role::from_str).transpose() {
        Ok(r) => r,
        Err(e) => return service_error(e.into()),
    };
    match state.chain.list_participants(role).await {
        Ok(participants) => (
            StatusCode::OK,
            Json(serde_json::json!({ "participants": participants })),
        )
            .into_response(),
        Err(e) => service_error(e),
    }
}

// ── Cold drinks ──────────────────────────────────────────────────────────────

/// POST /cold-drinks
pub(crate) async fn handle_add_cold_drink(
    State(state): State<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    payload: Result<Json<ColdDrinkDraft>, JsonRejection>,
) -> Response {
    let draft = match body(payload) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    match state.chain.add_cold_drink(&caller, draft).await {
        Ok(id) => (StatusCode::CREATED, Json(serde_json::json!({ "id": id }))).into_response(),
        Err(e) => service_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AdmitRequest {
    name: String,
    description: String,
    label_text: String,
}

/// POST /cold-drinks/admit
pub(crate) async fn handle_admit_cold_drink(
    State(state): State<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    payload: Result<Json<AdmitRequest>, JsonRejection>,
) -> Response {
    let request = match body(payload) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let result = state
        .chain
        .admit_cold_drink(
            &caller,
            &request.name,
            &request.description,
            &request.label_text,
            state.classifier.as_ref(),
        )
        .await;
    match result {
        Ok(admission) => (StatusCode::CREATED, Json(admission)).into_response(),
        Err(e) => service_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StageFilter {
    stage: Option<String>,
}

/// GET /cold-drinks?stage=
pub(crate) async fn handle_list_cold_drinks(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<StageFilter>,
) -> Response {
    let stage = match filter.stage.as_deref().map(Stage::from_str).transpose() {
        Ok(s) => s,
        Err(e) => return service_error(e.into()),
    };
    match state.chain.list_items(stage).await {
        Ok(items) => (
            StatusCode::OK,
            Json(serde_json::json!({ "cold_drinks": items })),
        )
            .into_response(),
        Err(e) => service_error(e),
    }
}

/// GET /cold-drinks/{id}
pub(crate) async fn handle_get_cold_drink(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.chain.get_item(id).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => service_error(e),
    }
}

/// GET /cold-drinks/{id}/history
pub(crate) async fn handle_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let transitions = match state.chain.history(id).await {
        Ok(t) => t,
        Err(e) => return service_error(e),
    };
    match state.chain.verify_history(id).await {
        Ok(verification) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "item_id": id,
                "transitions": transitions,
                "verification": verification,
            })),
        )
            .into_response(),
        Err(e) => service_error(e),
    }
}

/// POST /cold-drinks/{id}/{action}
pub(crate) async fn handle_transition(
    State(state): State<Arc<AppState>>,
    Extension(Caller(caller)): Extension<Caller>,
    Path((id, action)): Path<(String, String)>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let Some(transition) = Transition::from_wire(&action) else {
        return json_error(
            StatusCode::NOT_FOUND,
            ErrorKind::NotFound.code(),
            &format!("unknown action '{action}'"),
        )
        .into_response();
    };
    match state.chain.advance(&caller, id, transition).await {
        Ok(item) => (StatusCode::OK, Json(item)).into_response(),
        Err(e) => service_error(e),
    }
}

// ── Actions and classification ───────────────────────────────────────────────

/// GET /actions/{identity}
pub(crate) async fn handle_actions(
    State(state): State<Arc<AppState>>,
    Path(identity): Path<String>,
) -> Response {
    let identity = match parse_identity(&identity) {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match state.chain.action_space(&identity).await {
        Ok(space) => (StatusCode::OK, Json(space)).into_response(),
        Err(e) => service_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LabelRequest {
    label_text: String,
}

/// POST /process-ingredients
pub(crate) async fn handle_process_ingredients(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LabelRequest>, JsonRejection>,
) -> Response {
    let request = match body(payload) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    match state.label_rules.evaluate(&request.label_text) {
        Ok(classification) => (StatusCode::OK, Json(classification)).into_response(),
        Err(e) => service_error(e.into()),
    }
}
