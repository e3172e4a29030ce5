use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use devflow_core::error::DevflowError;
use devflow_core::types::ReviewDecision;

use crate::middleware::Authenticated;
use crate::state::AppState;

/// A boundary error rendered as `{"error": "..."}`.
pub struct ApiError(StatusCode, String);

impl From<DevflowError> for ApiError {
    fn from(e: DevflowError) -> Self {
        let status = match &e {
            DevflowError::Validation(_) => StatusCode::BAD_REQUEST,
            DevflowError::UnknownArtifact(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError(StatusCode::BAD_REQUEST, message.into())
}

// GET /api/health (no auth)
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Deserialize)]
pub struct FeedbackBody {
    #[serde(default)]
    pub artifact_key: Option<String>,
    /// Id or id prefix of the review, as listed by `/api/reviews`.
    #[serde(default)]
    pub review_id: Option<String>,
    #[serde(default, alias = "review_status")]
    pub decision: Option<String>,
}

/// Resolve the artifact key from either the key itself or a review id.
async fn artifact_key(
    state: &AppState,
    artifact_key: Option<String>,
    review_id: Option<String>,
) -> Result<String, ApiError> {
    if let Some(key) = artifact_key.filter(|k| !k.is_empty()) {
        return Ok(key);
    }
    let id = review_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| bad_request("an artifact or a review_id is required"))?;
    state
        .broker
        .find_by_prefix(&id)
        .await
        .map(|gate| gate.artifact_key)
        .ok_or_else(|| ApiError(StatusCode::NOT_FOUND, format!("no open review with id {}", id)))
}

// POST /api/review-feedback
pub async fn review_feedback(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Validate before touching the stores.
    let decision: ReviewDecision = body
        .decision
        .as_deref()
        .ok_or_else(|| bad_request("decision is required"))?
        .parse()?;
    let key = artifact_key(&state, body.artifact_key, body.review_id).await?;

    let gate = state.broker.submit_decision(&key, decision).await?;
    info!(review_id = %gate.id, decision = %decision, "Decision received over HTTP");
    Ok(Json(json!({
        "review_id": gate.id,
        "step": gate.step,
        "decision": decision,
    })))
}

#[derive(Deserialize)]
pub struct RevisionBody {
    #[serde(default)]
    pub original_artifact: Option<String>,
    #[serde(default)]
    pub review_id: Option<String>,
    #[serde(default)]
    pub revised_artifact: String,
}

// POST /api/revisions
pub async fn submit_revision(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RevisionBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.revised_artifact.trim().is_empty() {
        return Err(bad_request("revised_artifact must not be empty"));
    }
    let original = artifact_key(&state, body.original_artifact, body.review_id).await?;
    state
        .broker
        .submit_revision(&original, &body.revised_artifact)
        .await?;
    Ok(Json(json!({ "status": "accepted" })))
}

// GET /api/reviews
pub async fn list_reviews(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let reviews = state.broker.list().await;
    debug!(count = reviews.len(), "Listing reviews");
    Json(json!({ "reviews": reviews }))
}

#[derive(Deserialize)]
pub struct FormatQuery {
    #[serde(default)]
    pub format: Option<String>,
}

// GET /api/trace?format=entries
pub async fn trace(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Query(q): Query<FormatQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let trace = state.trace.read().await;
    match q.format.as_deref() {
        None | Some("map") => Ok(Json(serde_json::Value::Object(trace.to_step_map()))),
        Some("entries") => Ok(Json(serde_json::to_value(&*trace).map_err(DevflowError::from)?)),
        Some(other) => Err(bad_request(format!("unknown trace format '{}'", other))),
    }
}

// GET /api/graph?format=mermaid
pub async fn graph(
    _auth: Authenticated,
    State(state): State<Arc<AppState>>,
    Query(q): Query<FormatQuery>,
) -> Result<Response, ApiError> {
    match q.format.as_deref() {
        None | Some("json") => Ok(Json(&state.graph).into_response()),
        Some("mermaid") => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            state.graph.to_mermaid(),
        )
            .into_response()),
        Some(other) => Err(bad_request(format!("unknown graph format '{}'", other))),
    }
}
