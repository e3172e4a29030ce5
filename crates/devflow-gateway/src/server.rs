use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use devflow_agent::approval::ReviewBroker;
use devflow_agent::graph::GraphDescription;
use devflow_core::config::GatewayConfig;

use crate::routes;
use crate::state::{AppState, SharedTrace};

/// The API routes over a prepared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/review-feedback", post(routes::review_feedback))
        .route("/api/revisions", post(routes::submit_revision))
        .route("/api/reviews", get(routes::list_reviews))
        .route("/api/trace", get(routes::trace))
        .route("/api/graph", get(routes::graph))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP boundary for human reviewers, built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    broker: Arc<ReviewBroker>,
    graph: GraphDescription,
    trace: SharedTrace,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        broker: Arc<ReviewBroker>,
        graph: GraphDescription,
        trace: SharedTrace,
    ) -> Self {
        Self {
            config,
            broker,
            graph,
            trace,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            broker: self.broker.clone(),
            graph: self.graph.clone(),
            trace: self.trace.clone(),
        });
        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    use super::*;
    use devflow_agent::approval::GateStatus;
    use devflow_agent::graph::{GraphBuilder, StatusRoute};
    use devflow_agent::trace::ExecutionTrace;
    use devflow_core::types::{BranchKey, ReviewDecision, END};
    use devflow_test_utils::{demo_state, ScriptedStep};

    const STORIES: &str = "As a user, I can add tasks.";

    fn graph() -> GraphDescription {
        GraphBuilder::new()
            .step(ScriptedStep::new("generate_user_stories"))
            .step(ScriptedStep::new("review_user_stories"))
            .entry("generate_user_stories")
            .edge("generate_user_stories", "review_user_stories")
            .status_route(
                "review_user_stories",
                StatusRoute::new("review_status", "Approved", BranchKey::Revise),
                END,
                "generate_user_stories",
            )
            .build()
            .unwrap()
            .describe()
    }

    fn setup(token: Option<&str>) -> (Router, Arc<ReviewBroker>, SharedTrace) {
        let broker = Arc::new(ReviewBroker::new());
        let trace: SharedTrace = Arc::new(RwLock::new(ExecutionTrace::new()));
        let state = Arc::new(AppState {
            config: GatewayConfig {
                token: token.map(str::to_string),
                ..GatewayConfig::default()
            },
            broker: broker.clone(),
            graph: graph(),
            trace: trace.clone(),
        });
        (router(state), broker, trace)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let (status, bytes) = send(app, req).await;
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn decision_resolves_pending_gate() {
        let (app, broker, _) = setup(None);
        broker.open(STORIES, "review_user_stories").await;

        let (status, body) = send_json(
            &app,
            post_json(
                "/api/review-feedback",
                json!({"artifact_key": STORIES, "decision": "Approved"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decision"], "Approved");
        assert_eq!(broker.get(STORIES).await.unwrap().status, GateStatus::Approved);
    }

    #[tokio::test]
    async fn legacy_field_and_review_id() {
        let (app, broker, _) = setup(None);
        let gate = broker.open(STORIES, "review_user_stories").await;

        let (status, _) = send_json(
            &app,
            post_json(
                "/api/review-feedback",
                json!({"review_id": &gate.id[..8], "review_status": "Needs Revision"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            broker.get(STORIES).await.unwrap().status,
            GateStatus::NeedsRevision
        );
    }

    #[tokio::test]
    async fn invalid_decision_is_rejected_and_gate_untouched() {
        let (app, broker, _) = setup(None);
        broker.open(STORIES, "review_user_stories").await;

        let (status, body) = send_json(
            &app,
            post_json(
                "/api/review-feedback",
                json!({"artifact_key": STORIES, "decision": "Maybe"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());
        assert_eq!(broker.get(STORIES).await.unwrap().status, GateStatus::Pending);

        let (status, _) = send_json(
            &app,
            post_json("/api/review-feedback", json!({"artifact_key": STORIES})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_artifact_is_not_found() {
        let (app, _, _) = setup(None);
        let (status, _) = send_json(
            &app,
            post_json(
                "/api/review-feedback",
                json!({"artifact_key": "never reviewed", "decision": "Approved"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn second_decision_is_rejected() {
        let (app, broker, _) = setup(None);
        broker.open(STORIES, "review_user_stories").await;
        broker
            .submit_decision(STORIES, ReviewDecision::Approved)
            .await
            .unwrap();

        let (status, _) = send_json(
            &app,
            post_json(
                "/api/review-feedback",
                json!({"artifact_key": STORIES, "decision": "Needs Revision"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(broker.get(STORIES).await.unwrap().status, GateStatus::Approved);
    }

    #[tokio::test]
    async fn revision_requires_awaiting_artifact() {
        let (app, broker, _) = setup(None);
        broker.open("other stories", "review_user_stories").await;

        let (status, _) = send_json(
            &app,
            post_json(
                "/api/revisions",
                json!({"original_artifact": STORIES, "revised_artifact": "v2"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(broker.get("other stories").await.is_some());

        let (status, _) = send_json(
            &app,
            post_json(
                "/api/revisions",
                json!({"original_artifact": STORIES, "revised_artifact": "  "}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        broker.open(STORIES, "review_user_stories").await;
        broker
            .submit_decision(STORIES, ReviewDecision::NeedsRevision)
            .await
            .unwrap();
        let (status, body) = send_json(
            &app,
            post_json(
                "/api/revisions",
                json!({"original_artifact": STORIES, "revised_artifact": "v2"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "accepted");
    }

    #[tokio::test]
    async fn reviews_listing() {
        let (app, broker, _) = setup(None);
        broker.open(STORIES, "review_user_stories").await;

        let req = Request::get("/api/reviews").body(Body::empty()).unwrap();
        let (status, body) = send_json(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        let reviews = body["reviews"].as_array().unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0]["artifact_key"], STORIES);
        assert_eq!(reviews[0]["status"], "Pending");
    }

    #[tokio::test]
    async fn trace_in_both_shapes() {
        let (app, _, trace) = setup(None);
        {
            let mut trace = trace.write().await;
            trace.record("gather_requirements", &demo_state());
            trace.record("generate_user_stories", &demo_state());
        }

        let req = Request::get("/api/trace").body(Body::empty()).unwrap();
        let (status, body) = send_json(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gather_requirements"]["project_name"], "Demo");

        let req = Request::get("/api/trace?format=entries").body(Body::empty()).unwrap();
        let (_, body) = send_json(&app, req).await;
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["step"], "generate_user_stories");

        let req = Request::get("/api/trace?format=yaml").body(Body::empty()).unwrap();
        let (status, _) = send_json(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn graph_json_and_mermaid() {
        let (app, _, _) = setup(None);

        let req = Request::get("/api/graph").body(Body::empty()).unwrap();
        let (status, body) = send_json(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        let nodes: Vec<&str> = body["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["id"].as_str().unwrap())
            .collect();
        assert_eq!(
            nodes,
            ["__start__", "generate_user_stories", "review_user_stories", "__end__"]
        );

        let req = Request::get("/api/graph?format=mermaid").body(Body::empty()).unwrap();
        let (status, bytes) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("flowchart TD"));
        assert!(text.contains("review_user_stories -->|revise| generate_user_stories"));
    }

    #[tokio::test]
    async fn token_guards_everything_but_health() {
        let (app, _, _) = setup(Some("s3cret"));

        let req = Request::get("/api/health").body(Body::empty()).unwrap();
        assert_eq!(send(&app, req).await.0, StatusCode::OK);

        let req = Request::get("/api/reviews").body(Body::empty()).unwrap();
        assert_eq!(send(&app, req).await.0, StatusCode::UNAUTHORIZED);

        let req = Request::get("/api/reviews")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, req).await.0, StatusCode::OK);

        let req = Request::get("/api/trace?token=s3cret").body(Body::empty()).unwrap();
        assert_eq!(send(&app, req).await.0, StatusCode::OK);
    }
}
