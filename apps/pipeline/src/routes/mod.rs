pub mod applications;
pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/applications/:id",
            get(applications::handle_get_application),
        )
        .route(
            "/api/v1/applications/:id/process",
            post(applications::handle_process),
        )
        .route(
            "/api/v1/applications/:id/enqueue",
            post(applications::handle_enqueue),
        )
        .route(
            "/api/v1/applications/:id/retry",
            post(applications::handle_retry),
        )
        .route(
            "/api/v1/applications/:id/approval",
            post(applications::handle_approval),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline::{Pipeline, PipelineDefinition};
    use crate::resilience::ChannelLimiters;
    use crate::stages::{build_agents, StageDeps};
    use crate::submission::WebhookSubmissionChannel;
    use crate::testing::{seed_application, InMemoryStore, ScriptedGenerator};
    use crate::worker::JobQueue;

    fn app(store: Arc<InMemoryStore>) -> Router {
        let config = PipelineConfig::default();
        let deps = StageDeps {
            llm: Arc::new(ScriptedGenerator::new()),
            store: store.clone(),
            submission: Arc::new(
                WebhookSubmissionChannel::new("http://127.0.0.1:9/submissions".to_string())
                    .unwrap(),
            ),
            limiters: ChannelLimiters::from_settings(&config.rate_limits),
            candidate_profile: Arc::from(""),
            config,
        };
        let definition = PipelineDefinition::standard().unwrap();
        let agents = build_agents(&definition, &deps);
        let pipeline = Pipeline::new(store, definition, agents).unwrap();

        build_router(AppState {
            pipeline: Arc::new(pipeline),
            queue: JobQueue::new(redis::Client::open("redis://127.0.0.1:6379/").unwrap()),
        })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app(Arc::new(InMemoryStore::new())), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "pipeline");
    }

    #[tokio::test]
    async fn test_get_application() {
        let store = Arc::new(InMemoryStore::new());
        let seeded = seed_application(&store);

        let request = Request::get(format!("/api/v1/applications/{}", seeded.application_id))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(store), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "discovered");
        assert_eq!(body["completed_stages"], json!([]));
    }

    #[tokio::test]
    async fn test_unknown_application_is_404() {
        let request = Request::get(format!("/api/v1/applications/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(Arc::new(InMemoryStore::new())), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_approval_outside_pending_approval_is_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let seeded = seed_application(&store);

        let request = Request::post(format!(
            "/api/v1/applications/{}/approval",
            seeded.application_id
        ))
        .header("content-type", "application/json")
        .body(Body::from(r#"{"approve": true}"#))
        .unwrap();
        let (status, body) = send(app(store), request).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_retry_of_fresh_application_is_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let seeded = seed_application(&store);

        let request = Request::post(format!(
            "/api/v1/applications/{}/retry",
            seeded.application_id
        ))
        .body(Body::empty())
        .unwrap();
        let (status, _) = send(app(store), request).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
