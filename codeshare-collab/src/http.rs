//! HTTP control endpoint: the control messages of the socket protocol as
//! request/response.
//!
//! `POST /api` with `{"event":"run_code","language":"Python","room":"one"}`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use crate::manager::RoomManager;
use crate::protocol::{ApiRequest, ControlBody, ControlResponse, ControlStatus};

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Build the router for the control endpoint.
pub fn control_router(rooms: Arc<RoomManager>) -> Router {
    Router::new().route("/api", post(api_handler)).with_state(rooms)
}

/// Serve the control endpoint on an already bound listener.
pub async fn serve_control(listener: TcpListener, rooms: Arc<RoomManager>) -> std::io::Result<()> {
    log::info!("Control endpoint listening on {}", listener.local_addr()?);
    axum::serve(listener, control_router(rooms)).await
}

async fn api_handler(
    State(rooms): State<Arc<RoomManager>>,
    Json(request): Json<ApiRequest>,
) -> (StatusCode, Json<ControlBody>) {
    let Some(room_id) = request.room.as_deref() else {
        return reply(ControlResponse::bad_request("missing room"));
    };
    let Some(room) = rooms.get_room(room_id).await else {
        return reply(ControlResponse::not_found(format!("no room {room_id}")));
    };
    log::debug!("Control {:?} for room {room_id}", request.event);
    reply(room.handle_control(&request).await)
}

fn reply(response: ControlResponse) -> (StatusCode, Json<ControlBody>) {
    let status = match response.status {
        ControlStatus::Ok => StatusCode::OK,
        ControlStatus::BadRequest => StatusCode::BAD_REQUEST,
        ControlStatus::NotFound => StatusCode::NOT_FOUND,
        ControlStatus::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(response.body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::DisabledReviewer;
    use crate::room::{RoomConfig, CONTROL_ACK};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use codeshare_exec::{ExecError, ExecutionOutput, Executor};
    use std::time::Duration;
    use tower::ServiceExt;

    struct StubExecutor;

    #[async_trait]
    impl Executor for StubExecutor {
        async fn run(
            &self,
            _room_tag: &str,
            language: &str,
            _base_name: &str,
            _source: &str,
        ) -> Result<ExecutionOutput, ExecError> {
            if language == "Python" {
                Ok(ExecutionOutput {
                    output: "ok".to_string(),
                    exit_code: Some(0),
                    truncated: false,
                    duration: Duration::ZERO,
                })
            } else {
                Err(ExecError::UnsupportedLanguage(language.to_string()))
            }
        }
    }

    async fn app() -> Router {
        let rooms = Arc::new(RoomManager::new(
            Arc::new(StubExecutor),
            Arc::new(DisabledReviewer),
            RoomConfig::default(),
        ));
        rooms.create_room("one").await;
        control_router(rooms)
    }

    async fn post_api(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/api")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn test_run_code_acknowledged() {
        let (status, body) = post_api(
            app().await,
            r#"{"event":"run_code","language":"Python","room":"one"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "message": CONTROL_ACK }));
    }

    #[tokio::test]
    async fn test_unsupported_language_is_bad_request() {
        let (status, body) = post_api(
            app().await,
            r#"{"event":"run_code","language":"Fortran","room":"one"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("unsupported language"));
    }

    #[tokio::test]
    async fn test_review_failure_is_internal_error() {
        let (status, body) =
            post_api(app().await, r#"{"event":"code_review","room":"one"}"#).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, serde_json::json!({ "review": "internal server error" }));
    }

    #[tokio::test]
    async fn test_unknown_room_is_not_found() {
        let (status, body) = post_api(
            app().await,
            r#"{"event":"run_code","language":"Python","room":"nope"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_missing_room_is_bad_request() {
        let (status, _) = post_api(app().await, r#"{"event":"save_code"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_code_save_alias() {
        let (status, body) =
            post_api(app().await, r#"{"event":"save_code","room":"one"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], CONTROL_ACK);
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let (status, _) = post_api(app().await, r#"{"event":"launch"}"#).await;
        assert!(status.is_client_error());
    }
}
