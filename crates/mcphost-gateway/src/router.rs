use axum::Router;
use axum::extract::{Path, State};
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use mcphost_agents::prune;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::state::{DEFAULT_CONVERSATION, SharedState};

/// Build the application router with all routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tools", get(list_tools))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/chat/{conversation_id}", delete(end_conversation))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

/// POST /api/v1/chat
async fn chat(
    State(state): State<SharedState>,
    payload: Result<axum::Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(axum::Json(request)) => request,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("invalid request body: {}", rejection.body_text()),
            );
        }
    };
    if request.prompt.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "prompt must not be empty");
    }

    let conversation_id = request
        .conversation_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_CONVERSATION.to_string());

    let Some(session) = state.session(&conversation_id) else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "too many active conversations, try again later",
        );
    };
    let mut transcript = session.lock().await;
    *transcript = prune(&transcript, state.message_window);

    info!(conversation = %conversation_id, "chat request");
    let cancel = state.shutdown.child_token();
    match state
        .orchestrator
        .handle_turn_for_result(&request.prompt, &mut transcript, &cancel)
        .await
    {
        Ok(message) => axum::Json(serde_json::json!({
            "message": message,
            "conversation_id": conversation_id,
        }))
        .into_response(),
        Err(e) => {
            error!(conversation = %conversation_id, "turn failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// DELETE /api/v1/chat/{conversation_id}
async fn end_conversation(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
) -> Response {
    if state.remove_session(&conversation_id) {
        info!(conversation = %conversation_id, "conversation ended");
        StatusCode::NO_CONTENT.into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("unknown conversation: {conversation_id}"),
        )
    }
}

/// GET /api/tools
async fn list_tools(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    let tools: Vec<serde_json::Value> = state
        .orchestrator
        .registry()
        .catalog()
        .iter()
        .map(|entry| {
            serde_json::json!({
                "name": entry.definition.name,
                "server": entry.name.server(),
                "description": entry.definition.description,
            })
        })
        .collect();

    axum::Json(serde_json::json!({ "tools": tools }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::Request;
    use mcphost_agents::{LlmProvider, LlmRequest, LlmResponse, ToolRegistry, TurnOrchestrator};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Unreachable;

    #[async_trait::async_trait]
    impl LlmProvider for Unreachable {
        fn provider_id(&self) -> &str {
            "unreachable"
        }

        async fn complete(&self, _request: &LlmRequest) -> mcphost_common::Result<LlmResponse> {
            panic!("provider must not be called for rejected requests");
        }
    }

    fn app() -> Router {
        let orchestrator = TurnOrchestrator::new(
            Arc::new(Unreachable),
            Arc::new(ToolRegistry::empty()),
            "test",
        );
        build_router(Arc::new(AppState::new(Arc::new(orchestrator), 10)))
    }

    #[tokio::test]
    async fn test_missing_prompt_is_bad_request() {
        let response = app()
            .oneshot(
                Request::post("/api/v1/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"conversation_id":"x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_blank_prompt_is_bad_request() {
        let response = app()
            .oneshot(
                Request::post("/api/v1/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"prompt":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ending_unknown_conversation_is_not_found() {
        let response = app()
            .oneshot(Request::delete("/api/v1/chat/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
