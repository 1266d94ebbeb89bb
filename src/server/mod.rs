//! HTTP surface: stream initiation, control call and health.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;

use crate::client::USER_ID_HEADER;
use crate::error::Result;
use crate::orchestrator::ChatStreamUseCase;
use crate::protocol::{ChatStreamRequest, ControlAck, ControlCommand, ControlRequest};
use crate::wire::encode_stream;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub chat: ChatStreamUseCase,
}

impl AppState {
    pub fn new(chat: ChatStreamUseCase) -> Self {
        Self { chat }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/chat/stream", post(handle_chat_stream))
        .route("/chat/control", post(handle_chat_control))
        .with_state(state)
}

/// Run the router on an already bound listener until it fails.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "parley server listening");
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /chat/stream
async fn handle_chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatStreamRequest>,
) -> Response<Body> {
    let Some(user_id) = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    else {
        let body = Json(serde_json::json!({ "error": format!("missing {USER_ID_HEADER} header") }));
        return (StatusCode::UNAUTHORIZED, body).into_response();
    };

    tracing::debug!(conversation_id = %request.conversation_id, user_id, "stream requested");
    let events = state.chat.execute(user_id, request);
    let frames = encode_stream(events).inspect(|frame| {
        if let Err(e) = frame {
            tracing::warn!(error = %e, "failed to encode event");
        }
    });

    let mut response = Response::new(Body::from_stream(frames));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/event-stream"),
    );
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache"),
    );
    response
}

/// POST /chat/control
async fn handle_chat_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Json<ControlAck> {
    let conversation_id = request.conversation_id().to_string();
    let ack = match request {
        ControlRequest::Command {
            command: ControlCommand::Interrupt,
            ..
        } => {
            let ok = state.chat.interrupt(&conversation_id);
            ControlAck {
                ok,
                message: (!ok).then(|| "no interruptible stream".to_string()),
                conversation_id,
            }
        }
        ControlRequest::Action { action_id, .. } => {
            tracing::debug!(%conversation_id, %action_id, "action decision not handled");
            ControlAck {
                ok: false,
                message: Some("action decisions are not handled by this server".into()),
                conversation_id,
            }
        }
    };
    Json(ack)
}
