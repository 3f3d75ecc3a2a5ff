//! Chat-facing routes: the per-turn message endpoint, conversation lookup,
//! and the product catalog passthrough.
//!
//! The message endpoint's JSON shape is the widget contract: requests carry
//! `user_message` (or legacy `message`), responses are the reply body
//! discriminated by `response_type` merged with routing metadata.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use nouma_agent::{IncomingMessage, TurnError};
use nouma_core::{ChatReply, Intent, Language, ReplyBody};
use nouma_db::SqlChatStore;

use crate::bootstrap::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/message", post(post_message))
        .route("/conversation/{session_id}", get(get_conversation))
        .route("/products", get(get_products))
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    session_id: Option<String>,
    user_message: Option<String>,
    /// Legacy alias for `user_message`.
    message: Option<String>,
    channel: Option<String>,
    language: Option<String>,
    /// Widget page/customer context; accepted and currently unused.
    #[serde(default)]
    #[allow(dead_code)]
    metadata: Option<Value>,
}

async fn post_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Response {
    let incoming = IncomingMessage {
        session_id: request.session_id,
        text: request.user_message.or(request.message).unwrap_or_default(),
        channel: request.channel,
        language: request.language.as_deref().and_then(Language::parse),
    };
    let language = incoming.language.unwrap_or(Language::Ar);

    // The turn runs in its own task so that even a panic inside the
    // pipeline degrades to the generic bilingual payload instead of a
    // transport-level failure.
    let runtime = state.runtime.clone();
    let turn = tokio::spawn(async move { runtime.handle_message(incoming).await }).await;

    match turn {
        Ok(Ok(reply)) => (StatusCode::OK, Json(reply)).into_response(),
        Ok(Err(turn_error)) => {
            let status = match turn_error {
                TurnError::EmptyMessage | TurnError::MessageTooLong { .. } => {
                    StatusCode::BAD_REQUEST
                }
                TurnError::SessionEscalated => StatusCode::CONFLICT,
            };
            (status, Json(json!({"success": false, "error": turn_error.to_string()})))
                .into_response()
        }
        Err(join_error) => {
            error!(%join_error, "message turn crashed, serving fallback payload");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(fallback_reply(language))).into_response()
        }
    }
}

/// Generic bilingual error payload with agent `system`, served on any
/// unexpected failure so the widget always gets a well-formed reply.
fn fallback_reply(language: Language) -> ChatReply {
    ChatReply {
        body: ReplyBody::text(
            "عذراً، حصل خطأ تقني. حاول تاني بعد شوية.\n\
             Sorry, a technical error occurred. Please try again shortly.",
        ),
        agent_used: "system".to_string(),
        intent: Intent::General,
        confidence_score: 0.0,
        session_id: String::new(),
        language,
        llm_used: false,
    }
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(pool) = &state.db_pool else {
        return storage_offline();
    };

    match SqlChatStore::new(pool.clone()).conversation_with_history(&session_id).await {
        Ok(Some(history)) => {
            (StatusCode::OK, Json(json!({"success": true, "data": history}))).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"success": false, "error": "Conversation not found"})),
        )
            .into_response(),
        Err(error) => {
            error!(%error, "conversation lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": "Conversation lookup failed"})),
            )
                .into_response()
        }
    }
}

async fn get_products(State(state): State<AppState>) -> Response {
    let Some(pool) = &state.db_pool else {
        return (
            StatusCode::OK,
            Json(json!({"success": true, "products": [], "db_status": "offline"})),
        )
            .into_response();
    };

    match SqlChatStore::new(pool.clone()).list_active_products().await {
        Ok(products) => (
            StatusCode::OK,
            Json(json!({"success": true, "count": products.len(), "products": products})),
        )
            .into_response(),
        Err(error) => {
            error!(%error, "product listing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": "Product listing failed"})),
            )
                .into_response()
        }
    }
}

pub(crate) fn storage_offline() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"success": false, "error": "Database unavailable"})),
    )
        .into_response()
}
