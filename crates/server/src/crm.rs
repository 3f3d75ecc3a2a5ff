//! CRM-facing routes: manual lead management and the dashboard stats feed.
//!
//! Lead listing and stats degrade to documented offline shapes when storage
//! is down; mutating lead operations return 503 instead.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use nouma_core::{InterestLevel, LeadStatus, NewLead};
use nouma_db::{
    CreateLeadOutcome, DashboardStats, LeadFilter, LeadUpdate, SqlLeadRepository,
    SqlStatsRepository,
};

use crate::bootstrap::AppState;
use crate::chat::storage_offline;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leads", get(list_leads).post(create_lead))
        .route("/leads/{id}", get(get_lead).patch(update_lead))
        .route("/stats", get(get_stats))
}

#[derive(Debug, Default, Deserialize)]
struct LeadListQuery {
    status: Option<String>,
    interest_level: Option<String>,
    limit: Option<i64>,
}

async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<LeadListQuery>,
) -> Response {
    let Some(pool) = &state.db_pool else {
        return (
            StatusCode::OK,
            Json(json!({"success": true, "leads": [], "db_status": "offline"})),
        )
            .into_response();
    };

    let filter = LeadFilter {
        status: query.status,
        interest_level: query.interest_level,
        limit: query.limit,
    };
    match SqlLeadRepository::new(pool.clone()).list(&filter).await {
        Ok(leads) => (
            StatusCode::OK,
            Json(json!({"success": true, "count": leads.len(), "leads": leads})),
        )
            .into_response(),
        Err(error) => {
            error!(%error, "lead listing failed");
            internal_error("Lead listing failed")
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateLeadRequest {
    conversation_id: Option<i64>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    interested_product_id: Option<i64>,
    interest_level: Option<String>,
    notes: Option<String>,
    source: Option<String>,
}

async fn create_lead(
    State(state): State<AppState>,
    Json(request): Json<CreateLeadRequest>,
) -> Response {
    let Some(phone) = request.customer_phone.filter(|phone| !phone.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": "customer_phone is required"})),
        )
            .into_response();
    };
    let Some(pool) = &state.db_pool else {
        return storage_offline();
    };

    let lead = NewLead {
        conversation_id: request.conversation_id,
        customer_name: request.customer_name,
        customer_phone: phone,
        customer_email: request.customer_email,
        interested_product_id: request.interested_product_id,
        interest_level: request
            .interest_level
            .as_deref()
            .and_then(InterestLevel::parse)
            .unwrap_or(InterestLevel::Warm),
        notes: request.notes,
        source: request.source.unwrap_or_else(|| "chat".to_string()),
    };

    match SqlLeadRepository::new(pool.clone()).create(&lead).await {
        Ok(CreateLeadOutcome::Created { id, created_at }) => (
            StatusCode::OK,
            Json(json!({"success": true, "lead_id": id, "created_at": created_at})),
        )
            .into_response(),
        Ok(CreateLeadOutcome::Duplicate { id }) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "lead_id": id,
                "message": "Lead already exists",
                "duplicate": true
            })),
        )
            .into_response(),
        Err(error) => {
            error!(%error, "lead creation failed");
            internal_error("Lead creation failed")
        }
    }
}

async fn get_lead(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let Some(pool) = &state.db_pool else {
        return storage_offline();
    };

    let repository = SqlLeadRepository::new(pool.clone());
    match repository.get(id).await {
        Ok(Some(lead)) => {
            let messages = match repository.conversation_messages(&lead).await {
                Ok(messages) => messages,
                Err(error) => {
                    error!(%error, "lead conversation lookup failed");
                    Vec::new()
                }
            };
            (
                StatusCode::OK,
                Json(json!({"success": true, "lead": lead, "conversation_messages": messages})),
            )
                .into_response()
        }
        Ok(None) => lead_not_found(),
        Err(error) => {
            error!(%error, "lead lookup failed");
            internal_error("Lead lookup failed")
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateLeadRequest {
    status: Option<String>,
    interest_level: Option<String>,
    notes: Option<String>,
    follow_up_date: Option<String>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
}

async fn update_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateLeadRequest>,
) -> Response {
    let Some(pool) = &state.db_pool else {
        return storage_offline();
    };

    if let Some(status) = &request.status {
        if LeadStatus::parse(status).is_none() {
            return bad_request(&format!("Unknown lead status '{status}'"));
        }
    }
    if let Some(interest_level) = &request.interest_level {
        if InterestLevel::parse(interest_level).is_none() {
            return bad_request(&format!("Unknown interest level '{interest_level}'"));
        }
    }

    let update = LeadUpdate {
        status: request.status,
        interest_level: request.interest_level,
        notes: request.notes,
        follow_up_date: request.follow_up_date,
        customer_name: request.customer_name,
        customer_phone: request.customer_phone,
        customer_email: request.customer_email,
    };
    if update.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": "No fields to update"})),
        )
            .into_response();
    }

    match SqlLeadRepository::new(pool.clone()).update(id, &update).await {
        Ok(Some(lead)) => {
            (StatusCode::OK, Json(json!({"success": true, "lead": lead}))).into_response()
        }
        Ok(None) => lead_not_found(),
        Err(error) => {
            error!(%error, "lead update failed");
            internal_error("Lead update failed")
        }
    }
}

/// The dashboard never errors: a missing or failing store serves the
/// documented offline shape.
async fn get_stats(State(state): State<AppState>) -> Json<DashboardStats> {
    let Some(pool) = &state.db_pool else {
        return Json(DashboardStats::offline());
    };

    match SqlStatsRepository::new(pool.clone()).dashboard().await {
        Ok(stats) => Json(stats),
        Err(error) => {
            error!(%error, "stats aggregation failed, serving offline shape");
            Json(DashboardStats::offline())
        }
    }
}

fn lead_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"success": false, "error": "Lead not found"})))
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"success": false, "error": message})))
        .into_response()
}

fn internal_error(message: &str) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"success": false, "error": message})))
        .into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use nouma_agent::{AgentRegistry, ChatRuntime, RuntimePolicy};
    use nouma_db::{connect_with_settings, migrations, DbPool};

    use crate::bootstrap::{router, AppState};

    fn empty_state(pool: Option<DbPool>) -> (TempDir, AppState) {
        let dir = TempDir::new().expect("temp dir");
        let (registry, _) = AgentRegistry::load(dir.path());
        let registry = Arc::new(registry);
        let runtime =
            Arc::new(ChatRuntime::new(Arc::clone(&registry), RuntimePolicy::default()));
        (dir, AppState { runtime, registry, db_pool: pool, llm_configured: false })
    }

    async fn database_fixture() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    async fn send_json(
        app: axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => Request::builder().method(method).uri(uri).body(Body::empty()).expect("request"),
        };

        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn lead_lifecycle_create_get_patch() {
        let (_dir, state) = empty_state(Some(database_fixture().await));
        let app = router(state, None);

        let (status, body) = send_json(
            app.clone(),
            "POST",
            "/api/leads",
            Some(json!({"customer_phone": "01001234567", "interest_level": "hot"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        let lead_id = body["lead_id"].as_i64().expect("lead id");

        // Same phone while still `new` is a duplicate, not a second row.
        let (status, body) = send_json(
            app.clone(),
            "POST",
            "/api/leads",
            Some(json!({"customer_phone": "01001234567"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["duplicate"], true);

        let (status, body) =
            send_json(app.clone(), "GET", &format!("/api/leads/{lead_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lead"]["interest_level"], "hot");
        assert_eq!(body["conversation_messages"].as_array().expect("messages").len(), 0);

        let (status, body) = send_json(
            app.clone(),
            "PATCH",
            &format!("/api/leads/{lead_id}"),
            Some(json!({"status": "contacted"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["lead"]["status"], "contacted");

        let (status, body) =
            send_json(app, "GET", "/api/leads?status=contacted", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
    }

    #[tokio::test]
    async fn lead_creation_requires_a_phone_number() {
        let (_dir, state) = empty_state(Some(database_fixture().await));
        let app = router(state, None);

        let (status, body) =
            send_json(app, "POST", "/api/leads", Some(json!({"customer_name": "Nameless"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn empty_patch_is_rejected() {
        let (_dir, state) = empty_state(Some(database_fixture().await));
        let app = router(state, None);

        let (status, body) = send_json(app, "PATCH", "/api/leads/1", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No fields to update");
    }

    #[tokio::test]
    async fn unknown_status_and_interest_values_are_rejected() {
        let (_dir, state) = empty_state(Some(database_fixture().await));
        let app = router(state, None);

        let (status, _) =
            send_json(app.clone(), "PATCH", "/api/leads/1", Some(json!({"status": "vanished"})))
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send_json(
            app,
            "PATCH",
            "/api/leads/1",
            Some(json!({"interest_level": "volcanic"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_lead_is_not_found() {
        let (_dir, state) = empty_state(Some(database_fixture().await));
        let app = router(state, None);

        let (status, _) = send_json(app.clone(), "GET", "/api/leads/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            send_json(app, "PATCH", "/api/leads/999", Some(json!({"notes": "x"}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn offline_storage_degrades_lists_and_blocks_writes() {
        let (_dir, state) = empty_state(None);
        let app = router(state, None);

        let (status, body) = send_json(app.clone(), "GET", "/api/leads", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["db_status"], "offline");

        let (status, _) = send_json(
            app.clone(),
            "POST",
            "/api/leads",
            Some(json!({"customer_phone": "01001234567"})),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send_json(app, "GET", "/api/leads/1", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn stats_serve_online_and_offline_shapes() {
        let (_dir, state) = empty_state(Some(database_fixture().await));
        let app = router(state, None);

        let (status, body) = send_json(app, "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["db_status"], "online");
        assert_eq!(body["summary"]["total_conversations"], 0);
        assert_eq!(body["summary"]["avg_confidence"], "N/A");

        let (_dir, state) = empty_state(None);
        let offline = router(state, None);
        let (status, body) = send_json(offline, "GET", "/api/stats", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["db_status"], "offline");
        assert_eq!(body["summary"]["escalation_rate"], "0%");
        assert_eq!(body["by_channel"]["chat"], 0);
        assert!(body["recent_activity"].as_array().expect("activity").is_empty());
    }
}
