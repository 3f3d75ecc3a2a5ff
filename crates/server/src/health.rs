use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::bootstrap::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub llm: HealthCheck,
    pub checked_at: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Liveness plus collaborator flags. The service answers turns without a
/// database or model, so a degraded collaborator never fails this check;
/// the payload carries the detail instead.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = database_check(&state).await;
    let llm = llm_check(&state);
    let status = if database.status == "ready" { "ready" } else { "degraded" };

    Json(HealthResponse {
        status,
        service: HealthCheck {
            status: "ready",
            detail: "nouma-server runtime initialized".to_string(),
        },
        database,
        llm,
        checked_at: Utc::now().to_rfc3339(),
    })
}

async fn database_check(state: &AppState) -> HealthCheck {
    let Some(pool) = &state.db_pool else {
        return HealthCheck {
            status: "offline",
            detail: "running without persistence".to_string(),
        };
    };

    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn llm_check(state: &AppState) -> HealthCheck {
    if state.llm_configured {
        HealthCheck { status: "ready", detail: "generative tier configured".to_string() }
    } else {
        HealthCheck {
            status: "offline",
            detail: "keyword-only mode (no llm credentials)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::State;
    use axum::Json;
    use tempfile::TempDir;

    use nouma_agent::{AgentRegistry, ChatRuntime, RuntimePolicy};
    use nouma_db::{connect_with_settings, DbPool};

    use super::health;
    use crate::bootstrap::AppState;

    fn state_with(pool: Option<DbPool>) -> (TempDir, AppState) {
        let dir = TempDir::new().expect("temp dir");
        let (registry, _) = AgentRegistry::load(dir.path());
        let registry = Arc::new(registry);
        let runtime =
            Arc::new(ChatRuntime::new(Arc::clone(&registry), RuntimePolicy::default()));
        (dir, AppState { runtime, registry, db_pool: pool, llm_configured: false })
    }

    #[tokio::test]
    async fn health_is_ready_with_a_reachable_database() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        let (_dir, state) = state_with(Some(pool));

        let Json(payload) = health(State(state)).await;

        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert_eq!(payload.llm.status, "offline");
    }

    #[tokio::test]
    async fn health_degrades_without_a_store_but_stays_alive() {
        let (_dir, state) = state_with(None);

        let Json(payload) = health(State(state)).await;

        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "offline");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_reports_a_closed_pool_as_degraded() {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;
        let (_dir, state) = state_with(Some(pool));

        let Json(payload) = health(State(state)).await;

        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
    }
}
