//! Application assembly.
//!
//! Every collaborator is optional: a failed database connection, a missing
//! LLM api key, or an absent webhook URL degrade the pipeline instead of
//! failing startup. Only an invalid configuration aborts.

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use thiserror::Error;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use nouma_agent::{AgentRegistry, ChatRuntime, LlmClient, RuntimePolicy, TurnNotifier};
use nouma_core::config::{AppConfig, ConfigError, LoadOptions};
use nouma_core::ChatStore;
use nouma_db::{connect_with_settings, migrations, seed_demo_catalog, DbPool, SqlChatStore};

use crate::llm::OpenAiClient;
use crate::notify::CrmWebhookNotifier;
use crate::{admin, chat, crm, health};

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ChatRuntime>,
    pub registry: Arc<AgentRegistry>,
    pub db_pool: Option<DbPool>,
    pub llm_configured: bool,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    Ok(bootstrap_with_config(config, false).await)
}

pub async fn bootstrap_with_config(config: AppConfig, seed_demo: bool) -> Application {
    let db_pool = connect_database(&config, seed_demo).await;

    let (registry, summary) = AgentRegistry::load(&config.agents.dir);
    let registry = Arc::new(registry);
    if summary.loaded == 0 {
        warn!(
            dir = %config.agents.dir.display(),
            "no agent documents loaded, turns will use the built-in support fallback"
        );
    }

    let llm_client: Option<Arc<dyn LlmClient>> = if config.llm.generative_available() {
        match OpenAiClient::from_config(&config.llm) {
            Ok(client) => {
                info!(model = %config.llm.model, "generative tier enabled");
                Some(Arc::new(client))
            }
            Err(error) => {
                warn!(%error, "llm client construction failed, running keyword-only");
                None
            }
        }
    } else {
        info!("no llm credentials configured, running keyword-only");
        None
    };
    let llm_configured = llm_client.is_some();

    let notifier: Option<Arc<dyn TurnNotifier>> = match &config.crm.webhook_url {
        Some(url) => {
            info!("crm webhook notifier enabled");
            Some(Arc::new(CrmWebhookNotifier::new(url.clone())))
        }
        None => None,
    };

    let policy = RuntimePolicy {
        max_message_chars: config.chat.max_message_chars,
        history_limit: config.chat.history_limit,
        post_escalation: config.agents.post_escalation,
    };

    let mut runtime = ChatRuntime::new(Arc::clone(&registry), policy);
    if let Some(pool) = &db_pool {
        runtime = runtime.with_store(Arc::new(SqlChatStore::new(pool.clone())) as Arc<dyn ChatStore>);
    }
    if let Some(llm) = &llm_client {
        runtime = runtime.with_llm(Arc::clone(llm));
    }
    if let Some(notifier) = &notifier {
        runtime = runtime.with_notifier(Arc::clone(notifier));
    }

    let state =
        AppState { runtime: Arc::new(runtime), registry, db_pool, llm_configured };
    Application { config, state }
}

/// Connects and migrates, or returns `None` so the server starts without a
/// store. The outage is surfaced through `/health` and `db_status` fields.
async fn connect_database(config: &AppConfig, seed_demo: bool) -> Option<DbPool> {
    let pool = match connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    {
        Ok(pool) => pool,
        Err(error) => {
            warn!(%error, "database connection failed, starting without persistence");
            return None;
        }
    };

    if let Err(error) = migrations::run_pending(&pool).await {
        warn!(%error, "database migration failed, starting without persistence");
        return None;
    }
    info!("database connected and migrated");

    if seed_demo {
        match seed_demo_catalog(&pool).await {
            Ok(summary) => info!(
                products = summary.products,
                delivery_rules = summary.delivery_rules,
                "demo catalog seeded"
            ),
            Err(error) => warn!(%error, "demo catalog seeding failed"),
        }
    }

    Some(pool)
}

pub fn router(state: AppState, widget_dir: Option<&Path>) -> Router {
    let api = Router::new().merge(chat::router()).merge(crm::router()).merge(admin::router());

    let mut app =
        Router::new().nest("/api", api).merge(health::router()).with_state(state);
    if let Some(dir) = widget_dir {
        app = app.nest_service("/widget", ServeDir::new(dir));
    }
    app
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use nouma_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use super::{bootstrap, bootstrap_with_config};

    fn file_db_options(dir: &TempDir) -> LoadOptions {
        let path = dir.path().join("nouma-test.db");
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(format!("sqlite://{}", path.display())),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_connects_and_migrates() {
        let dir = TempDir::new().expect("temp dir");
        let app = bootstrap(file_db_options(&dir)).await.expect("bootstrap");

        let pool = app.state.db_pool.as_ref().expect("pool");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'conversations'",
        )
        .fetch_one(pool)
        .await
        .expect("table check");
        assert_eq!(count, 1);
        assert!(!app.state.llm_configured, "no api key means keyword-only");
        pool.close().await;
    }

    #[tokio::test]
    async fn unreachable_database_degrades_instead_of_failing() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite:///definitely/not/writable/nouma.db".to_string();

        let app = bootstrap_with_config(config, false).await;
        assert!(app.state.db_pool.is_none(), "startup must survive a database outage");
    }

    #[tokio::test]
    async fn seed_demo_populates_the_catalog() {
        let dir = TempDir::new().expect("temp dir");
        let config = AppConfig::load(file_db_options(&dir)).expect("config");
        let app = bootstrap_with_config(config, true).await;

        let pool = app.state.db_pool.as_ref().expect("pool");
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(pool)
            .await
            .expect("count products");
        assert!(count > 0, "demo seed should insert products");
        pool.close().await;
    }
}
