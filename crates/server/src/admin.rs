//! Administrative views over the agent registry: listing, per-section
//! config reads, hot reload, and the intent-routing probe.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use nouma_core::AgentProfile;

use crate::bootstrap::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/reload", post(reload_agents))
        .route("/agents/route", post(route_intent))
        .route("/agents/{name}", get(get_agent))
        .route("/agents/{name}/config", get(get_agent_config))
        .route("/agents/{name}/triggers", get(get_agent_triggers))
        .route("/agents/{name}/escalation", get(get_agent_escalation))
        .route("/agents/{name}/templates", get(get_agent_templates))
}

fn agent_not_found(state: &AppState, name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": format!("Agent '{name}' not found"),
            "available_agents": state.registry.agent_names(),
        })),
    )
        .into_response()
}

fn profile_value(profile: &AgentProfile) -> Map<String, Value> {
    match serde_json::to_value(profile) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

async fn list_agents(State(state): State<AppState>) -> Json<Value> {
    let agents: Vec<Value> = state
        .registry
        .all()
        .iter()
        .map(|profile| {
            json!({
                "name": profile.name,
                "role": profile.role,
                "status": profile.status,
                "supported_channels": profile.supported_channels,
                "supported_languages": profile.supported_languages,
            })
        })
        .collect();

    Json(json!({"success": true, "count": agents.len(), "agents": agents}))
}

async fn get_agent(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.registry.get(&name) {
        Some(profile) => Json(profile.as_ref().clone()).into_response(),
        None => agent_not_found(&state, &name),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigQuery {
    section: Option<String>,
}

async fn get_agent_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<ConfigQuery>,
) -> Response {
    let Some(profile) = state.registry.get(&name) else {
        return agent_not_found(&state, &name);
    };
    let fields = profile_value(&profile);

    if let Some(section) = query.section {
        let mut result = Map::new();
        result.insert("name".to_string(), Value::String(profile.name.clone()));
        for key in section.split(',').map(str::trim).filter(|key| !key.is_empty()) {
            if let Some(value) = fields.get(key) {
                result.insert(key.to_string(), value.clone());
            }
        }
        return Json(Value::Object(result)).into_response();
    }

    Json(json!({
        "name": profile.name,
        "role": profile.role,
        "allowed_outputs": profile.allowed_outputs,
        "allowed_actions": profile.allowed_actions,
        "forbidden_actions": profile.forbidden_actions,
        "escalation_rules": profile.escalation_rules,
        "response_templates": profile.response_templates,
    }))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct TriggersQuery {
    language: Option<String>,
}

async fn get_agent_triggers(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<TriggersQuery>,
) -> Response {
    let Some(profile) = state.registry.get(&name) else {
        return agent_not_found(&state, &name);
    };

    if let Some(language) = query.language {
        let keywords = profile
            .triggers
            .intent_keywords
            .get(&language)
            .cloned()
            .unwrap_or_default();
        return Json(json!({
            "name": profile.name,
            "language": language,
            "keywords": keywords,
            "intent_categories": profile.triggers.intent_categories,
        }))
        .into_response();
    }

    Json(json!({"name": profile.name, "triggers": profile.triggers})).into_response()
}

async fn get_agent_escalation(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    let Some(profile) = state.registry.get(&name) else {
        return agent_not_found(&state, &name);
    };

    Json(json!({
        "name": profile.name,
        "escalation_rules": profile.escalation_rules,
        "routing_queues": profile.extras.get("routing_queues"),
        "de_escalation_phrases": profile.extras.get("de_escalation_phrases"),
    }))
    .into_response()
}

#[derive(Debug, Default, Deserialize)]
struct TemplatesQuery {
    template: Option<String>,
    language: Option<String>,
}

async fn get_agent_templates(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<TemplatesQuery>,
) -> Response {
    let Some(profile) = state.registry.get(&name) else {
        return agent_not_found(&state, &name);
    };

    if let Some(template) = query.template {
        let Some(translations) = profile.response_templates.get(&template) else {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "success": false,
                    "error": format!("Template '{template}' not found for agent '{name}'"),
                })),
            )
                .into_response();
        };

        if let Some(language) = query.language {
            if let Some(text) = translations.get(&language) {
                return Json(json!({
                    "name": profile.name,
                    "template": template,
                    "language": language,
                    "text": text,
                }))
                .into_response();
            }
        }

        return Json(json!({
            "name": profile.name,
            "template": template,
            "content": translations,
        }))
        .into_response();
    }

    Json(json!({"name": profile.name, "response_templates": profile.response_templates}))
        .into_response()
}

async fn reload_agents(State(state): State<AppState>) -> Json<Value> {
    let summary = state.registry.reload();
    Json(json!({
        "success": true,
        "message": "Agents reloaded successfully",
        "loaded": summary.loaded,
        "skipped": summary.skipped,
        "agents": summary.agents,
    }))
}

#[derive(Debug, Deserialize)]
struct RouteRequest {
    intent: Option<String>,
}

/// Routing probe: resolves an intent label exactly the way a live turn
/// would, including the default-agent fallback for unmapped labels.
async fn route_intent(
    State(state): State<AppState>,
    Json(request): Json<RouteRequest>,
) -> Response {
    let Some(intent) = request.intent.filter(|intent| !intent.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "error": "Missing required field: intent"})),
        )
            .into_response();
    };

    match state.registry.route_by_label(&intent) {
        Some(profile) => Json(json!({
            "success": true,
            "intent": intent,
            "agent": profile.name,
        }))
        .into_response(),
        None => Json(json!({
            "success": true,
            "intent": intent,
            "agent": "support",
            "note": "no router loaded, defaulting to support",
        }))
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use nouma_agent::{AgentRegistry, ChatRuntime, RuntimePolicy};

    use crate::bootstrap::{router, AppState};

    fn agents_fixture() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        fs::write(
            dir.path().join("router.agent.json"),
            r#"{
                "name": "router",
                "intents": {"DELIVERY": "support", "SALES_PRICE": "sales"},
                "default_agent": "support"
            }"#,
        )
        .expect("write router");
        fs::write(
            dir.path().join("sales.agent.json"),
            r#"{
                "name": "sales",
                "role": "Sales assistant",
                "allowed_actions": ["quote catalog prices"],
                "triggers": {"intent_keywords": {"en": ["price"], "ar": ["سعر"]}},
                "response_templates": {
                    "ask_for_size": {"en": "Which size do you need?", "ar": "محتاج مقاس كام؟"}
                },
                "routing_queues": {"bulk": "b2b-desk"}
            }"#,
        )
        .expect("write sales");
        fs::write(dir.path().join("support.agent.json"), r#"{"name": "support"}"#)
            .expect("write support");
        dir
    }

    fn state_for(dir: &TempDir) -> AppState {
        let (registry, _) = AgentRegistry::load(dir.path());
        let registry = Arc::new(registry);
        let runtime =
            Arc::new(ChatRuntime::new(Arc::clone(&registry), RuntimePolicy::default()));
        AppState { runtime, registry, db_pool: None, llm_configured: false }
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
    async fn agents_are_listed_with_summaries() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        let (status, body) = send_json(app, "GET", "/api/agents", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        let names: Vec<&str> = body["agents"]
            .as_array()
            .expect("agents")
            .iter()
            .map(|agent| agent["name"].as_str().expect("name"))
            .collect();
        assert!(names.contains(&"router"));
        assert!(names.contains(&"sales"));
    }

    #[tokio::test]
    async fn unknown_agent_lists_available_names() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        let (status, body) = send_json(app, "GET", "/api/agents/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["available_agents"].as_array().expect("names").len() >= 3);
    }

    #[tokio::test]
    async fn config_supports_section_filtering() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        let (status, body) = send_json(app.clone(), "GET", "/api/agents/sales/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "Sales assistant");
        assert!(body.get("allowed_outputs").is_some());

        let (status, body) =
            send_json(app, "GET", "/api/agents/sales/config?section=allowed_actions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["allowed_actions"][0], "quote catalog prices");
        assert!(body.get("allowed_outputs").is_none(), "unrequested sections are omitted");
    }

    #[tokio::test]
    async fn triggers_filter_by_language() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        let (status, body) =
            send_json(app, "GET", "/api/agents/sales/triggers?language=ar", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["language"], "ar");
        assert_eq!(body["keywords"][0], "سعر");
    }

    #[tokio::test]
    async fn templates_resolve_by_key_and_language() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        let (status, body) = send_json(
            app.clone(),
            "GET",
            "/api/agents/sales/templates?template=ask_for_size&language=en",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text"], "Which size do you need?");

        let (status, _) = send_json(
            app,
            "GET",
            "/api/agents/sales/templates?template=missing",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn escalation_view_exposes_extras() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        let (status, body) = send_json(app, "GET", "/api/agents/sales/escalation", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["routing_queues"]["bulk"], "b2b-desk");
    }

    #[tokio::test]
    async fn reload_picks_up_new_documents() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        fs::write(dir.path().join("warranty.agent.json"), r#"{"name": "warranty"}"#)
            .expect("write warranty");

        let (status, body) = send_json(app.clone(), "POST", "/api/agents/reload", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loaded"], 4);

        let (status, _) = send_json(app, "GET", "/api/agents/warranty", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn routing_probe_matches_live_routing() {
        let dir = agents_fixture();
        let app = router(state_for(&dir), None);

        let (status, body) = send_json(
            app.clone(),
            "POST",
            "/api/agents/route",
            Some(json!({"intent": "SALES_PRICE"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent"], "sales");

        // Unmapped labels fall through to the router's default agent.
        let (status, body) = send_json(
            app.clone(),
            "POST",
            "/api/agents/route",
            Some(json!({"intent": "WARRANTY"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent"], "support");

        let (status, _) =
            send_json(app, "POST", "/api/agents/route", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
