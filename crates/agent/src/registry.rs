//! Agent configuration registry.
//!
//! Loads every `*.agent.json` document from the configured directory,
//! normalizes the two historical document shapes into the canonical
//! [`AgentProfile`], and indexes profiles by name. A document that fails to
//! parse is skipped with a warning; a partial load never aborts.
//!
//! The registry is the one process-wide mutable structure shared across
//! concurrent requests. Reload builds a complete replacement table off to
//! the side and publishes it with a single pointer swap, so readers observe
//! either the old table or the fully-new one, never a half-cleared state.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use nouma_core::domain::agent::{
    AgentKind, AgentProfile, AllowedOutputs, EscalationCondition, EscalationRules, RoutingTable,
    Triggers,
};
use nouma_core::Intent;

const AGENT_FILE_SUFFIX: &str = ".agent.json";
const DEFAULT_ROUTER_FALLBACK: &str = "support";

#[derive(Debug, Error)]
enum DocumentError {
    #[error("document has neither `name` nor `agent_name`")]
    MissingName,
    #[error("invalid document: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Outcome of a load or reload pass, reported by the admin API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
    pub agents: Vec<String>,
}

#[derive(Default)]
struct RegistryTable {
    agents: BTreeMap<String, Arc<AgentProfile>>,
    router: Option<Arc<AgentProfile>>,
}

pub struct AgentRegistry {
    agents_dir: PathBuf,
    table: RwLock<Arc<RegistryTable>>,
}

impl AgentRegistry {
    /// Builds the registry and performs the initial load. A missing or
    /// unreadable directory degrades to an empty registry with a warning.
    pub fn load(agents_dir: impl Into<PathBuf>) -> (Self, LoadSummary) {
        let registry = Self {
            agents_dir: agents_dir.into(),
            table: RwLock::new(Arc::new(RegistryTable::default())),
        };
        let summary = registry.reload();
        (registry, summary)
    }

    /// Clears and reloads synchronously. Safe to call concurrently with
    /// in-flight reads; the new table is published atomically.
    pub fn reload(&self) -> LoadSummary {
        let (table, summary) = build_table(&self.agents_dir);
        self.publish(Arc::new(table));
        info!(
            loaded = summary.loaded,
            skipped = summary.skipped,
            agents = %summary.agents.join(","),
            "agent registry loaded"
        );
        summary
    }

    pub fn get(&self, name: &str) -> Option<Arc<AgentProfile>> {
        self.snapshot().agents.get(name).cloned()
    }

    pub fn agent_names(&self) -> Vec<String> {
        self.snapshot().agents.keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<AgentProfile>> {
        self.snapshot().agents.values().cloned().collect()
    }

    /// Resolves an intent through the router's mapping, falling back to the
    /// router's default agent for unmapped intents. Returns `None` when no
    /// router is loaded or the mapped name is unknown; callers must treat
    /// that as "no agent available" and substitute `support`.
    pub fn route_by_intent(&self, intent: Intent) -> Option<Arc<AgentProfile>> {
        self.route_by_label(intent.as_str())
    }

    /// Raw-label variant used by the routing probe endpoint. A label absent
    /// from the router's map resolves to the default agent, like any other
    /// unmapped intent.
    pub fn route_by_label(&self, label: &str) -> Option<Arc<AgentProfile>> {
        let table = self.snapshot();
        let router = table.router.as_ref()?;
        let routing = router.routing.as_ref()?;
        table.agents.get(routing.target_for_label(label)).cloned()
    }

    fn snapshot(&self) -> Arc<RegistryTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn publish(&self, table: Arc<RegistryTable>) {
        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }
}

fn build_table(agents_dir: &Path) -> (RegistryTable, LoadSummary) {
    let mut table = RegistryTable::default();
    let mut skipped = 0usize;

    let entries = match fs::read_dir(agents_dir) {
        Ok(entries) => entries,
        Err(error) => {
            warn!(dir = %agents_dir.display(), %error, "agents directory unavailable, registry is empty");
            let summary = LoadSummary { loaded: 0, skipped: 0, agents: Vec::new() };
            return (table, summary);
        }
    };

    let mut paths = entries
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(AGENT_FILE_SUFFIX))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    paths.sort();

    for path in paths {
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) => {
                warn!(file = %path.display(), %error, "skipping unreadable agent document");
                skipped += 1;
                continue;
            }
        };

        let mut profile = match parse_document(&raw) {
            Ok(profile) => profile,
            Err(error) => {
                warn!(file = %path.display(), %error, "skipping invalid agent document");
                skipped += 1;
                continue;
            }
        };

        if profile.routing.is_some() {
            if table.router.is_some() {
                warn!(
                    agent = %profile.name,
                    "ignoring routing table: another agent already carries one"
                );
                profile.routing = None;
            }
        }

        let profile = Arc::new(profile);
        if profile.routing.is_some() {
            table.router = Some(Arc::clone(&profile));
        }
        table.agents.insert(profile.name.clone(), profile);
    }

    let agents = table.agents.keys().cloned().collect::<Vec<_>>();
    let summary = LoadSummary { loaded: agents.len(), skipped, agents };
    (table, summary)
}

/// Parses one document, dispatching on which name key it carries. The two
/// historical shapes are distinct input variants with their own mapping
/// functions; there is no scattered optional-field defaulting elsewhere.
fn parse_document(raw: &str) -> Result<AgentProfile, DocumentError> {
    let value: Value = serde_json::from_str(raw)?;

    if value.get("name").and_then(Value::as_str).is_some() {
        let document: ModernAgentDocument = serde_json::from_value(value)?;
        Ok(normalize_modern(document))
    } else if value.get("agent_name").and_then(Value::as_str).is_some() {
        let document: LegacyAgentDocument = serde_json::from_value(value)?;
        Ok(normalize_legacy(document))
    } else {
        Err(DocumentError::MissingName)
    }
}

/// Current document shape, keyed by `name`.
#[derive(Debug, Deserialize)]
struct ModernAgentDocument {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    supported_channels: Option<Vec<String>>,
    #[serde(default)]
    supported_languages: Option<Vec<String>>,
    #[serde(default)]
    triggers: Option<Triggers>,
    #[serde(default)]
    allowed_outputs: Option<AllowedOutputs>,
    #[serde(default)]
    allowed_actions: Vec<String>,
    #[serde(default)]
    forbidden_actions: Vec<String>,
    #[serde(default)]
    escalation_rules: Option<EscalationRules>,
    #[serde(default)]
    response_templates: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    notes: Vec<String>,
    #[serde(default)]
    intents: Option<BTreeMap<String, String>>,
    #[serde(default)]
    default_agent: Option<String>,
    #[serde(flatten)]
    extras: BTreeMap<String, Value>,
}

/// Historical document shape, keyed by `agent_name`, with bare-string
/// escalation conditions and a flat `messages` map.
#[derive(Debug, Deserialize)]
struct LegacyAgentDocument {
    agent_name: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    supported_channels: Option<Vec<String>>,
    #[serde(default)]
    supported_languages: Option<Vec<String>>,
    #[serde(default)]
    allowed_actions: Vec<String>,
    #[serde(default)]
    forbidden_actions: Vec<String>,
    #[serde(default)]
    escalation_conditions: Vec<String>,
    #[serde(default)]
    messages: BTreeMap<String, String>,
    #[serde(default)]
    response_templates: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    notes: Vec<String>,
    #[serde(default)]
    intents: Option<BTreeMap<String, String>>,
    #[serde(default)]
    default_agent: Option<String>,
    #[serde(flatten)]
    extras: BTreeMap<String, Value>,
}

fn default_channels() -> Vec<String> {
    vec!["chat".to_string(), "voice".to_string(), "whatsapp".to_string()]
}

fn default_languages() -> Vec<String> {
    vec!["ar".to_string(), "en".to_string()]
}

fn routing_table(
    name: &str,
    intents: Option<BTreeMap<String, String>>,
    default_agent: Option<String>,
) -> Option<RoutingTable> {
    if AgentKind::from_name(name) != AgentKind::Router {
        return None;
    }
    intents.map(|intents| RoutingTable {
        intents,
        default_agent: default_agent.unwrap_or_else(|| DEFAULT_ROUTER_FALLBACK.to_string()),
    })
}

fn normalize_modern(document: ModernAgentDocument) -> AgentProfile {
    let routing = routing_table(&document.name, document.intents, document.default_agent);
    let description = document.description.or(document.role.clone()).unwrap_or_default();
    let role = document.role.unwrap_or_else(|| description.clone());

    AgentProfile {
        kind: AgentKind::from_name(&document.name),
        name: document.name,
        description,
        role,
        version: document.version.unwrap_or_else(|| "1.0.0".to_string()),
        status: document.status.unwrap_or_else(|| "active".to_string()),
        supported_channels: document.supported_channels.unwrap_or_else(default_channels),
        supported_languages: document.supported_languages.unwrap_or_else(default_languages),
        triggers: document.triggers.unwrap_or_default(),
        allowed_outputs: document.allowed_outputs.unwrap_or_default(),
        allowed_actions: document.allowed_actions,
        forbidden_actions: document.forbidden_actions,
        escalation_rules: document.escalation_rules.unwrap_or_default(),
        response_templates: document.response_templates,
        notes: document.notes,
        extras: document.extras,
        routing,
    }
}

fn normalize_legacy(document: LegacyAgentDocument) -> AgentProfile {
    let routing = routing_table(&document.agent_name, document.intents, document.default_agent);
    let role = document.role.unwrap_or_default();
    let conditions = document
        .escalation_conditions
        .into_iter()
        .map(|trigger| EscalationCondition {
            trigger,
            action: "escalate_to_human".to_string(),
            priority: "medium".to_string(),
        })
        .collect();

    AgentProfile {
        kind: AgentKind::from_name(&document.agent_name),
        name: document.agent_name,
        description: role.clone(),
        role,
        version: document.version.unwrap_or_else(|| "1.0.0".to_string()),
        status: document.status.unwrap_or_else(|| "active".to_string()),
        supported_channels: document.supported_channels.unwrap_or_else(default_channels),
        supported_languages: document.supported_languages.unwrap_or_else(default_languages),
        triggers: Triggers::default(),
        allowed_outputs: AllowedOutputs::default(),
        allowed_actions: document.allowed_actions,
        forbidden_actions: document.forbidden_actions,
        escalation_rules: EscalationRules {
            conditions,
            escalation_message: document.messages,
        },
        response_templates: document.response_templates,
        notes: document.notes,
        extras: document.extras,
        routing,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use nouma_core::{AgentKind, Intent, Language};
    use tempfile::TempDir;

    use super::{parse_document, AgentRegistry};

    fn write_agent(dir: &TempDir, file: &str, contents: &str) {
        fs::write(dir.path().join(file), contents).expect("write agent document");
    }

    fn seed_minimal_fleet(dir: &TempDir) {
        write_agent(
            dir,
            "router.agent.json",
            r#"{
                "name": "router",
                "intents": {"DELIVERY": "support", "SALES_PRICE": "sales"},
                "default_agent": "support"
            }"#,
        );
        write_agent(dir, "support.agent.json", r#"{"name": "support", "role": "support"}"#);
        write_agent(dir, "sales.agent.json", r#"{"name": "sales", "role": "sales"}"#);
    }

    #[test]
    fn load_indexes_agents_and_routes_by_intent() {
        let dir = TempDir::new().expect("temp dir");
        seed_minimal_fleet(&dir);

        let (registry, summary) = AgentRegistry::load(dir.path());
        assert_eq!(summary.loaded, 3);
        assert_eq!(summary.skipped, 0);

        let routed = registry.route_by_intent(Intent::Delivery).expect("routed agent");
        assert_eq!(routed.name, "support");

        let routed = registry.route_by_intent(Intent::SalesPrice).expect("routed agent");
        assert_eq!(routed.name, "sales");
    }

    #[test]
    fn unmapped_intent_falls_back_to_default_agent() {
        let dir = TempDir::new().expect("temp dir");
        seed_minimal_fleet(&dir);

        let (registry, _) = AgentRegistry::load(dir.path());
        let routed = registry.route_by_intent(Intent::Warranty).expect("default agent");
        assert_eq!(routed.name, "support");
    }

    #[test]
    fn routing_without_router_yields_none() {
        let dir = TempDir::new().expect("temp dir");
        write_agent(&dir, "support.agent.json", r#"{"name": "support"}"#);

        let (registry, _) = AgentRegistry::load(dir.path());
        assert!(registry.route_by_intent(Intent::Delivery).is_none());
    }

    #[test]
    fn routing_to_unknown_agent_name_yields_none() {
        let dir = TempDir::new().expect("temp dir");
        write_agent(
            &dir,
            "router.agent.json",
            r#"{"name": "router", "intents": {"DELIVERY": "ghost"}, "default_agent": "ghost"}"#,
        );

        let (registry, _) = AgentRegistry::load(dir.path());
        assert!(registry.route_by_intent(Intent::Delivery).is_none());
    }

    #[test]
    fn invalid_documents_are_skipped_not_fatal() {
        let dir = TempDir::new().expect("temp dir");
        seed_minimal_fleet(&dir);
        write_agent(&dir, "broken.agent.json", "{not json");
        write_agent(&dir, "nameless.agent.json", r#"{"role": "mystery"}"#);

        let (registry, summary) = AgentRegistry::load(dir.path());
        assert_eq!(summary.loaded, 3);
        assert_eq!(summary.skipped, 2);
        assert!(registry.get("support").is_some());
    }

    #[test]
    fn missing_directory_degrades_to_empty_registry() {
        let (registry, summary) = AgentRegistry::load("/definitely/not/here");
        assert_eq!(summary.loaded, 0);
        assert!(registry.agent_names().is_empty());
        assert!(registry.route_by_intent(Intent::Greeting).is_none());
    }

    #[test]
    fn legacy_documents_normalize_into_canonical_shape() {
        let profile = parse_document(
            r#"{
                "agent_name": "warranty",
                "role": "warranty desk",
                "escalation_conditions": ["claim disputed"],
                "messages": {"ar": "ثواني", "en": "One moment"}
            }"#,
        )
        .expect("legacy parse");

        assert_eq!(profile.name, "warranty");
        assert_eq!(profile.kind, AgentKind::Warranty);
        assert_eq!(profile.description, "warranty desk");
        assert_eq!(profile.escalation_rules.conditions.len(), 1);
        assert_eq!(profile.escalation_rules.conditions[0].trigger, "claim disputed");
        assert_eq!(profile.escalation_rules.conditions[0].priority, "medium");
        assert_eq!(profile.escalation_message(Language::En), Some("One moment"));
    }

    #[test]
    fn second_routing_table_is_ignored_with_first_kept() {
        let dir = TempDir::new().expect("temp dir");
        seed_minimal_fleet(&dir);
        // Sorted after router.agent.json; its table must not displace the
        // first one.
        write_agent(
            &dir,
            "router2.agent.json",
            r#"{"name": "router", "intents": {"DELIVERY": "sales"}, "default_agent": "sales"}"#,
        );

        let (registry, _) = AgentRegistry::load(dir.path());
        let routed = registry.route_by_intent(Intent::Delivery).expect("routed agent");
        // router2 re-registers the `router` name but the routing table from
        // the first file stays authoritative for this load.
        assert_eq!(routed.name, "support");
    }

    #[test]
    fn reload_swaps_in_new_table_atomically() {
        let dir = TempDir::new().expect("temp dir");
        seed_minimal_fleet(&dir);

        let (registry, _) = AgentRegistry::load(dir.path());
        assert_eq!(registry.agent_names().len(), 3);

        write_agent(&dir, "complaint.agent.json", r#"{"name": "complaint"}"#);
        let summary = registry.reload();

        assert_eq!(summary.loaded, 4);
        assert!(registry.get("complaint").is_some());
        // Routing still works after the swap.
        assert_eq!(registry.route_by_intent(Intent::Delivery).expect("routed").name, "support");
    }

    #[test]
    fn extras_carry_agent_specific_fields() {
        let profile = parse_document(
            r#"{
                "name": "support",
                "delivery_info": {"free_delivery_threshold_egp": 5000}
            }"#,
        )
        .expect("parse");

        assert!(profile.extras.contains_key("delivery_info"));
    }
}
