use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::intent::{Intent, Language};

/// Closed enumeration of agent behaviors. Derived from the configured agent
/// name at load time; unrecognized names fall back to `Support` so routing
/// never dispatches on a raw string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Sales,
    Support,
    Warranty,
    Complaint,
    Escalation,
    Router,
}

impl AgentKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "sales" => Self::Sales,
            "warranty" => Self::Warranty,
            "complaint" => Self::Complaint,
            "escalation" => Self::Escalation,
            "router" => Self::Router,
            _ => Self::Support,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Support => "support",
            Self::Warranty => "warranty",
            Self::Complaint => "complaint",
            Self::Escalation => "escalation",
            Self::Router => "router",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default)]
    pub intent_keywords: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub intent_categories: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOutput {
    pub enabled: bool,
    pub max_length: usize,
    #[serde(default)]
    pub tone: BTreeMap<String, String>,
}

impl Default for TextOutput {
    fn default() -> Self {
        Self { enabled: true, max_length: 400, tone: BTreeMap::new() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleOutput {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllowedOutputs {
    #[serde(default)]
    pub text: TextOutput,
    #[serde(default)]
    pub product_card: ToggleOutput,
    #[serde(default = "enabled_toggle")]
    pub handover: ToggleOutput,
}

fn enabled_toggle() -> ToggleOutput {
    ToggleOutput { enabled: true }
}

impl Default for AllowedOutputs {
    fn default() -> Self {
        Self {
            text: TextOutput::default(),
            product_card: ToggleOutput::default(),
            handover: enabled_toggle(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationCondition {
    pub trigger: String,
    #[serde(default = "default_escalation_action")]
    pub action: String,
    #[serde(default = "default_escalation_priority")]
    pub priority: String,
}

fn default_escalation_action() -> String {
    "escalate_to_human".to_string()
}

fn default_escalation_priority() -> String {
    "medium".to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EscalationRules {
    #[serde(default)]
    pub conditions: Vec<EscalationCondition>,
    #[serde(default)]
    pub escalation_message: BTreeMap<String, String>,
}

/// Intent → agent-name mapping carried only by the distinguished router
/// profile. Every value must name a loaded agent or the default applies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingTable {
    pub intents: BTreeMap<String, String>,
    pub default_agent: String,
}

impl RoutingTable {
    pub fn target_for(&self, intent: Intent) -> &str {
        self.target_for_label(intent.as_str())
    }

    pub fn target_for_label(&self, label: &str) -> &str {
        self.intents.get(label).map(String::as_str).unwrap_or(&self.default_agent)
    }
}

/// Canonical, normalized agent configuration. Loader output; read-only at
/// runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub kind: AgentKind,
    pub description: String,
    pub role: String,
    pub version: String,
    pub status: String,
    pub supported_channels: Vec<String>,
    pub supported_languages: Vec<String>,
    pub triggers: Triggers,
    pub allowed_outputs: AllowedOutputs,
    pub allowed_actions: Vec<String>,
    pub forbidden_actions: Vec<String>,
    pub escalation_rules: EscalationRules,
    pub response_templates: BTreeMap<String, BTreeMap<String, String>>,
    pub notes: Vec<String>,
    #[serde(default)]
    pub extras: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingTable>,
}

impl AgentProfile {
    /// Minimal support profile used when the registry has nothing to offer,
    /// so a turn can still be answered in degraded mode.
    pub fn fallback_support() -> Self {
        Self {
            name: "support".to_string(),
            kind: AgentKind::Support,
            description: "a customer support agent for Nouma Mattresses (نوما للمراتب)"
                .to_string(),
            role: "Default support agent".to_string(),
            version: "0.0.0".to_string(),
            status: "fallback".to_string(),
            supported_channels: vec!["chat".to_string()],
            supported_languages: vec!["ar".to_string(), "en".to_string()],
            triggers: Triggers::default(),
            allowed_outputs: AllowedOutputs::default(),
            allowed_actions: Vec::new(),
            forbidden_actions: Vec::new(),
            escalation_rules: EscalationRules::default(),
            response_templates: BTreeMap::new(),
            notes: Vec::new(),
            extras: BTreeMap::new(),
            routing: None,
        }
    }

    pub fn tone(&self, language: Language) -> Option<&str> {
        self.allowed_outputs
            .text
            .tone
            .get(language.as_str())
            .map(String::as_str)
            .filter(|tone| !tone.is_empty())
    }

    /// Localized template text with the same fallback order the widget
    /// expects: requested language, then Arabic, then English.
    pub fn template_text(&self, key: &str, language: Language) -> Option<&str> {
        let template = self.response_templates.get(key)?;
        template
            .get(language.as_str())
            .or_else(|| template.get("ar"))
            .or_else(|| template.get("en"))
            .map(String::as_str)
    }

    pub fn escalation_message(&self, language: Language) -> Option<&str> {
        let messages = &self.escalation_rules.escalation_message;
        messages
            .get(language.as_str())
            .or_else(|| messages.get("ar"))
            .or_else(|| messages.get("en"))
            .map(String::as_str)
            .filter(|message| !message.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{AgentKind, AgentProfile, RoutingTable};
    use crate::domain::intent::{Intent, Language};

    #[test]
    fn unknown_agent_names_fall_back_to_support() {
        assert_eq!(AgentKind::from_name("sales"), AgentKind::Sales);
        assert_eq!(AgentKind::from_name("Escalation"), AgentKind::Escalation);
        assert_eq!(AgentKind::from_name("concierge"), AgentKind::Support);
        assert_eq!(AgentKind::from_name(""), AgentKind::Support);
    }

    #[test]
    fn routing_table_falls_back_to_default_agent() {
        let mut intents = BTreeMap::new();
        intents.insert("DELIVERY".to_string(), "support".to_string());
        let table = RoutingTable { intents, default_agent: "support".to_string() };

        assert_eq!(table.target_for(Intent::Delivery), "support");
        assert_eq!(table.target_for(Intent::Warranty), "support");
    }

    #[test]
    fn template_text_prefers_requested_language() {
        let mut profile = AgentProfile::fallback_support();
        let mut translations = BTreeMap::new();
        translations.insert("ar".to_string(), "أهلاً".to_string());
        translations.insert("en".to_string(), "Welcome".to_string());
        profile.response_templates.insert("greeting".to_string(), translations);

        assert_eq!(profile.template_text("greeting", Language::En), Some("Welcome"));
        assert_eq!(profile.template_text("greeting", Language::Ar), Some("أهلاً"));
        assert_eq!(profile.template_text("missing", Language::En), None);
    }
}
