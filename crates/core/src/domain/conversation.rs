use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::intent::{Intent, Language};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Customer,
    Bot,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Bot => "bot",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(Self::Customer),
            "bot" => Some(Self::Bot),
            _ => None,
        }
    }
}

/// One chat session, keyed by an opaque client-supplied (or generated)
/// session id. Created on the first message and mutated on every turn;
/// never deleted by this core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub session_id: String,
    pub channel: String,
    pub language: Language,
    pub status: ConversationStatus,
    pub assigned_agent: Option<String>,
    pub escalated: bool,
    pub started_at: DateTime<Utc>,
    pub last_message_at: DateTime<Utc>,
}

/// Append-only message row, ordered by creation time within a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_type: SenderType,
    pub sender_id: Option<String>,
    pub message_text: String,
    pub intent_detected: Option<Intent>,
    pub confidence_score: Option<f32>,
    pub created_at: DateTime<Utc>,
}
