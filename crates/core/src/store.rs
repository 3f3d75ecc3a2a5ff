//! Abstract conversation store consumed by the message pipeline.
//!
//! The pipeline never talks to a database directly; it goes through this
//! trait and treats every failure as "no persisted state for this concern."
//! A turn must complete even when no store exists at all.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::catalog::{DeliveryRule, Product};
use crate::domain::conversation::{Conversation, ConversationMessage};
use crate::domain::intent::{Intent, IntentDetection, Language};
use crate::domain::lead::NewLead;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage query failed: {0}")]
    Query(String),
}

/// One action-log row capturing what an agent did for a turn.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentActionEntry {
    pub conversation_id: i64,
    pub agent_name: String,
    pub action_type: &'static str,
    pub intent: Intent,
    pub input_text: String,
    pub output_text: String,
    pub response_time_ms: i64,
    pub success: bool,
    pub escalated: bool,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Insert-or-update keyed by session id; touches `last_message_at` on
    /// conflict so racing turns never produce duplicate conversation rows.
    async fn load_or_create_conversation(
        &self,
        session_id: &str,
        channel: &str,
        language: Language,
    ) -> Result<Conversation, StoreError>;

    async fn assign_agent(&self, conversation_id: i64, agent_name: &str)
        -> Result<(), StoreError>;

    /// Idempotent: setting the flag twice is harmless.
    async fn mark_escalated(&self, conversation_id: i64) -> Result<(), StoreError>;

    /// Up to `limit` most recent messages, returned oldest-first.
    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: u32,
    ) -> Result<Vec<ConversationMessage>, StoreError>;

    async fn append_customer_message(
        &self,
        conversation_id: i64,
        sender_id: &str,
        text: &str,
        detection: IntentDetection,
    ) -> Result<(), StoreError>;

    async fn append_bot_message(
        &self,
        conversation_id: i64,
        agent_name: &str,
        text: &str,
    ) -> Result<(), StoreError>;

    async fn log_agent_action(&self, entry: &AgentActionEntry) -> Result<(), StoreError>;

    async fn lead_exists_for_conversation(&self, conversation_id: i64)
        -> Result<bool, StoreError>;

    async fn create_lead(&self, lead: &NewLead) -> Result<(), StoreError>;

    async fn active_products(&self) -> Result<Vec<Product>, StoreError>;

    async fn active_delivery_rules(&self) -> Result<Vec<DeliveryRule>, StoreError>;
}
