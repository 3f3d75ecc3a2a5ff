//! In-memory store doubles for tests and degraded-mode simulations.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use nouma_core::{
    AgentActionEntry, ChatStore, Conversation, ConversationMessage, ConversationStatus,
    DeliveryRule, IntentDetection, Language, NewLead, Product, SenderType, StoreError,
};

/// A fully working `ChatStore` backed by process memory. Behaves like the
/// SQLite store for upsert and ordering semantics, without a database.
#[derive(Default)]
pub struct InMemoryChatStore {
    next_id: AtomicI64,
    conversations: RwLock<Vec<Conversation>>,
    messages: RwLock<Vec<ConversationMessage>>,
    actions: RwLock<Vec<AgentActionEntry>>,
    leads: RwLock<Vec<NewLead>>,
    products: RwLock<Vec<Product>>,
    delivery_rules: RwLock<Vec<DeliveryRule>>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_products(&self, products: Vec<Product>) {
        *self.products.write().await = products;
    }

    pub async fn set_delivery_rules(&self, rules: Vec<DeliveryRule>) {
        *self.delivery_rules.write().await = rules;
    }

    pub async fn conversation(&self, session_id: &str) -> Option<Conversation> {
        self.conversations
            .read()
            .await
            .iter()
            .find(|conversation| conversation.session_id == session_id)
            .cloned()
    }

    pub async fn messages(&self, conversation_id: i64) -> Vec<ConversationMessage> {
        self.messages
            .read()
            .await
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect()
    }

    pub async fn actions(&self) -> Vec<AgentActionEntry> {
        self.actions.read().await.clone()
    }

    pub async fn leads(&self) -> Vec<NewLead> {
        self.leads.read().await.clone()
    }

    fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl ChatStore for InMemoryChatStore {
    async fn load_or_create_conversation(
        &self,
        session_id: &str,
        channel: &str,
        language: Language,
    ) -> Result<Conversation, StoreError> {
        let mut conversations = self.conversations.write().await;
        if let Some(conversation) =
            conversations.iter_mut().find(|conversation| conversation.session_id == session_id)
        {
            conversation.last_message_at = Utc::now();
            return Ok(conversation.clone());
        }

        let conversation = Conversation {
            id: self.allocate_id(),
            session_id: session_id.to_string(),
            channel: channel.to_string(),
            language,
            status: ConversationStatus::Open,
            assigned_agent: None,
            escalated: false,
            started_at: Utc::now(),
            last_message_at: Utc::now(),
        };
        conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn assign_agent(
        &self,
        conversation_id: i64,
        agent_name: &str,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        if let Some(conversation) =
            conversations.iter_mut().find(|conversation| conversation.id == conversation_id)
        {
            conversation.assigned_agent = Some(agent_name.to_string());
        }
        Ok(())
    }

    async fn mark_escalated(&self, conversation_id: i64) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        if let Some(conversation) =
            conversations.iter_mut().find(|conversation| conversation.id == conversation_id)
        {
            conversation.escalated = true;
        }
        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: u32,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let messages = self.messages.read().await;
        let scoped: Vec<ConversationMessage> = messages
            .iter()
            .filter(|message| message.conversation_id == conversation_id)
            .cloned()
            .collect();
        let skip = scoped.len().saturating_sub(limit as usize);
        Ok(scoped.into_iter().skip(skip).collect())
    }

    async fn append_customer_message(
        &self,
        conversation_id: i64,
        sender_id: &str,
        text: &str,
        detection: IntentDetection,
    ) -> Result<(), StoreError> {
        self.messages.write().await.push(ConversationMessage {
            id: self.allocate_id(),
            conversation_id,
            sender_type: SenderType::Customer,
            sender_id: Some(sender_id.to_string()),
            message_text: text.to_string(),
            intent_detected: Some(detection.intent),
            confidence_score: Some(detection.confidence),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn append_bot_message(
        &self,
        conversation_id: i64,
        agent_name: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        self.messages.write().await.push(ConversationMessage {
            id: self.allocate_id(),
            conversation_id,
            sender_type: SenderType::Bot,
            sender_id: Some(agent_name.to_string()),
            message_text: text.to_string(),
            intent_detected: None,
            confidence_score: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn log_agent_action(&self, entry: &AgentActionEntry) -> Result<(), StoreError> {
        self.actions.write().await.push(entry.clone());
        Ok(())
    }

    async fn lead_exists_for_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<bool, StoreError> {
        Ok(self
            .leads
            .read()
            .await
            .iter()
            .any(|lead| lead.conversation_id == Some(conversation_id)))
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<(), StoreError> {
        self.leads.write().await.push(lead.clone());
        Ok(())
    }

    async fn active_products(&self) -> Result<Vec<Product>, StoreError> {
        Ok(self.products.read().await.iter().filter(|p| p.is_active).cloned().collect())
    }

    async fn active_delivery_rules(&self) -> Result<Vec<DeliveryRule>, StoreError> {
        Ok(self.delivery_rules.read().await.iter().filter(|r| r.is_active).cloned().collect())
    }
}

/// A store whose every operation fails, for storage-outage tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableChatStore;

impl UnavailableChatStore {
    fn outage<T>() -> Result<T, StoreError> {
        Err(StoreError::Unavailable("storage is offline".to_string()))
    }
}

#[async_trait]
impl ChatStore for UnavailableChatStore {
    async fn load_or_create_conversation(
        &self,
        _session_id: &str,
        _channel: &str,
        _language: Language,
    ) -> Result<Conversation, StoreError> {
        Self::outage()
    }

    async fn assign_agent(
        &self,
        _conversation_id: i64,
        _agent_name: &str,
    ) -> Result<(), StoreError> {
        Self::outage()
    }

    async fn mark_escalated(&self, _conversation_id: i64) -> Result<(), StoreError> {
        Self::outage()
    }

    async fn recent_messages(
        &self,
        _conversation_id: i64,
        _limit: u32,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        Self::outage()
    }

    async fn append_customer_message(
        &self,
        _conversation_id: i64,
        _sender_id: &str,
        _text: &str,
        _detection: IntentDetection,
    ) -> Result<(), StoreError> {
        Self::outage()
    }

    async fn append_bot_message(
        &self,
        _conversation_id: i64,
        _agent_name: &str,
        _text: &str,
    ) -> Result<(), StoreError> {
        Self::outage()
    }

    async fn log_agent_action(&self, _entry: &AgentActionEntry) -> Result<(), StoreError> {
        Self::outage()
    }

    async fn lead_exists_for_conversation(
        &self,
        _conversation_id: i64,
    ) -> Result<bool, StoreError> {
        Self::outage()
    }

    async fn create_lead(&self, _lead: &NewLead) -> Result<(), StoreError> {
        Self::outage()
    }

    async fn active_products(&self) -> Result<Vec<Product>, StoreError> {
        Self::outage()
    }

    async fn active_delivery_rules(&self) -> Result<Vec<DeliveryRule>, StoreError> {
        Self::outage()
    }
}
