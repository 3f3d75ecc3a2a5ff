//! SQLite-backed implementation of the conversation store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use nouma_core::{
    AgentActionEntry, ChatStore, Conversation, ConversationMessage, ConversationStatus,
    DeliveryRule, Intent, IntentDetection, Language, NewLead, Product, SenderType, StoreError,
};

use super::RepositoryError;
use crate::DbPool;

#[derive(Clone)]
pub struct SqlChatStore {
    pool: DbPool,
}

/// Conversation plus its full message and action-log history, as served by
/// the conversation lookup endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationHistory {
    pub conversation: Conversation,
    pub messages: Vec<ConversationMessage>,
    pub agent_logs: Vec<AgentActionRow>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AgentActionRow {
    pub id: i64,
    pub conversation_id: i64,
    pub agent_name: String,
    pub action_type: String,
    pub intent_received: Option<String>,
    pub input_text: Option<String>,
    pub output_text: Option<String>,
    pub response_time_ms: Option<i64>,
    pub success: bool,
    pub escalated: bool,
    pub created_at: String,
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation, RepositoryError> {
    let language: String = row.try_get("language")?;
    let status: String = row.try_get("status")?;
    let started_at: String = row.try_get("started_at")?;
    let last_message_at: String = row.try_get("last_message_at")?;

    Ok(Conversation {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        channel: row.try_get("channel")?,
        language: Language::parse(&language).unwrap_or(Language::Ar),
        status: ConversationStatus::parse(&status).unwrap_or(ConversationStatus::Open),
        assigned_agent: row.try_get("assigned_agent")?,
        escalated: row.try_get::<i64, _>("escalated")? != 0,
        started_at: parse_timestamp(&started_at)?,
        last_message_at: parse_timestamp(&last_message_at)?,
    })
}

pub(super) fn message_from_row(row: &SqliteRow) -> Result<ConversationMessage, RepositoryError> {
    let sender_type: String = row.try_get("sender_type")?;
    let intent: Option<String> = row.try_get("intent_detected")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ConversationMessage {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        sender_type: SenderType::parse(&sender_type).unwrap_or(SenderType::Customer),
        sender_id: row.try_get("sender_id")?,
        message_text: row.try_get("message_text")?,
        intent_detected: intent.as_deref().and_then(Intent::parse),
        confidence_score: row.try_get::<Option<f64>, _>("confidence_score")?.map(|v| v as f32),
        created_at: parse_timestamp(&created_at)?,
    })
}

fn product_from_row(row: &SqliteRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: row.try_get("id")?,
        name_en: row.try_get("name_en")?,
        name_ar: row.try_get("name_ar")?,
        category: row.try_get("category")?,
        dimensions: row.try_get("dimensions")?,
        material: row.try_get("material")?,
        firmness_level: row.try_get("firmness_level")?,
        warranty_years: row.try_get("warranty_years")?,
        description_en: row.try_get("description_en")?,
        description_ar: row.try_get("description_ar")?,
        price_egp: row.try_get("price_egp")?,
        discount_percent: row.try_get("discount_percent")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
    })
}

fn delivery_rule_from_row(row: &SqliteRow) -> Result<DeliveryRule, RepositoryError> {
    Ok(DeliveryRule {
        id: row.try_get("id")?,
        region: row.try_get("region")?,
        governorate: row.try_get("governorate")?,
        delivery_days_min: row.try_get("delivery_days_min")?,
        delivery_days_max: row.try_get("delivery_days_max")?,
        delivery_fee_egp: row.try_get("delivery_fee_egp")?,
        free_delivery_threshold: row.try_get("free_delivery_threshold")?,
        notes_en: row.try_get("notes_en")?,
        notes_ar: row.try_get("notes_ar")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
    })
}

fn action_from_row(row: &SqliteRow) -> Result<AgentActionRow, RepositoryError> {
    Ok(AgentActionRow {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        agent_name: row.try_get("agent_name")?,
        action_type: row.try_get("action_type")?,
        intent_received: row.try_get("intent_received")?,
        input_text: row.try_get("input_text")?,
        output_text: row.try_get("output_text")?,
        response_time_ms: row.try_get("response_time_ms")?,
        success: row.try_get::<i64, _>("success")? != 0,
        escalated: row.try_get::<i64, _>("escalated")? != 0,
        created_at: row.try_get("created_at")?,
    })
}

impl SqlChatStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn upsert_conversation(
        &self,
        session_id: &str,
        channel: &str,
        language: Language,
    ) -> Result<Conversation, RepositoryError> {
        let now = now_string();
        let row = sqlx::query(
            "INSERT INTO conversations \
                (session_id, channel, language, status, started_at, last_message_at) \
             VALUES (?, ?, ?, 'open', ?, ?) \
             ON CONFLICT(session_id) DO UPDATE SET last_message_at = excluded.last_message_at \
             RETURNING id, session_id, channel, language, status, assigned_agent, escalated, \
                       started_at, last_message_at",
        )
        .bind(session_id)
        .bind(channel)
        .bind(language.as_str())
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        conversation_from_row(&row)
    }

    pub async fn find_conversation(
        &self,
        session_id: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(conversation_from_row).transpose()
    }

    pub async fn conversation_with_history(
        &self,
        session_id: &str,
    ) -> Result<Option<ConversationHistory>, RepositoryError> {
        let Some(conversation) = self.find_conversation(session_id).await? else {
            return Ok(None);
        };

        let message_rows = sqlx::query(
            "SELECT * FROM conversation_messages WHERE conversation_id = ? \
             ORDER BY created_at, id",
        )
        .bind(conversation.id)
        .fetch_all(&self.pool)
        .await?;
        let messages = message_rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        let action_rows = sqlx::query(
            "SELECT * FROM agent_actions WHERE conversation_id = ? ORDER BY created_at, id",
        )
        .bind(conversation.id)
        .fetch_all(&self.pool)
        .await?;
        let agent_logs = action_rows
            .iter()
            .map(action_from_row)
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Some(ConversationHistory { conversation, messages, agent_logs }))
    }

    pub async fn list_active_products(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM products WHERE is_active = 1 ORDER BY category, price_egp",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }

    pub async fn list_active_delivery_rules(&self) -> Result<Vec<DeliveryRule>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM delivery_rules WHERE is_active = 1 ORDER BY delivery_days_min",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(delivery_rule_from_row).collect()
    }
}

#[async_trait]
impl ChatStore for SqlChatStore {
    async fn load_or_create_conversation(
        &self,
        session_id: &str,
        channel: &str,
        language: Language,
    ) -> Result<Conversation, StoreError> {
        self.upsert_conversation(session_id, channel, language).await.map_err(StoreError::from)
    }

    async fn assign_agent(
        &self,
        conversation_id: i64,
        agent_name: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET assigned_agent = ? WHERE id = ?")
            .bind(agent_name)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query(error.to_string()))?;
        Ok(())
    }

    async fn mark_escalated(&self, conversation_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE conversations SET escalated = 1 WHERE id = ?")
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|error| StoreError::Query(error.to_string()))?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        conversation_id: i64,
        limit: u32,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM conversation_messages WHERE conversation_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| StoreError::Query(error.to_string()))?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, RepositoryError>>()
            .map_err(StoreError::from)?;
        messages.reverse();
        Ok(messages)
    }

    async fn append_customer_message(
        &self,
        conversation_id: i64,
        sender_id: &str,
        text: &str,
        detection: IntentDetection,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversation_messages \
                (conversation_id, sender_type, sender_id, message_text, message_type, \
                 intent_detected, confidence_score, created_at) \
             VALUES (?, 'customer', ?, ?, 'text', ?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(text)
        .bind(detection.intent.as_str())
        .bind(detection.confidence as f64)
        .bind(now_string())
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query(error.to_string()))?;
        Ok(())
    }

    async fn append_bot_message(
        &self,
        conversation_id: i64,
        agent_name: &str,
        text: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO conversation_messages \
                (conversation_id, sender_type, sender_id, message_text, message_type, created_at) \
             VALUES (?, 'bot', ?, ?, 'text', ?)",
        )
        .bind(conversation_id)
        .bind(agent_name)
        .bind(text)
        .bind(now_string())
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query(error.to_string()))?;
        Ok(())
    }

    async fn log_agent_action(&self, entry: &AgentActionEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agent_actions \
                (conversation_id, agent_name, action_type, intent_received, input_text, \
                 output_text, response_time_ms, success, escalated, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.conversation_id)
        .bind(&entry.agent_name)
        .bind(entry.action_type)
        .bind(entry.intent.as_str())
        .bind(&entry.input_text)
        .bind(&entry.output_text)
        .bind(entry.response_time_ms)
        .bind(entry.success as i64)
        .bind(entry.escalated as i64)
        .bind(now_string())
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query(error.to_string()))?;
        Ok(())
    }

    async fn lead_exists_for_conversation(
        &self,
        conversation_id: i64,
    ) -> Result<bool, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|error| StoreError::Query(error.to_string()))?;
        Ok(count > 0)
    }

    async fn create_lead(&self, lead: &NewLead) -> Result<(), StoreError> {
        let now = now_string();
        sqlx::query(
            "INSERT INTO leads \
                (conversation_id, customer_name, customer_phone, customer_email, \
                 interested_product_id, interest_level, notes, source, status, \
                 created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'new', ?, ?)",
        )
        .bind(lead.conversation_id)
        .bind(&lead.customer_name)
        .bind(&lead.customer_phone)
        .bind(&lead.customer_email)
        .bind(lead.interested_product_id)
        .bind(lead.interest_level.as_str())
        .bind(&lead.notes)
        .bind(&lead.source)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|error| StoreError::Query(error.to_string()))?;
        Ok(())
    }

    async fn active_products(&self) -> Result<Vec<Product>, StoreError> {
        self.list_active_products().await.map_err(StoreError::from)
    }

    async fn active_delivery_rules(&self) -> Result<Vec<DeliveryRule>, StoreError> {
        self.list_active_delivery_rules().await.map_err(StoreError::from)
    }
}

#[cfg(test)]
mod tests {
    use nouma_core::{
        AgentActionEntry, ChatStore, Intent, IntentDetection, InterestLevel, Language, NewLead,
        SenderType,
    };

    use super::SqlChatStore;
    use crate::{connect_with_settings, migrations};

    async fn store_fixture() -> SqlChatStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlChatStore::new(pool)
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_session_id() {
        let store = store_fixture().await;

        let first = store
            .load_or_create_conversation("session_a", "chat", Language::En)
            .await
            .expect("create conversation");
        let second = store
            .load_or_create_conversation("session_a", "chat", Language::En)
            .await
            .expect("load conversation");
        let other = store
            .load_or_create_conversation("session_b", "chat", Language::Ar)
            .await
            .expect("create second conversation");

        assert_eq!(first.id, second.id, "same session id must not duplicate rows");
        assert_ne!(first.id, other.id);
        assert!(second.last_message_at >= first.last_message_at);
    }

    #[tokio::test]
    async fn messages_round_trip_in_order_with_limit() {
        let store = store_fixture().await;
        let conversation = store
            .load_or_create_conversation("session_a", "chat", Language::En)
            .await
            .expect("conversation");

        for index in 0..12 {
            store
                .append_customer_message(
                    conversation.id,
                    "session_a",
                    &format!("message {index}"),
                    IntentDetection::new(Intent::General, 0.5),
                )
                .await
                .expect("append message");
        }

        let recent =
            store.recent_messages(conversation.id, 10).await.expect("recent messages");
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].message_text, "message 2", "oldest of the window comes first");
        assert_eq!(recent[9].message_text, "message 11");
        assert!(recent.iter().all(|message| message.sender_type == SenderType::Customer));
    }

    #[tokio::test]
    async fn conversation_history_includes_messages_and_action_log() {
        let store = store_fixture().await;
        let conversation = store
            .load_or_create_conversation("session_a", "chat", Language::En)
            .await
            .expect("conversation");

        store
            .append_customer_message(
                conversation.id,
                "session_a",
                "hello",
                IntentDetection::new(Intent::Greeting, 0.8),
            )
            .await
            .expect("customer message");
        store
            .append_bot_message(conversation.id, "support", "Welcome to Nouma!")
            .await
            .expect("bot message");
        store
            .log_agent_action(&AgentActionEntry {
                conversation_id: conversation.id,
                agent_name: "support".to_string(),
                action_type: "MESSAGE_ROUTED",
                intent: Intent::Greeting,
                input_text: "hello".to_string(),
                output_text: "Welcome to Nouma!".to_string(),
                response_time_ms: 12,
                success: true,
                escalated: false,
            })
            .await
            .expect("action log");

        let history = store
            .conversation_with_history("session_a")
            .await
            .expect("history query")
            .expect("conversation exists");

        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.messages[0].message_text, "hello");
        assert_eq!(history.messages[0].intent_detected, Some(Intent::Greeting));
        assert_eq!(history.messages[1].sender_type, SenderType::Bot);
        assert_eq!(history.agent_logs.len(), 1);
        assert_eq!(history.agent_logs[0].agent_name, "support");

        assert!(store
            .conversation_with_history("session_unknown")
            .await
            .expect("history query")
            .is_none());
    }

    #[tokio::test]
    async fn escalation_flag_updates_are_idempotent() {
        let store = store_fixture().await;
        let conversation = store
            .load_or_create_conversation("session_a", "chat", Language::En)
            .await
            .expect("conversation");

        store.mark_escalated(conversation.id).await.expect("first escalation");
        store.mark_escalated(conversation.id).await.expect("second escalation");

        let reloaded = store
            .find_conversation("session_a")
            .await
            .expect("find conversation")
            .expect("conversation exists");
        assert!(reloaded.escalated);
    }

    #[tokio::test]
    async fn lead_existence_is_scoped_to_conversation() {
        let store = store_fixture().await;
        let conversation = store
            .load_or_create_conversation("session_a", "chat", Language::En)
            .await
            .expect("conversation");

        assert!(!store
            .lead_exists_for_conversation(conversation.id)
            .await
            .expect("existence check"));

        store
            .create_lead(&NewLead {
                conversation_id: Some(conversation.id),
                customer_name: None,
                customer_phone: "pending".to_string(),
                customer_email: None,
                interested_product_id: None,
                interest_level: InterestLevel::Hot,
                notes: Some("Intent: SALES_PRICE | Message: buy".to_string()),
                source: "chat".to_string(),
            })
            .await
            .expect("create lead");

        assert!(store
            .lead_exists_for_conversation(conversation.id)
            .await
            .expect("existence check"));
    }
}
