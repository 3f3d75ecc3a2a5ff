//! Lead CRUD for the external CRM-facing API.
//!
//! Manual creation deduplicates by phone number among leads still in `new`
//! status; updates apply only the fields present in the request.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row};

use nouma_core::{ConversationMessage, NewLead};

use super::chat::message_from_row;
use super::RepositoryError;
use crate::DbPool;

pub struct SqlLeadRepository {
    pool: DbPool,
}

/// Lead row joined with the interested product's names, as served over HTTP.
#[derive(Clone, Debug, Serialize)]
pub struct LeadRecord {
    pub id: i64,
    pub conversation_id: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub interested_product_id: Option<i64>,
    pub interest_level: String,
    pub notes: Option<String>,
    pub source: String,
    pub status: String,
    pub follow_up_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub product_name_en: Option<String>,
    pub product_name_ar: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LeadFilter {
    pub status: Option<String>,
    pub interest_level: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct LeadUpdate {
    pub status: Option<String>,
    pub interest_level: Option<String>,
    pub notes: Option<String>,
    pub follow_up_date: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
}

impl LeadUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.interest_level.is_none()
            && self.notes.is_none()
            && self.follow_up_date.is_none()
            && self.customer_name.is_none()
            && self.customer_phone.is_none()
            && self.customer_email.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateLeadOutcome {
    Created { id: i64, created_at: String },
    Duplicate { id: i64 },
}

fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn record_from_row(row: &SqliteRow) -> Result<LeadRecord, RepositoryError> {
    Ok(LeadRecord {
        id: row.try_get("id")?,
        conversation_id: row.try_get("conversation_id")?,
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_email: row.try_get("customer_email")?,
        interested_product_id: row.try_get("interested_product_id")?,
        interest_level: row.try_get("interest_level")?,
        notes: row.try_get("notes")?,
        source: row.try_get("source")?,
        status: row.try_get("status")?,
        follow_up_date: row.try_get("follow_up_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        product_name_en: row.try_get("product_name_en")?,
        product_name_ar: row.try_get("product_name_ar")?,
    })
}

const RECORD_SELECT: &str = "SELECT l.*, p.name_en AS product_name_en, \
                             p.name_ar AS product_name_ar \
                             FROM leads l \
                             LEFT JOIN products p ON p.id = l.interested_product_id";

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Creates a lead unless a lead with the same phone number is still in
    /// `new` status, in which case the existing lead wins.
    pub async fn create(&self, lead: &NewLead) -> Result<CreateLeadOutcome, RepositoryError> {
        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM leads WHERE customer_phone = ? AND status = 'new' LIMIT 1",
        )
        .bind(&lead.customer_phone)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(id) = existing {
            return Ok(CreateLeadOutcome::Duplicate { id });
        }

        let now = now_string();
        let row = sqlx::query(
            "INSERT INTO leads \
                (conversation_id, customer_name, customer_phone, customer_email, \
                 interested_product_id, interest_level, notes, source, status, \
                 created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'new', ?, ?) \
             RETURNING id, created_at",
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
        .fetch_one(&self.pool)
        .await?;

        Ok(CreateLeadOutcome::Created {
            id: row.try_get("id")?,
            created_at: row.try_get("created_at")?,
        })
    }

    pub async fn list(&self, filter: &LeadFilter) -> Result<Vec<LeadRecord>, RepositoryError> {
        let mut builder = QueryBuilder::new(RECORD_SELECT);
        builder.push(" WHERE 1=1");
        if let Some(status) = &filter.status {
            builder.push(" AND l.status = ").push_bind(status);
        }
        if let Some(interest_level) = &filter.interest_level {
            builder.push(" AND l.interest_level = ").push_bind(interest_level);
        }
        builder.push(" ORDER BY l.created_at DESC, l.id DESC LIMIT ");
        builder.push_bind(filter.limit.unwrap_or(50).clamp(1, 200));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn get(&self, id: i64) -> Result<Option<LeadRecord>, RepositoryError> {
        let mut builder = QueryBuilder::new(RECORD_SELECT);
        builder.push(" WHERE l.id = ").push_bind(id);

        let row = builder.build().fetch_optional(&self.pool).await?;
        row.as_ref().map(record_from_row).transpose()
    }

    /// Messages of the conversation a lead is linked to, oldest first.
    pub async fn conversation_messages(
        &self,
        lead: &LeadRecord,
    ) -> Result<Vec<ConversationMessage>, RepositoryError> {
        let Some(conversation_id) = lead.conversation_id else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            "SELECT * FROM conversation_messages WHERE conversation_id = ? \
             ORDER BY created_at, id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    /// Applies only the fields present in the update. Callers reject an
    /// all-empty update before getting here.
    pub async fn update(
        &self,
        id: i64,
        update: &LeadUpdate,
    ) -> Result<Option<LeadRecord>, RepositoryError> {
        if update.is_empty() {
            return self.get(id).await;
        }

        let mut builder = QueryBuilder::new("UPDATE leads SET ");
        let mut separated = builder.separated(", ");
        if let Some(status) = &update.status {
            separated.push("status = ").push_bind_unseparated(status);
        }
        if let Some(interest_level) = &update.interest_level {
            separated.push("interest_level = ").push_bind_unseparated(interest_level);
        }
        if let Some(notes) = &update.notes {
            separated.push("notes = ").push_bind_unseparated(notes);
        }
        if let Some(follow_up_date) = &update.follow_up_date {
            separated.push("follow_up_date = ").push_bind_unseparated(follow_up_date);
        }
        if let Some(customer_name) = &update.customer_name {
            separated.push("customer_name = ").push_bind_unseparated(customer_name);
        }
        if let Some(customer_phone) = &update.customer_phone {
            separated.push("customer_phone = ").push_bind_unseparated(customer_phone);
        }
        if let Some(customer_email) = &update.customer_email {
            separated.push("customer_email = ").push_bind_unseparated(customer_email);
        }
        separated.push("updated_at = ").push_bind_unseparated(now_string());
        builder.push(" WHERE id = ").push_bind(id);

        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get(id).await
    }
}
