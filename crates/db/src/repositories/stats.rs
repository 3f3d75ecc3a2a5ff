//! Aggregate dashboard metrics.
//!
//! The dashboard endpoint never errors on a storage outage; callers serve
//! [`DashboardStats::offline`] instead, which is the documented all-zero
//! shape with `db_status: "offline"`.

use std::collections::BTreeMap;

use chrono::{Duration, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

#[derive(Clone, Debug, Serialize)]
pub struct StatsSummary {
    pub total_conversations: i64,
    pub today: i64,
    pub this_week: i64,
    pub escalation_rate: String,
    pub avg_confidence: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct IntentCount {
    pub intent: String,
    pub count: i64,
    pub percentage: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityEntry {
    pub agent: String,
    pub intent: Option<String>,
    pub channel: String,
    pub language: String,
    pub escalated: bool,
    pub message_preview: String,
    pub time: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LeadFunnel {
    pub total: i64,
    pub today: i64,
    pub by_interest_level: BTreeMap<String, i64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardStats {
    pub summary: StatsSummary,
    pub top_intents: Vec<IntentCount>,
    pub by_agent: BTreeMap<String, i64>,
    pub by_channel: BTreeMap<String, i64>,
    pub recent_activity: Vec<ActivityEntry>,
    pub leads: LeadFunnel,
    pub db_status: &'static str,
}

impl DashboardStats {
    /// The shape served when storage is unavailable.
    pub fn offline() -> Self {
        Self {
            summary: StatsSummary {
                total_conversations: 0,
                today: 0,
                this_week: 0,
                escalation_rate: "0%".to_string(),
                avg_confidence: "N/A".to_string(),
            },
            top_intents: Vec::new(),
            by_agent: BTreeMap::new(),
            by_channel: default_channels(),
            recent_activity: Vec::new(),
            leads: LeadFunnel { total: 0, today: 0, by_interest_level: BTreeMap::new() },
            db_status: "offline",
        }
    }
}

fn default_channels() -> BTreeMap<String, i64> {
    let mut channels = BTreeMap::new();
    channels.insert("chat".to_string(), 0);
    channels.insert("whatsapp".to_string(), 0);
    channels.insert("voice".to_string(), 0);
    channels
}

const PREVIEW_CHARS: usize = 50;

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

pub struct SqlStatsRepository {
    pool: DbPool,
}

impl SqlStatsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, RepositoryError> {
        // Timestamps are stored as RFC 3339 UTC text, so date cutoffs compare
        // lexicographically.
        let now = Utc::now();
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let week_start = (now - Duration::days(7)).to_rfc3339_opts(SecondsFormat::Secs, true);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&self.pool)
            .await?;
        let today: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE started_at >= ?")
                .bind(&today_start)
                .fetch_one(&self.pool)
                .await?;
        let this_week: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE started_at >= ?")
                .bind(&week_start)
                .fetch_one(&self.pool)
                .await?;
        let escalated: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE escalated = 1")
                .fetch_one(&self.pool)
                .await?;

        let escalation_rate = if total > 0 {
            format!("{:.1}%", escalated as f64 / total as f64 * 100.0)
        } else {
            "0%".to_string()
        };

        let avg_confidence: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(confidence_score) FROM conversation_messages \
             WHERE confidence_score IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        let avg_confidence = match avg_confidence {
            Some(average) => format!("{:.1}%", average * 100.0),
            None => "N/A".to_string(),
        };

        let intent_rows = sqlx::query(
            "SELECT intent_detected AS intent, COUNT(*) AS count \
             FROM conversation_messages \
             WHERE intent_detected IS NOT NULL AND sender_type = 'customer' \
             GROUP BY intent_detected ORDER BY count DESC LIMIT 5",
        )
        .fetch_all(&self.pool)
        .await?;
        let top_intents = intent_rows
            .iter()
            .map(|row| -> Result<IntentCount, RepositoryError> {
                let count: i64 = row.try_get("count")?;
                let percentage = if total > 0 {
                    format!("{:.1}", count as f64 / total as f64 * 100.0)
                } else {
                    "0".to_string()
                };
                Ok(IntentCount { intent: row.try_get("intent")?, count, percentage })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let agent_rows = sqlx::query(
            "SELECT agent_name, COUNT(*) AS count FROM agent_actions \
             GROUP BY agent_name ORDER BY count DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_agent = BTreeMap::new();
        for row in &agent_rows {
            by_agent.insert(row.try_get::<String, _>("agent_name")?, row.try_get("count")?);
        }

        let channel_rows =
            sqlx::query("SELECT channel, COUNT(*) AS count FROM conversations GROUP BY channel")
                .fetch_all(&self.pool)
                .await?;
        let mut by_channel = default_channels();
        for row in &channel_rows {
            by_channel.insert(row.try_get::<String, _>("channel")?, row.try_get("count")?);
        }

        let activity_rows = sqlx::query(
            "SELECT a.agent_name, a.intent_received, a.input_text, a.created_at, a.escalated, \
                    c.channel, c.language \
             FROM agent_actions a \
             LEFT JOIN conversations c ON c.id = a.conversation_id \
             ORDER BY a.created_at DESC, a.id DESC LIMIT 10",
        )
        .fetch_all(&self.pool)
        .await?;
        let recent_activity = activity_rows
            .iter()
            .map(|row| -> Result<ActivityEntry, RepositoryError> {
                let input: Option<String> = row.try_get("input_text")?;
                Ok(ActivityEntry {
                    agent: row.try_get("agent_name")?,
                    intent: row.try_get("intent_received")?,
                    channel: row
                        .try_get::<Option<String>, _>("channel")?
                        .unwrap_or_else(|| "chat".to_string()),
                    language: row
                        .try_get::<Option<String>, _>("language")?
                        .unwrap_or_else(|| "ar".to_string()),
                    escalated: row.try_get::<i64, _>("escalated")? != 0,
                    message_preview: input.as_deref().map(preview).unwrap_or_default(),
                    time: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let leads_total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM leads").fetch_one(&self.pool).await?;
        let leads_today: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE created_at >= ?")
                .bind(&today_start)
                .fetch_one(&self.pool)
                .await?;
        let level_rows = sqlx::query(
            "SELECT interest_level, COUNT(*) AS count FROM leads GROUP BY interest_level",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_interest_level = BTreeMap::new();
        for row in &level_rows {
            by_interest_level
                .insert(row.try_get::<String, _>("interest_level")?, row.try_get("count")?);
        }

        Ok(DashboardStats {
            summary: StatsSummary {
                total_conversations: total,
                today,
                this_week,
                escalation_rate,
                avg_confidence,
            },
            top_intents,
            by_agent,
            by_channel,
            recent_activity,
            leads: LeadFunnel { total: leads_total, today: leads_today, by_interest_level },
            db_status: "online",
        })
    }
}
