use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    Hot,
    Warm,
    Cold,
}

impl InterestLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hot" => Some(Self::Hot),
            "warm" => Some(Self::Warm),
            "cold" => Some(Self::Cold),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Contacted,
    Converted,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "converted" => Some(Self::Converted),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

/// A captured sales opportunity linked to a conversation. Auto-capture
/// creates at most one lead per conversation; manual creation deduplicates
/// by phone number among leads still in `new` status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub conversation_id: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub interested_product_id: Option<i64>,
    pub interest_level: InterestLevel,
    pub notes: Option<String>,
    pub source: String,
    pub status: LeadStatus,
    pub follow_up_date: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a lead; `customer_phone` is `pending` when the
/// auto-capture heuristic found buy intent but no phone number yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewLead {
    pub conversation_id: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub interested_product_id: Option<i64>,
    pub interest_level: InterestLevel,
    pub notes: Option<String>,
    pub source: String,
}
