use serde::{Deserialize, Serialize};

use crate::domain::intent::{Intent, Language};

/// Product summary embedded in a `product_card` reply. Price and warranty
/// are pre-formatted display strings; the widget renders them verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductCard {
    pub name: String,
    pub description: String,
    pub price: String,
    pub warranty: String,
    pub url: String,
}

/// Discriminated per-turn reply variant. The serialized shape
/// `{"response_type": ..., "content": {...}}` is the widget contract and
/// must not change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response_type", content = "content", rename_all = "snake_case")]
pub enum ReplyBody {
    Text { text: String },
    ProductCard { text: String, product: ProductCard },
    Handover { handover_message: String },
}

impl ReplyBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn handover(message: impl Into<String>) -> Self {
        Self::Handover { handover_message: message.into() }
    }

    /// Display text used for persistence and the action log.
    pub fn display_text(&self) -> &str {
        match self {
            Self::Text { text } | Self::ProductCard { text, .. } => text,
            Self::Handover { handover_message } => handover_message,
        }
    }
}

/// The full per-turn payload: the reply body merged with routing metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(flatten)]
    pub body: ReplyBody,
    pub agent_used: String,
    pub intent: Intent,
    pub confidence_score: f32,
    pub session_id: String,
    pub language: Language,
    pub llm_used: bool,
}
