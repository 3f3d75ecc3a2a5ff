use thiserror::Error;

use nouma_core::StoreError;

pub mod chat;
pub mod lead;
pub mod memory;
pub mod stats;

pub use chat::{AgentActionRow, ConversationHistory, SqlChatStore};
pub use lead::{CreateLeadOutcome, LeadFilter, LeadRecord, LeadUpdate, SqlLeadRepository};
pub use memory::{InMemoryChatStore, UnavailableChatStore};
pub use stats::{DashboardStats, SqlStatsRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Query(error.to_string())
    }
}
