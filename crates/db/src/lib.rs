pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::{seed_demo_catalog, SeedSummary};
pub use repositories::{
    AgentActionRow, ConversationHistory, CreateLeadOutcome, DashboardStats, InMemoryChatStore,
    LeadFilter, LeadRecord, LeadUpdate, SqlChatStore, SqlLeadRepository, SqlStatsRepository,
    UnavailableChatStore,
};
