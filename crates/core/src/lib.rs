pub mod config;
pub mod domain;
pub mod store;

pub use domain::agent::{AgentKind, AgentProfile, EscalationRules, RoutingTable, Triggers};
pub use domain::catalog::{DeliveryRule, Product};
pub use domain::conversation::{
    Conversation, ConversationMessage, ConversationStatus, SenderType,
};
pub use domain::intent::{Intent, IntentDetection, Language};
pub use domain::lead::{InterestLevel, Lead, LeadStatus, NewLead};
pub use domain::reply::{ChatReply, ProductCard, ReplyBody};
pub use store::{AgentActionEntry, ChatStore, StoreError};
