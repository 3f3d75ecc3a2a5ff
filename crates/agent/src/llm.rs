use anyhow::Result;
use async_trait::async_trait;

use nouma_core::{IntentDetection, Language};

/// One prior conversation turn handed to the completion call, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnRole {
    Customer,
    Bot,
}

/// Pluggable language-model capability. Both operations may legitimately
/// return `Ok(None)` (provider declined, empty completion, low-value
/// answer); callers treat `Err` the same way after logging it.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_message: &str,
    ) -> Result<Option<String>>;

    async fn classify_intent(
        &self,
        message: &str,
        language: Language,
    ) -> Result<Option<IntentDetection>>;
}
