//! Per-message orchestration: validate, classify, route, generate, persist.
//!
//! Every storage call is best-effort. A failed step is logged and the turn
//! continues as if no store existed; the caller always receives a
//! well-formed reply unless the input itself was invalid.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use nouma_core::config::PostEscalationPolicy;
use nouma_core::{
    AgentActionEntry, AgentKind, AgentProfile, ChatReply, ChatStore, Intent, InterestLevel,
    Language, NewLead, SenderType, StoreError,
};

use crate::classifier::{detect_intent, detect_language, LLM_ADOPTION_THRESHOLD};
use crate::generator::{find_size_token, generate_reply, ReplyContext};
use crate::llm::{ChatTurn, LlmClient, TurnRole};
use crate::registry::AgentRegistry;

const ACTION_MESSAGE_ROUTED: &str = "MESSAGE_ROUTED";
const LEAD_NOTE_EXCERPT_CHARS: usize = 100;

const BUY_PHRASES: &[&str] = &[
    "buy",
    "order",
    "purchase",
    "i'll take",
    "i will take",
    "send me",
    "عايز",
    "محتاج",
    "هشتري",
    "ابعتلي",
    "اطلب",
    "اشتري",
];

#[derive(Clone, Debug, Default)]
pub struct IncomingMessage {
    pub session_id: Option<String>,
    pub text: String,
    pub channel: Option<String>,
    pub language: Option<Language>,
}

#[derive(Clone, Copy, Debug)]
pub struct RuntimePolicy {
    pub max_message_chars: usize,
    pub history_limit: u32,
    pub post_escalation: PostEscalationPolicy,
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self {
            max_message_chars: 2000,
            history_limit: 10,
            post_escalation: PostEscalationPolicy::Answer,
        }
    }
}

/// Client-input errors — the only error surface of a turn. Anything else
/// degrades internally.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("Missing or invalid field: user_message")]
    EmptyMessage,
    #[error("Message too long (max {limit} characters)")]
    MessageTooLong { limit: usize },
    #[error("Conversation was handed to a human operator")]
    SessionEscalated,
}

/// Summary handed to the CRM notifier after each completed turn.
#[derive(Clone, Debug, Serialize)]
pub struct TurnSummary {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub channel: String,
    pub language: Language,
    pub user_message: String,
    pub bot_response: String,
    pub intent: Intent,
    pub agent_used: String,
    pub confidence: f32,
    pub escalated: bool,
}

/// Outbound turn notification, dispatched without awaiting completion.
/// Implementations spawn their own task and log their own failures.
pub trait TurnNotifier: Send + Sync {
    fn notify_turn(&self, summary: TurnSummary);
}

pub struct ChatRuntime {
    registry: Arc<AgentRegistry>,
    store: Option<Arc<dyn ChatStore>>,
    llm: Option<Arc<dyn LlmClient>>,
    notifier: Option<Arc<dyn TurnNotifier>>,
    policy: RuntimePolicy,
}

impl ChatRuntime {
    pub fn new(registry: Arc<AgentRegistry>, policy: RuntimePolicy) -> Self {
        Self { registry, store: None, llm: None, notifier: None, policy }
    }

    pub fn with_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn TurnNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub async fn handle_message(&self, incoming: IncomingMessage) -> Result<ChatReply, TurnError> {
        let started = Instant::now();

        let trimmed = incoming.text.trim();
        if trimmed.is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        if incoming.text.chars().count() > self.policy.max_message_chars {
            return Err(TurnError::MessageTooLong { limit: self.policy.max_message_chars });
        }
        let text = trimmed.to_string();

        let session_id = incoming
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("session_{}", Uuid::new_v4().simple()));
        let channel = incoming
            .channel
            .filter(|channel| !channel.trim().is_empty())
            .unwrap_or_else(|| "chat".to_string());
        let language = incoming.language.unwrap_or_else(|| detect_language(&text));

        let mut detection = detect_intent(&text);
        // The model is consulted only when the keyword pass found nothing,
        // and its answer is adopted only when it is confident and specific.
        if detection.intent == Intent::General {
            if let Some(llm) = &self.llm {
                match llm.classify_intent(&text, language).await {
                    Ok(Some(alternate))
                        if alternate.intent != Intent::General
                            && alternate.confidence > LLM_ADOPTION_THRESHOLD =>
                    {
                        detection = alternate;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        warn!(%error, "llm intent classification failed, keeping GENERAL");
                    }
                }
            }
        }

        let conversation = match &self.store {
            Some(store) => best_effort(
                "load_or_create_conversation",
                store.load_or_create_conversation(&session_id, &channel, language).await,
            ),
            None => None,
        };

        if let Some(conversation) = &conversation {
            if conversation.escalated
                && self.policy.post_escalation == PostEscalationPolicy::Reject
            {
                return Err(TurnError::SessionEscalated);
            }
        }

        let profile = self
            .registry
            .route_by_intent(detection.intent)
            .or_else(|| self.registry.get("support"))
            .unwrap_or_else(|| Arc::new(AgentProfile::fallback_support()));
        let agent_name = profile.name.clone();

        if let (Some(store), Some(conversation)) = (&self.store, &conversation) {
            best_effort("assign_agent", store.assign_agent(conversation.id, &agent_name).await);
        }

        // Fetch history before persisting the current message so the turn
        // does not leak into its own generative context.
        let history = match (&self.store, &conversation) {
            (Some(store), Some(conversation)) => best_effort(
                "recent_messages",
                store.recent_messages(conversation.id, self.policy.history_limit).await,
            )
            .unwrap_or_default(),
            _ => Vec::new(),
        };
        let history_turns = history
            .iter()
            .map(|message| ChatTurn {
                role: match message.sender_type {
                    SenderType::Customer => TurnRole::Customer,
                    SenderType::Bot => TurnRole::Bot,
                },
                text: message.message_text.clone(),
            })
            .collect::<Vec<_>>();

        if let (Some(store), Some(conversation)) = (&self.store, &conversation) {
            best_effort(
                "append_customer_message",
                store.append_customer_message(conversation.id, &session_id, &text, detection).await,
            );
        }

        let mut context = ReplyContext::default();
        if let Some(store) = &self.store {
            if profile.kind == AgentKind::Sales || detection.intent.concerns_products() {
                context.products =
                    best_effort("active_products", store.active_products().await).unwrap_or_default();
            }
            if profile.kind == AgentKind::Support || detection.intent == Intent::Delivery {
                context.delivery_rules =
                    best_effort("active_delivery_rules", store.active_delivery_rules().await)
                        .unwrap_or_default();
            }
        }

        let generated = generate_reply(
            &profile,
            detection.intent,
            &text,
            language,
            &history_turns,
            &context,
            self.llm.as_deref(),
        )
        .await;

        if generated.escalated {
            if let (Some(store), Some(conversation)) = (&self.store, &conversation) {
                best_effort("mark_escalated", store.mark_escalated(conversation.id).await);
            }
        }

        let response_text = generated.body.display_text().to_string();
        if let (Some(store), Some(conversation)) = (&self.store, &conversation) {
            best_effort(
                "append_bot_message",
                store.append_bot_message(conversation.id, &agent_name, &response_text).await,
            );
            let entry = AgentActionEntry {
                conversation_id: conversation.id,
                agent_name: agent_name.clone(),
                action_type: ACTION_MESSAGE_ROUTED,
                intent: detection.intent,
                input_text: text.clone(),
                output_text: response_text.clone(),
                response_time_ms: started.elapsed().as_millis() as i64,
                success: true,
                escalated: generated.escalated,
            };
            best_effort("log_agent_action", store.log_agent_action(&entry).await);
        }

        if let Some(notifier) = &self.notifier {
            notifier.notify_turn(TurnSummary {
                timestamp: Utc::now(),
                session_id: session_id.clone(),
                channel: channel.clone(),
                language,
                user_message: text.clone(),
                bot_response: response_text,
                intent: detection.intent,
                agent_used: agent_name.clone(),
                confidence: detection.confidence,
                escalated: generated.escalated,
            });
        }

        if profile.kind == AgentKind::Sales {
            if let (Some(store), Some(conversation)) = (&self.store, &conversation) {
                self.capture_lead(store.as_ref(), conversation.id, &channel, &text, detection.intent)
                    .await;
            }
        }

        Ok(ChatReply {
            body: generated.body,
            agent_used: agent_name,
            intent: detection.intent,
            confidence_score: detection.confidence,
            session_id,
            language,
            llm_used: generated.llm_used,
        })
    }

    /// Opportunistic lead capture for sales conversations: an explicit buy
    /// phrase, or a price question that already names a size, counts as a
    /// strong signal. At most one lead per conversation.
    async fn capture_lead(
        &self,
        store: &dyn ChatStore,
        conversation_id: i64,
        channel: &str,
        text: &str,
        intent: Intent,
    ) {
        let lowered = text.to_lowercase();
        let has_buy_intent = BUY_PHRASES.iter().any(|phrase| lowered.contains(phrase));
        let size = find_size_token(&lowered);
        let price_with_size = intent == Intent::SalesPrice && size.is_some();

        if !has_buy_intent && !price_with_size {
            return;
        }

        // On a failed existence check assume a lead exists; duplicating a
        // lead is worse than missing one turn's capture.
        let exists = best_effort(
            "lead_exists_for_conversation",
            store.lead_exists_for_conversation(conversation_id).await,
        )
        .unwrap_or(true);
        if exists {
            return;
        }

        let interest_level = if has_buy_intent {
            InterestLevel::Hot
        } else if size.is_some() {
            InterestLevel::Warm
        } else {
            InterestLevel::Cold
        };

        let excerpt: String = text.chars().take(LEAD_NOTE_EXCERPT_CHARS).collect();
        let lead = NewLead {
            conversation_id: Some(conversation_id),
            customer_name: None,
            customer_phone: find_phone(text).unwrap_or_else(|| "pending".to_string()),
            customer_email: None,
            interested_product_id: None,
            interest_level,
            notes: Some(format!("Intent: {intent} | Message: {excerpt}")),
            source: channel.to_string(),
        };
        best_effort("create_lead", store.create_lead(&lead).await);
    }
}

fn best_effort<T>(operation: &'static str, result: Result<T, StoreError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(operation, %error, "storage step skipped, continuing without persistence");
            None
        }
    }
}

/// Egyptian mobile number: an 11-digit run starting with `01`.
fn find_phone(text: &str) -> Option<String> {
    let mut run = String::new();
    let mut runs = Vec::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            run.push(ch);
        } else if !run.is_empty() {
            runs.push(std::mem::take(&mut run));
        }
    }
    if !run.is_empty() {
        runs.push(run);
    }

    runs.into_iter().find(|run| run.len() == 11 && run.starts_with("01"))
}
