//! OpenAI-compatible chat-completions client for the generative tier.
//!
//! Works against api.openai.com or any compatible endpoint (Ollama's
//! `/v1` surface included). Every request is bounded by the configured
//! timeout; transport errors are retried up to `max_retries` times and an
//! exhausted retry budget surfaces as an error the caller downgrades to
//! "no result."

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nouma_agent::{ChatTurn, LlmClient, TurnRole};
use nouma_core::config::{LlmConfig, LlmProvider};
use nouma_core::{Intent, IntentDetection, Language};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const INTENT_SYSTEM_PROMPT: &str = r#"You are an intent classifier for Nouma Mattresses (نوما للمراتب), an Egyptian mattress company.

Classify the customer message into exactly ONE of these intents:
- SALES_PRICE: asking about prices, costs, how much
- SALES_RECOMMENDATION: asking for recommendations, which is best, advice
- PRODUCT_INQUIRY: asking about product details, types, sizes, materials
- DELIVERY: asking about delivery, shipping, tracking, delivery areas
- STORE_INFO: asking about store locations, branches, addresses, hours
- WARRANTY: asking about warranty, repair, defects, claims
- COMPLAINT: expressing dissatisfaction, problems, issues, anger
- HUMAN_REQUEST: wanting to talk to a human agent
- GREETING: greetings, hello, hi
- GENERAL: anything else that doesn't fit above

Respond with ONLY a JSON object: {"intent": "INTENT_NAME", "confidence": 0.95}
Do not include any other text."#;

pub struct OpenAiClient {
    client: Client,
    api_key: Option<SecretString>,
    chat_url: String,
    model: String,
    intent_model: String,
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct IntentProbe {
    intent: String,
    confidence: f32,
}

impl OpenAiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base = match config.provider {
            LlmProvider::OpenAi => {
                config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string())
            }
            LlmProvider::Ollama => config
                .base_url
                .clone()
                .context("llm.base_url is required for the ollama provider")?,
        };
        let chat_url = format!("{}/chat/completions", base.trim_end_matches('/'));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("http client construction failed")?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            chat_url,
            model: config.model.clone(),
            intent_model: config.intent_model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    async fn chat(&self, request: &ChatRequest<'_>) -> Result<Option<String>> {
        for attempt in 0..=self.max_retries {
            let mut builder = self.client.post(&self.chat_url).json(request);
            if let Some(api_key) = &self.api_key {
                builder = builder.bearer_auth(api_key.expose_secret());
            }

            match builder.send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed: ChatResponse =
                        response.json().await.context("completion response decode failed")?;
                    let content = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.message.content)
                        .map(|content| content.trim().to_string())
                        .filter(|content| !content.is_empty());
                    return Ok(content);
                }
                Ok(response) => {
                    bail!("completion request rejected with status {}", response.status());
                }
                Err(error) => {
                    if attempt == self.max_retries {
                        return Err(error).context(format!(
                            "completion failed after {} attempts",
                            attempt + 1
                        ));
                    }
                    warn!(attempt, %error, "completion transport error, retrying");
                }
            }
        }

        bail!("completion retry budget exhausted")
    }
}

fn role_for(turn_role: TurnRole) -> &'static str {
    match turn_role {
        TurnRole::Customer => "user",
        TurnRole::Bot => "assistant",
    }
}

/// Parses the classifier's JSON answer, tolerating a markdown code fence
/// around it. Unknown labels and malformed payloads yield `None`.
fn parse_intent_content(content: &str) -> Option<IntentDetection> {
    let trimmed = content.trim().trim_start_matches("```json").trim_start_matches("```");
    let trimmed = trimmed.trim_end_matches("```").trim();

    let probe: IntentProbe = serde_json::from_str(trimmed).ok()?;
    let intent = Intent::parse(&probe.intent)?;
    Some(IntentDetection::new(intent, probe.confidence))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_message: &str,
    ) -> Result<Option<String>> {
        let mut messages =
            vec![ChatMessage { role: "system", content: system_prompt.to_string() }];
        messages.extend(history.iter().map(|turn| ChatMessage {
            role: role_for(turn.role),
            content: turn.text.clone(),
        }));
        messages.push(ChatMessage { role: "user", content: user_message.to_string() });

        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        self.chat(&request).await
    }

    async fn classify_intent(
        &self,
        message: &str,
        _language: Language,
    ) -> Result<Option<IntentDetection>> {
        let messages = [
            ChatMessage { role: "system", content: INTENT_SYSTEM_PROMPT.to_string() },
            ChatMessage { role: "user", content: message.to_string() },
        ];
        let request = ChatRequest {
            model: &self.intent_model,
            messages: &messages,
            temperature: 0.1,
            max_tokens: 50,
        };

        let Some(content) = self.chat(&request).await? else {
            return Ok(None);
        };
        let detection = parse_intent_content(&content);
        if detection.is_none() {
            debug!(%content, "unusable intent classification answer");
        }
        Ok(detection)
    }
}

#[cfg(test)]
mod tests {
    use nouma_agent::TurnRole;
    use nouma_core::config::{AppConfig, LlmProvider};
    use nouma_core::Intent;

    use super::{parse_intent_content, role_for, OpenAiClient};

    #[test]
    fn intent_answers_parse_with_and_without_fences() {
        let detection = parse_intent_content(r#"{"intent": "DELIVERY", "confidence": 0.92}"#)
            .expect("plain json");
        assert_eq!(detection.intent, Intent::Delivery);
        assert_eq!(detection.confidence, 0.92);

        let fenced = "```json\n{\"intent\": \"SALES_PRICE\", \"confidence\": 0.88}\n```";
        let detection = parse_intent_content(fenced).expect("fenced json");
        assert_eq!(detection.intent, Intent::SalesPrice);
    }

    #[test]
    fn unusable_intent_answers_yield_none() {
        assert!(parse_intent_content("I think it is DELIVERY").is_none());
        assert!(parse_intent_content(r#"{"intent": "NOT_A_LABEL", "confidence": 0.9}"#).is_none());
        assert!(parse_intent_content("").is_none());
    }

    #[test]
    fn history_roles_map_to_openai_names() {
        assert_eq!(role_for(TurnRole::Customer), "user");
        assert_eq!(role_for(TurnRole::Bot), "assistant");
    }

    #[test]
    fn base_url_defaults_for_openai_and_is_required_for_ollama() {
        let mut config = AppConfig::default().llm;
        config.api_key = Some("sk-test".to_string().into());

        let client = OpenAiClient::from_config(&config).expect("openai client");
        assert_eq!(client.chat_url, "https://api.openai.com/v1/chat/completions");

        config.provider = LlmProvider::Ollama;
        config.base_url = None;
        assert!(OpenAiClient::from_config(&config).is_err());

        config.base_url = Some("http://localhost:11434/v1/".to_string());
        let client = OpenAiClient::from_config(&config).expect("ollama client");
        assert_eq!(client.chat_url, "http://localhost:11434/v1/chat/completions");
    }
}
