//! Fire-and-forget CRM webhook notification.
//!
//! Each completed turn is posted to the configured webhook from a detached
//! task: the HTTP response to the widget is never blocked by, and never
//! learns about, a slow or failing CRM endpoint.

use std::time::Duration;

use reqwest::Client;
use tracing::warn;

use nouma_agent::{TurnNotifier, TurnSummary};

const WEBHOOK_TIMEOUT_SECS: u64 = 10;

pub struct CrmWebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl CrmWebhookNotifier {
    pub fn new(webhook_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, webhook_url }
    }
}

impl TurnNotifier for CrmWebhookNotifier {
    fn notify_turn(&self, summary: TurnSummary) {
        let client = self.client.clone();
        let url = self.webhook_url.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&summary).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "crm webhook rejected turn summary");
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(%error, "crm webhook notification failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use nouma_agent::{TurnNotifier, TurnSummary};
    use nouma_core::{Intent, Language};

    use super::CrmWebhookNotifier;

    fn summary() -> TurnSummary {
        TurnSummary {
            timestamp: Utc::now(),
            session_id: "session_test".to_string(),
            channel: "chat".to_string(),
            language: Language::En,
            user_message: "how much is the 160".to_string(),
            bot_response: "Which size do you need?".to_string(),
            intent: Intent::SalesPrice,
            agent_used: "sales".to_string(),
            confidence: 0.8,
            escalated: false,
        }
    }

    #[tokio::test]
    async fn turn_summary_is_delivered_to_the_webhook() {
        let received: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));

        let captured = Arc::clone(&received);
        let app = Router::new()
            .route(
                "/hook",
                post(|State(captured): State<Arc<Mutex<Option<Value>>>>, Json(body): Json<Value>| async move {
                    *captured.lock().await = Some(body);
                    Json(serde_json::json!({"ok": true}))
                }),
            )
            .with_state(captured);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });

        let notifier = CrmWebhookNotifier::new(format!("http://{address}/hook"));
        notifier.notify_turn(summary());

        let mut delivered = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(body) = received.lock().await.clone() {
                delivered = Some(body);
                break;
            }
        }

        let body = delivered.expect("webhook should receive the summary");
        assert_eq!(body["session_id"], "session_test");
        assert_eq!(body["intent"], "SALES_PRICE");
        assert_eq!(body["agent_used"], "sales");
        assert_eq!(body["escalated"], false);
    }

    #[tokio::test]
    async fn unreachable_webhook_is_swallowed() {
        let notifier = CrmWebhookNotifier::new("http://127.0.0.1:9/hook".to_string());
        notifier.notify_turn(summary());
        // The detached task logs and dies on its own; nothing to await.
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
