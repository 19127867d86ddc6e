use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::Config;
use crate::context::ConversationTurn;

/// Fixed user-facing reply when the completion service fails for any reason.
pub const FALLBACK_REPLY: &str = "I couldn't process your request. Please try again later.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Reasoning-only model families reject system instructions and sampling
/// parameter overrides; both must be omitted from their requests.
fn is_reasoning_model(model: &str) -> bool {
    model.contains("o1")
}

/// Assemble the final role-tagged message list: optional system turn, the
/// context turns in order, then a trailing user turn with the trigger
/// prompt. Empty system prompt and empty trigger prompt are both omitted,
/// and reasoning-only models never receive a system turn.
pub fn build_messages(prompt: &str, turns: &[ConversationTurn], config: &Config) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 2);

    if !config.system_prompt.is_empty() && !is_reasoning_model(&config.model) {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: config.system_prompt.clone(),
        });
    }

    messages.extend(turns.iter().map(|turn| ChatMessage {
        role: turn.role.as_str().to_string(),
        content: turn.content.clone(),
    }));

    if !prompt.is_empty() {
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });
    }

    messages
}

/// Completion boundary the pipeline talks to. Implementations never fail:
/// any fault degrades to a fixed apology string so the message handler can
/// always deliver something.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str, turns: &[ConversationTurn]) -> String;
}

pub struct CompletionClient {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl CompletionClient {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let sampled = !is_reasoning_model(&self.config.model);
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: sampled.then_some(self.config.temperature),
            max_tokens: sampled.then_some(self.config.max_tokens),
            top_p: sampled.then_some(self.config.top_p),
            frequency_penalty: sampled.then_some(self.config.frequency_penalty),
            presence_penalty: sampled.then_some(self.config.presence_penalty),
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        debug!("Sending completion request to {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion API error ({}): {}", status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("Completion response contained no choices")
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str, turns: &[ConversationTurn]) -> String {
        let messages = build_messages(prompt, turns, &self.config);
        match self.chat(messages).await {
            Ok(text) => text,
            Err(e) => {
                error!("Completion request failed: {:#}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Config {
        let mut map = HashMap::new();
        map.insert("DISCORD_BOT_TOKEN".to_string(), "token".to_string());
        for (k, v) in pairs {
            map.insert(k.to_string(), v.to_string());
        }
        Config::from_map(&map).unwrap()
    }

    fn turns() -> Vec<ConversationTurn> {
        vec![
            ConversationTurn { role: Role::User, content: "hi".to_string() },
            ConversationTurn { role: Role::Assistant, content: "ok".to_string() },
        ]
    }

    #[test]
    fn messages_are_system_then_context_then_trigger() {
        let config = config(&[("SYSTEM_PROMPT", "be brief"), ("MSG_PROMPT", "reply now")]);
        let messages = build_messages(&config.msg_prompt, &turns(), &config);

        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(messages[1].content, "hi");
        assert_eq!(messages[2].content, "ok");
        assert_eq!(messages[3].content, "reply now");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let config = config(&[("MSG_PROMPT", "go")]);
        let messages = build_messages(&config.msg_prompt, &turns(), &config);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn empty_trigger_prompt_is_omitted() {
        let config = config(&[("SYSTEM_PROMPT", "be brief")]);
        let messages = build_messages("", &turns(), &config);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages.last().unwrap().content, "ok");
    }

    #[test]
    fn reasoning_model_drops_the_system_turn() {
        let config = config(&[
            ("SYSTEM_PROMPT", "be brief"),
            ("MSG_PROMPT", "go"),
            ("OPENAI_MODEL", "o1-mini"),
        ]);
        let messages = build_messages(&config.msg_prompt, &turns(), &config);

        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);
    }

    #[test]
    fn reasoning_model_detection_matches_by_name() {
        assert!(is_reasoning_model("o1-preview"));
        assert!(is_reasoning_model("o1"));
        assert!(!is_reasoning_model("gpt-4o-mini"));
    }

    #[test]
    fn sampling_parameters_serialize_only_when_present() {
        let full = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: Vec::new(),
            temperature: Some(0.7),
            max_tokens: Some(2048),
            top_p: Some(1.0),
            frequency_penalty: Some(0.0),
            presence_penalty: Some(0.0),
        };
        let json = serde_json::to_value(&full).unwrap();
        assert_eq!(json["temperature"], serde_json::json!(0.7));
        assert_eq!(json["max_tokens"], serde_json::json!(2048));

        let reasoning = ChatRequest {
            model: "o1-mini".to_string(),
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        };
        let json = serde_json::to_value(&reasoning).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("top_p").is_none());
        assert!(json.get("frequency_penalty").is_none());
        assert!(json.get("presence_penalty").is_none());
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_the_fallback_reply() {
        // Unroutable base URL: the request fails before leaving the host.
        let config = Arc::new(config(&[("OPENAI_BASE_URL", "http://127.0.0.1:1")]));
        let client = CompletionClient::new(config);

        let reply = client.complete("hello", &[]).await;

        assert_eq!(reply, FALLBACK_REPLY);
    }
}
