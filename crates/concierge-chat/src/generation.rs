//! Text generation capability.
//!
//! The orchestrator treats generation as one opaque call: a system framing
//! plus role-tagged turns in, one assistant utterance out. No retries
//! happen at this layer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use concierge_core::error::ConciergeError;
use concierge_core::types::{Sender, Utterance};

/// One generation call: system framing plus the recent window, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub turns: Vec<Utterance>,
}

#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ConciergeError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

fn wire_role(sender: Sender) -> &'static str {
    match sender {
        Sender::Customer => "user",
        Sender::Assistant => "assistant",
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct HttpGenerationService {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl HttpGenerationService {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            temperature,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn body<'a>(&'a self, request: &'a GenerationRequest) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(request.turns.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: &request.system,
        });
        messages.extend(request.turns.iter().map(|turn| WireMessage {
            role: wire_role(turn.role),
            content: &turn.content,
        }));

        ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        }
    }
}

impl std::fmt::Debug for HttpGenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerationService")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ConciergeError> {
        let mut builder = self.client.post(&self.endpoint).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ConciergeError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConciergeError::Generation(format!("HTTP {}: {}", status, body)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ConciergeError::Generation(format!("Unreadable response: {}", e)))?;

        let reply = parse_completion(&text)?;
        debug!(model = %self.model, chars = reply.len(), "Completion received");
        Ok(reply)
    }
}

/// First choice's message content. An empty or missing reply is an error.
fn parse_completion(body: &str) -> Result<String, ConciergeError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ConciergeError::Generation(format!("Invalid response: {}", e)))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ConciergeError::Generation("Empty completion".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let service = HttpGenerationService::new("http://localhost/v1/chat", "gpt-4", 0.7);
        let request = GenerationRequest {
            system: "be brief".to_string(),
            turns: vec![
                Utterance::customer("hi"),
                Utterance::assistant("hello!"),
                Utterance::customer("coats?"),
            ],
        };

        let body = serde_json::to_value(service.body(&request)).unwrap();
        assert_eq!(body["model"], "gpt-4");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "be brief");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "coats?");
    }

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Try the wool coat."}}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Try the wool coat.");
    }

    #[test]
    fn test_parse_completion_rejects_empty() {
        assert!(parse_completion(r#"{"choices":[]}"#).is_err());
        assert!(parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#).is_err());
        assert!(parse_completion(r#"{"choices":[{"message":{"content":"  "}}]}"#).is_err());
    }

    #[test]
    fn test_parse_completion_invalid_json() {
        let err = parse_completion("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ConciergeError::Generation(_)));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let service = HttpGenerationService::new("http://x", "m", 0.2).with_api_key("sk-secret");
        let debug = format!("{:?}", service);
        assert!(!debug.contains("sk-secret"));
    }
}
