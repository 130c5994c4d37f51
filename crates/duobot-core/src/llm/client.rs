//! LLM API HTTP Client
//!
//! Supports both the Anthropic Messages API and OpenAI-compatible APIs

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{Config, LlmProvider};
use crate::error::{Error, Result};
use crate::session::{Role, Turn};

use super::CompletionService;
use super::types::*;

/// LLM API client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: LlmProvider,
    max_tokens: u64,
    system_prompt: Option<String>,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.session.completion_timeout())
            .build()
            .map_err(Error::Http)?;

        let llm_config = &config.llm;

        let base_url = match &llm_config.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => llm_config.provider.default_base_url().to_string(),
        };

        Ok(Self {
            client,
            api_key: llm_config.api_key.clone(),
            model: llm_config.model.clone(),
            base_url,
            provider: llm_config.provider.clone(),
            max_tokens: llm_config.max_tokens,
            system_prompt: config.session.system_prompt.clone(),
        })
    }

    /// Create with custom base URL (for testing or custom endpoints)
    pub fn with_base_url(config: &Config, base_url: impl Into<String>) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into();
        Ok(client)
    }

    /// Send a request to the configured provider
    pub async fn messages(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        match self.provider {
            LlmProvider::Claude => self.send_claude_request(request).await,
            LlmProvider::OpenAi => self.send_openai_request(request).await,
        }
    }

    async fn send_claude_request(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!("Sending request to Claude API: {}", url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Claude API error: {} - {}", status, body);
            return Err(Error::LlmApi(format!("{}: {}", status, body)));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| Error::LlmApi(format!("Failed to parse response: {} - {}", e, body)))?;

        info!(
            "Claude API response: stop_reason={:?}, tokens={}",
            parsed.stop_reason,
            parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0)
        );

        Ok(parsed)
    }

    async fn send_openai_request(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!("Sending request to OpenAI-compatible API: {}", url);

        let openai_request = ChatCompletionRequest::from_messages_request(&request);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&openai_request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("OpenAI API error: {} - {}", status, body);
            return Err(Error::LlmApi(format!("{}: {}", status, body)));
        }

        let openai_response: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| Error::LlmApi(format!("Failed to parse response: {} - {}", e, body)))?;

        let parsed = openai_response.into_messages_response();

        info!(
            "OpenAI API response: stop_reason={:?}, tokens={}",
            parsed.stop_reason,
            parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0)
        );

        Ok(parsed)
    }

    /// Create a messages request builder
    pub fn request_builder(&self) -> MessagesRequestBuilder {
        MessagesRequestBuilder::new(self.model.clone()).max_tokens(self.max_tokens)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }
}

#[async_trait]
impl CompletionService for LlmClient {
    async fn complete(&self, turns: &[Turn]) -> Result<String> {
        let mut builder = self.request_builder();
        if let Some(system) = &self.system_prompt {
            builder = builder.system(system.clone());
        }

        // conversations must open with a user message
        for turn in turns.iter().skip_while(|t| t.role() == Role::Assistant) {
            builder = builder.message(Message::from(turn));
        }

        let response = self.messages(builder.build()).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(Error::LlmApi("Completion contained no text".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(provider: LlmProvider) -> Config {
        let mut config = Config::default();
        config.llm.api_key = "test_key".to_string();
        config.llm.provider = provider;
        config.session.system_prompt = Some("be brief".to_string());
        config
    }

    fn turns(texts: &[(Role, &str)]) -> Vec<Turn> {
        texts
            .iter()
            .map(|(role, text)| Turn::new(*role, *text).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_claude_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude",
                "stop_reason": "end_turn",
                "content": [{"type": "text", "text": "Hello back"}],
                "usage": {"input_tokens": 5, "output_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(&test_config(LlmProvider::Claude), server.uri()).unwrap();
        let reply = client
            .complete(&turns(&[(Role::Participant, "Hello")]))
            .await
            .unwrap();

        assert_eq!(reply, "Hello back");
    }

    #[tokio::test]
    async fn test_openai_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "glm",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(&test_config(LlmProvider::OpenAi), server.uri()).unwrap();
        let reply = client
            .complete(&turns(&[(Role::Participant, "ping")]))
            .await
            .unwrap();

        assert_eq!(reply, "pong");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(&test_config(LlmProvider::Claude), server.uri()).unwrap();
        let result = client.complete(&turns(&[(Role::Participant, "Hello")])).await;

        assert!(matches!(result, Err(Error::LlmApi(msg)) if msg.contains("429")));
    }

    #[tokio::test]
    async fn test_leading_assistant_turns_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "ok"}]
            })))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(&test_config(LlmProvider::Claude), server.uri()).unwrap();
        client
            .complete(&turns(&[
                (Role::Assistant, "earlier reply"),
                (Role::Participant, "question"),
            ]))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["system"], "be brief");
    }

    #[tokio::test]
    async fn test_facade_sends_history_and_survives_outage() {
        use crate::session::{ManualClock, SessionFacade, SessionStore};
        use std::sync::Arc;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "noted"}]
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = LlmClient::with_base_url(&test_config(LlmProvider::Claude), server.uri()).unwrap();
        let store = Arc::new(SessionStore::with_options(20, Arc::new(ManualClock::default())));
        let facade = SessionFacade::new(Arc::clone(&store), Arc::new(client)).with_fallback_reply("later");

        assert_eq!(facade.handle_turn("u1", "first").await, "noted");
        assert_eq!(facade.handle_turn("u1", "second").await, "noted");
        assert_eq!(facade.handle_turn("u1", "third").await, "later");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        let roles: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "assistant", "user"]);

        // the failed call leaves only the participant turn behind
        let window = store.window("u1");
        assert_eq!(window.len(), 5);
        assert_eq!(window[4].role(), Role::Participant);
        assert_eq!(window[4].content(), "third");
    }
}
