//! OpenAI-backed inference client.
//! Talks to the chat completions endpoint; HTTP 429 is reported as a rate limit.

use super::{Connector, InferenceClient, InferenceRequest};
use crate::config::LlmSettings;
use crate::error::InferenceError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, trace};

/// Client for an OpenAI-compatible chat completions API.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    max_tokens: Option<u32>,
}

impl OpenAiClient {
    /// Create a client from settings. The API key must be present.
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            return Err(anyhow!("OpenAI API key is required"));
        }
        Ok(Self {
            client: Client::new(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    /// Check the key by listing models.
    pub async fn validate(&self) -> Result<()> {
        trace!("validate model={}", self.model);
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        resp.error_for_status()?;
        Ok(())
    }

    /// Send a JSON body to the chat completions endpoint and return the JSON response.
    async fn post_chat(&self, body: Value) -> Result<Value, InferenceError> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(anyhow::Error::from)?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let text = resp.text().await.unwrap_or_default();
            return Err(InferenceError::RateLimited(text));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("API responded with {status}: {text}").into());
        }
        Ok(resp.json().await.map_err(anyhow::Error::from)?)
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    async fn infer(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let mut messages = Vec::new();
        if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature.unwrap_or(self.temperature),
        });
        if let Some(max) = request.max_tokens.or(self.max_tokens) {
            body["max_tokens"] = json!(max);
        }
        let value = self.post_chat(body).await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("missing content"))?;
        debug!("received {} bytes from {}", content.len(), self.model);
        Ok(content.to_string())
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Builds and validates [`OpenAiClient`]s.
pub struct OpenAiConnector;

#[async_trait]
impl Connector<LlmSettings, dyn InferenceClient> for OpenAiConnector {
    async fn connect(&self, settings: &LlmSettings) -> Result<Arc<dyn InferenceClient>> {
        let client = OpenAiClient::new(settings)?;
        client.validate().await?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn settings(server: &MockServer) -> LlmSettings {
        LlmSettings {
            api_key: "sk-test".into(),
            base_url: server.url("/v1"),
            ..LlmSettings::default()
        }
    }

    fn request(prompt: &str) -> InferenceRequest {
        InferenceRequest {
            prompt: prompt.into(),
            system_prompt: Some("be brief".into()),
            ..InferenceRequest::default()
        }
    }

    #[tokio::test]
    async fn returns_message_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{"model": "gpt-4o", "temperature": 0.5}"#);
                then.status(200)
                    .json_body(serde_json::json!({"choices": [{"message": {"content": "hello"}}]}));
            })
            .await;
        let client = OpenAiClient::new(&settings(&server)).unwrap();
        assert_eq!(client.infer(request("こんにちは")).await.unwrap(), "hello");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limit() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(429).body("slow down");
            })
            .await;
        let client = OpenAiClient::new(&settings(&server)).unwrap();
        let err = client.infer(request("x")).await.unwrap_err();
        assert!(matches!(err, InferenceError::RateLimited(ref m) if m == "slow down"));
    }

    #[tokio::test]
    async fn other_failures_are_not_rate_limits() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(500).body("boom");
            })
            .await;
        let client = OpenAiClient::new(&settings(&server)).unwrap();
        let err = client.infer(request("x")).await.unwrap_err();
        assert!(!err.is_rate_limit());
    }

    #[tokio::test]
    async fn connector_validates_key() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/models");
                then.status(401);
            })
            .await;
        assert!(OpenAiConnector.connect(&settings(&server)).await.is_err());

        let mut missing = settings(&server);
        missing.api_key.clear();
        assert!(OpenAiConnector.connect(&missing).await.is_err());
    }
}
