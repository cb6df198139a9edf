//! In-memory clients for tests.

use crate::client::{
    Connector, InferenceClient, InferenceRequest, TranscriptSegment, TranscriptionClient,
};
use crate::error::InferenceError;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};

type Reply = dyn Fn(usize, &InferenceRequest) -> Result<String, InferenceError> + Send + Sync;

/// Answers each call through `reply(call_number, request)` and records the requests.
#[derive(Clone)]
pub struct ScriptedClient {
    pub calls: Arc<Mutex<Vec<InferenceRequest>>>,
    reply: Arc<Reply>,
}

impl ScriptedClient {
    pub fn new(
        reply: impl Fn(usize, &InferenceRequest) -> Result<String, InferenceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            reply: Arc::new(reply),
        }
    }

    /// Prefix every text with `T:`, keeping batch headers intact.
    pub fn translating() -> Self {
        Self::new(|_, req| Ok(translate_prompt(&req.prompt)))
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|r| r.prompt.clone()).collect()
    }
}

/// Fake translation of a prompt: batch lines keep their header, plain text is prefixed.
pub fn translate_prompt(prompt: &str) -> String {
    if prompt.lines().all(|l| l.contains("s): ")) {
        prompt
            .lines()
            .map(|l| l.replacen("s): ", "s): T:", 1))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        format!("T:{prompt}")
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn infer(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.len()
        };
        (self.reply)(call, &request)
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

pub fn rate_limited() -> InferenceError {
    InferenceError::RateLimited("slow down".into())
}

pub fn fatal(msg: &str) -> InferenceError {
    InferenceError::Other(anyhow!(msg.to_string()))
}

/// Transcriber returning fixed output, or failing when `fail` is set.
pub struct FixedTranscriber {
    pub fail: bool,
}

#[async_trait]
impl TranscriptionClient for FixedTranscriber {
    async fn transcribe_line(&self, _audio: &Path, language: &str) -> Result<String> {
        if self.fail {
            return Err(anyhow!("decoder crashed"));
        }
        Ok(format!("[{language}] hello"))
    }

    async fn transcribe_file(&self, _audio: &Path, _language: &str) -> Result<Vec<TranscriptSegment>> {
        if self.fail {
            return Err(anyhow!("decoder crashed"));
        }
        Ok(vec![
            TranscriptSegment {
                start_ms: 0,
                end_ms: 1000,
                text: "one".into(),
            },
            TranscriptSegment {
                start_ms: 1000,
                end_ms: 2000,
                text: "two".into(),
            },
        ])
    }
}

/// Holds each reply until a permit is added to its [`gate`](Self::gate).
/// Requests are recorded as soon as they arrive.
pub struct GatedClient {
    pub inner: ScriptedClient,
    gate: Arc<tokio::sync::Semaphore>,
}

impl GatedClient {
    pub fn new(inner: ScriptedClient) -> Self {
        Self {
            inner,
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
        }
    }

    pub fn gate(&self) -> Arc<tokio::sync::Semaphore> {
        self.gate.clone()
    }
}

#[async_trait]
impl InferenceClient for GatedClient {
    async fn infer(&self, request: InferenceRequest) -> Result<String, InferenceError> {
        let reply = self.inner.infer(request).await;
        let _permit = self.gate.acquire().await.map_err(anyhow::Error::from)?;
        reply
    }

    fn model(&self) -> &str {
        "gated"
    }
}

/// Connector handing out the same prebuilt client every time.
pub struct Ready<C: ?Sized>(pub Arc<C>);

#[async_trait]
impl<S, C> Connector<S, C> for Ready<C>
where
    S: Send + Sync + 'static,
    C: ?Sized + Send + Sync + 'static,
{
    async fn connect(&self, _settings: &S) -> Result<Arc<C>> {
        Ok(self.0.clone())
    }
}
