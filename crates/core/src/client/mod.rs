//! Clients for the remote services the pipeline depends on, and the service
//! object that owns their lifecycle.

use crate::error::{InferenceError, LoadError};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, trace, warn};

pub mod openai;

/// One text-generation call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A text-generation service.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Run one request. Rate limiting must be reported as
    /// [`InferenceError::RateLimited`] so callers can retry it.
    async fn infer(&self, request: InferenceRequest) -> Result<String, InferenceError>;

    /// Model identifier, for logs and status.
    fn model(&self) -> &str;
}

/// A timed piece of transcribed speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// A speech-to-text service.
#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Transcribe a short clip into a single line of text.
    async fn transcribe_line(&self, audio: &Path, language: &str) -> Result<String>;

    /// Transcribe a whole recording into ordered segments.
    async fn transcribe_file(&self, audio: &Path, language: &str) -> Result<Vec<TranscriptSegment>>;
}

/// Builds a ready-to-use client from settings.
#[async_trait]
pub trait Connector<S, C: ?Sized>: Send + Sync
where
    S: Send + Sync,
{
    async fn connect(&self, settings: &S) -> Result<Arc<C>>;
}

/// Owns one shared client: staged settings, the live instance and the
/// loading flag.
///
/// Settings passed to [`configure`](Self::configure) only take effect on the
/// next [`initialize`](Self::initialize). Jobs hold their own `Arc` to the
/// client they started with, so re-initializing never swaps a client out from
/// under a running job.
pub struct ManagedClient<S, C: ?Sized> {
    connector: Option<Arc<dyn Connector<S, C>>>,
    settings: Mutex<S>,
    active: RwLock<Option<Arc<C>>>,
    loading: AtomicBool,
}

impl<S, C> ManagedClient<S, C>
where
    S: Clone + Send + Sync,
    C: ?Sized + Send + Sync,
{
    pub fn new(connector: Option<Arc<dyn Connector<S, C>>>, settings: S) -> Self {
        Self {
            connector,
            settings: Mutex::new(settings),
            active: RwLock::new(None),
            loading: AtomicBool::new(false),
        }
    }

    /// Update the staged settings.
    pub fn configure(&self, update: impl FnOnce(&mut S)) {
        update(&mut self.settings.lock());
    }

    /// Copy of the staged settings.
    pub fn settings(&self) -> S {
        self.settings.lock().clone()
    }

    /// Build a new client from the staged settings and make it current.
    /// The previous client, if any, stays current when this fails.
    pub async fn initialize(&self) -> Result<(), LoadError> {
        let _loading = LoadingGuard::acquire(&self.loading).ok_or(LoadError::AlreadyLoading)?;
        let connector = self.connector.clone().ok_or(LoadError::Unavailable)?;
        let settings = self.settings();
        trace!("initialize: connecting");
        match connector.connect(&settings).await {
            Ok(client) => {
                *self.active.write() = Some(client);
                info!("client initialized");
                Ok(())
            }
            Err(err) => {
                warn!("client initialization failed: {err:#}");
                Err(LoadError::Connect(err))
            }
        }
    }

    /// Drop the current client. Jobs already running keep theirs.
    pub fn shutdown(&self) {
        if self.active.write().take().is_some() {
            info!("client shut down");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.active.read().is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// The current client, if initialized.
    pub fn current(&self) -> Option<Arc<C>> {
        self.active.read().clone()
    }
}

/// Holds a one-slot flag for its lifetime.
struct LoadingGuard<'a>(&'a AtomicBool);

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
