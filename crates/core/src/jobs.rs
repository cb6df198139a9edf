//! Background jobs against the shared inference and transcription clients.
//!
//! Each kind of job has one slot: at most one job of a kind runs at a time,
//! submissions are never queued, and callers poll for status and results
//! instead of awaiting the job. Jobs of different kinds run independently.

use crate::client::{Connector, InferenceClient, ManagedClient, TranscriptSegment, TranscriptionClient};
use crate::config::{AudioSettings, LlmSettings};
use crate::context::ContextMap;
use crate::error::{LoadError, SubmitError};
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::script::Script;
use crate::subtitle;
use crate::translate::{BatchTranslator, RetryPolicy, TranslateOptions, TranslationMode};
use anyhow::{anyhow, Result};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

/// The two shared resources jobs run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Translation,
    Transcription,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Translation => f.write_str("translation"),
            JobKind::Transcription => f.write_str("transcription"),
        }
    }
}

/// What a finished job produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum JobPayload {
    LineTranslation(String),
    FileTranslation { filename: String, content: String },
    Transcription(String),
    TranscriptSegments(Vec<TranscriptSegment>),
}

/// Answer to a result poll. Terminal states are delivered once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum JobResult {
    Idle,
    Processing,
    Complete(JobPayload),
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobStatus {
    pub running: bool,
    pub loading: bool,
}

/// Translate a whole subtitle file.
#[derive(Debug, Clone)]
pub struct FileTranslationRequest {
    pub path: PathBuf,
    pub context: ContextMap,
    pub input_lang: String,
    pub output_lang: String,
    pub mode: TranslationMode,
}

/// Translate one piece of text.
#[derive(Debug, Clone)]
pub struct LineTranslationRequest {
    pub text: String,
    pub context: ContextMap,
    pub input_lang: String,
    pub output_lang: String,
}

/// State of one job kind.
#[derive(Default)]
struct JobSlot {
    running: AtomicBool,
    result: Mutex<Option<JobPayload>>,
    error: Mutex<Option<String>>,
}

impl JobSlot {
    /// Claim the slot and clear the previous outcome. False when a job is
    /// already running.
    fn try_begin(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        *self.result.lock() = None;
        *self.error.lock() = None;
        true
    }

    fn finish(&self, kind: JobKind, outcome: Result<JobPayload>) {
        match outcome {
            Ok(payload) => {
                info!("{kind} job completed");
                *self.result.lock() = Some(payload);
            }
            Err(err) => {
                error!("{kind} job failed: {err:#}");
                *self.error.lock() = Some(format!("{err:#}"));
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn take(&self) -> JobResult {
        if self.is_running() {
            return JobResult::Processing;
        }
        if let Some(err) = self.error.lock().take() {
            return JobResult::Error(err);
        }
        match self.result.lock().take() {
            Some(payload) => JobResult::Complete(payload),
            None => JobResult::Idle,
        }
    }
}

struct Inner {
    llm: ManagedClient<LlmSettings, dyn InferenceClient>,
    audio: ManagedClient<AudioSettings, dyn TranscriptionClient>,
    translation: JobSlot,
    transcription: JobSlot,
    progress: Mutex<ProgressTracker>,
    retry: Mutex<RetryPolicy>,
}

impl Inner {
    fn slot(&self, kind: JobKind) -> &JobSlot {
        match kind {
            JobKind::Translation => &self.translation,
            JobKind::Transcription => &self.transcription,
        }
    }
}

/// Holds a claimed job slot. Dropping it releases the slot; a job dropped
/// before it stored an outcome is reported as an error.
struct RunningGuard {
    inner: Arc<Inner>,
    kind: JobKind,
    finished: bool,
}

impl RunningGuard {
    fn complete(mut self, outcome: Result<JobPayload>) {
        if self.kind == JobKind::Translation {
            self.inner.progress.lock().reset();
        }
        self.inner.slot(self.kind).finish(self.kind, outcome);
        self.finished = true;
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if !self.finished {
            if self.kind == JobKind::Translation {
                self.inner.progress.lock().reset();
            }
            let dropped = anyhow!("{} job was dropped before completing", self.kind);
            self.inner.slot(self.kind).finish(self.kind, Err(dropped));
        }
        self.inner.slot(self.kind).running.store(false, Ordering::SeqCst);
        info!("{} process completed", self.kind);
    }
}

/// Completion handle for a submitted job. Awaiting it is optional; dropping it
/// leaves the job running. Jobs cannot be cancelled.
#[derive(Debug)]
pub struct JobHandle(JoinHandle<()>);

impl Future for JobHandle {
    type Output = Result<(), JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

/// Owns the shared clients and runs jobs against them in the background.
///
/// Cloning is cheap and every clone shares the same clients and job state.
/// Submitting jobs and background loading spawn Tokio tasks, so those calls
/// must happen inside a Tokio runtime.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    /// Create an orchestrator. A missing connector means that kind of client
    /// can never be initialized.
    pub fn new(
        inference: Option<Arc<dyn Connector<LlmSettings, dyn InferenceClient>>>,
        transcription: Option<Arc<dyn Connector<AudioSettings, dyn TranscriptionClient>>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                llm: ManagedClient::new(inference, LlmSettings::default()),
                audio: ManagedClient::new(transcription, AudioSettings::default()),
                translation: JobSlot::default(),
                transcription: JobSlot::default(),
                progress: Mutex::new(ProgressTracker::new()),
                retry: Mutex::new(RetryPolicy::default()),
            }),
        }
    }

    /// Retry policy used by translation jobs submitted from now on.
    pub fn set_retry_policy(&self, retry: RetryPolicy) {
        *self.inner.retry.lock() = retry;
    }

    /// Stage inference settings. They apply from the next `initialize`.
    pub fn configure_llm(&self, update: impl FnOnce(&mut LlmSettings)) {
        self.inner.llm.configure(update);
    }

    /// Stage transcription settings. They apply from the next `initialize`.
    pub fn configure_audio(&self, update: impl FnOnce(&mut AudioSettings)) {
        self.inner.audio.configure(update);
    }

    pub fn llm_settings(&self) -> LlmSettings {
        self.inner.llm.settings()
    }

    pub fn audio_settings(&self) -> AudioSettings {
        self.inner.audio.settings()
    }

    /// Build the client for `kind` from its staged settings.
    pub async fn initialize(&self, kind: JobKind) -> Result<(), LoadError> {
        match kind {
            JobKind::Translation => {
                let settings = self.inner.llm.settings();
                info!("loading LLM: model='{}', temperature={}", settings.model, settings.temperature);
                self.inner.llm.initialize().await
            }
            JobKind::Transcription => {
                let settings = self.inner.audio.settings();
                info!("loading audio model: model='{}', device='{}'", settings.model, settings.device);
                self.inner.audio.initialize().await
            }
        }
    }

    /// Initialize in the background. Returns `None` when that client is
    /// already loading.
    pub fn load_in_background(&self, kind: JobKind) -> Option<JoinHandle<()>> {
        if self.status(kind).loading {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move {
            if let Err(err) = this.initialize(kind).await {
                error!("error loading {kind} client: {err}");
            }
        }))
    }

    /// Drop the client for `kind`. A job already running keeps its client.
    pub fn shutdown(&self, kind: JobKind) {
        match kind {
            JobKind::Translation => self.inner.llm.shutdown(),
            JobKind::Transcription => self.inner.audio.shutdown(),
        }
    }

    pub fn is_ready(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::Translation => self.inner.llm.is_ready(),
            JobKind::Transcription => self.inner.audio.is_ready(),
        }
    }

    pub fn is_running(&self, kind: JobKind) -> bool {
        self.inner.slot(kind).is_running()
    }

    pub fn status(&self, kind: JobKind) -> JobStatus {
        let loading = match kind {
            JobKind::Translation => self.inner.llm.is_loading(),
            JobKind::Transcription => self.inner.audio.is_loading(),
        };
        JobStatus {
            running: self.is_running(kind),
            loading,
        }
    }

    /// Progress of the running file translation. All zeros when none runs.
    pub fn progress(&self) -> ProgressSnapshot {
        self.inner.progress.lock().snapshot()
    }

    /// Poll the outcome for `kind`. Reading a result or an error clears it.
    pub fn result(&self, kind: JobKind) -> JobResult {
        self.inner.slot(kind).take()
    }

    /// Translate a subtitle file in the background.
    pub fn submit_translate_file(&self, request: FileTranslationRequest) -> Result<JobHandle, SubmitError> {
        let client = self.llm_client()?;
        let options = self.translate_options(&request.input_lang, &request.output_lang);
        info!(
            "starting file translation: file='{}', input_lang='{}', output_lang='{}', context keys: {:?}",
            request.path.display(),
            request.input_lang,
            request.output_lang,
            request.context.keys().collect::<Vec<_>>()
        );
        let inner = self.inner.clone();
        self.submit(JobKind::Translation, async move {
            translate_file(&inner, client.as_ref(), &options, request).await
        })
    }

    /// Translate one line of text in the background.
    pub fn submit_translate_line(&self, request: LineTranslationRequest) -> Result<JobHandle, SubmitError> {
        let client = self.llm_client()?;
        let options = self.translate_options(&request.input_lang, &request.output_lang);
        info!(
            "starting line translation: input_lang='{}', output_lang='{}'",
            request.input_lang, request.output_lang
        );
        self.submit(JobKind::Translation, async move {
            let text = BatchTranslator::new(client.as_ref(), &options)
                .translate_text(&request.text, &request.context)
                .await?;
            Ok(JobPayload::LineTranslation(text))
        })
    }

    /// Transcribe a short audio clip in the background.
    pub fn submit_transcribe_line(&self, audio: &Path, language: &str) -> Result<JobHandle, SubmitError> {
        let client = self.audio_client()?;
        let (audio, language) = (audio.to_path_buf(), language.to_string());
        info!("starting audio transcription: file='{}', language='{language}'", audio.display());
        self.submit(JobKind::Transcription, async move {
            let text = client.transcribe_line(&audio, &language).await?;
            Ok(JobPayload::Transcription(text))
        })
    }

    /// Transcribe a whole recording into timed segments in the background.
    pub fn submit_transcribe_file(&self, audio: &Path, language: &str) -> Result<JobHandle, SubmitError> {
        let client = self.audio_client()?;
        let (audio, language) = (audio.to_path_buf(), language.to_string());
        info!("starting file transcription: file='{}', language='{language}'", audio.display());
        self.submit(JobKind::Transcription, async move {
            let segments = client.transcribe_file(&audio, &language).await?;
            info!("transcribed {} segments", segments.len());
            Ok(JobPayload::TranscriptSegments(segments))
        })
    }

    fn llm_client(&self) -> Result<Arc<dyn InferenceClient>, SubmitError> {
        self.inner
            .llm
            .current()
            .ok_or(SubmitError::ClientNotReady(JobKind::Translation))
    }

    fn audio_client(&self) -> Result<Arc<dyn TranscriptionClient>, SubmitError> {
        self.inner
            .audio
            .current()
            .ok_or(SubmitError::ClientNotReady(JobKind::Transcription))
    }

    /// Settings for a translation run, fixed at submission time.
    fn translate_options(&self, input_lang: &str, output_lang: &str) -> TranslateOptions {
        let settings = self.inner.llm.settings();
        let mut options = TranslateOptions::new(input_lang, output_lang);
        options.temperature = Some(settings.temperature);
        options.max_tokens = settings.max_tokens;
        options.retry = *self.inner.retry.lock();
        options
    }

    /// Claim the slot for `kind` and run `task` on a background worker.
    /// The outcome is stored for polling before the slot is released.
    fn submit<F>(&self, kind: JobKind, task: F) -> Result<JobHandle, SubmitError>
    where
        F: Future<Output = Result<JobPayload>> + Send + 'static,
    {
        if !self.inner.slot(kind).try_begin() {
            warn!("{kind} submission rejected: already running");
            return Err(SubmitError::AlreadyRunning(kind));
        }
        let running = RunningGuard {
            inner: self.inner.clone(),
            kind,
            finished: false,
        };
        Ok(JobHandle(tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(_) => Err(anyhow!("{kind} task panicked")),
            };
            running.complete(outcome);
        })))
    }
}

async fn translate_file(
    inner: &Inner,
    client: &dyn InferenceClient,
    options: &TranslateOptions,
    request: FileTranslationRequest,
) -> Result<JobPayload> {
    let mut doc = subtitle::load(&request.path)?;
    let total = doc.script.len();
    inner.progress.lock().start(total);
    let started = Instant::now();
    let translator = BatchTranslator::new(client, options);
    let progress = |done: usize, total: usize| inner.progress.lock().update(done, total);
    match request.mode {
        TranslationMode::Batched { batch_size } => {
            translator
                .translate_batched(&mut doc.script, &request.context, batch_size, progress)
                .await?;
        }
        TranslationMode::LineByLine { context_window } => {
            let report = translator
                .translate_per_line(&mut doc.script, &request.context, context_window, progress)
                .await;
            if !report.failed.is_empty() {
                warn!(
                    "{} of {} lines left untranslated: {:?}",
                    report.failed.len(),
                    total,
                    report.failed.iter().map(|p| p + 1).collect::<Vec<_>>()
                );
            }
        }
    }
    info!("file translation completed in {:.2}s", started.elapsed().as_secs_f64());
    Ok(JobPayload::FileTranslation {
        filename: translated_filename(&request.path),
        content: doc.render(),
    })
}

/// `{stem}_translated{.ext}` for the file name of `path`.
pub fn translated_filename(path: &Path) -> String {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    match path.extension() {
        Some(ext) => format!("{stem}_translated.{}", ext.to_string_lossy()),
        None => format!("{stem}_translated"),
    }
}

/// Render transcription segments as SRT text.
pub fn segments_to_srt(segments: &[TranscriptSegment]) -> String {
    subtitle::srt::format(&Script::from_segments(segments))
}
