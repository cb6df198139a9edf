//! Translation of a whole script through an inference client.
//! This module wires context building, the batch codec and the retry policy.
//!
//! Two failure policies exist side by side:
//! - batched translation is all-or-nothing: the first failed batch ends the
//!   run, leaving earlier batches committed and later ones untouched;
//! - line-by-line translation is best-effort: a failed line keeps its source
//!   text and the run moves on.

use crate::client::{InferenceClient, InferenceRequest};
use crate::codec;
use crate::context::{self, ContextMap};
use crate::error::{InferenceError, TranslateError};
use crate::prompts;
use crate::script::Script;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Default number of subtitle lines translated per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of neighbouring lines sent with each line in line-by-line mode.
pub const DEFAULT_CONTEXT_WINDOW: usize = 3;

/// How many times a request is tried and how long to wait after a rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1500),
        }
    }
}

/// How a file is split into requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationMode {
    /// Numbered batches of up to `batch_size` lines. All-or-nothing.
    Batched { batch_size: usize },
    /// One request per line with `context_window` neighbours. Best-effort.
    LineByLine { context_window: usize },
}

impl Default for TranslationMode {
    fn default() -> Self {
        TranslationMode::Batched {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Per-run settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOptions {
    pub input_lang: String,
    pub output_lang: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub retry: RetryPolicy,
}

impl TranslateOptions {
    pub fn new(input_lang: impl Into<String>, output_lang: impl Into<String>) -> Self {
        Self {
            input_lang: input_lang.into(),
            output_lang: output_lang.into(),
            temperature: None,
            max_tokens: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a best-effort line-by-line run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineReport {
    pub translated: usize,
    /// Positions of lines left in their source language.
    pub failed: Vec<usize>,
}

/// Split `len` lines into contiguous ranges of at most `batch_size` (min 1).
pub fn batches(len: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let size = batch_size.max(1);
    (0..len).step_by(size).map(move |start| start..(start + size).min(len))
}

/// Drives one inference client over a script.
pub struct BatchTranslator<'a> {
    client: &'a dyn InferenceClient,
    options: &'a TranslateOptions,
}

impl<'a> BatchTranslator<'a> {
    pub fn new(client: &'a dyn InferenceClient, options: &'a TranslateOptions) -> Self {
        Self { client, options }
    }

    /// Translate `script` in place, batch by batch.
    ///
    /// Text is written back only once a whole batch decodes, and `progress`
    /// is called with `(processed, total)` after each committed line. The
    /// first failing batch ends the run.
    pub async fn translate_batched<F>(
        &self,
        script: &mut Script,
        base: &ContextMap,
        batch_size: usize,
        mut progress: F,
    ) -> Result<(), TranslateError>
    where
        F: FnMut(usize, usize),
    {
        let total = script.len();
        let mut done = 0;
        info!("translating {total} lines in batches of {}", batch_size.max(1));
        for range in batches(total, batch_size) {
            let expected = range.len();
            let response = {
                let lines = &script.lines()[range.clone()];
                self.infer_with_retry(|| InferenceRequest {
                    prompt: codec::encode_batch(lines),
                    system_prompt: Some(prompts::batch_system_prompt(
                        &context::batch_context(base),
                        &self.options.input_lang,
                        &self.options.output_lang,
                    )),
                    temperature: self.options.temperature,
                    max_tokens: self.options.max_tokens,
                })
                .await
            };
            let translated = response
                .and_then(|text| codec::decode_batch(&text, expected))
                .map_err(|err| {
                    warn!("batch {}-{} failed: {err}", range.start + 1, range.end);
                    err
                })?;
            for (pos, text) in range.clone().zip(translated) {
                script.set_text(pos, text);
                done += 1;
                progress(done, total);
            }
            debug!("translated lines {}-{}", range.start + 1, range.end);
        }
        Ok(())
    }

    /// Review an existing translation batch by batch, writing corrections into
    /// `translated`. Same commit and failure rules as [`translate_batched`](Self::translate_batched).
    /// Scripts of different lengths are rejected before any request is sent.
    pub async fn review_batched<F>(
        &self,
        source: &Script,
        translated: &mut Script,
        base: &ContextMap,
        batch_size: usize,
        mut progress: F,
    ) -> Result<(), TranslateError>
    where
        F: FnMut(usize, usize),
    {
        if source.len() != translated.len() {
            return Err(TranslateError::ShapeMismatch {
                expected: source.len(),
                actual: translated.len(),
            });
        }
        let total = source.len();
        let mut done = 0;
        info!("reviewing {total} lines in batches of {}", batch_size.max(1));
        for range in batches(total, batch_size) {
            let expected = range.len();
            let response = {
                let src = &source.lines()[range.clone()];
                let trans = &translated.lines()[range.clone()];
                self.infer_with_retry(|| InferenceRequest {
                    prompt: codec::encode_review(src, trans),
                    system_prompt: Some(prompts::review_system_prompt(
                        &context::batch_context(base),
                        &self.options.input_lang,
                        &self.options.output_lang,
                    )),
                    temperature: self.options.temperature,
                    max_tokens: self.options.max_tokens,
                })
                .await
            };
            let reviewed = response
                .and_then(|text| codec::decode_batch(&text, expected))
                .map_err(|err| {
                    warn!("review batch {}-{} failed: {err}", range.start + 1, range.end);
                    err
                })?;
            for (pos, text) in range.clone().zip(reviewed) {
                translated.set_text(pos, text);
                done += 1;
                progress(done, total);
            }
            debug!("reviewed lines {}-{}", range.start + 1, range.end);
        }
        Ok(())
    }

    /// Translate `script` in place, one line at a time with `window` lines of
    /// context on each side. Failed lines keep their text.
    pub async fn translate_per_line<F>(
        &self,
        script: &mut Script,
        base: &ContextMap,
        window: usize,
        mut progress: F,
    ) -> LineReport
    where
        F: FnMut(usize, usize),
    {
        let total = script.len();
        let mut report = LineReport::default();
        info!("translating {total} lines one by one, window {window}");
        for pos in 0..total {
            let result = {
                let live: &Script = script;
                self.infer_with_retry(|| InferenceRequest {
                    prompt: live.lines()[pos].text.trim().to_string(),
                    system_prompt: Some(prompts::line_system_prompt(
                        &context::line_context(live, pos, window, base),
                        &self.options.input_lang,
                        &self.options.output_lang,
                    )),
                    temperature: self.options.temperature,
                    max_tokens: self.options.max_tokens,
                })
                .await
            };
            match result {
                Ok(text) => {
                    let cleaned = codec::decode_line(&text, &script.lines()[pos].speaker);
                    script.set_text(pos, cleaned);
                    report.translated += 1;
                }
                Err(err) => {
                    warn!("line {} left untranslated: {err}", pos + 1);
                    report.failed.push(pos);
                }
            }
            progress(pos + 1, total);
        }
        report
    }

    /// Translate a free-standing piece of text with the given context.
    pub async fn translate_text(&self, text: &str, base: &ContextMap) -> Result<String, TranslateError> {
        let response = self
            .infer_with_retry(|| InferenceRequest {
                prompt: text.trim().to_string(),
                system_prompt: Some(prompts::line_system_prompt(
                    base,
                    &self.options.input_lang,
                    &self.options.output_lang,
                )),
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
            })
            .await?;
        Ok(codec::decode_line(&response, ""))
    }

    /// Send a request, retrying only on rate limits. The request is rebuilt
    /// for every attempt. No sleep follows the final attempt.
    async fn infer_with_retry<B>(&self, build: B) -> Result<String, TranslateError>
    where
        B: Fn() -> InferenceRequest,
    {
        let max = self.options.retry.max_attempts.max(1);
        let mut last = String::new();
        for attempt in 1..=max {
            trace!("inference attempt {attempt}/{max}");
            match self.client.infer(build()).await {
                Ok(text) => return Ok(text),
                Err(InferenceError::RateLimited(message)) => {
                    warn!("rate limit hit on attempt {attempt}/{max}: {message}");
                    last = message;
                    if attempt < max {
                        tokio::time::sleep(self.options.retry.backoff).await;
                    }
                }
                Err(InferenceError::Other(err)) => return Err(TranslateError::Inference(err)),
            }
        }
        Err(TranslateError::RateLimited {
            attempts: max,
            message: last,
        })
    }
}
