//! Context-aware translation of subtitle scripts through a rate-limited
//! text-generation service, with single-flight background jobs.

pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod progress;
pub mod prompts;
pub mod script;
pub mod subtitle;
pub mod translate;

#[cfg(test)]
mod testing;
