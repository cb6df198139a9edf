//! The ordered dialogue lines a translation run works on.

use crate::client::TranscriptSegment;
use serde::{Deserialize, Serialize};

/// One timed dialogue line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedLine {
    /// Position in the script. Never changes during a run.
    pub index: usize,
    /// Speaker name, empty when the source format has none.
    pub speaker: String,
    /// Source text before translation, target text after.
    pub text: String,
    pub start_ms: Option<u64>,
    pub end_ms: Option<u64>,
}

impl TimedLine {
    pub fn new(index: usize, speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            index,
            speaker: speaker.into(),
            text: text.into(),
            start_ms: None,
            end_ms: None,
        }
    }

    /// Attach a time range. `end_ms` below `start_ms` is clamped up to `start_ms`.
    pub fn with_timing(mut self, start_ms: u64, end_ms: u64) -> Self {
        self.start_ms = Some(start_ms);
        self.end_ms = Some(end_ms.max(start_ms));
        self
    }

    /// Length of the line in seconds, or `None` when timing is unknown.
    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.start_ms, self.end_ms) {
            (Some(start), Some(end)) => Some((end.saturating_sub(start)) as f64 / 1000.0),
            _ => None,
        }
    }

    /// `speaker: text`, or just the text when there is no speaker.
    pub fn labeled(&self) -> String {
        if self.speaker.trim().is_empty() {
            self.text.clone()
        } else {
            format!("{}: {}", self.speaker.trim(), self.text)
        }
    }
}

/// An ordered sequence of lines. Insertion order is playback and translation order.
///
/// Only the text of a line can be changed once the script is built, so the
/// length and every index stay fixed for the lifetime of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    lines: Vec<TimedLine>,
}

impl Script {
    pub fn new(lines: Vec<TimedLine>) -> Self {
        Self { lines }
    }

    /// Build a script from transcription output, numbering lines from zero.
    pub fn from_segments(segments: &[TranscriptSegment]) -> Self {
        let lines = segments
            .iter()
            .enumerate()
            .map(|(i, s)| TimedLine::new(i, "", s.text.trim()).with_timing(s.start_ms, s.end_ms))
            .collect();
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[TimedLine] {
        &self.lines
    }

    pub fn get(&self, pos: usize) -> Option<&TimedLine> {
        self.lines.get(pos)
    }

    /// Replace the text at `pos`. Out of range positions are ignored.
    pub fn set_text(&mut self, pos: usize, text: impl Into<String>) {
        if let Some(line) = self.lines.get_mut(pos) {
            line.text = text.into();
        }
    }

    pub fn into_lines(self) -> Vec<TimedLine> {
        self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_floored_at_zero_and_optional() {
        let line = TimedLine::new(0, "A", "x").with_timing(2000, 1000);
        assert_eq!(line.end_ms, Some(2000));
        assert_eq!(line.duration_seconds(), Some(0.0));

        let line = TimedLine::new(0, "A", "x").with_timing(1000, 2500);
        assert_eq!(line.duration_seconds(), Some(1.5));

        assert_eq!(TimedLine::new(0, "A", "x").duration_seconds(), None);
    }

    #[test]
    fn set_text_keeps_index_and_length() {
        let mut script = Script::new(vec![TimedLine::new(0, "", "a"), TimedLine::new(1, "", "b")]);
        script.set_text(1, "B");
        script.set_text(7, "ignored");
        assert_eq!(script.len(), 2);
        assert_eq!(script.lines()[1].index, 1);
        assert_eq!(script.lines()[1].text, "B");
    }

    #[test]
    fn segments_become_numbered_lines() {
        let segments = vec![
            TranscriptSegment {
                start_ms: 0,
                end_ms: 900,
                text: " hello ".into(),
            },
            TranscriptSegment {
                start_ms: 900,
                end_ms: 2000,
                text: "world".into(),
            },
        ];
        let script = Script::from_segments(&segments);
        assert_eq!(script.len(), 2);
        assert_eq!(script.lines()[0].text, "hello");
        assert_eq!(script.lines()[1].index, 1);
        assert_eq!(script.lines()[1].start_ms, Some(900));
    }
}
