//! Side information sent with every inference request.
//!
//! The caller supplies fixed context (series background, character notes and
//! so on). Per-line entries are computed from the script around the cursor.
//! Every call returns a fresh map so nothing from one batch or line can leak
//! into the next.

use crate::script::{Script, TimedLine};
use std::collections::BTreeMap;

/// Label to text. Ordered so prompts are deterministic.
pub type ContextMap = BTreeMap<String, String>;

pub const PREVIOUS_LINES: &str = "previous_lines";
pub const NEXT_LINES: &str = "next_lines";
pub const CURRENT_SPEAKER: &str = "current_speaker";
pub const LENGTH_SECONDS: &str = "length_seconds";

/// Context for translating the line at `cursor` on its own.
///
/// Adds the `window` lines before and after the cursor, the current speaker
/// and, when the line has timing, its length in seconds. Windows stop at the
/// script boundaries instead of wrapping.
pub fn line_context(script: &Script, cursor: usize, window: usize, base: &ContextMap) -> ContextMap {
    let lines = script.lines();
    let cursor = cursor.min(lines.len());
    let before = &lines[cursor.saturating_sub(window)..cursor];
    let after_start = (cursor + 1).min(lines.len());
    let after_end = cursor.saturating_add(1).saturating_add(window).min(lines.len());
    let after = &lines[after_start..after_end];

    let render = |slice: &[TimedLine]| {
        slice
            .iter()
            .map(|l| l.labeled())
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut ctx = base.clone();
    ctx.insert(PREVIOUS_LINES.into(), render(before));
    ctx.insert(NEXT_LINES.into(), render(after));
    if let Some(line) = lines.get(cursor) {
        ctx.insert(CURRENT_SPEAKER.into(), line.speaker.trim().to_string());
        if let Some(secs) = line.duration_seconds() {
            ctx.insert(LENGTH_SECONDS.into(), format_seconds(secs));
        }
    }
    ctx
}

/// Context for a whole batch. Speaker and timing travel inside the encoded
/// batch text instead, so this is a copy of the base context.
pub fn batch_context(base: &ContextMap) -> ContextMap {
    base.clone()
}

/// Seconds with two decimals, floored at zero.
pub fn format_seconds(secs: f64) -> String {
    format!("{:.2}", secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(n: usize) -> Script {
        Script::new(
            (0..n)
                .map(|i| TimedLine::new(i, format!("S{i}"), format!("t{i}")).with_timing(0, 1234))
                .collect(),
        )
    }

    fn base() -> ContextMap {
        ContextMap::from([("series".to_string(), "Idol drama".to_string())])
    }

    #[test]
    fn windows_stop_at_the_start() {
        let ctx = line_context(&script(5), 0, 2, &base());
        assert_eq!(ctx[PREVIOUS_LINES], "");
        assert_eq!(ctx[NEXT_LINES], "S1: t1\nS2: t2");
        assert_eq!(ctx[CURRENT_SPEAKER], "S0");
        assert_eq!(ctx[LENGTH_SECONDS], "1.23");
        assert_eq!(ctx["series"], "Idol drama");
    }

    #[test]
    fn windows_stop_at_the_end() {
        let ctx = line_context(&script(5), 4, 3, &base());
        assert_eq!(ctx[PREVIOUS_LINES], "S1: t1\nS2: t2\nS3: t3");
        assert_eq!(ctx[NEXT_LINES], "");
    }

    #[test]
    fn window_never_reaches_beyond_its_size() {
        let ctx = line_context(&script(10), 5, 1, &base());
        assert_eq!(ctx[PREVIOUS_LINES], "S4: t4");
        assert_eq!(ctx[NEXT_LINES], "S6: t6");
        let ctx = line_context(&script(10), 5, 0, &base());
        assert_eq!(ctx[PREVIOUS_LINES], "");
        assert_eq!(ctx[NEXT_LINES], "");
    }

    #[test]
    fn length_is_omitted_without_timing() {
        let s = Script::new(vec![TimedLine::new(0, "", "x")]);
        let ctx = line_context(&s, 0, 3, &ContextMap::new());
        assert!(!ctx.contains_key(LENGTH_SECONDS));
        assert_eq!(ctx[CURRENT_SPEAKER], "");
    }

    #[test]
    fn every_call_starts_from_the_base() {
        let s = script(4);
        let base = base();
        let first = line_context(&s, 1, 1, &base);
        let second = line_context(&s, 3, 1, &base);
        assert_eq!(base.len(), 1);
        assert_ne!(first[PREVIOUS_LINES], second[PREVIOUS_LINES]);
        assert_eq!(batch_context(&base), base);
    }
}
