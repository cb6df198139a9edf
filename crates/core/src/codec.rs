//! Wire format between a batch of lines and the inference service.
//!
//! A batch is sent as numbered lines, `N. Speaker (1.25s): text`, and must come
//! back as exactly one non-empty line per request line. The text after the
//! first `:` of each response line is the translation for the line at the same
//! position.

use crate::context::format_seconds;
use crate::error::TranslateError;
use crate::script::TimedLine;
use crate::subtitle::LINE_BREAK;

/// Speaker label used when a line has none.
const ANONYMOUS: &str = "Line";

/// Render a batch as numbered, speaker-tagged lines.
pub fn encode_batch(lines: &[TimedLine]) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{} {}", header(i, line), line.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render source and translated lines side by side as `N. Speaker (Xs): src => trans`.
/// Speaker and duration come from the source line. Responses use the
/// [`decode_batch`] contract.
pub fn encode_review(source: &[TimedLine], translated: &[TimedLine]) -> String {
    source
        .iter()
        .zip(translated)
        .enumerate()
        .map(|(i, (src, trans))| format!("{} {} => {}", header(i, src), src.text, trans.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `N. Speaker (1.25s):` for the line at batch position `i`.
fn header(i: usize, line: &TimedLine) -> String {
    let speaker = line.speaker.trim();
    let speaker = if speaker.is_empty() { ANONYMOUS } else { speaker };
    let secs = line.duration_seconds().unwrap_or(0.0);
    format!("{}. {} ({}s):", i + 1, speaker, format_seconds(secs))
}

/// Split a batch response into one translation per requested line.
pub fn decode_batch(response: &str, expected: usize) -> Result<Vec<String>, TranslateError> {
    let lines: Vec<&str> = response.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() != expected {
        return Err(TranslateError::ShapeMismatch {
            expected,
            actual: lines.len(),
        });
    }
    lines
        .into_iter()
        .map(|line| match line.split_once(':') {
            Some((_, text)) => Ok(clean(text)),
            None => Err(TranslateError::MissingDelimiter {
                line: line.trim().to_string(),
            }),
        })
        .collect()
}

/// Clean a single-line response. A leading `speaker:` label that repeats the
/// line's own speaker is dropped.
pub fn decode_line(response: &str, speaker: &str) -> String {
    let text = response.trim();
    let speaker = speaker.trim();
    let text = if speaker.is_empty() {
        text
    } else {
        text.strip_prefix(speaker)
            .and_then(|rest| rest.trim_start().strip_prefix(':'))
            .unwrap_or(text)
    };
    clean(text)
}

/// Fold break markers and raw newlines into single spaces and trim, so the
/// result always fits on one subtitle line.
fn clean(text: &str) -> String {
    text.replace(LINE_BREAK, "\n")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> Vec<TimedLine> {
        vec![
            TimedLine::new(0, "Akemi", "おはよう").with_timing(1000, 2500),
            TimedLine::new(1, "", "はい"),
            TimedLine::new(2, " Producer ", "行こう\\N今すぐ").with_timing(0, 3333),
        ]
    }

    #[test]
    fn encodes_position_speaker_and_duration() {
        assert_eq!(
            encode_batch(&batch()),
            "1. Akemi (1.50s): おはよう\n2. Line (0.00s): はい\n3. Producer (3.33s): 行こう\\N今すぐ"
        );
    }

    #[test]
    fn review_pairs_source_with_translation() {
        let translated = vec![
            TimedLine::new(0, "Akemi", "Morning"),
            TimedLine::new(1, "", "Yes"),
        ];
        assert_eq!(
            encode_review(&batch()[..2], &translated),
            "1. Akemi (1.50s): おはよう => Morning\n2. Line (0.00s): はい => Yes"
        );
    }

    #[test]
    fn decodes_matching_response() {
        let response = "1. Akemi (1.50s): Morning!\n\n2. Line (0.00s):  Yes \n3. Producer (3.33s): Let's go\\Nright now\\N\n";
        let out = decode_batch(response, 3).unwrap();
        assert_eq!(out, vec!["Morning!", "Yes", "Let's go right now"]);
    }

    #[test]
    fn keeps_colons_inside_the_text() {
        let out = decode_batch("1. Line (0.00s): Note: it works", 1).unwrap();
        assert_eq!(out, vec!["Note: it works"]);
    }

    #[test]
    fn line_count_must_match() {
        let err = decode_batch("1. A: one\n2. B: two", 3).unwrap_err();
        assert!(matches!(
            err,
            TranslateError::ShapeMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert!(matches!(
            decode_batch("1. A: one\n2. B: two\n3. C: three\n4. D: four", 3),
            Err(TranslateError::ShapeMismatch { actual: 4, .. })
        ));
    }

    #[test]
    fn missing_delimiter_is_fatal() {
        let err = decode_batch("1. A: one\n2 no delimiter", 2).unwrap_err();
        assert!(matches!(err, TranslateError::MissingDelimiter { line } if line == "2 no delimiter"));
    }

    #[test]
    fn single_line_strips_own_label_and_markers() {
        assert_eq!(decode_line("  Akemi: Good morning\\N ", "Akemi"), "Good morning");
        assert_eq!(decode_line("Time: 5pm", "Akemi"), "Time: 5pm");
        assert_eq!(decode_line("Hello there", ""), "Hello there");
    }

    #[test]
    fn raw_newlines_fold_into_one_line() {
        assert_eq!(decode_line("Hello\n\nthere\r\n", ""), "Hello there");
        assert_eq!(decode_line("Akemi: Wait,\n  please", "Akemi"), "Wait, please");
    }
}
