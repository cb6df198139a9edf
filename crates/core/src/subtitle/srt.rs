//! SRT parsing and formatting.
//! Multi-line cues are folded into one line with the `\N` break marker so the
//! pipeline always sees exactly one TimedLine per cue.

use super::LINE_BREAK;
use crate::script::{Script, TimedLine};
use anyhow::{anyhow, Context, Result};

/// Parse SRT text into a script.
/// Cue numbers are not kept: lines are indexed by position.
pub fn parse(input: &str) -> Result<Script> {
    let mut out = Vec::new();
    let mut lines = input.trim_start_matches('\u{feff}').lines();
    loop {
        let number = match lines.next() {
            Some(l) if !l.trim().is_empty() => l.trim(),
            Some(_) => continue,
            None => break,
        };
        let _: u32 = number
            .parse()
            .with_context(|| format!("bad cue number {number:?}"))?;
        let time_line = lines.next().ok_or_else(|| anyhow!("missing time"))?;
        let (start_ms, end_ms) = parse_times(time_line)?;
        let mut text = Vec::new();
        for line in lines.by_ref() {
            if line.trim().is_empty() {
                break;
            }
            text.push(line.to_string());
        }
        out.push(TimedLine::new(out.len(), "", text.join(LINE_BREAK)).with_timing(start_ms, end_ms));
    }
    Ok(Script::new(out))
}

/// Format a script back to SRT, numbering cues from 1.
pub fn format(script: &Script) -> String {
    let mut out = String::new();
    for (pos, line) in script.lines().iter().enumerate() {
        let start = line.start_ms.unwrap_or(0);
        let end = line.end_ms.unwrap_or(start);
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            pos + 1,
            format_time(start),
            format_time(end),
            line.text.replace(LINE_BREAK, "\n")
        ));
    }
    out
}

/// Parse a time range like `00:00:01,000 --> 00:00:02,000` to milliseconds.
fn parse_times(line: &str) -> Result<(u64, u64)> {
    let mut parts = line.split(" --> ");
    let start = parts.next().ok_or_else(|| anyhow!("no start"))?;
    let end = parts.next().ok_or_else(|| anyhow!("no end"))?;
    Ok((parse_time(start.trim())?, parse_time(end.trim())?))
}

/// Parse `HH:MM:SS,mmm` into milliseconds.
fn parse_time(t: &str) -> Result<u64> {
    let parts: Vec<&str> = t.split([':', ',', '.']).collect();
    if parts.len() != 4 {
        return Err(anyhow!("bad time {t:?}"));
    }
    let h: u64 = parts[0].parse()?;
    let m: u64 = parts[1].parse()?;
    let s: u64 = parts[2].parse()?;
    let ms: u64 = parts[3].parse()?;
    h.checked_mul(3_600_000)
        .and_then(|acc| acc.checked_add(m.checked_mul(60_000)?))
        .and_then(|acc| acc.checked_add(s.checked_mul(1000)?))
        .and_then(|acc| acc.checked_add(ms))
        .ok_or_else(|| anyhow!("time out of range {t:?}"))
}

/// Format milliseconds back to `HH:MM:SS,mmm`.
fn format_time(ms: u64) -> String {
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1000;
    let ms = ms % 1000;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_srt() {
        let input = "1\n00:00:00,000 --> 00:00:01,000\nHello\n\n";
        let script = parse(input).unwrap();
        assert_eq!(script.len(), 1);
        assert_eq!(script.lines()[0].text, "Hello");
        assert_eq!(format(&script), input);
    }

    #[test]
    fn folds_multiline_cues() {
        let input = "1\n00:00:01,500 --> 00:00:03,000\nfirst\nsecond\n\n2\n00:01:00,000 --> 00:01:02,250\nthird\n";
        let script = parse(input).unwrap();
        assert_eq!(script.len(), 2);
        assert_eq!(script.lines()[0].text, "first\\Nsecond");
        assert_eq!(script.lines()[0].duration_seconds(), Some(1.5));
        assert_eq!(script.lines()[1].index, 1);
        assert_eq!(script.lines()[1].start_ms, Some(60_000));
        assert!(format(&script).starts_with("1\n00:00:01,500 --> 00:00:03,000\nfirst\nsecond\n\n2\n"));
    }

    #[test]
    fn rejects_missing_time_line() {
        assert!(parse("1\n").is_err());
        assert!(parse("x\n00:00:00,000 --> 00:00:01,000\nhi\n").is_err());
    }

    #[test]
    fn rejects_out_of_range_hours() {
        assert!(parse_time("99999999999999:00:00,000").is_err());
        assert!(parse("1\n99999999999999:00:00,000 --> 99999999999999:00:01,000\nhi\n").is_err());
        assert_eq!(parse_time("01:00:00,001").unwrap(), 3_600_001);
    }
}
