//! Advanced SubStation Alpha (`.ass`/`.ssa`) events.
//! Only `Dialogue:` rows are read; every other line is kept verbatim so the
//! file can be written back with just the text column replaced.

use crate::script::{Script, TimedLine};
use anyhow::{anyhow, Context, Result};

/// Column layout used when a file has no `Format:` line in `[Events]`.
const DEFAULT_FORMAT: &[&str] = &[
    "layer", "start", "end", "style", "name", "marginl", "marginr", "marginv", "effect", "text",
];

/// Raw file contents plus where each dialogue row lives.
#[derive(Debug, Clone, PartialEq)]
pub struct AssFile {
    lines: Vec<String>,
    events: Vec<Event>,
    trailing_newline: bool,
}

/// A dialogue row: its line number and everything before the text column.
#[derive(Debug, Clone, PartialEq)]
struct Event {
    row: usize,
    prefix: String,
}

/// Parse an ASS document into its raw layout and a script of dialogue lines.
pub fn parse(input: &str) -> Result<(AssFile, Script)> {
    let input = input.trim_start_matches('\u{feff}');
    let lines: Vec<String> = input.lines().map(str::to_string).collect();
    let mut events = Vec::new();
    let mut script = Vec::new();
    let mut in_events = false;
    let mut columns: Vec<String> = DEFAULT_FORMAT.iter().map(|c| c.to_string()).collect();

    for (row, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            in_events = trimmed.eq_ignore_ascii_case("[events]");
            continue;
        }
        if !in_events {
            continue;
        }
        if let Some(format) = trimmed.strip_prefix("Format:") {
            columns = format.split(',').map(|c| c.trim().to_lowercase()).collect();
            if columns.last().map(String::as_str) != Some("text") {
                return Err(anyhow!("line {}: Text must be the last event column", row + 1));
            }
            continue;
        }
        let Some(payload) = line.trim_start().strip_prefix("Dialogue:") else {
            continue;
        };
        let fields: Vec<&str> = payload.splitn(columns.len(), ',').collect();
        if fields.len() != columns.len() {
            return Err(anyhow!(
                "line {}: expected {} fields, found {}",
                row + 1,
                columns.len(),
                fields.len()
            ));
        }
        let field = |name: &str| {
            columns
                .iter()
                .position(|c| c == name)
                .map(|i| fields[i].trim())
        };
        let start = field("start").ok_or_else(|| anyhow!("no Start column"))?;
        let end = field("end").ok_or_else(|| anyhow!("no End column"))?;
        let start_ms = parse_time(start).with_context(|| format!("line {}", row + 1))?;
        let end_ms = parse_time(end).with_context(|| format!("line {}", row + 1))?;
        let speaker = field("name").unwrap_or("");
        let text = fields[fields.len() - 1];

        events.push(Event {
            row,
            prefix: line[..line.len() - text.len()].to_string(),
        });
        script.push(TimedLine::new(script.len(), speaker, text).with_timing(start_ms, end_ms));
    }

    let file = AssFile {
        lines,
        events,
        trailing_newline: input.ends_with('\n'),
    };
    Ok((file, Script::new(script)))
}

/// Write the file back with the text column of each dialogue row taken from `script`.
pub fn render(file: &AssFile, script: &Script) -> String {
    let mut lines = file.lines.clone();
    for (event, line) in file.events.iter().zip(script.lines()) {
        lines[event.row] = format!("{}{}", event.prefix, line.text);
    }
    let mut out = lines.join("\n");
    if file.trailing_newline {
        out.push('\n');
    }
    out
}

/// Parse `H:MM:SS.cc` into milliseconds.
fn parse_time(t: &str) -> Result<u64> {
    let parts: Vec<&str> = t.split([':', '.']).collect();
    if parts.len() != 4 {
        return Err(anyhow!("bad time {t:?}"));
    }
    let h: u64 = parts[0].parse()?;
    let m: u64 = parts[1].parse()?;
    let s: u64 = parts[2].parse()?;
    let cs: u64 = parts[3].parse()?;
    h.checked_mul(3_600_000)
        .and_then(|acc| acc.checked_add(m.checked_mul(60_000)?))
        .and_then(|acc| acc.checked_add(s.checked_mul(1000)?))
        .and_then(|acc| acc.checked_add(cs.checked_mul(10)?))
        .ok_or_else(|| anyhow!("time out of range {t:?}"))
}
