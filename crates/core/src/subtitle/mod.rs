//! Subtitle files as the pipeline sees them: an ordered script plus whatever
//! is needed to write the same file back out after translation.

pub mod ass;
pub mod srt;

use crate::script::Script;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, trace};

/// Explicit line-break marker used inside a single subtitle line.
pub const LINE_BREAK: &str = "\\N";

#[derive(Debug, Clone, PartialEq)]
enum Layout {
    Srt,
    Ass(ass::AssFile),
}

/// A loaded subtitle file.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleDocument {
    layout: Layout,
    pub script: Script,
}

impl SubtitleDocument {
    /// Parse `content` using the format implied by `path`'s extension.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "srt" => Ok(Self {
                layout: Layout::Srt,
                script: srt::parse(content)?,
            }),
            "ass" | "ssa" => {
                let (file, script) = ass::parse(content)?;
                Ok(Self {
                    layout: Layout::Ass(file),
                    script,
                })
            }
            _ => Err(anyhow!(
                "unsupported subtitle format {:?}, expected .srt or .ass",
                path.display().to_string()
            )),
        }
    }

    /// Serialize the (possibly translated) script in the original format.
    pub fn render(&self) -> String {
        match &self.layout {
            Layout::Srt => srt::format(&self.script),
            Layout::Ass(file) => ass::render(file, &self.script),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        trace!("save path={}", path.display());
        fs::write(path, self.render())?;
        debug!("wrote {} lines to {}", self.script.len(), path.display());
        Ok(())
    }
}

/// Read and parse a subtitle file.
pub fn load(path: &Path) -> Result<SubtitleDocument> {
    trace!("load path={}", path.display());
    let content = fs::read_to_string(path)?;
    let doc = SubtitleDocument::parse(path, &content)?;
    debug!("loaded {} lines from {}", doc.script.len(), path.display());
    Ok(doc)
}

/// Dialogue statistics for a script.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptStats {
    pub total_lines: usize,
    pub character_count: usize,
    pub average_character_count: String,
}

/// Count non-empty lines and their characters (speaker label included).
pub fn stats(script: &Script) -> ScriptStats {
    let mut total_lines = 0;
    let mut character_count = 0;
    for line in script.lines() {
        if line.text.trim().is_empty() {
            continue;
        }
        let mut labeled = line.clone();
        labeled.text = line.text.trim().to_string();
        total_lines += 1;
        character_count += labeled.labeled().chars().count();
    }
    let average = if total_lines > 0 {
        character_count as f64 / total_lines as f64
    } else {
        0.0
    };
    ScriptStats {
        total_lines,
        character_count,
        average_character_count: format!("{average:.2}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::TimedLine;
    use tempfile::tempdir;

    #[test]
    fn picks_format_from_extension() {
        let srt = "1\n00:00:00,000 --> 00:00:01,000\nhi\n\n";
        let doc = SubtitleDocument::parse(Path::new("a.SRT"), srt).unwrap();
        assert_eq!(doc.render(), srt);
        assert!(SubtitleDocument::parse(Path::new("a.txt"), srt).is_err());
    }

    #[test]
    fn load_and_save_roundtrip_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ep.srt");
        fs::write(&path, "1\n00:00:00,000 --> 00:00:01,000\nhello\n\n").unwrap();
        let mut doc = load(&path).unwrap();
        doc.script.set_text(0, "olá");
        let out = dir.path().join("ep_translated.srt");
        doc.save(&out).unwrap();
        assert!(fs::read_to_string(out).unwrap().contains("olá"));
    }

    #[test]
    fn stats_skip_blank_lines() {
        let script = Script::new(vec![
            TimedLine::new(0, "Ann", "hey"),
            TimedLine::new(1, "", "  "),
            TimedLine::new(2, "", "hello"),
        ]);
        let s = stats(&script);
        assert_eq!(s.total_lines, 2);
        assert_eq!(s.character_count, "Ann: hey".len() + "hello".len());
        assert_eq!(s.average_character_count, "6.50");
        assert_eq!(stats(&Script::default()).average_character_count, "0.00");
    }
}
