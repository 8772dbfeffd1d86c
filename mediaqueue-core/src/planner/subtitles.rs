use std::io;
use std::path::Path;

use regex::Regex;
use tracing::info;

/// In-place fixup applied to downloaded `.srt` files before muxing.
pub trait SubtitleRepair: Send + Sync {
    fn repair(&self, path: &Path) -> io::Result<()>;
}

/// Joins multi-line cues into one line separated by `<br />`.
///
/// Some converters split a cue over several lines in a way players render as
/// separate events; joining them keeps a cue on screen as one block.
pub struct SrtLineJoiner {
    timing: Regex,
}

impl std::fmt::Debug for SrtLineJoiner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrtLineJoiner").finish_non_exhaustive()
    }
}

impl Default for SrtLineJoiner {
    fn default() -> Self {
        Self::new()
    }
}

impl SrtLineJoiner {
    pub fn new() -> Self {
        let timing = Regex::new(r"^\d{2}:\d{2}:\d{2},\d{3} --> \d{2}:\d{2}:\d{2},\d{3}")
            .expect("valid regex");
        Self { timing }
    }

    pub fn join_cue_lines(&self, srt: &str) -> String {
        let lines: Vec<&str> = srt.split('\n').collect();
        let mut output: Vec<String> = Vec::with_capacity(lines.len());
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            output.push(line.to_string());
            i += 1;
            let is_cue_number = !line.is_empty() && line.trim().chars().all(|c| c.is_ascii_digit());
            if !is_cue_number || i >= lines.len() || !self.timing.is_match(lines[i]) {
                continue;
            }
            output.push(lines[i].to_string());
            i += 1;
            if i >= lines.len() {
                continue;
            }
            let mut text = lines[i].to_string();
            i += 1;
            while i < lines.len() && !lines[i].is_empty() {
                text.push_str("<br />");
                text.push_str(lines[i]);
                i += 1;
            }
            output.push(text);
        }
        output.join("\n")
    }
}

impl SubtitleRepair for SrtLineJoiner {
    fn repair(&self, path: &Path) -> io::Result<()> {
        let raw = std::fs::read_to_string(path)?;
        let (bom, body) = match raw.strip_prefix('\u{feff}') {
            Some(body) => ("\u{feff}", body),
            None => ("", raw.as_str()),
        };
        let repaired = self.join_cue_lines(body);
        info!(path = %path.display(), "joined multi-line subtitle cues");
        std::fs::write(path, format!("{bom}{repaired}"))
    }
}
