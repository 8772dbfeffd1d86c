use std::fmt::Write as _;

use crate::metadata::Chapter;

/// Renders chapters as an ffmpeg metadata file with millisecond timestamps.
pub fn render_ffmetadata(chapters: &[Chapter]) -> String {
    let mut contents = String::from(";FFMETADATA1\n");
    for chapter in chapters {
        contents.push_str("[CHAPTER]\nTIMEBASE=1/1000\n");
        let _ = writeln!(contents, "START={}", to_millis(chapter.start_time));
        let _ = writeln!(contents, "END={}", to_millis(chapter.end_time));
        if let Some(title) = chapter.title.as_deref().filter(|title| !title.is_empty()) {
            let _ = writeln!(contents, "title={}", escape(title));
        }
    }
    contents
}

fn to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0) as i64
}

/// Backslash-escapes the characters ffmetadata treats as syntax.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '=' | ';' | '#' | '\\' | '\n') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
