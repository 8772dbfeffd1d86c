/// Maps provider language tags (`en`, `de-DE`, ...) to ISO 639-2 codes.
pub trait LanguageResolver: Send + Sync {
    fn resolve(&self, tag: &str) -> String;
}

/// Tag written for tracks whose language is unknown.
pub const UNDETERMINED: &str = "und";

/// Providers label untagged subtitles `un`; they are treated as English.
pub const UNTAGGED: &str = "un";

#[derive(Debug, Default, Clone, Copy)]
pub struct IsoLanguageTable;

impl LanguageResolver for IsoLanguageTable {
    fn resolve(&self, tag: &str) -> String {
        let lower = tag.trim().to_lowercase();
        if lower == UNTAGGED {
            return "eng".to_string();
        }
        let primary: String = lower.chars().take(2).collect();
        let code = match primary.as_str() {
            "en" => "eng",
            "de" => "deu",
            "fr" => "fra",
            "es" => "spa",
            "it" => "ita",
            "pt" => "por",
            "nl" => "nld",
            "sv" => "swe",
            "da" => "dan",
            "no" | "nb" | "nn" => "nor",
            "fi" => "fin",
            "pl" => "pol",
            "cs" => "ces",
            "hu" => "hun",
            "tr" => "tur",
            "el" => "ell",
            "ru" => "rus",
            "uk" => "ukr",
            "ar" => "ara",
            "he" => "heb",
            "hi" => "hin",
            "ja" => "jpn",
            "zh" => "zho",
            "ko" => "kor",
            _ => UNDETERMINED,
        };
        code.to_string()
    }
}
