mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::runner::{QueueError, QueueResult};

pub use store::MetadataStore;

/// The downloader's raw info document for one entry, key order preserved.
pub type InfoDocument = Map<String, Value>;

/// Typed view over an [`InfoDocument`] once forced overrides are merged in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMetadata {
    pub requested_formats: Option<Vec<FormatDescriptor>>,
    pub ext: Option<String>,
    pub acodec: Option<String>,
    pub language: Option<String>,
    pub subtitles: Option<Map<String, Value>>,
    pub chapters: Option<Vec<Chapter>>,
    pub title: Option<String>,
    pub episode: Option<String>,
    pub episode_number: Option<i64>,
    pub episode_offset: Option<i64>,
    pub season_number: Option<i64>,
    pub series: Option<String>,
    pub movie: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub format_id: String,
    pub ext: String,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl FormatDescriptor {
    /// An absent codec is unknown, not missing, so it still counts.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default)]
    pub title: Option<String>,
}

impl RawMetadata {
    pub fn from_document(index: usize, document: InfoDocument) -> QueueResult<Self> {
        serde_json::from_value(Value::Object(document)).map_err(|err| {
            QueueError::InvalidMetadata {
                index,
                reason: err.to_string(),
            }
        })
    }

    pub fn is_movie(&self) -> bool {
        self.movie == Some(true)
    }

    pub fn requested_formats(&self) -> Option<&[FormatDescriptor]> {
        self.requested_formats
            .as_deref()
            .filter(|formats| !formats.is_empty())
    }

    pub fn chapters(&self) -> &[Chapter] {
        self.chapters.as_deref().unwrap_or_default()
    }

    /// Subtitle language tags in the order the provider listed them.
    pub fn subtitle_languages(&self) -> impl Iterator<Item = &str> {
        self.subtitles
            .iter()
            .flat_map(|subs| subs.keys())
            .map(String::as_str)
    }
}

/// User supplied corrections merged over every fetched document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForcedOverrides {
    values: InfoDocument,
}

impl ForcedOverrides {
    pub fn new(values: InfoDocument) -> Self {
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Top-level keys of the overrides replace the fetched ones.
    pub fn apply(&self, mut document: InfoDocument) -> InfoDocument {
        for (key, value) in &self.values {
            document.insert(key.clone(), value.clone());
        }
        document
    }
}

/// Trimmed, non-empty string field.
pub(crate) fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|text| !text.trim().is_empty())
}
