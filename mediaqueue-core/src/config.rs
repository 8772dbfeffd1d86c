use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Languages whose subtitle tracks are requested from the downloader and
/// considered for muxing. `un` is the provider tag for "undetermined".
pub const DEFAULT_SUBTITLE_LANGUAGES: &[&str] = &[
    "en", "en-US", "en-UK", "en-us", "en-uk", "de", "de-DE", "de-de", "un",
];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct QueueConfig {
    pub paths: PathsSection,
    pub download: DownloadSection,
    pub retry: RetrySection,
    pub mux: MuxSection,
    pub identity: IdentitySection,
}

impl QueueConfig {
    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.paths.work_dir)
    }

    pub fn validate(&self) -> Result<()> {
        let [min, max] = self.retry.delay_seconds;
        if min > max {
            return Err(ConfigError::Invalid(format!(
                "retry.delay_seconds must be ascending, got [{min}, {max}]"
            )));
        }
        if self.mux.container.trim().is_empty() {
            return Err(ConfigError::Invalid("mux.container must not be empty".into()));
        }
        if self.download.tool.trim().is_empty() {
            return Err(ConfigError::Invalid("download.tool must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub work_dir: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            work_dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub tool: String,
    pub subtitle_languages: Vec<String>,
    pub subtitle_format: String,
    pub convert_subtitles: Option<String>,
    /// Some sites only serve webp, which is never attached.
    pub convert_thumbnails: Option<String>,
    pub socket_timeout_seconds: u32,
    pub check_certificates: bool,
    pub prefer_native_hls: bool,
    pub extra_args: Vec<String>,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self {
            tool: "yt-dlp".to_string(),
            subtitle_languages: DEFAULT_SUBTITLE_LANGUAGES
                .iter()
                .map(|lang| lang.to_string())
                .collect(),
            subtitle_format: "srt/vtt".to_string(),
            convert_subtitles: Some("srt".to_string()),
            convert_thumbnails: Some("jpg".to_string()),
            socket_timeout_seconds: 10,
            check_certificates: false,
            prefer_native_hls: true,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Delay before the first and the last ramped retry.
    pub delay_seconds: [u64; 2],
    /// Zero means retry forever.
    pub max_attempts: u32,
    pub ramp_attempts: u32,
    /// Wait before re-downloading after a planning or mux failure.
    pub rerun_delay_seconds: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            delay_seconds: [30, 30],
            max_attempts: 0,
            ramp_attempts: 1,
            rerun_delay_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MuxSection {
    pub ffmpeg: String,
    pub container: String,
    pub min_thumbnail_height: u32,
    pub thumbnail_name: String,
    pub repair_srt: bool,
}

impl Default for MuxSection {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            container: "mkv".to_string(),
            min_thumbnail_height: 480,
            thumbnail_name: "thumbnail".to_string(),
            repair_srt: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IdentitySection {
    pub missing_number: MissingNumberPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingNumberPolicy {
    #[default]
    Ask,
    Default,
    Fail,
}

pub fn load_queue_config<P: AsRef<Path>>(path: P) -> Result<QueueConfig> {
    let config: QueueConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
