use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::config::MissingNumberPolicy;
use crate::metadata::{present, RawMetadata};
use crate::runner::{QueueError, QueueResult};

const EPISODE_PLACEHOLDER: &str = "EPISODE";
const SERIES_PLACEHOLDER: &str = "SERIES";

/// Source of answers for identity numbers the metadata does not carry.
///
/// Asking is async so a pending question never holds up the runtime and can
/// be abandoned when the run is interrupted.
#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Draws the operator's attention before a question is asked.
    fn notify(&self) {}

    /// `None` means no answer is available and the entry cannot be resolved.
    async fn ask_integer(&self, question: &str, default: i64) -> Option<i64>;
}

/// Accepts every proposed default without asking.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAnswers;

#[async_trait]
impl OperatorPrompt for DefaultAnswers {
    async fn ask_integer(&self, _question: &str, default: i64) -> Option<i64> {
        Some(default)
    }
}

/// Never answers; missing numbers stop the entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

#[async_trait]
impl OperatorPrompt for Unattended {
    async fn ask_integer(&self, _question: &str, _default: i64) -> Option<i64> {
        None
    }
}

/// Prompt for the non-interactive policies; `Ask` needs a terminal and is
/// supplied by the caller.
pub fn prompt_for_policy(policy: MissingNumberPolicy) -> Option<Arc<dyn OperatorPrompt>> {
    match policy {
        MissingNumberPolicy::Ask => None,
        MissingNumberPolicy::Default => Some(Arc::new(DefaultAnswers)),
        MissingNumberPolicy::Fail => Some(Arc::new(Unattended)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Identity {
    Movie {
        title: String,
    },
    Episode {
        series: String,
        season_number: i64,
        episode_number: i64,
        episode_title: String,
    },
}

impl Identity {
    pub fn is_movie(&self) -> bool {
        matches!(self, Identity::Movie { .. })
    }

    /// Title written into the container and used for the file name.
    pub fn title(&self) -> String {
        match self {
            Identity::Movie { title } => title.clone(),
            Identity::Episode {
                series,
                season_number,
                episode_number,
                episode_title,
            } => format!("{series} - {season_number}x{episode_number:02} - {episode_title}"),
        }
    }

    /// Movies land in the work dir, episodes in a directory per season.
    pub fn output_path(&self, work_dir: &Path, container: &str) -> PathBuf {
        let file_name = format!("{}.{container}", file_name_safe(&self.title()));
        match self {
            Identity::Movie { .. } => work_dir.join(file_name),
            Identity::Episode { season_number, .. } => {
                work_dir.join(season_number.to_string()).join(file_name)
            }
        }
    }
}

fn file_name_safe(title: &str) -> String {
    title
        .chars()
        .map(|c| if c == '/' || c == '\0' { '_' } else { c })
        .collect()
}

/// Turns noisy provider metadata into a movie title or a numbered episode.
pub struct TitleResolver {
    prompt: Arc<dyn OperatorPrompt>,
    episode_marker: Regex,
    fraction_suffix: Regex,
}

impl std::fmt::Debug for TitleResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleResolver").finish_non_exhaustive()
    }
}

impl TitleResolver {
    pub fn new(prompt: Arc<dyn OperatorPrompt>) -> Self {
        let episode_marker =
            Regex::new(r"^(?:(?:Episode|Folge|Part) )*(?P<nr>\d+)(?:/\d)*").expect("valid regex");
        let fraction_suffix = Regex::new(r"( \(?\d+/\d+\)?)$").expect("valid regex");
        Self {
            prompt,
            episode_marker,
            fraction_suffix,
        }
    }

    pub async fn resolve(&self, index: usize, meta: &RawMetadata) -> QueueResult<Identity> {
        if meta.is_movie() {
            let title = present(&meta.title).ok_or(QueueError::MissingIdentityField {
                index,
                field: "title",
            })?;
            return Ok(Identity::Movie {
                title: title.to_string(),
            });
        }

        let mut episode_title = present(&meta.episode)
            .or_else(|| present(&meta.title))
            .unwrap_or(EPISODE_PLACEHOLDER)
            .to_string();

        let season_number = match meta.season_number {
            Some(number) => number,
            None => self.ask(
                index,
                "season_number",
                &format!("No season number found. Please specify for episode \"{episode_title}\""),
                0,
            )
            .await?,
        };

        let captured_number = self
            .episode_marker
            .captures(&episode_title)
            .map(|caps| caps.name("nr").and_then(|nr| nr.as_str().parse::<i64>().ok()));
        if captured_number.is_some() {
            // A bare "Episode 5" is stale next to a real title.
            if let Some(title) = meta.title.as_deref() {
                if title != episode_title {
                    episode_title = title.to_string();
                }
            }
        }

        let series = present(&meta.series).unwrap_or(SERIES_PLACEHOLDER).to_string();
        let episode_title = self.strip_episode_title(&episode_title, season_number, &series);

        let mut episode_number = match (meta.episode_number, captured_number.flatten()) {
            (Some(number), _) => number,
            (None, Some(number)) => number,
            (None, None) => self.ask(
                index,
                "episode_number",
                &format!("No episode number found. Please specify for episode \"{episode_title}\""),
                100 + index as i64,
            )
            .await?,
        };
        if let Some(offset) = meta.episode_offset {
            episode_number += offset;
        }

        Ok(Identity::Episode {
            series,
            season_number,
            episode_number,
            episode_title,
        })
    }

    fn strip_episode_title(&self, raw: &str, season_number: i64, series: &str) -> String {
        let mut title = self.fraction_suffix.replace(raw, "").into_owned();
        title = title.replace(&format!("Season {season_number}"), "");
        title = title.replace(series, "");
        title = title.replace(" - ", "");
        title.trim().to_string()
    }

    async fn ask(
        &self,
        index: usize,
        field: &'static str,
        question: &str,
        default: i64,
    ) -> QueueResult<i64> {
        warn!(index, field, "identity metadata incomplete, asking operator");
        self.prompt.notify();
        self.prompt
            .ask_integer(question, default)
            .await
            .ok_or(QueueError::MissingIdentityField { index, field })
    }
}
