mod error;
mod retry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::QueueConfig;
use crate::download::{Downloader, YtDlpDownloader};
use crate::ledger::ProgressLedger;
use crate::metadata::{ForcedOverrides, MetadataStore, RawMetadata};
use crate::mux::{CommandSynthesizer, MuxExecutor};
use crate::planner::MuxPlanner;
use crate::title::{Identity, OperatorPrompt, TitleResolver};

pub use error::{QueueError, QueueResult};
pub use retry::RetryPolicy;

/// One line of the link list. The 0-based line number is the entry's
/// identity in the ledger and in every transient file name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub index: usize,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyDone,
    Blank,
    NotALink,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadyDone => "already_done",
            SkipReason::Blank => "blank",
            SkipReason::NotALink => "not_a_link",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EntryOutcome {
    Completed { title: String, output: PathBuf },
    Skipped { reason: SkipReason },
    /// Ended by an error retrying cannot fix; the entry stays pending.
    Failed { reason: String },
    /// The retry cap was reached; the entry stays pending.
    Abandoned { reason: String },
}

impl EntryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            EntryOutcome::Completed { .. } => "completed",
            EntryOutcome::Skipped { .. } => "skipped",
            EntryOutcome::Failed { .. } => "failed",
            EntryOutcome::Abandoned { .. } => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub index: usize,
    pub url: String,
    pub attempts: u32,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub link_list: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<EntryReport>,
}

impl RunReport {
    fn count(&self, label: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome.label() == label)
            .count()
    }

    pub fn completed(&self) -> usize {
        self.count("completed")
    }

    pub fn skipped(&self) -> usize {
        self.count("skipped")
    }

    pub fn failed(&self) -> usize {
        self.count("failed")
    }

    pub fn abandoned(&self) -> usize {
        self.count("abandoned")
    }
}

pub async fn read_link_list(path: &Path) -> QueueResult<Vec<String>> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|source| QueueError::io(path, source))?;
    Ok(contents
        .lines()
        .map(|line| line.trim_end().to_string())
        .collect())
}

/// A link starts right at the beginning of its line; indented lines are
/// treated as notes.
fn is_link(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    Url::parse(line)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Walks a link list in order, downloading and muxing each pending entry.
pub struct QueueRunner {
    config: Arc<QueueConfig>,
    store: MetadataStore,
    downloader: Arc<dyn Downloader>,
    titles: TitleResolver,
    planner: MuxPlanner,
    synthesizer: CommandSynthesizer,
    mux: MuxExecutor,
    retry_policy: RetryPolicy,
    refresh_metadata: bool,
}

impl std::fmt::Debug for QueueRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueRunner")
            .field("work_dir", &self.config.paths.work_dir)
            .field("retry_policy", &self.retry_policy)
            .field("refresh_metadata", &self.refresh_metadata)
            .finish_non_exhaustive()
    }
}

impl QueueRunner {
    pub fn new(
        config: Arc<QueueConfig>,
        prompt: Arc<dyn OperatorPrompt>,
    ) -> crate::error::Result<Self> {
        let store = MetadataStore::new(config.work_dir());
        let retry_policy = RetryPolicy::try_from(&config.retry)?;
        Ok(Self {
            downloader: Arc::new(YtDlpDownloader::new(config.clone(), store.clone())),
            titles: TitleResolver::new(prompt),
            planner: MuxPlanner::new(&config),
            synthesizer: CommandSynthesizer::new(&config.mux),
            mux: MuxExecutor::new(),
            store,
            retry_policy,
            refresh_metadata: false,
            config,
        })
    }

    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_planner(mut self, planner: MuxPlanner) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_mux_executor(mut self, mux: MuxExecutor) -> Self {
        self.mux = mux;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Drops cached info documents before each pending entry is fetched.
    pub fn with_refresh_metadata(mut self, refresh: bool) -> Self {
        self.refresh_metadata = refresh;
        self
    }

    pub async fn run(&self, link_list: &Path) -> QueueResult<RunReport> {
        let started_at = Utc::now();
        let lines = read_link_list(link_list).await?;
        let mut ledger = ProgressLedger::open(ProgressLedger::path_for(link_list)).await?;
        let overrides =
            MetadataStore::load_overrides(&MetadataStore::overrides_path_for(link_list)).await?;
        info!(
            link_list = %link_list.display(),
            entries = lines.len(),
            done = ledger.len(),
            overrides = overrides.len(),
            "starting queue"
        );

        let mut entries = Vec::with_capacity(lines.len());
        for (index, line) in lines.into_iter().enumerate() {
            let skip = if ledger.contains(index) {
                Some(SkipReason::AlreadyDone)
            } else if line.is_empty() {
                Some(SkipReason::Blank)
            } else if !is_link(&line) {
                Some(SkipReason::NotALink)
            } else {
                None
            };
            if let Some(reason) = skip {
                debug!(index, %reason, "skipping entry");
                entries.push(EntryReport {
                    index,
                    url: line,
                    attempts: 0,
                    outcome: EntryOutcome::Skipped { reason },
                    finished_at: Utc::now(),
                });
                continue;
            }

            let entry = QueueEntry { index, url: line };
            if self.refresh_metadata && self.store.invalidate(index).await? {
                debug!(index, "dropped cached info document");
            }
            info!(index, url = %entry.url, "processing entry");
            let (attempts, outcome) = self.process_entry(&entry, &overrides).await;
            if matches!(outcome, EntryOutcome::Completed { .. }) {
                ledger.append(index).await?;
            }
            entries.push(EntryReport {
                index,
                url: entry.url,
                attempts,
                outcome,
                finished_at: Utc::now(),
            });
        }

        let report = RunReport {
            link_list: link_list.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            entries,
        };
        info!(
            completed = report.completed(),
            skipped = report.skipped(),
            failed = report.failed(),
            abandoned = report.abandoned(),
            "queue finished"
        );
        Ok(report)
    }

    async fn process_entry(
        &self,
        entry: &QueueEntry,
        overrides: &ForcedOverrides,
    ) -> (u32, EntryOutcome) {
        let mut identity = None;
        let mut failures = 0u32;
        loop {
            match self.attempt(entry, overrides, &mut identity).await {
                Ok(outcome) => return (failures + 1, outcome),
                Err(err) if err.is_retryable() => {
                    failures += 1;
                    if !self.retry_policy.allows_another(failures) {
                        error!(index = entry.index, attempts = failures, error = %err, "giving up on entry");
                        return (
                            failures,
                            EntryOutcome::Abandoned {
                                reason: err.to_string(),
                            },
                        );
                    }
                    let delay = self.retry_policy.delay_for(&err, failures - 1);
                    warn!(index = entry.index, attempt = failures, wait = ?delay, error = %err, "retrying entry");
                    if !delay.is_zero() {
                        sleep(delay).await;
                    }
                }
                Err(err) => {
                    error!(index = entry.index, error = %err, "entry failed");
                    return (
                        failures + 1,
                        EntryOutcome::Failed {
                            reason: err.to_string(),
                        },
                    );
                }
            }
        }
    }

    /// One full pass: download, merge overrides, resolve, plan and mux. The
    /// identity is kept across retries so the operator is asked only once.
    async fn attempt(
        &self,
        entry: &QueueEntry,
        overrides: &ForcedOverrides,
        identity: &mut Option<Identity>,
    ) -> QueueResult<EntryOutcome> {
        let document = self.downloader.download(entry).await?;
        let meta = RawMetadata::from_document(entry.index, overrides.apply(document))?;
        let identity = match identity.as_ref() {
            Some(known) => known.clone(),
            None => {
                let resolved = self.titles.resolve(entry.index, &meta).await?;
                *identity = Some(resolved.clone());
                resolved
            }
        };
        let plan = self.planner.plan(entry.index, &meta)?;
        let invocation = self.synthesizer.build(&plan, &identity);
        self.mux.execute(&invocation).await?;
        Ok(EntryOutcome::Completed {
            title: identity.title(),
            output: invocation.output,
        })
    }
}
