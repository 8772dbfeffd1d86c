use std::path::PathBuf;

use clap::{Args, ValueEnum};
use mediaqueue_core::{MissingNumberPolicy, QueueConfig};

/// Download and mux every pending entry of a link list.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Link list with one URL per line
    pub file: PathBuf,

    /// Log every external command and its diagnostics
    #[arg(short, long)]
    pub verbose: bool,

    /// What to do when a season or episode number is missing
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_missing: Option<OnMissing>,

    /// Fetch metadata again instead of using cached info documents
    #[arg(long)]
    pub refresh_metadata: bool,

    /// Give up on an entry after this many attempts (0 retries forever)
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Directory for downloads and finished files
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnMissing {
    /// Ring the terminal bell and ask
    Ask,
    /// Take the proposed default without asking
    Default,
    /// Leave the entry pending
    Fail,
}

impl From<OnMissing> for MissingNumberPolicy {
    fn from(value: OnMissing) -> Self {
        match value {
            OnMissing::Ask => MissingNumberPolicy::Ask,
            OnMissing::Default => MissingNumberPolicy::Default,
            OnMissing::Fail => MissingNumberPolicy::Fail,
        }
    }
}

impl RunArgs {
    /// Command-line flags win over the config file.
    pub fn apply(&self, config: &mut QueueConfig) {
        if let Some(work_dir) = &self.work_dir {
            config.paths.work_dir = work_dir.to_string_lossy().to_string();
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(policy) = self.on_missing {
            config.identity.missing_number = policy.into();
        }
    }
}
