pub mod config;
pub mod download;
pub mod error;
pub mod ledger;
pub mod metadata;
pub mod mux;
pub mod planner;
pub mod process;
pub mod runner;
pub mod title;

pub use config::{load_queue_config, MissingNumberPolicy, QueueConfig};
pub use download::{verify_assets, Downloader, YtDlpDownloader};
pub use error::{ConfigError, Result};
pub use ledger::ProgressLedger;
pub use metadata::{Chapter, ForcedOverrides, FormatDescriptor, InfoDocument, MetadataStore, RawMetadata};
pub use mux::{CommandSynthesizer, MuxExecutor, MuxInvocation, SideFile};
pub use planner::{
    AssetInspector, AudioTrack, ImageInspector, IsoLanguageTable, LanguageResolver, MuxPlan,
    MuxPlanner, SrtLineJoiner, SubtitleRepair, SubtitleTrack, Thumbnail, ThumbnailGuard,
};
pub use process::{CommandExecutor, SystemCommandExecutor};
pub use runner::{
    read_link_list, EntryOutcome, EntryReport, QueueEntry, QueueError, QueueResult, QueueRunner,
    RetryPolicy, RunReport, SkipReason,
};
pub use title::{prompt_for_policy, DefaultAnswers, Identity, OperatorPrompt, TitleResolver, Unattended};
