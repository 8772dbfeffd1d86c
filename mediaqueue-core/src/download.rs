use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::QueueConfig;
use crate::metadata::{InfoDocument, MetadataStore, RawMetadata};
use crate::process::{stderr_tail, CommandExecutor, SystemCommandExecutor};
use crate::runner::{QueueEntry, QueueError, QueueResult};

/// Fetches every raw asset of an entry into the work dir and returns its info
/// document. Any failure is reported as [`QueueError::DownloadFailed`].
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(&self, entry: &QueueEntry) -> QueueResult<InfoDocument>;
}

pub struct YtDlpDownloader {
    config: Arc<QueueConfig>,
    store: MetadataStore,
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for YtDlpDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlpDownloader")
            .field("tool", &self.config.download.tool)
            .field("store", &self.store)
            .finish()
    }
}

impl YtDlpDownloader {
    pub fn new(config: Arc<QueueConfig>, store: MetadataStore) -> Self {
        Self {
            config,
            store,
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    fn program(&self) -> PathBuf {
        PathBuf::from(&self.config.download.tool)
    }

    fn network_args(&self) -> Vec<String> {
        let download = &self.config.download;
        let mut args = vec![
            "--socket-timeout".to_string(),
            download.socket_timeout_seconds.to_string(),
        ];
        if !download.check_certificates {
            args.push("--no-check-certificates".to_string());
        }
        if download.prefer_native_hls {
            args.push("--hls-prefer-native".to_string());
        }
        args.extend(download.extra_args.iter().cloned());
        args
    }

    pub fn metadata_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--no-playlist".to_string(),
        ];
        args.extend(self.network_args());
        args.push(url.to_string());
        args
    }

    pub fn asset_args(&self, index: usize) -> Vec<String> {
        let download = &self.config.download;
        let mut args = vec![
            "--load-info-json".to_string(),
            self.store.cache_path(index).to_string_lossy().to_string(),
            "--paths".to_string(),
            self.config.paths.work_dir.clone(),
            "-o".to_string(),
            format!("{index}.%(ext)s"),
            "-k".to_string(),
            "--write-subs".to_string(),
            "--sub-langs".to_string(),
            download.subtitle_languages.join(","),
            "--sub-format".to_string(),
            download.subtitle_format.clone(),
        ];
        if let Some(target) = &download.convert_subtitles {
            args.push("--convert-subs".to_string());
            args.push(target.clone());
        }
        args.push("--write-thumbnail".to_string());
        if let Some(target) = &download.convert_thumbnails {
            args.push("--convert-thumbnails".to_string());
            args.push(target.clone());
        }
        args.extend([
            "--fixup".to_string(),
            "never".to_string(),
            "--abort-on-unavailable-fragments".to_string(),
        ]);
        args.extend(self.network_args());
        args
    }

    async fn fetch_document(&self, entry: &QueueEntry) -> QueueResult<InfoDocument> {
        let args = self.metadata_args(&entry.url);
        debug!(index = entry.index, args = ?args, "fetching info document");
        let output = self
            .executor
            .output(&self.program(), &args)
            .await
            .map_err(|err| {
                QueueError::download(
                    entry.index,
                    format!("failed to start {}: {err}", self.config.download.tool),
                )
            })?;
        if !output.status.success() {
            let tail = stderr_tail(&output.stderr, 5);
            debug!(index = entry.index, stderr = %tail, "metadata extraction failed");
            return Err(QueueError::download(
                entry.index,
                format!(
                    "{} exited with {:?}: {tail}",
                    self.config.download.tool,
                    output.status.code()
                ),
            ));
        }
        match serde_json::from_slice::<Value>(&output.stdout) {
            Ok(Value::Object(document)) => Ok(document),
            Ok(_) => Err(QueueError::download(
                entry.index,
                "info document is not a JSON object",
            )),
            Err(err) => Err(QueueError::download(
                entry.index,
                format!("unreadable info document: {err}"),
            )),
        }
    }

    async fn fetch_assets(&self, entry: &QueueEntry) -> QueueResult<()> {
        let args = self.asset_args(entry.index);
        debug!(index = entry.index, args = ?args, "downloading assets");
        let status = self
            .executor
            .status(&self.program(), &args)
            .await
            .map_err(|err| {
                QueueError::download(
                    entry.index,
                    format!("failed to start {}: {err}", self.config.download.tool),
                )
            })?;
        if !status.success() {
            return Err(QueueError::download(
                entry.index,
                format!(
                    "{} exited with {:?} while downloading assets",
                    self.config.download.tool,
                    status.code()
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Downloader for YtDlpDownloader {
    async fn download(&self, entry: &QueueEntry) -> QueueResult<InfoDocument> {
        let document = match self.store.load_cached(entry.index).await? {
            Some(document) => document,
            None => {
                let document = self.fetch_document(entry).await?;
                self.store.store(entry.index, &document).await?;
                document
            }
        };
        self.fetch_assets(entry).await?;
        verify_assets(&self.config.work_dir(), entry.index, &document)?;
        info!(index = entry.index, "assets downloaded");
        Ok(document)
    }
}

/// Checks that the media files named by the document exist and are not
/// partial downloads left behind by an earlier, interrupted attempt.
pub fn verify_assets(work_dir: &Path, index: usize, document: &InfoDocument) -> QueueResult<()> {
    let Ok(meta) = RawMetadata::from_document(index, document.clone()) else {
        // Overrides may still repair the document; planning reports it otherwise.
        return Ok(());
    };
    let expected: Vec<PathBuf> = match meta.requested_formats() {
        Some(formats) => formats
            .iter()
            .map(|format| work_dir.join(format!("{index}.f{}.{}", format.format_id, format.ext)))
            .collect(),
        None => meta
            .ext
            .iter()
            .map(|ext| work_dir.join(format!("{index}.{ext}")))
            .collect(),
    };
    for path in &expected {
        let complete = std::fs::metadata(path)
            .map(|info| info.is_file() && info.len() > 0)
            .unwrap_or(false);
        if !complete {
            return Err(QueueError::download(
                index,
                format!("asset {} is missing or empty", path.display()),
            ));
        }
        let partial = PathBuf::from(format!("{}.part", path.display()));
        if partial.exists() {
            return Err(QueueError::download(
                index,
                format!("asset {} is still a partial download", path.display()),
            ));
        }
    }
    Ok(())
}
