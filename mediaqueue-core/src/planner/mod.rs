//! Decides which downloaded files become which container tracks.

mod chapters;
mod language;
mod subtitles;
mod thumbnail;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::metadata::{present, Chapter, RawMetadata};
use crate::runner::{QueueError, QueueResult};

pub use chapters::{escape, render_ffmetadata};
pub use language::{IsoLanguageTable, LanguageResolver, UNDETERMINED, UNTAGGED};
pub use subtitles::{SrtLineJoiner, SubtitleRepair};
pub use thumbnail::{select_thumbnail, AssetInspector, ImageInspector, Thumbnail, ThumbnailGuard};

const FALLBACK_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTrack {
    /// `None` when the audio lives in one of the video inputs.
    pub path: Option<PathBuf>,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
    pub path: PathBuf,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MuxPlan {
    pub index: usize,
    pub work_dir: PathBuf,
    pub video_tracks: Vec<PathBuf>,
    pub audio_tracks: Vec<AudioTrack>,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    pub thumbnail: Option<Thumbnail>,
    pub chapters: Vec<Chapter>,
    pub needs_aac_fixup: bool,
    pub description: Option<String>,
}

impl MuxPlan {
    /// Side file that carries chapter markers into the mux.
    pub fn chapter_file(&self) -> PathBuf {
        self.work_dir.join(format!("{}.meta", self.index))
    }
}

pub struct MuxPlanner {
    work_dir: PathBuf,
    subtitle_languages: Vec<String>,
    thumbnail_name: String,
    min_thumbnail_height: u32,
    inspector: Arc<dyn AssetInspector>,
    languages: Arc<dyn LanguageResolver>,
    subtitle_repair: Option<Arc<dyn SubtitleRepair>>,
}

impl std::fmt::Debug for MuxPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxPlanner")
            .field("work_dir", &self.work_dir)
            .field("subtitle_languages", &self.subtitle_languages)
            .field("min_thumbnail_height", &self.min_thumbnail_height)
            .field("subtitle_repair", &self.subtitle_repair.is_some())
            .finish()
    }
}

impl MuxPlanner {
    pub fn new(config: &QueueConfig) -> Self {
        let work_dir = config.work_dir();
        let subtitle_repair: Option<Arc<dyn SubtitleRepair>> = if config.mux.repair_srt {
            Some(Arc::new(SrtLineJoiner::new()))
        } else {
            None
        };
        Self {
            work_dir: std::path::absolute(&work_dir).unwrap_or(work_dir),
            subtitle_languages: config.download.subtitle_languages.clone(),
            thumbnail_name: config.mux.thumbnail_name.clone(),
            min_thumbnail_height: config.mux.min_thumbnail_height,
            inspector: Arc::new(ImageInspector),
            languages: Arc::new(IsoLanguageTable),
            subtitle_repair,
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn AssetInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_language_resolver(mut self, languages: Arc<dyn LanguageResolver>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_subtitle_repair(mut self, repair: Option<Arc<dyn SubtitleRepair>>) -> Self {
        self.subtitle_repair = repair;
        self
    }

    pub fn plan(&self, index: usize, meta: &RawMetadata) -> QueueResult<MuxPlan> {
        let mut video_tracks = Vec::new();
        let mut audio_tracks = Vec::new();
        let mut needs_aac_fixup = false;
        let document_language = present(&meta.language);

        match meta.requested_formats() {
            Some(formats) => {
                for format in formats {
                    let path = self
                        .work_dir
                        .join(format!("{index}.f{}.{}", format.format_id, format.ext));
                    if format.has_video() {
                        video_tracks.push(path.clone());
                    }
                    if format.has_audio() {
                        let tag = present(&format.language)
                            .or(document_language)
                            .unwrap_or(FALLBACK_LANGUAGE);
                        let co_located = video_tracks.contains(&path);
                        audio_tracks.push(AudioTrack {
                            path: (!co_located).then_some(path),
                            language: self.languages.resolve(tag),
                        });
                        needs_aac_fixup |= is_aac(format.acodec.as_deref());
                    }
                }
            }
            None => {
                let ext = present(&meta.ext).ok_or(QueueError::NoMediaFound { index })?;
                video_tracks.push(self.work_dir.join(format!("{index}.{ext}")));
                audio_tracks.push(AudioTrack {
                    path: None,
                    language: self
                        .languages
                        .resolve(document_language.unwrap_or(FALLBACK_LANGUAGE)),
                });
                needs_aac_fixup = is_aac(meta.acodec.as_deref());
            }
        }

        if video_tracks.is_empty() && audio_tracks.is_empty() {
            return Err(QueueError::NoMediaFound { index });
        }

        let plan = MuxPlan {
            index,
            work_dir: self.work_dir.clone(),
            video_tracks,
            audio_tracks,
            subtitle_tracks: self.subtitle_tracks(index, meta),
            thumbnail: select_thumbnail(
                self.inspector.as_ref(),
                &self.work_dir,
                index,
                &self.thumbnail_name,
                self.min_thumbnail_height,
            ),
            chapters: meta.chapters().to_vec(),
            needs_aac_fixup,
            description: meta.description.clone(),
        };
        debug!(
            index,
            video = plan.video_tracks.len(),
            audio = plan.audio_tracks.len(),
            subtitles = plan.subtitle_tracks.len(),
            thumbnail = plan.thumbnail.is_some(),
            chapters = plan.chapters.len(),
            "mux plan ready"
        );
        Ok(plan)
    }

    fn subtitle_tracks(&self, index: usize, meta: &RawMetadata) -> Vec<SubtitleTrack> {
        meta.subtitle_languages()
            .filter(|tag| self.subtitle_languages.iter().any(|allowed| allowed == tag))
            .filter_map(|tag| {
                let vtt = self.work_dir.join(format!("{index}.{tag}.vtt"));
                let path = if self.inspector.is_file(&vtt) {
                    vtt
                } else {
                    let srt = self.work_dir.join(format!("{index}.{tag}.srt"));
                    if !self.inspector.is_file(&srt) {
                        return None;
                    }
                    self.repair_srt(&srt);
                    srt
                };
                Some(SubtitleTrack {
                    path,
                    language: self.languages.resolve(tag),
                })
            })
            .collect()
    }

    fn repair_srt(&self, path: &Path) {
        if let Some(repair) = &self.subtitle_repair {
            if let Err(err) = repair.repair(path) {
                warn!(path = %path.display(), error = %err, "subtitle repair failed, muxing as is");
            }
        }
    }
}

fn is_aac(codec: Option<&str>) -> bool {
    codec.is_some_and(|codec| codec.starts_with("mp4a"))
}
