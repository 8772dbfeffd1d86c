use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

/// Filesystem and image probing used while planning.
pub trait AssetInspector: Send + Sync {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Pixel height, or `None` when the file is not a readable image.
    fn image_height(&self, path: &Path) -> Option<u32>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImageInspector;

impl AssetInspector for ImageInspector {
    fn image_height(&self, path: &Path) -> Option<u32> {
        match image::image_dimensions(path) {
            Ok((_, height)) => Some(height),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "unreadable thumbnail");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thumbnail {
    /// Where the downloader left the image.
    pub source: PathBuf,
    /// Name the image carries while attached, so the container shows a clean
    /// attachment name.
    pub attach_as: PathBuf,
    pub mime: &'static str,
}

/// Candidate thumbnails in order of preference.
const THUMBNAIL_KINDS: &[(&str, &str)] = &[("jpg", "image/jpeg"), ("png", "image/png")];

/// Picks the preferred thumbnail and drops it when it is unreadable or too
/// small to be worth attaching.
pub fn select_thumbnail(
    inspector: &dyn AssetInspector,
    work_dir: &Path,
    index: usize,
    attach_name: &str,
    min_height: u32,
) -> Option<Thumbnail> {
    let (source, ext, mime) = THUMBNAIL_KINDS.iter().find_map(|(ext, mime)| {
        let path = work_dir.join(format!("{index}.{ext}"));
        inspector.is_file(&path).then_some((path, *ext, *mime))
    })?;
    match inspector.image_height(&source) {
        Some(height) if height >= min_height => Some(Thumbnail {
            attach_as: work_dir.join(format!("{attach_name}.{ext}")),
            source,
            mime,
        }),
        Some(height) => {
            debug!(index, height, min_height, "thumbnail too small, skipping");
            None
        }
        None => None,
    }
}

/// Keeps a thumbnail under its attachment name for as long as it is held.
///
/// The original name is restored on drop, which also covers early returns and
/// a cancelled mux.
#[derive(Debug)]
pub struct ThumbnailGuard {
    source: PathBuf,
    attached: PathBuf,
    active: bool,
}

impl ThumbnailGuard {
    pub fn acquire(thumbnail: &Thumbnail) -> io::Result<Self> {
        std::fs::rename(&thumbnail.source, &thumbnail.attach_as)?;
        Ok(Self {
            source: thumbnail.source.clone(),
            attached: thumbnail.attach_as.clone(),
            active: true,
        })
    }

    pub fn restore(mut self) -> io::Result<()> {
        self.active = false;
        std::fs::rename(&self.attached, &self.source)
    }
}

impl Drop for ThumbnailGuard {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Err(err) = std::fs::rename(&self.attached, &self.source) {
            warn!(
                from = %self.attached.display(),
                to = %self.source.display(),
                error = %err,
                "failed to restore thumbnail name"
            );
        }
    }
}
