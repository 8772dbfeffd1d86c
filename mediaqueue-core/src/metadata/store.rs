use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::{debug, warn};

use crate::runner::{QueueError, QueueResult};

use super::{ForcedOverrides, InfoDocument};

/// Per-entry info cache plus the forced overrides document.
///
/// Cached documents are written once and read back on later attempts so that a
/// retry does not fetch descriptive metadata again.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    work_dir: PathBuf,
}

impl MetadataStore {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// Overrides live next to the link list, e.g. `shows.txt` → `shows.forced.json`.
    pub fn overrides_path_for(link_list: &Path) -> PathBuf {
        link_list.with_extension("forced.json")
    }

    pub fn cache_path(&self, index: usize) -> PathBuf {
        self.work_dir.join(format!("{index}.info.json"))
    }

    pub async fn load_cached(&self, index: usize) -> QueueResult<Option<InfoDocument>> {
        let path = self.cache_path(index);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(QueueError::io(path, source)),
        };
        match serde_json::from_slice::<Value>(&contents) {
            Ok(Value::Object(document)) => {
                debug!(index, path = %path.display(), "using cached info document");
                Ok(Some(document))
            }
            Ok(_) | Err(_) => {
                warn!(index, path = %path.display(), "ignoring unreadable info cache");
                Ok(None)
            }
        }
    }

    /// Writes through a temporary file so an interrupted run never leaves a
    /// truncated cache behind.
    pub async fn store(&self, index: usize, document: &InfoDocument) -> QueueResult<PathBuf> {
        let path = self.cache_path(index);
        let staging = path.with_extension("json.tmp");
        let payload = serde_json::to_vec(document)?;
        fs::write(&staging, payload)
            .await
            .map_err(|source| QueueError::io(&staging, source))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|source| QueueError::io(&path, source))?;
        Ok(path)
    }

    pub async fn invalidate(&self, index: usize) -> QueueResult<bool> {
        let path = self.cache_path(index);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(QueueError::io(path, source)),
        }
    }

    /// A missing file means no overrides; anything but a JSON object is an error.
    pub async fn load_overrides(path: &Path) -> QueueResult<ForcedOverrides> {
        let contents = match fs::read(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ForcedOverrides::default())
            }
            Err(source) => return Err(QueueError::io(path, source)),
        };
        match serde_json::from_slice::<Value>(&contents) {
            Ok(Value::Object(values)) => Ok(ForcedOverrides::new(values)),
            Ok(other) => Err(QueueError::InvalidOverrides {
                path: path.to_path_buf(),
                reason: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
            Err(err) => Err(QueueError::InvalidOverrides {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn cache_round_trip_and_invalidate() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path());
        assert!(store.load_cached(3).await.unwrap().is_none());

        let mut document = InfoDocument::new();
        document.insert("title".into(), json!("Pilot"));
        let path = store.store(3, &document).await.unwrap();
        assert_eq!(path, dir.path().join("3.info.json"));

        let cached = store.load_cached(3).await.unwrap().unwrap();
        assert_eq!(cached.get("title"), Some(&json!("Pilot")));

        assert!(store.invalidate(3).await.unwrap());
        assert!(!store.invalidate(3).await.unwrap());
        assert!(store.load_cached(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_cache_is_treated_as_missing() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("1.info.json"), "{\"title\": \"Pi").unwrap();
        let store = MetadataStore::new(dir.path());
        assert!(store.load_cached(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn overrides_are_optional_but_must_be_objects() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.forced.json");
        assert!(MetadataStore::load_overrides(&path).await.unwrap().is_empty());

        std::fs::write(&path, r#"{"series": "Foo", "season_number": 3}"#).unwrap();
        assert_eq!(MetadataStore::load_overrides(&path).await.unwrap().len(), 2);

        std::fs::write(&path, "[1, 2]").unwrap();
        let err = MetadataStore::load_overrides(&path).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidOverrides { .. }));
    }

    #[test]
    fn overrides_path_sits_next_to_link_list() {
        assert_eq!(
            MetadataStore::overrides_path_for(Path::new("queue/anime.txt")),
            PathBuf::from("queue/anime.forced.json")
        );
    }
}
