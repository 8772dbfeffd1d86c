use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::runner::{QueueError, QueueResult};

/// Append-only record of queue entries that were muxed successfully.
///
/// The file holds one index per line. Lines that are not plain numbers are
/// ignored on load so that hand edits do not break a resume.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    path: PathBuf,
    done: BTreeSet<usize>,
}

impl ProgressLedger {
    /// Ledger that lives next to the link list, e.g. `shows.txt` → `shows.done`.
    pub fn path_for(link_list: &Path) -> PathBuf {
        link_list.with_extension("done")
    }

    pub async fn open(path: impl Into<PathBuf>) -> QueueResult<Self> {
        let path = path.into();
        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                fs::write(&path, b"")
                    .await
                    .map_err(|source| QueueError::io(&path, source))?;
                String::new()
            }
            Err(source) => return Err(QueueError::io(&path, source)),
        };
        let done = parse_indices(&contents);
        debug!(path = %path.display(), completed = done.len(), "progress ledger loaded");
        Ok(Self { path, done })
    }

    pub fn contains(&self, index: usize) -> bool {
        self.done.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Persists `index` before recording it in memory, so a failed write never
    /// leaves the in-memory view ahead of the file.
    pub async fn append(&mut self, index: usize) -> QueueResult<()> {
        if self.done.contains(&index) {
            return Ok(());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| QueueError::io(&self.path, source))?;
        file.write_all(format!("{index}\n").as_bytes())
            .await
            .map_err(|source| QueueError::io(&self.path, source))?;
        file.flush()
            .await
            .map_err(|source| QueueError::io(&self.path, source))?;
        self.done.insert(index);
        Ok(())
    }
}

fn parse_indices(contents: &str) -> BTreeSet<usize> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|line| line.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ledger_path_replaces_link_list_extension() {
        assert_eq!(
            ProgressLedger::path_for(Path::new("/data/shows.txt")),
            PathBuf::from("/data/shows.done")
        );
    }

    #[test]
    fn non_numeric_lines_are_ignored() {
        let parsed = parse_indices("3\n\nfoo\n-1\n 7 \n3\n12a\n");
        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec![3, 7]);
    }

    #[tokio::test]
    async fn open_creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.done");
        let ledger = ProgressLedger::open(&path).await.unwrap();
        assert!(ledger.is_empty());
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn append_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.done");
        std::fs::write(&path, "0\nnotes\n").unwrap();

        let mut ledger = ProgressLedger::open(&path).await.unwrap();
        ledger.append(4).await.unwrap();
        ledger.append(4).await.unwrap();
        assert!(ledger.contains(0));
        assert!(ledger.contains(4));

        let reopened = ProgressLedger::open(&path).await.unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0\nnotes\n4\n");
    }
}
