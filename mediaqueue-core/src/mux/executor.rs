use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, warn};

use crate::planner::ThumbnailGuard;
use crate::process::{CommandExecutor, SystemCommandExecutor};
use crate::runner::{QueueError, QueueResult};

use super::MuxInvocation;

/// Prepares the filesystem for an invocation and runs it.
pub struct MuxExecutor {
    executor: Arc<dyn CommandExecutor>,
}

impl std::fmt::Debug for MuxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuxExecutor").finish_non_exhaustive()
    }
}

impl Default for MuxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl MuxExecutor {
    pub fn new() -> Self {
        Self {
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub async fn execute(&self, invocation: &MuxInvocation) -> QueueResult<()> {
        let index = invocation.index;
        if let Some(side_file) = &invocation.chapter_file {
            fs::write(&side_file.path, &side_file.contents)
                .await
                .map_err(|source| QueueError::io(&side_file.path, source))?;
        }
        if let Some(parent) = invocation.output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| QueueError::io(parent, source))?;
        }
        match fs::remove_file(&invocation.output).await {
            Ok(()) => debug!(index, output = %invocation.output.display(), "replacing existing output"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(QueueError::io(&invocation.output, source)),
        }

        let guard = match &invocation.thumbnail {
            Some(thumbnail) => Some((
                ThumbnailGuard::acquire(thumbnail)
                    .map_err(|source| QueueError::io(&thumbnail.source, source))?,
                thumbnail,
            )),
            None => None,
        };

        debug!(index, program = %invocation.program.display(), args = ?invocation.args, "running mux");
        let outcome = self
            .executor
            .status(&invocation.program, &invocation.args)
            .await;

        let result = match outcome {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(QueueError::MuxFailed {
                index,
                status: status.code(),
            }),
            Err(err) => {
                warn!(index, program = %invocation.program.display(), error = %err, "failed to start mux");
                Err(QueueError::MuxFailed {
                    index,
                    status: None,
                })
            }
        };

        // A lost thumbnail must not hide how the mux itself went.
        if let Some((guard, thumbnail)) = guard {
            if let Err(err) = guard.restore() {
                warn!(
                    index,
                    thumbnail = %thumbnail.source.display(),
                    error = %err,
                    "failed to restore thumbnail name"
                );
            }
        }
        result?;
        info!(index, output = %invocation.output.display(), "mux complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::SideFile;
    use crate::planner::Thumbnail;
    use async_trait::async_trait;
    use std::os::unix::process::ExitStatusExt;
    use std::path::{Path, PathBuf};
    use std::process::{ExitStatus, Output};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct RecordingExecutor {
        code: i32,
        thumbnail: Option<PathBuf>,
        seen_thumbnail: Mutex<Option<bool>>,
        discard_thumbnail: bool,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingExecutor {
        fn new(code: i32, thumbnail: Option<PathBuf>) -> Arc<Self> {
            Arc::new(Self {
                code,
                thumbnail,
                seen_thumbnail: Mutex::new(None),
                discard_thumbnail: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        /// Deletes the attached thumbnail while "running", like a tool that
        /// cleans up its inputs.
        fn discarding(code: i32, thumbnail: PathBuf) -> Arc<Self> {
            Arc::new(Self {
                code,
                thumbnail: Some(thumbnail),
                seen_thumbnail: Mutex::new(None),
                discard_thumbnail: true,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn output(&self, _program: &Path, _args: &[String]) -> std::io::Result<Output> {
            unreachable!("mux only waits for the exit status")
        }

        async fn status(&self, _program: &Path, args: &[String]) -> std::io::Result<ExitStatus> {
            self.calls.lock().unwrap().push(args.to_vec());
            if let Some(path) = &self.thumbnail {
                *self.seen_thumbnail.lock().unwrap() = Some(path.exists());
                if self.discard_thumbnail {
                    std::fs::remove_file(path)?;
                }
            }
            Ok(ExitStatus::from_raw(self.code << 8))
        }
    }

    fn invocation(dir: &Path) -> MuxInvocation {
        MuxInvocation {
            index: 0,
            program: PathBuf::from("ffmpeg"),
            args: vec!["-y".into(), "out.mkv".into()],
            output: dir.join("2").join("Show - 2x01 - Pilot.mkv"),
            chapter_file: Some(SideFile {
                path: dir.join("0.meta"),
                contents: ";FFMETADATA1\n".into(),
            }),
            thumbnail: Some(Thumbnail {
                source: dir.join("0.jpg"),
                attach_as: dir.join("thumbnail.jpg"),
                mime: "image/jpeg",
            }),
        }
    }

    #[tokio::test]
    async fn prepares_files_and_restores_thumbnail() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("0.jpg"), b"jpeg").unwrap();
        let invocation = invocation(dir.path());
        std::fs::create_dir_all(invocation.output.parent().unwrap()).unwrap();
        std::fs::write(&invocation.output, b"stale").unwrap();

        let recorder = RecordingExecutor::new(0, Some(dir.path().join("thumbnail.jpg")));
        MuxExecutor::new()
            .with_executor(recorder.clone())
            .execute(&invocation)
            .await
            .unwrap();

        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
        assert_eq!(*recorder.seen_thumbnail.lock().unwrap(), Some(true));
        assert!(dir.path().join("0.jpg").exists());
        assert!(!dir.path().join("thumbnail.jpg").exists());
        assert!(!invocation.output.exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("0.meta")).unwrap(),
            ";FFMETADATA1\n"
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_mux_failure() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("0.jpg"), b"jpeg").unwrap();
        let recorder = RecordingExecutor::new(1, None);
        let err = MuxExecutor::new()
            .with_executor(recorder)
            .execute(&invocation(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::MuxFailed {
                index: 0,
                status: Some(1)
            }
        ));
        assert!(dir.path().join("0.jpg").exists());
    }

    #[tokio::test]
    async fn lost_thumbnail_keeps_mux_failure_retryable() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("0.jpg"), b"jpeg").unwrap();
        let recorder = RecordingExecutor::discarding(1, dir.path().join("thumbnail.jpg"));
        let err = MuxExecutor::new()
            .with_executor(recorder.clone())
            .execute(&invocation(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::MuxFailed {
                index: 0,
                status: Some(1)
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(*recorder.seen_thumbnail.lock().unwrap(), Some(true));
        assert!(!dir.path().join("0.jpg").exists());
    }

    #[tokio::test]
    async fn lost_thumbnail_after_successful_mux_is_not_an_error() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("0.jpg"), b"jpeg").unwrap();
        let recorder = RecordingExecutor::discarding(0, dir.path().join("thumbnail.jpg"));
        MuxExecutor::new()
            .with_executor(recorder)
            .execute(&invocation(dir.path()))
            .await
            .unwrap();
    }
}
