use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use mediaqueue_core::{
    CommandExecutor, DefaultAnswers, Downloader, EntryOutcome, InfoDocument, MuxExecutor,
    QueueConfig, QueueEntry, QueueError, QueueResult, QueueRunner, RetryPolicy, SkipReason,
    Unattended,
};

/// Serves canned info documents, failing the first `failures` calls per entry.
#[derive(Default)]
struct ScriptedDownloader {
    documents: HashMap<usize, Value>,
    failures: Mutex<HashMap<usize, u32>>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedDownloader {
    fn with_document(mut self, index: usize, document: Value) -> Self {
        self.documents.insert(index, document);
        self
    }

    fn failing_first(self, index: usize, times: u32) -> Self {
        self.failures.lock().unwrap().insert(index, times);
        self
    }

    fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Downloader for ScriptedDownloader {
    async fn download(&self, entry: &QueueEntry) -> QueueResult<InfoDocument> {
        self.calls.lock().unwrap().push(entry.index);
        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&entry.index) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(QueueError::download(entry.index, "connection reset"));
            }
        }
        match self.documents.get(&entry.index) {
            Some(Value::Object(document)) => Ok(document.clone()),
            _ => Err(QueueError::download(entry.index, "no such video")),
        }
    }
}

/// Stands in for ffmpeg: records each invocation and exits with `code`.
struct FakeMuxer {
    code: i32,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeMuxer {
    fn exiting(code: i32) -> Arc<Self> {
        Arc::new(Self {
            code,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn runs(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandExecutor for FakeMuxer {
    async fn output(&self, _program: &Path, _args: &[String]) -> std::io::Result<Output> {
        unreachable!("ffmpeg output is never captured")
    }

    async fn status(&self, _program: &Path, args: &[String]) -> std::io::Result<ExitStatus> {
        self.calls.lock().unwrap().push(args.to_vec());
        Ok(ExitStatus::from_raw(self.code << 8))
    }
}

struct Fixture {
    dir: TempDir,
    link_list: PathBuf,
    config: Arc<QueueConfig>,
}

impl Fixture {
    fn new(links: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let link_list = dir.path().join("queue.txt");
        std::fs::write(&link_list, links.join("\n")).unwrap();
        let mut config = QueueConfig::default();
        config.paths.work_dir = dir.path().to_string_lossy().to_string();
        Self {
            dir,
            link_list,
            config: Arc::new(config),
        }
    }

    fn ledger(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("queue.done")).unwrap_or_default()
    }

    fn runner(
        &self,
        downloader: Arc<ScriptedDownloader>,
        muxer: Arc<FakeMuxer>,
    ) -> QueueRunner {
        QueueRunner::new(self.config.clone(), Arc::new(DefaultAnswers))
            .unwrap()
            .with_downloader(downloader)
            .with_mux_executor(MuxExecutor::new().with_executor(muxer))
    }
}

fn movie(title: &str) -> Value {
    json!({"ext": "mp4", "acodec": "mp4a.40.2", "movie": true, "title": title})
}

#[tokio::test]
async fn completed_entries_are_never_revisited() {
    let fixture = Fixture::new(&[
        "https://example.com/a",
        "https://example.com/b",
        "",
        "notes about the queue",
        "https://example.com/c",
    ]);
    std::fs::write(fixture.dir.path().join("queue.done"), "1\n").unwrap();
    let downloader = Arc::new(
        ScriptedDownloader::default()
            .with_document(0, movie("First"))
            .with_document(4, movie("Last")),
    );
    let muxer = FakeMuxer::exiting(0);
    let report = fixture
        .runner(downloader.clone(), muxer.clone())
        .run(&fixture.link_list)
        .await
        .unwrap();

    assert_eq!(downloader.calls(), vec![0, 4]);
    assert_eq!(muxer.runs(), 2);
    assert_eq!(report.completed(), 2);
    assert_eq!(report.skipped(), 3);
    assert_eq!(
        report.entries[1].outcome,
        EntryOutcome::Skipped {
            reason: SkipReason::AlreadyDone
        }
    );
    assert_eq!(
        report.entries[2].outcome,
        EntryOutcome::Skipped {
            reason: SkipReason::Blank
        }
    );
    assert_eq!(
        report.entries[3].outcome,
        EntryOutcome::Skipped {
            reason: SkipReason::NotALink
        }
    );
    assert_eq!(fixture.ledger(), "1\n0\n4\n");

    let second = fixture
        .runner(downloader.clone(), muxer.clone())
        .run(&fixture.link_list)
        .await
        .unwrap();
    assert_eq!(second.completed(), 0);
    assert_eq!(downloader.calls(), vec![0, 4]);
    assert_eq!(muxer.runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn mux_failure_leaves_entry_pending() {
    let fixture = Fixture::new(&["https://example.com/a"]);
    let downloader = Arc::new(ScriptedDownloader::default().with_document(0, movie("Film")));
    let failing = FakeMuxer::exiting(1);
    let started = tokio::time::Instant::now();
    let report = fixture
        .runner(downloader.clone(), failing.clone())
        .with_retry_policy(RetryPolicy::capped(3, 30))
        .run(&fixture.link_list)
        .await
        .unwrap();

    assert_eq!(report.abandoned(), 1);
    assert_eq!(report.entries[0].attempts, 3);
    assert_eq!(failing.runs(), 3);
    assert_eq!(downloader.calls(), vec![0, 0, 0]);
    // Re-downloading after a failed mux does not wait.
    assert!(started.elapsed() < Duration::from_secs(30));
    assert_eq!(fixture.ledger(), "");

    let report = fixture
        .runner(downloader, FakeMuxer::exiting(0))
        .run(&fixture.link_list)
        .await
        .unwrap();
    assert_eq!(report.completed(), 1);
    assert_eq!(fixture.ledger(), "0\n");
}

#[tokio::test(start_paused = true)]
async fn download_failures_retry_until_success() {
    let fixture = Fixture::new(&["https://example.com/a"]);
    let downloader = Arc::new(
        ScriptedDownloader::default()
            .with_document(0, movie("Film"))
            .failing_first(0, 4),
    );
    let muxer = FakeMuxer::exiting(0);
    let started = tokio::time::Instant::now();
    let report = fixture
        .runner(downloader.clone(), muxer.clone())
        .run(&fixture.link_list)
        .await
        .unwrap();

    assert_eq!(report.completed(), 1);
    assert_eq!(report.entries[0].attempts, 5);
    assert_eq!(muxer.runs(), 1);
    assert!(started.elapsed() >= Duration::from_secs(120));
}

#[tokio::test]
async fn unanswerable_identity_fails_entry_and_moves_on() {
    let fixture = Fixture::new(&["https://example.com/a", "https://example.com/b"]);
    let downloader = Arc::new(
        ScriptedDownloader::default()
            .with_document(0, json!({"ext": "mp4", "title": "Some Episode"}))
            .with_document(1, movie("Film")),
    );
    let muxer = FakeMuxer::exiting(0);
    let report = QueueRunner::new(fixture.config.clone(), Arc::new(Unattended))
        .unwrap()
        .with_downloader(downloader.clone())
        .with_mux_executor(MuxExecutor::new().with_executor(muxer.clone()))
        .run(&fixture.link_list)
        .await
        .unwrap();

    assert!(matches!(
        &report.entries[0].outcome,
        EntryOutcome::Failed { reason } if reason.contains("season_number")
    ));
    assert_eq!(report.entries[0].attempts, 1);
    assert_eq!(report.completed(), 1);
    assert_eq!(muxer.runs(), 1);
    assert_eq!(fixture.ledger(), "1\n");
}

#[tokio::test]
async fn forced_overrides_shape_the_output() {
    let fixture = Fixture::new(&["https://example.com/a"]);
    std::fs::write(
        fixture.dir.path().join("queue.forced.json"),
        r#"{"series": "Foo", "season_number": 2}"#,
    )
    .unwrap();
    let downloader = Arc::new(ScriptedDownloader::default().with_document(
        0,
        json!({"ext": "mp4", "series": "foo (official)", "episode": "Episode 5/10", "title": "Episode 5/10"}),
    ));
    let muxer = FakeMuxer::exiting(0);
    let report = fixture
        .runner(downloader, muxer.clone())
        .run(&fixture.link_list)
        .await
        .unwrap();

    let EntryOutcome::Completed { title, output } = &report.entries[0].outcome else {
        panic!("entry should complete: {:?}", report.entries[0].outcome);
    };
    assert_eq!(title, "Foo - 2x05 - Episode");
    assert_eq!(output, &fixture.dir.path().join("2").join("Foo - 2x05 - Episode.mkv"));
    let args = &muxer.calls.lock().unwrap()[0];
    assert_eq!(args.last(), Some(&output.to_string_lossy().to_string()));
    assert!(args.contains(&"aac_adtstoasc".to_string()));
}

#[tokio::test]
async fn malformed_overrides_abort_the_run() {
    let fixture = Fixture::new(&["https://example.com/a"]);
    std::fs::write(fixture.dir.path().join("queue.forced.json"), "[]").unwrap();
    let downloader = Arc::new(ScriptedDownloader::default());
    let err = fixture
        .runner(downloader.clone(), FakeMuxer::exiting(0))
        .run(&fixture.link_list)
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidOverrides { .. }));
    assert!(downloader.calls().is_empty());
}
