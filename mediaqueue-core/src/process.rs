use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

/// Seam around external tools so the pipeline can be driven without them.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs to completion capturing stdout and stderr.
    async fn output(&self, program: &Path, args: &[String]) -> std::io::Result<Output>;

    /// Runs to completion with the tool's progress going to the terminal.
    async fn status(&self, program: &Path, args: &[String]) -> std::io::Result<ExitStatus>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn output(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }

    async fn status(&self, program: &Path, args: &[String]) -> std::io::Result<ExitStatus> {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
    }
}

/// Last few lines of a tool's stderr, enough to diagnose without flooding logs.
pub fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let collected: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    let start = collected.len().saturating_sub(lines);
    collected[start..].join("\n")
}
