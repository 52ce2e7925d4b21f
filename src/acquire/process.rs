// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::AcquireError;

/// Executable looked up on `PATH` when no binary is configured
pub const DEFAULT_DOWNLOADER: &str = "yt-dlp";

/// One downloader invocation: `<binary> <url> -f <format> -o <output>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub format: String,
    pub output: PathBuf,
}

/// How a downloader process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// Exited with status 0
    Completed,
    /// Stopped because `cancel` was called
    Cancelled,
    /// Exited non-zero on its own
    Failed { code: Option<i32>, stderr: String },
}

/// A running downloader whose event stream can be read line by line
#[async_trait]
pub trait DownloadRun: Send {
    /// Next non-empty stdout line, `None` once the stream is closed
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;

    /// Kill the downloader and every process it spawned
    async fn cancel(&mut self);

    /// Wait for the process to exit
    async fn wait(self: Box<Self>) -> std::io::Result<RunExit>;
}

/// Starts downloader processes; the seam the acquirer is tested through
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn start(&self, request: &DownloadRequest) -> Result<Box<dyn DownloadRun>, AcquireError>;
}

/// Downloader backed by a yt-dlp compatible command-line tool
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOADER)
    }
}

#[async_trait]
impl MediaDownloader for YtDlp {
    async fn start(&self, request: &DownloadRequest) -> Result<Box<dyn DownloadRun>, AcquireError> {
        let mut command = Command::new(&self.binary);
        command
            .arg(&request.url)
            .arg("-f")
            .arg(&request.format)
            .arg("-o")
            .arg(&request.output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so cancellation can take helpers (ffmpeg) down too
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| AcquireError::SpawnFailed {
            binary: self.binary.clone(),
            source: e,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| AcquireError::SpawnFailed {
            binary: self.binary.clone(),
            source: std::io::Error::other("stdout was not captured"),
        })?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut collected = String::new();
                let _ = stderr.read_to_string(&mut collected).await;
                collected
            })
        });

        debug!(binary = %self.binary, url = %request.url, format = %request.format, "downloader started");

        Ok(Box::new(ProcessRun {
            child,
            lines: LineSplitter::new(stdout),
            stderr_task,
            cancelled: false,
        }))
    }
}

struct ProcessRun {
    child: Child,
    lines: LineSplitter<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    cancelled: bool,
}

#[async_trait]
impl DownloadRun for ProcessRun {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    async fn cancel(&mut self) {
        self.cancelled = true;
        if let Some(pid) = self.child.id() {
            kill_process_tree(pid);
        }
        // Also updates the child's state if the tree kill already reaped it
        let _ = self.child.start_kill();
    }

    async fn wait(mut self: Box<Self>) -> std::io::Result<RunExit> {
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if self.cancelled {
            Ok(RunExit::Cancelled)
        } else if status.success() {
            Ok(RunExit::Completed)
        } else {
            Ok(RunExit::Failed {
                code: status.code(),
                stderr,
            })
        }
    }
}

impl Drop for ProcessRun {
    fn drop(&mut self) {
        // A run abandoned mid-download still takes its helpers down; the id
        // is gone once the child has been reaped
        if let Some(pid) = self.child.id() {
            kill_process_tree(pid);
        }
    }
}

#[cfg(unix)]
fn kill_process_tree(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        debug!(pid, error = %e, "failed to kill downloader process group");
    }
}

#[cfg(windows)]
fn kill_process_tree(pid: u32) {
    let result = std::process::Command::new("taskkill")
        .args(["/pid", &pid.to_string(), "/T", "/F"])
        .output();
    if let Err(e) = result {
        debug!(pid, error = %e, "taskkill failed");
    }
}

#[cfg(not(any(unix, windows)))]
fn kill_process_tree(_pid: u32) {}

/// Splits a byte stream into lines on `\n` and `\r`
///
/// The downloader redraws its progress line with carriage returns, so both
/// count as terminators. Empty lines are skipped.
pub struct LineSplitter<R> {
    reader: R,
    buffer: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> LineSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            eof: false,
        }
    }

    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n' || *b == b'\r') {
                let line: Vec<u8> = self.buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                if text.trim().is_empty() {
                    continue;
                }
                return Ok(Some(text));
            }

            if self.eof {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let rest = std::mem::take(&mut self.buffer);
                let text = String::from_utf8_lossy(&rest).into_owned();
                if text.trim().is_empty() {
                    return Ok(None);
                }
                return Ok(Some(text));
            }

            let mut chunk = [0u8; 4096];
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                self.eof = true;
            } else {
                self.buffer.extend_from_slice(&chunk[..read]);
            }
        }
    }
}
