// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::process::{DownloadRequest, MediaDownloader, RunExit};
use super::progress_line::parse_progress_line;
use crate::error::AcquireError;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Stderr text the downloader prints when a selector matches nothing
pub const FORMAT_UNAVAILABLE: &str = "Requested format is not available";

/// Options for media acquisition
#[derive(Debug, Clone, Default)]
pub struct AcquireOptions {
    /// Reject attempts whose reported size exceeds this many bytes
    pub size_cap: Option<u64>,
    /// Also enforce the cap on the last cascade entry instead of keeping its output
    pub reject_oversized_final: bool,
}

enum AttemptOutcome {
    Completed,
    Oversized { size: u64 },
}

/// Downloads embedded media through a prioritized cascade of format selectors
pub struct MediaAcquirer<D: MediaDownloader> {
    downloader: D,
    options: AcquireOptions,
    reporter: SharedProgressReporter,
}

impl<D: MediaDownloader> MediaAcquirer<D> {
    pub fn new(downloader: D, options: AcquireOptions, reporter: SharedProgressReporter) -> Self {
        Self {
            downloader,
            options,
            reporter,
        }
    }

    pub fn options(&self) -> &AcquireOptions {
        &self.options
    }

    /// Acquire `url` into a fresh file inside `work_dir`
    ///
    /// Entries of `formats` are tried in order. An attempt is abandoned when the
    /// downloader reports the selector as unavailable, when it cannot be started,
    /// or when its reported size passes the configured cap. Unless
    /// `reject_oversized_final` is set, the last entry is never cancelled for size.
    pub async fn acquire(
        &self,
        url: &str,
        work_dir: &Path,
        formats: &[String],
    ) -> Result<PathBuf, AcquireError> {
        if formats.is_empty() {
            return Err(AcquireError::EmptyCascade {
                url: url.to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            let format = &formats[attempt];
            let is_last = attempt + 1 == formats.len();
            let enforce_cap = !is_last || self.options.reject_oversized_final;
            let output = unique_target(work_dir, format);

            self.reporter.report(ProgressEvent::MediaAttemptStarting {
                url: url.to_string(),
                format: format.clone(),
                attempt,
                total_formats: formats.len(),
            });

            let failure = match self.run_attempt(url, format, &output, enforce_cap).await {
                Ok(AttemptOutcome::Completed) => {
                    self.reporter.report(ProgressEvent::MediaAcquired {
                        url: url.to_string(),
                        path: output.clone(),
                    });
                    return Ok(output);
                }
                Ok(AttemptOutcome::Oversized { size }) => {
                    remove_partial_output(&output).await;
                    AcquireError::SizeCapExceeded {
                        url: url.to_string(),
                        format: format.clone(),
                        size,
                        cap: self.options.size_cap.unwrap_or_default(),
                    }
                }
                Err(
                    e @ (AcquireError::FormatUnavailable { .. } | AcquireError::SpawnFailed { .. }),
                ) => e,
                Err(e) => return Err(e),
            };

            if is_last {
                return Err(AcquireError::CascadeExhausted {
                    url: url.to_string(),
                    attempts: formats.len(),
                    last: Box::new(failure),
                });
            }

            debug!(url, format = %format, reason = %failure, "advancing format cascade");
            self.reporter.report(ProgressEvent::MediaAttemptRejected {
                url: url.to_string(),
                reason: failure.to_string(),
            });
            attempt += 1;
        }
    }

    async fn run_attempt(
        &self,
        url: &str,
        format: &str,
        output: &Path,
        enforce_cap: bool,
    ) -> Result<AttemptOutcome, AcquireError> {
        let request = DownloadRequest {
            url: url.to_string(),
            format: format.to_string(),
            output: output.to_path_buf(),
        };
        let mut run = self.downloader.start(&request).await?;
        let output_error = |e| AcquireError::OutputFailed {
            url: url.to_string(),
            source: e,
        };

        let mut oversized = None;
        while let Some(line) = run.next_line().await.map_err(output_error)? {
            let Some(progress) = parse_progress_line(&line) else {
                continue;
            };

            self.reporter.report(ProgressEvent::MediaProgress {
                url: url.to_string(),
                percent: progress.percent,
                size_bytes: progress.size_bytes,
            });

            if let Some(cap) = self.options.size_cap
                && progress.size_bytes > cap
            {
                if enforce_cap {
                    debug!(url, format, size = progress.size_bytes, cap, "file too large, cancelling");
                    run.cancel().await;
                    oversized = Some(progress.size_bytes);
                    break;
                }
                if oversized.is_none() {
                    warn!(url, format, size = progress.size_bytes, cap, "last format exceeds size cap, keeping it");
                    oversized = Some(progress.size_bytes);
                }
            }
        }

        let exit = run.wait().await.map_err(output_error)?;
        if enforce_cap && let Some(size) = oversized {
            return Ok(AttemptOutcome::Oversized { size });
        }

        match exit {
            RunExit::Completed => Ok(AttemptOutcome::Completed),
            RunExit::Cancelled => Err(AcquireError::DownloaderFailed {
                url: url.to_string(),
                format: format.to_string(),
                code: None,
                stderr: "cancelled".to_string(),
            }),
            RunExit::Failed { stderr, .. } if stderr.contains(FORMAT_UNAVAILABLE) => {
                Err(AcquireError::FormatUnavailable {
                    url: url.to_string(),
                    format: format.to_string(),
                })
            }
            RunExit::Failed { code, stderr } => Err(AcquireError::DownloaderFailed {
                url: url.to_string(),
                format: format.to_string(),
                code,
                stderr: stderr.trim().to_string(),
            }),
        }
    }
}

/// Container extension implied by a format selector
///
/// Selectors that pull a video stream land in `.mp4`, audio-only ones in `.m4a`.
pub fn extension_for_format(format: &str) -> &'static str {
    let wants_video = format.contains("video")
        || format.contains("best[")
        || format.contains("b[")
        || format.contains("bc")
        || format.contains("wv")
        || format == "best";
    if wants_video { "mp4" } else { "m4a" }
}

/// Random file name inside `work_dir` that does not exist yet
fn unique_target(work_dir: &Path, format: &str) -> PathBuf {
    let extension = extension_for_format(format);
    loop {
        let candidate = work_dir.join(format!("{}.{}", Uuid::new_v4(), extension));
        if !candidate.exists() {
            return candidate;
        }
    }
}

async fn remove_partial_output(output: &Path) {
    let mut partial = output.as_os_str().to_owned();
    partial.push(".part");
    for path in [output.to_path_buf(), PathBuf::from(partial)] {
        if tokio::fs::remove_file(&path).await.is_ok() {
            debug!(path = %path.display(), "removed abandoned download");
        }
    }
}
