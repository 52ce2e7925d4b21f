// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::Arc;

/// Events emitted during a conversion for progress reporting
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// The article page is being fetched
    FetchingPage { url: String },

    /// Reader-mode extraction finished
    ArticleExtracted { title: String, site_name: String },

    /// A downloader attempt is starting for one cascade entry
    MediaAttemptStarting {
        url: String,
        format: String,
        /// Zero-based index into the format cascade
        attempt: usize,
        total_formats: usize,
    },

    /// Downloader progress line
    MediaProgress {
        url: String,
        percent: f64,
        /// Reported size normalized to bytes
        size_bytes: u64,
    },

    /// An attempt was abandoned and the next cascade entry will be tried
    MediaAttemptRejected { url: String, reason: String },

    /// An embedded media item was acquired into a local file
    MediaAcquired { url: String, path: PathBuf },

    /// An embedded media item could not be acquired
    MediaFailed { url: String, error: String },

    /// Registered assets are being placed into the build directory
    AssetsStarting { images: usize, audio_video: usize },

    /// One asset is in place
    AssetPlaced { locator: String, bytes: u64 },

    /// One asset was skipped
    AssetSkipped { locator: String, error: String },

    /// Cover image downloaded and probed
    CoverReady { width: u32, height: u32 },

    /// XHTML/OPF/NCX files are being written
    RenderingFiles { items: usize },

    /// The build directory is being packaged
    Archiving { output: PathBuf },

    /// The conversion finished
    Completed { output: PathBuf },
}

/// Trait for reporting progress events during a conversion.
///
/// Implementations can use this to display progress bars, log messages,
/// or collect statistics.
pub trait ProgressReporter: Send + Sync {
    /// Report a progress event
    fn report(&self, event: ProgressEvent);
}

/// A shared reference to a progress reporter
pub type SharedProgressReporter = Arc<dyn ProgressReporter>;

/// A no-op progress reporter that silently ignores all events.
/// Useful for tests or quiet mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _event: ProgressEvent) {}
}

impl NoopReporter {
    /// Create a new NoopReporter wrapped in an Arc
    pub fn shared() -> SharedProgressReporter {
        Arc::new(Self)
    }
}
