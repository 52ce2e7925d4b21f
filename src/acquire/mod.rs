// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod cascade;
mod process;
mod progress_line;

pub use cascade::{AcquireOptions, FORMAT_UNAVAILABLE, MediaAcquirer, extension_for_format};
pub use process::{
    DEFAULT_DOWNLOADER, DownloadRequest, DownloadRun, LineSplitter, MediaDownloader, RunExit, YtDlp,
};
pub use progress_line::{DownloadProgress, event_tag, parse_progress_line, unit_multiplier};
