// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod acquire;
pub mod archive;
pub mod book;
pub mod content;
pub mod convert;
pub mod error;
pub mod extract;
pub mod http;
pub mod media;
pub mod progress;
pub mod render;

// Re-export main types for convenience
pub use acquire::{AcquireOptions, MediaAcquirer, MediaDownloader, YtDlp};
pub use archive::{archive, repair_archive};
pub use book::{ContentSource, DocumentModel, EpubOptions, EpubVersion};
pub use convert::{ConvertOptions, convert_url, convert_with, create_epub};
pub use error::{AcquireError, ArchiveError, AssetError, BuildError, ConfigError, ConvertError, ExtractError};
pub use extract::{Article, Extractor, MetaExtractor};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use render::Renderer;
