// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while driving the external media downloader
#[derive(Error, Debug)]
pub enum AcquireError {
    #[error("Failed to start downloader '{binary}': {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Requested format '{format}' is not available for {url}")]
    FormatUnavailable { url: String, format: String },

    #[error("Downloader exited with code {code:?} for {url} (format '{format}'): {stderr}")]
    DownloaderFailed {
        url: String,
        format: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to read downloader output for {url}: {source}")]
    OutputFailed {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Download of {url} as '{format}' reached {size} bytes, over the cap of {cap} bytes")]
    SizeCapExceeded {
        url: String,
        format: String,
        size: u64,
        cap: u64,
    },

    #[error("No format selectors configured for {url}")]
    EmptyCascade { url: String },

    #[error("All {attempts} format selectors failed for {url}: {last}")]
    CascadeExhausted {
        url: String,
        attempts: usize,
        #[source]
        last: Box<AcquireError>,
    },
}

/// Errors for a single media asset; these never abort a build
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("HTTP request failed for {url}: {source}")]
    HttpFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP error {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Stream error while downloading {url}: {source}")]
    StreamFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    FileCreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to place local file {from} at {to}: {source}")]
    PlaceFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Media type of {locator} can't be resolved")]
    UnresolvableType { locator: String },
}

/// Fatal errors that abort building a document
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Could not find any title")]
    MissingTitle,

    #[error("Unsupported EPUB version {0}, expected 2 or 3")]
    UnsupportedVersion(u8),

    #[error("Template not found: {path}")]
    MissingTemplate { path: PathBuf },

    #[error("Failed to read template {path}: {source}")]
    TemplateReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Custom font not found at {path}")]
    FontNotFound { path: PathBuf },

    #[error("The cover image can't be processed: {locator}")]
    InvalidCover { locator: String },

    #[error("Failed to fetch cover image {locator}: {source}")]
    CoverFetchFailed {
        locator: String,
        #[source]
        source: AssetError,
    },

    #[error("Failed to retrieve cover image dimensions for {path}")]
    CoverDimensions { path: PathBuf },

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur when packaging a build directory
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Build directory does not exist: {0}")]
    MissingBuildDir(PathBuf),

    #[error("Failed to create archive {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write archive {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to remove build directory {path}: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors loading an options file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read options file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid options in {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the reader-mode extractor
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("No readable content found at {url}")]
    NoContent { url: String },

    #[error("Invalid page URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Top-level errors for a whole conversion
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to fetch page {url}: {source}")]
    PageFetchFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Failed to create output directory {path}: {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
