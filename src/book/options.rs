// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::content::{default_allowed_attributes, default_allowed_xhtml11_tags};
use crate::error::{BuildError, ConfigError};
use crate::http::DEFAULT_USER_AGENT;

/// Major EPUB version of the package being built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpubVersion {
    /// EPUB 2 with XHTML 1.1 content and an NCX table of contents
    V2,
    /// EPUB 3 with HTML5-flavoured XHTML and a navigation document
    V3,
}

impl EpubVersion {
    pub fn number(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }

    pub fn supports_audio_video(self) -> bool {
        self == Self::V3
    }
}

impl TryFrom<u8> for EpubVersion {
    type Error = BuildError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            other => Err(BuildError::UnsupportedVersion(other)),
        }
    }
}

/// Options for building an EPUB
///
/// Every field has a default, so a JSON options file only needs the keys it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpubOptions {
    /// Book title; building without one fails
    pub title: Option<String>,
    pub description: Option<String>,
    /// Cover image URL or local path
    pub cover: Option<String>,
    /// Use the first image of the content as cover when `cover` is unset
    pub first_image_is_cover: bool,
    pub publisher: String,
    pub authors: Vec<String>,
    pub toc_title: String,
    /// Repeat each chapter's title as a heading above its content
    pub append_chapter_titles: bool,
    pub show_toc: bool,
    /// Publication date; defaults to the time of the build
    pub date: Option<String>,
    pub lang: String,
    /// Stylesheet replacing the built-in one
    pub css: Option<String>,
    pub fonts: Vec<PathBuf>,
    pub custom_opf_template: Option<PathBuf>,
    pub custom_ncx_template: Option<PathBuf>,
    pub custom_html_toc_template: Option<PathBuf>,
    pub custom_html_cover_template: Option<PathBuf>,
    pub version: u8,
    pub user_agent: String,
    pub allowed_attributes: Vec<String>,
    pub allowed_xhtml11_tags: Vec<String>,
    /// Parent of the per-build directories
    pub temp_dir: Option<PathBuf>,
}

impl Default for EpubOptions {
    fn default() -> Self {
        Self {
            title: None,
            description: None,
            cover: None,
            first_image_is_cover: false,
            publisher: "anonymous".to_string(),
            authors: vec!["anonymous".to_string()],
            toc_title: "Table Of Contents".to_string(),
            append_chapter_titles: true,
            show_toc: true,
            date: None,
            lang: "en".to_string(),
            css: None,
            fonts: Vec::new(),
            custom_opf_template: None,
            custom_ncx_template: None,
            custom_html_toc_template: None,
            custom_html_cover_template: None,
            version: 3,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            allowed_attributes: default_allowed_attributes(),
            allowed_xhtml11_tags: default_allowed_xhtml11_tags(),
            temp_dir: None,
        }
    }
}

impl EpubOptions {
    /// Load options from a JSON file, falling back to defaults for missing keys
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Two-letter language code, `en` when none is usable
    pub fn language_code(&self) -> String {
        let code: String = self
            .lang
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .take(2)
            .collect::<String>()
            .to_lowercase();
        if code.len() == 2 { code } else { "en".to_string() }
    }

    /// Parent directory for build directories
    pub fn temp_root(&self) -> PathBuf {
        self.temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("epub-downloader"))
    }
}

/// One chapter handed to the builder
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSource {
    pub title: Option<String>,
    /// HTML fragment
    pub data: String,
    /// File name inside the package; derived from the title when unset
    pub filename: Option<String>,
    /// Attribution link, also the base for relative media references
    pub url: Option<String>,
    pub authors: Vec<String>,
    pub exclude_from_toc: bool,
    pub before_toc: bool,
}

impl ContentSource {
    pub fn new(title: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            data: data.into(),
            ..Default::default()
        }
    }
}
