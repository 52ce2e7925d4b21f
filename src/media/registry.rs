// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::mime::resolve_type;
use crate::book::EpubVersion;

/// Which subfolder of the package a media asset lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    AudioVideo,
}

impl MediaKind {
    /// Kind of media referenced by an element's `src`, if it carries media at all
    pub fn for_tag(tag: &str) -> Option<Self> {
        match tag {
            "img" | "input" => Some(Self::Image),
            "audio" | "video" => Some(Self::AudioVideo),
            _ => None,
        }
    }

    pub fn subfolder(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::AudioVideo => "audiovideo",
        }
    }
}

/// Where the bytes of an asset come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocator {
    Remote(Url),
    LocalFile(PathBuf),
}

impl MediaLocator {
    /// Interpret a `src` value, resolving relative references against `base`
    ///
    /// `data:` URIs, unknown schemes, and relative references without a base
    /// have no locator.
    pub fn parse(reference: &str, base: Option<&Url>) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.starts_with("data:") {
            return None;
        }

        let url = match Url::parse(reference) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(reference).ok()?,
            Err(_) => return None,
        };

        match url.scheme() {
            "http" | "https" => Some(Self::Remote(url)),
            "file" => url.to_file_path().ok().map(Self::LocalFile),
            _ => None,
        }
    }

    /// Like [`MediaLocator::parse`], but a plain filesystem path is accepted too
    pub fn parse_with_local_paths(reference: &str) -> Option<Self> {
        match Url::parse(reference.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https" | "file") => Self::parse(reference, None),
            // Single-letter "schemes" are Windows drive letters
            Ok(url) if url.scheme().len() > 1 => None,
            _ if reference.trim().is_empty() => None,
            _ => Some(Self::LocalFile(PathBuf::from(reference.trim()))),
        }
    }
}

/// One media resource referenced by the content
#[derive(Debug, Clone)]
pub struct MediaAsset {
    /// Opaque per-document identifier, also the file stem inside the package
    pub id: String,
    /// The reference exactly as it appeared in the content
    pub source: String,
    pub locator: MediaLocator,
    pub kind: MediaKind,
    pub media_type: String,
    pub extension: String,
}

impl MediaAsset {
    /// Path relative to the content documents, e.g. `images/<id>.png`
    pub fn relative_path(&self) -> String {
        format!("{}/{}.{}", self.kind.subfolder(), self.id, self.extension)
    }
}

/// Result of registering a reference
#[derive(Debug)]
pub enum Registration<'a> {
    Registered(&'a MediaAsset),
    /// No locator or media type could be determined; keep the original reference
    Unresolvable,
    /// The element kind is not packaged for this EPUB version
    Unsupported,
}

/// Per-document set of media assets, deduplicated by source reference
#[derive(Debug)]
pub struct MediaRegistry {
    version: EpubVersion,
    assets: Vec<MediaAsset>,
    by_source: HashMap<String, usize>,
}

impl MediaRegistry {
    pub fn new(version: EpubVersion) -> Self {
        Self {
            version,
            assets: Vec::new(),
            by_source: HashMap::new(),
        }
    }

    /// Register `source` referenced by an element of `kind`
    ///
    /// A source seen before returns the asset registered first. Audio and video
    /// are ignored under EPUB 2.
    pub fn register(&mut self, source: &str, kind: MediaKind, base: Option<&Url>) -> Registration<'_> {
        if kind == MediaKind::AudioVideo && !self.version.supports_audio_video() {
            return Registration::Unsupported;
        }

        if let Some(&index) = self.by_source.get(source) {
            return Registration::Registered(&self.assets[index]);
        }

        let Some(locator) = MediaLocator::parse(source, base) else {
            debug!(source, "media reference has no usable locator");
            return Registration::Unresolvable;
        };

        let type_source = match &locator {
            MediaLocator::Remote(url) => url.path().to_string(),
            MediaLocator::LocalFile(path) => path.to_string_lossy().into_owned(),
        };
        let Some(resolved) = resolve_type(&type_source) else {
            debug!(source, "the media can't be processed");
            return Registration::Unresolvable;
        };

        let index = self.assets.len();
        self.assets.push(MediaAsset {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            locator,
            kind,
            media_type: resolved.media_type,
            extension: resolved.extension,
        });
        self.by_source.insert(source.to_string(), index);

        Registration::Registered(&self.assets[index])
    }

    /// All assets in registration order
    pub fn assets(&self) -> &[MediaAsset] {
        &self.assets
    }

    pub fn images(&self) -> impl Iterator<Item = &MediaAsset> {
        self.assets.iter().filter(|a| a.kind == MediaKind::Image)
    }

    pub fn audio_video(&self) -> impl Iterator<Item = &MediaAsset> {
        self.assets.iter().filter(|a| a.kind == MediaKind::AudioVideo)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
