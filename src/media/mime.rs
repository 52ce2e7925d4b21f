// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use url::Url;

/// Media type and file extension resolved from a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedType {
    pub media_type: String,
    pub extension: String,
}

/// Guess the media type of a locator from its path, ignoring query and fragment
pub fn resolve_type(locator: &str) -> Option<ResolvedType> {
    let path = match Url::parse(locator) {
        Ok(url) => url.path().to_string(),
        Err(_) => locator
            .split(['?', '#'])
            .next()
            .unwrap_or(locator)
            .to_string(),
    };

    let mime = mime_guess::from_path(Path::new(&path)).first()?;
    let media_type = mime.essence_str().to_string();
    let extension = extension_for_media_type(&media_type)?;

    Some(ResolvedType {
        media_type,
        extension,
    })
}

/// Canonical extension for a media type
///
/// Common types map to the extension readers expect; anything else falls back
/// to the first extension `mime_guess` knows for the type.
pub fn extension_for_media_type(media_type: &str) -> Option<String> {
    let preferred = match media_type.to_lowercase().as_str() {
        "image/jpeg" => Some("jpeg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/ogg" => Some("ogg"),
        "audio/opus" => Some("opus"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    };

    preferred.map(String::from).or_else(|| {
        mime_guess::get_mime_extensions_str(media_type)
            .and_then(|extensions| extensions.first())
            .map(|ext| ext.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_png_url() {
        let resolved = resolve_type("https://x/y.png").unwrap();
        assert_eq!(resolved.media_type, "image/png");
        assert_eq!(resolved.extension, "png");
    }

    #[test]
    fn ignores_query_string() {
        let resolved = resolve_type("https://cdn.example.com/photo.JPG?w=800&q=70").unwrap();
        assert_eq!(resolved.media_type, "image/jpeg");
        assert_eq!(resolved.extension, "jpeg");
    }

    #[test]
    fn resolves_local_paths() {
        let resolved = resolve_type("/tmp/work/0b1c.m4a").unwrap();
        assert_eq!(resolved.extension, "m4a");
        let resolved = resolve_type("file:///tmp/work/clip.mp4").unwrap();
        assert_eq!(resolved.media_type, "video/mp4");
    }

    #[test]
    fn unknown_extensions_do_not_resolve() {
        assert!(resolve_type("https://example.com/image").is_none());
        assert!(resolve_type("https://example.com/thing.notarealext").is_none());
    }
}
