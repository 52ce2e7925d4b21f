// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::book::Cover;
use crate::error::BuildError;
use crate::http::HttpClient;
use crate::media::place_asset;

/// Cover image placed in the build directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Fetch the cover into `oebps_dir` and probe its dimensions
///
/// Both dimensions must be known and positive; the cover page lays the image
/// out with them.
pub async fn prepare_cover<C: HttpClient + ?Sized>(
    client: &C,
    cover: &Cover,
    oebps_dir: &Path,
) -> Result<CoverImage, BuildError> {
    let file_name = cover.file_name();
    let destination = oebps_dir.join(&file_name);

    place_asset(client, &cover.locator, &destination, None)
        .await
        .map_err(|e| BuildError::CoverFetchFailed {
            locator: cover.source.clone(),
            source: e,
        })?;

    let (width, height) = probe_dimensions(destination.clone())
        .await
        .ok_or(BuildError::CoverDimensions { path: destination })?;
    debug!(width, height, "cover image dimensions");

    Ok(CoverImage {
        file_name,
        width,
        height,
    })
}

async fn probe_dimensions(path: PathBuf) -> Option<(u32, u32)> {
    let dimensions = tokio::task::spawn_blocking(move || image::image_dimensions(&path))
        .await
        .ok()?
        .ok()?;
    match dimensions {
        (0, _) | (_, 0) => None,
        dimensions => Some(dimensions),
    }
}
