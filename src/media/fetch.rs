// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use super::registry::MediaLocator;
use crate::error::AssetError;
use crate::http::HttpClient;

/// Put the bytes behind `locator` at `destination`
///
/// Remote assets are streamed to disk. Local files below `owned_root` were
/// produced by this build (acquired media) and are moved; other local files
/// are copied. Returns the number of bytes placed.
pub async fn place_asset<C: HttpClient + ?Sized>(
    client: &C,
    locator: &MediaLocator,
    destination: &Path,
    owned_root: Option<&Path>,
) -> Result<u64, AssetError> {
    match locator {
        MediaLocator::Remote(url) => download_to_file(client, url.as_str(), destination).await,
        MediaLocator::LocalFile(path) => {
            let owned = owned_root.is_some_and(|root| path.starts_with(root));
            place_local_file(path, destination, owned).await
        }
    }
}

/// Stream a remote resource into `output_path`
pub async fn download_to_file<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    output_path: &Path,
) -> Result<u64, AssetError> {
    let response = client
        .get_stream(url)
        .await
        .map_err(|e| AssetError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?;

    if response.status >= 400 {
        return Err(AssetError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let mut file = File::create(output_path)
        .await
        .map_err(|e| AssetError::FileCreateFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    let mut bytes_written: u64 = 0;
    let mut stream = response.body;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| AssetError::StreamFailed {
            url: url.to_string(),
            source: e,
        })?;

        file.write_all(&chunk)
            .await
            .map_err(|e| AssetError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        bytes_written += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| AssetError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    Ok(bytes_written)
}

async fn place_local_file(source: &Path, destination: &Path, owned: bool) -> Result<u64, AssetError> {
    let place_error = |e| AssetError::PlaceFailed {
        from: source.to_path_buf(),
        to: destination.to_path_buf(),
        source: e,
    };

    if owned && tokio::fs::rename(source, destination).await.is_ok() {
        let metadata = tokio::fs::metadata(destination).await.map_err(place_error)?;
        return Ok(metadata.len());
    }

    // Copy when the file isn't ours or the rename crossed filesystems
    let bytes = tokio::fs::copy(source, destination).await.map_err(place_error)?;
    if owned {
        let _ = tokio::fs::remove_file(source).await;
    }
    Ok(bytes)
}
