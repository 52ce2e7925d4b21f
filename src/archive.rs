// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Packaging of a rendered build directory into an `.epub` file

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;

pub const MIMETYPE: &str = "application/epub+zip";

/// External tool used for the optional repair pass
pub const REPAIR_BINARY: &str = "zip";

/// Subdirectories of the build directory that end up in the archive, in order
const PACKAGED_DIRS: [&str; 2] = ["META-INF", "OEBPS"];

/// Zip `build_dir` into `output` and remove `build_dir`
///
/// The first entry is the uncompressed `mimetype` marker. If packaging fails,
/// no output file is left behind and the build directory is kept.
pub async fn archive(build_dir: &Path, output: &Path) -> Result<(), ArchiveError> {
    if !build_dir.is_dir() {
        return Err(ArchiveError::MissingBuildDir(build_dir.to_path_buf()));
    }

    let (from, to) = (build_dir.to_path_buf(), output.to_path_buf());
    let written = tokio::task::spawn_blocking(move || write_archive(&from, &to))
        .await
        .unwrap_or_else(|e| {
            Err(ArchiveError::WriteFailed {
                path: output.to_path_buf(),
                source: std::io::Error::other(e),
            })
        });

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(output).await;
        return Err(e);
    }
    debug!(output = %output.display(), "archive written");

    tokio::fs::remove_dir_all(build_dir)
        .await
        .map_err(|e| ArchiveError::CleanupFailed {
            path: build_dir.to_path_buf(),
            source: e,
        })
}

fn write_archive(build_dir: &Path, output: &Path) -> Result<(), ArchiveError> {
    let file = File::create(output).map_err(|e| ArchiveError::CreateFailed {
        path: output.to_path_buf(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    zip.start_file("mimetype", stored)?;
    zip.write_all(MIMETYPE.as_bytes())
        .map_err(|e| ArchiveError::WriteFailed {
            path: output.to_path_buf(),
            source: e,
        })?;

    for dir in PACKAGED_DIRS {
        for path in files_below(&build_dir.join(dir))? {
            let name = entry_name(build_dir, &path);
            let data = std::fs::read(&path).map_err(|e| ArchiveError::ReadFailed {
                path: path.clone(),
                source: e,
            })?;
            zip.start_file(name, deflated)?;
            zip.write_all(&data).map_err(|e| ArchiveError::WriteFailed {
                path: output.to_path_buf(),
                source: e,
            })?;
        }
    }

    let mut writer = zip.finish()?;
    writer.flush().map_err(|e| ArchiveError::WriteFailed {
        path: output.to_path_buf(),
        source: e,
    })
}

/// Every regular file below `dir`, sorted for a reproducible entry order
fn files_below(dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }

    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current).map_err(|e| ArchiveError::ReadFailed {
            path: current.clone(),
            source: e,
        })?;
        for entry in entries {
            let entry = entry.map_err(|e| ArchiveError::ReadFailed {
                path: current.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Archive entry names always use `/`
fn entry_name(build_dir: &Path, path: &Path) -> String {
    path.strip_prefix(build_dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Rewrite `archive` with `zip -F`; failures are logged and otherwise ignored
///
/// Returns whether the archive was replaced by the repaired copy.
pub async fn repair_archive(archive: &Path, work_dir: &Path) -> bool {
    repair_with(REPAIR_BINARY, archive, work_dir).await
}

async fn repair_with(binary: &str, archive: &Path, work_dir: &Path) -> bool {
    if let Err(e) = tokio::fs::create_dir_all(work_dir).await {
        warn!(path = %work_dir.display(), error = %e, "can't create repair directory");
        return false;
    }
    let fixed = work_dir.join("fix.zip");

    let status = Command::new(binary)
        .arg("-F")
        .arg(archive)
        .arg("--out")
        .arg(&fixed)
        .kill_on_drop(true)
        .output()
        .await;

    match status {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            warn!(
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "archive repair failed"
            );
            return false;
        }
        Err(e) => {
            warn!(binary, error = %e, "archive repair tool unavailable");
            return false;
        }
    }

    let replaced = match tokio::fs::copy(&fixed, archive).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "can't replace archive with the repaired copy");
            false
        }
    };
    let _ = tokio::fs::remove_file(&fixed).await;
    replaced
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn populate(build_dir: &Path) {
        std::fs::create_dir_all(build_dir.join("META-INF")).unwrap();
        std::fs::create_dir_all(build_dir.join("OEBPS/images")).unwrap();
        std::fs::write(build_dir.join("META-INF/container.xml"), "<container/>").unwrap();
        std::fs::write(build_dir.join("OEBPS/content.opf"), "<package/>").unwrap();
        std::fs::write(build_dir.join("OEBPS/images/a.png"), b"png").unwrap();
    }

    #[tokio::test]
    async fn mimetype_is_the_first_stored_entry() {
        let dir = tempdir().unwrap();
        let build_dir = dir.path().join("build");
        populate(&build_dir);
        let output = dir.path().join("book.epub");

        archive(&build_dir, &output).await.unwrap();

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let mut first = zip.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        let mut contents = String::new();
        first.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, MIMETYPE);
    }

    #[tokio::test]
    async fn build_tree_is_packaged_and_removed() {
        let dir = tempdir().unwrap();
        let build_dir = dir.path().join("build");
        populate(&build_dir);
        std::fs::write(build_dir.join("stray.txt"), "not packaged").unwrap();
        let output = dir.path().join("book.epub");

        archive(&build_dir, &output).await.unwrap();

        let zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert_eq!(zip.len(), 4);
        assert!(names.contains(&"META-INF/container.xml"));
        assert!(names.contains(&"OEBPS/content.opf"));
        assert!(names.contains(&"OEBPS/images/a.png"));
        assert!(!names.contains(&"stray.txt"));
        assert!(!build_dir.exists());
    }

    #[tokio::test]
    async fn failure_keeps_the_build_directory() {
        let dir = tempdir().unwrap();
        let build_dir = dir.path().join("build");
        populate(&build_dir);
        let output = dir.path().join("missing/book.epub");

        let result = archive(&build_dir, &output).await;

        assert!(matches!(result, Err(ArchiveError::CreateFailed { .. })));
        assert!(build_dir.join("OEBPS/content.opf").exists());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn missing_build_directory_is_reported() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("book.epub");

        let result = archive(&dir.path().join("nope"), &output).await;

        assert!(matches!(result, Err(ArchiveError::MissingBuildDir(_))));
        assert!(!output.exists());
    }

    #[test]
    fn entry_names_are_relative() {
        let root = Path::new("/tmp/build");
        assert_eq!(entry_name(root, &root.join("OEBPS").join("images").join("a.png")), "OEBPS/images/a.png");
    }

    #[tokio::test]
    async fn missing_repair_tool_is_not_fatal() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("book.epub");
        std::fs::write(&output, b"archive").unwrap();

        let replaced = repair_with("epub-downloader-no-such-tool", &output, &dir.path().join("repair")).await;

        assert!(!replaced);
        assert_eq!(std::fs::read(&output).unwrap(), b"archive");
    }
}
