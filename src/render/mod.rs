// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod cover;
mod package;
mod templates;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

pub use cover::{CoverImage, prepare_cover};
pub use templates::{CONTAINER_XML, DEFAULT_CSS, IBOOKS_DISPLAY_OPTIONS, Templates, document_header, fill};

use crate::book::{DocumentModel, EpubVersion, TOC_HREF};
use crate::error::BuildError;
use crate::http::HttpClient;
use crate::media::{MediaKind, MediaLocator, place_asset};
use crate::progress::{ProgressEvent, SharedProgressReporter};
use package::Package;

/// Writes a document model out as an unpacked EPUB directory tree
pub struct Renderer<'a, C: HttpClient + ?Sized> {
    client: &'a C,
    reporter: SharedProgressReporter,
    owned_media_root: Option<PathBuf>,
}

impl<'a, C: HttpClient + ?Sized> Renderer<'a, C> {
    pub fn new(client: &'a C, reporter: SharedProgressReporter) -> Self {
        Self {
            client,
            reporter,
            owned_media_root: None,
        }
    }

    /// Local media below `root` was produced by this run and is moved, not copied
    pub fn with_owned_media_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.owned_media_root = Some(root.into());
        self
    }

    /// Render `model` into its build directory and return that directory
    ///
    /// Media that can't be placed is skipped. Template, cover and filesystem
    /// failures abort the render; the partial build directory is left for
    /// inspection.
    pub async fn render(&self, model: &DocumentModel) -> Result<PathBuf, BuildError> {
        let templates = Templates::load(model.version, &model.templates)?;

        let build_dir = model.build_dir();
        let oebps = build_dir.join("OEBPS");
        let meta_inf = build_dir.join("META-INF");
        create_dir(&oebps).await?;
        create_dir(&meta_inf).await?;
        debug!(build_dir = %build_dir.display(), "rendering");

        let skipped = self.place_media(model, &oebps).await?;

        let cover = match &model.cover {
            Some(cover) => {
                let image = prepare_cover(self.client, cover, &oebps).await?;
                self.reporter.report(ProgressEvent::CoverReady {
                    width: image.width,
                    height: image.height,
                });
                Some(image)
            }
            None => None,
        };

        write_file(&oebps.join("style.css"), model.css.as_deref().unwrap_or(DEFAULT_CSS)).await?;
        let fonts = copy_fonts(&model.fonts, &oebps).await?;

        let package = Package {
            model,
            templates: &templates,
            cover: cover.as_ref(),
            fonts: &fonts,
            skipped: &skipped,
        };

        self.reporter.report(ProgressEvent::RenderingFiles {
            items: model.items().len(),
        });
        for item in model.items() {
            write_file(&oebps.join(&item.href), &package.content_document(item)).await?;
        }

        write_file(&meta_inf.join("container.xml"), CONTAINER_XML).await?;
        if model.version == EpubVersion::V2 {
            write_file(&meta_inf.join("com.apple.ibooks.display-options.xml"), IBOOKS_DISPLAY_OPTIONS).await?;
            write_file(&oebps.join("toc.ncx"), &package.ncx()).await?;
        }
        write_file(&oebps.join("content.opf"), &package.opf(Utc::now())).await?;
        write_file(&oebps.join(TOC_HREF), &package.html_toc()).await?;

        Ok(build_dir)
    }

    /// Place every registered asset, one at a time; returns the ids that failed
    async fn place_media(&self, model: &DocumentModel, oebps: &Path) -> Result<HashSet<String>, BuildError> {
        let media = model.media();
        let images = media.images().count();
        let audio_video = media.audio_video().count();
        self.reporter
            .report(ProgressEvent::AssetsStarting { images, audio_video });

        if images > 0 {
            create_dir(&oebps.join(MediaKind::Image.subfolder())).await?;
        }
        if audio_video > 0 {
            create_dir(&oebps.join(MediaKind::AudioVideo.subfolder())).await?;
        }

        let mut skipped = HashSet::new();
        for asset in media.assets() {
            let destination = oebps.join(asset.relative_path());
            let locator = describe(&asset.locator);

            match place_asset(self.client, &asset.locator, &destination, self.owned_media_root.as_deref()).await {
                Ok(bytes) => self.reporter.report(ProgressEvent::AssetPlaced { locator, bytes }),
                Err(e) => {
                    warn!(locator = %locator, error = %e, "the media can't be processed, skipping");
                    let _ = tokio::fs::remove_file(&destination).await;
                    skipped.insert(asset.id.clone());
                    self.reporter.report(ProgressEvent::AssetSkipped {
                        locator,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(skipped)
    }
}

fn describe(locator: &MediaLocator) -> String {
    match locator {
        MediaLocator::Remote(url) => url.to_string(),
        MediaLocator::LocalFile(path) => path.display().to_string(),
    }
}

async fn create_dir(path: &Path) -> Result<(), BuildError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| BuildError::CreateDirectoryFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn write_file(path: &Path, contents: &str) -> Result<(), BuildError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| BuildError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Copy fonts into `OEBPS/fonts`, returning their file names
async fn copy_fonts(fonts: &[PathBuf], oebps: &Path) -> Result<Vec<String>, BuildError> {
    if fonts.is_empty() {
        return Ok(Vec::new());
    }

    let fonts_dir = oebps.join("fonts");
    create_dir(&fonts_dir).await?;

    let mut names = Vec::with_capacity(fonts.len());
    for font in fonts {
        let name = font
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BuildError::FontNotFound { path: font.clone() })?;
        let destination = fonts_dir.join(&name);
        tokio::fs::copy(font, &destination)
            .await
            .map_err(|e| BuildError::CopyFailed {
                from: font.clone(),
                to: destination.clone(),
                source: e,
            })?;
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{ContentSource, EpubOptions};
    use crate::media::MockHttpClient;
    use crate::progress::NoopReporter;
    use crate::progress::tests::RecordingReporter;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn options(temp: &Path, version: u8) -> EpubOptions {
        EpubOptions {
            title: Some("Example Article".to_string()),
            version,
            temp_dir: Some(temp.to_path_buf()),
            ..Default::default()
        }
    }

    fn read(path: PathBuf) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn renders_the_full_tree() {
        let temp = tempdir().unwrap();
        let model = DocumentModel::new(
            &options(temp.path(), 3),
            vec![ContentSource::new("Chapter One", r#"<p><img src="https://x/y.png"></p>"#)],
        )
        .unwrap();
        let client = MockHttpClient::default().with("https://x/y.png", b"png");

        let build_dir = Renderer::new(&client, NoopReporter::shared())
            .render(&model)
            .await
            .unwrap();

        assert_eq!(build_dir, temp.path().join(&model.id));
        let oebps = build_dir.join("OEBPS");
        assert!(build_dir.join("META-INF/container.xml").exists());
        assert!(!build_dir.join("META-INF/com.apple.ibooks.display-options.xml").exists());
        assert!(!oebps.join("toc.ncx").exists());
        assert!(oebps.join("style.css").exists());
        assert!(oebps.join("toc.xhtml").exists());

        let asset = &model.media().assets()[0];
        assert_eq!(std::fs::read(oebps.join(asset.relative_path())).unwrap(), b"png");

        let chapter = read(oebps.join("0_chapter-one.xhtml"));
        assert!(chapter.contains("<h1>Chapter One</h1>"));
        assert!(chapter.contains(&asset.relative_path()));

        let opf = read(oebps.join("content.opf"));
        assert!(opf.contains(r#"<item id="item_0" href="0_chapter-one.xhtml" media-type="application/xhtml+xml" />"#));
        assert!(opf.contains(&format!(r#"href="{}" media-type="image/png""#, asset.relative_path())));
        assert!(opf.contains(r#"<itemref idref="toc" />"#));
        assert!(opf.contains("<dc:title>Example Article</dc:title>"));
    }

    #[tokio::test]
    async fn legacy_version_writes_ncx_and_display_options() {
        let temp = tempdir().unwrap();
        let model = DocumentModel::new(&options(temp.path(), 2), vec![ContentSource::new("One", "<p>a</p>")]).unwrap();

        let build_dir = Renderer::new(&MockHttpClient::default(), NoopReporter::shared())
            .render(&model)
            .await
            .unwrap();

        assert!(build_dir.join("META-INF/com.apple.ibooks.display-options.xml").exists());
        let ncx = read(build_dir.join("OEBPS/toc.ncx"));
        assert!(ncx.contains(r#"<navPoint id="toc" playOrder="1""#));
        assert!(ncx.contains(r#"<navPoint id="item_0" playOrder="2""#));
        let opf = read(build_dir.join("OEBPS/content.opf"));
        assert!(opf.contains(r#"<spine toc="ncx">"#));
    }

    #[tokio::test]
    async fn failed_assets_are_skipped() {
        let temp = tempdir().unwrap();
        let model = DocumentModel::new(
            &options(temp.path(), 3),
            vec![ContentSource::new(
                "One",
                r#"<img src="https://x/ok.png"><img src="https://x/gone.png">"#,
            )],
        )
        .unwrap();
        let client = MockHttpClient::default().with("https://x/ok.png", b"ok");
        let reporter = Arc::new(RecordingReporter::default());

        let build_dir = Renderer::new(&client, reporter.clone()).render(&model).await.unwrap();

        let images: Vec<_> = std::fs::read_dir(build_dir.join("OEBPS/images")).unwrap().collect();
        assert_eq!(images.len(), 1);
        let opf = read(build_dir.join("OEBPS/content.opf"));
        assert_eq!(opf.matches("media-type=\"image/png\"").count(), 1);

        let events = reporter.events.lock().unwrap();
        assert!(events.iter().any(|e| matches!(e, ProgressEvent::AssetSkipped { locator, .. } if locator == "https://x/gone.png")));
    }

    #[tokio::test]
    async fn cover_page_and_image_are_rendered() {
        let temp = tempdir().unwrap();
        let mut png = std::io::Cursor::new(Vec::new());
        image::RgbImage::new(12, 16)
            .write_to(&mut png, image::ImageFormat::Png)
            .unwrap();
        let client = MockHttpClient::default().with("https://x/cover.png", png.get_ref());

        let opts = EpubOptions {
            cover: Some("https://x/cover.png".to_string()),
            ..options(temp.path(), 3)
        };
        let model = DocumentModel::new(&opts, vec![ContentSource::new("One", "<p>a</p>")]).unwrap();

        let build_dir = Renderer::new(&client, NoopReporter::shared()).render(&model).await.unwrap();
        let oebps = build_dir.join("OEBPS");

        assert!(oebps.join("cover.png").exists());
        let cover_page = read(oebps.join("cover.xhtml"));
        assert!(cover_page.contains(r#"viewBox="0 0 12 16""#));
        let opf = read(oebps.join("content.opf"));
        assert!(opf.contains(r#"<meta name="cover" content="image_cover" />"#));
        assert!(opf.contains(r#"properties="cover-image""#));
        let spine_start = opf.find("<spine>").unwrap();
        assert!(opf[spine_start..].find("item_0").unwrap() < opf[spine_start..].find("item_1").unwrap());
    }

    #[tokio::test]
    async fn fonts_are_copied_and_listed() {
        let temp = tempdir().unwrap();
        let font = temp.path().join("Serif.ttf");
        std::fs::write(&font, b"font").unwrap();
        let opts = EpubOptions {
            fonts: vec![font],
            ..options(temp.path(), 3)
        };
        let model = DocumentModel::new(&opts, Vec::new()).unwrap();

        let build_dir = Renderer::new(&MockHttpClient::default(), NoopReporter::shared())
            .render(&model)
            .await
            .unwrap();

        assert!(build_dir.join("OEBPS/fonts/Serif.ttf").exists());
        assert!(read(build_dir.join("OEBPS/content.opf")).contains(r#"href="fonts/Serif.ttf""#));
    }

    #[tokio::test]
    async fn acquired_media_is_moved_into_place() {
        let temp = tempdir().unwrap();
        let work = temp.path().join("media");
        std::fs::create_dir(&work).unwrap();
        let clip = work.join("clip.mp4");
        std::fs::write(&clip, b"video").unwrap();
        let src = url::Url::from_file_path(&clip).unwrap();

        let model = DocumentModel::new(
            &options(temp.path(), 3),
            vec![ContentSource::new("One", format!(r#"<video src="{src}"></video>"#))],
        )
        .unwrap();

        let build_dir = Renderer::new(&MockHttpClient::default(), NoopReporter::shared())
            .with_owned_media_root(&work)
            .render(&model)
            .await
            .unwrap();

        let asset = &model.media().assets()[0];
        assert!(build_dir.join("OEBPS").join(asset.relative_path()).exists());
        assert!(!clip.exists());
    }

    #[tokio::test]
    async fn hidden_toc_stays_out_of_the_spine() {
        let temp = tempdir().unwrap();
        let opts = EpubOptions {
            show_toc: false,
            ..options(temp.path(), 3)
        };
        let model = DocumentModel::new(&opts, vec![ContentSource::new("One", "<p>a</p>")]).unwrap();

        let build_dir = Renderer::new(&MockHttpClient::default(), NoopReporter::shared())
            .render(&model)
            .await
            .unwrap();

        let opf = read(build_dir.join("OEBPS/content.opf"));
        assert!(!opf.contains(r#"<itemref idref="toc" />"#));
        assert!(opf.contains(r#"properties="nav""#));
        assert!(build_dir.join("OEBPS/toc.xhtml").exists());
    }
}
