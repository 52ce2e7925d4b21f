// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Conversion of a web page into an EPUB file

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::acquire::{MediaAcquirer, MediaDownloader};
use crate::archive::{archive, repair_archive};
use crate::book::{ContentSource, DocumentModel, EpubOptions, output_filename, site_name_from_url};
use crate::content::{DefaultSanitizer, EmbedSettings, Sanitizer, replace_embeds};
use crate::error::ConvertError;
use crate::extract::{Article, Extractor, MetaExtractor};
use crate::http::HttpClient;
use crate::progress::{ProgressEvent, SharedProgressReporter};
use crate::render::Renderer;

pub const REFERENCES_TITLE: &str = "References";

/// Options for converting one page
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Page to convert
    pub url: String,
    /// Exact output file; wins over `path`
    pub output: Option<PathBuf>,
    /// Directory the derived file name is placed in (default: current directory)
    pub path: Option<PathBuf>,
    /// Place the file in a per-site subdirectory of `path`
    pub create_subfolders: bool,
    /// Cascade replacing the built-in ones for embedded media
    pub media_formats: Option<Vec<String>>,
    /// Run `zip -F` over the finished archive
    pub repair_archive: bool,
    /// Book options; title, authors, publisher and date come from the page
    pub epub: EpubOptions,
}

/// Fetch `options.url` and write it out as an EPUB, returning the output path
///
/// Embedded media is acquired only when an `acquirer` is given.
pub async fn convert_url<C, D>(
    client: &C,
    acquirer: Option<&MediaAcquirer<D>>,
    options: &ConvertOptions,
    reporter: SharedProgressReporter,
) -> Result<PathBuf, ConvertError>
where
    C: HttpClient + ?Sized,
    D: MediaDownloader,
{
    convert_with(client, &MetaExtractor, &DefaultSanitizer, acquirer, options, reporter).await
}

/// [`convert_url`] with a custom extractor and sanitizer
pub async fn convert_with<C, D>(
    client: &C,
    extractor: &dyn Extractor,
    sanitizer: &dyn Sanitizer,
    acquirer: Option<&MediaAcquirer<D>>,
    options: &ConvertOptions,
    reporter: SharedProgressReporter,
) -> Result<PathBuf, ConvertError>
where
    C: HttpClient + ?Sized,
    D: MediaDownloader,
{
    let url = Url::parse(&options.url)?;

    reporter.report(ProgressEvent::FetchingPage {
        url: url.to_string(),
    });
    let page = client
        .get_bytes(url.as_str())
        .await
        .map_err(|e| ConvertError::PageFetchFailed {
            url: url.to_string(),
            source: e,
        })?;
    let mut article = extractor.extract(&String::from_utf8_lossy(&page), &url)?;

    reporter.report(ProgressEvent::ArticleExtracted {
        title: article.title.clone().unwrap_or_default(),
        site_name: site_name(&article, &url),
    });

    let media_root = match acquirer {
        Some(acquirer) => {
            // Absolute, so acquired files can be referenced by `file:` URL
            let work_dir = options.epub.temp_root().join(format!("media-{}", Uuid::new_v4()));
            let work_dir = std::path::absolute(&work_dir).map_err(|e| ConvertError::OutputDirFailed {
                path: work_dir.clone(),
                source: e,
            })?;
            tokio::fs::create_dir_all(&work_dir)
                .await
                .map_err(|e| ConvertError::OutputDirFailed {
                    path: work_dir.clone(),
                    source: e,
                })?;

            let settings = EmbedSettings {
                acquirer: Some(acquirer),
                work_dir: &work_dir,
                formats: options.media_formats.as_deref(),
                base: Some(&url),
                reporter: reporter.clone(),
            };
            article.html_content = replace_embeds(&article.html_content, &settings).await;
            Some(work_dir)
        }
        None => None,
    };

    article.html_content = sanitizer.sanitize(&article.html_content, media_root.as_deref());

    let result = create_epub(client, &article, &url, options, media_root.as_deref(), reporter).await;

    if let Some(root) = &media_root {
        let _ = tokio::fs::remove_dir_all(root).await;
    }
    result
}

/// Build, render and archive a book from an already extracted article
///
/// Acquired media below `media_root` is moved into the book.
pub async fn create_epub<C: HttpClient + ?Sized>(
    client: &C,
    article: &Article,
    page_url: &Url,
    options: &ConvertOptions,
    media_root: Option<&Path>,
    reporter: SharedProgressReporter,
) -> Result<PathBuf, ConvertError> {
    let site = site_name(article, page_url);
    let author = author(article, &site);
    let published = article
        .published_time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t.trim()).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let epub = EpubOptions {
        title: article.title.clone().or_else(|| options.epub.title.clone()),
        authors: vec![author.clone()],
        publisher: site.clone(),
        date: Some(published.to_rfc3339()),
        lang: article.language.clone().unwrap_or_else(|| options.epub.lang.clone()),
        show_toc: false,
        ..options.epub.clone()
    };
    let title = epub.title.clone().unwrap_or_default();

    let contents = vec![
        ContentSource::new(title.as_str(), article.html_content.as_str()),
        ContentSource::new(
            REFERENCES_TITLE,
            references(page_url, &site, &author, &published, &article.text_content),
        ),
    ];
    // Validates everything before the filesystem is touched
    let model = DocumentModel::new(&epub, contents)?;

    let output = output_path(options, &title, &site, &published).await?;
    debug!(output = %output.display(), "output path");

    let mut renderer = Renderer::new(client, reporter.clone());
    if let Some(root) = media_root {
        renderer = renderer.with_owned_media_root(root);
    }
    let build_dir = renderer.render(&model).await?;

    reporter.report(ProgressEvent::Archiving {
        output: output.clone(),
    });
    archive(&build_dir, &output).await?;

    if options.repair_archive {
        let repair_dir = model.temp_root.join(format!("repair-{}", model.id));
        if repair_archive(&output, &repair_dir).await {
            info!(output = %output.display(), "archive repaired");
        }
        let _ = tokio::fs::remove_dir_all(&repair_dir).await;
    }

    reporter.report(ProgressEvent::Completed {
        output: output.clone(),
    });
    Ok(output)
}

fn site_name(article: &Article, page_url: &Url) -> String {
    article
        .site_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| site_name_from_url(page_url))
}

/// Byline without a leading `by `, or the site name
fn author(article: &Article, site: &str) -> String {
    article
        .byline
        .as_deref()
        .map(str::trim)
        .map(|b| b.strip_prefix("by ").unwrap_or(b).trim())
        .filter(|b| !b.is_empty())
        .unwrap_or(site)
        .to_string()
}

/// `sha256:<hex>` of the article text
pub fn content_hash(text: &str) -> String {
    format!("sha256:{:x}", Sha256::digest(text.as_bytes()))
}

fn references(page_url: &Url, site: &str, author: &str, published: &DateTime<Utc>, plain_text: &str) -> String {
    const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

    format!(
        "<p>Published on: <em>{}</em> by <em>{}</em> at <a href=\"{}\">{}</a>.</p>\
         <p>Fetched on: <em>{}</em>.</p>\
         <p>Content hash: <code>{}</code></p>",
        published.format(DATE_FORMAT),
        text(author),
        attr(page_url.as_str()),
        text(site),
        Utc::now().format(DATE_FORMAT),
        content_hash(plain_text)
    )
}

async fn output_path(
    options: &ConvertOptions,
    title: &str,
    site: &str,
    published: &DateTime<Utc>,
) -> Result<PathBuf, ConvertError> {
    if let Some(output) = &options.output {
        return Ok(output.clone());
    }

    let mut dir = options.path.clone().unwrap_or_else(|| PathBuf::from("."));
    if options.create_subfolders && !site.is_empty() {
        dir = dir.join(sanitize_filename::sanitize(site));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ConvertError::OutputDirFailed {
                path: dir.clone(),
                source: e,
            })?;
    }

    Ok(dir.join(output_filename(title, published)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::YtDlp;
    use crate::error::BuildError;
    use crate::media::MockHttpClient;
    use crate::progress::NoopReporter;
    use crate::progress::tests::RecordingReporter;
    use std::fs::File;
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::{TempDir, tempdir};
    use zip::{CompressionMethod, ZipArchive};

    const PAGE_URL: &str = "https://www.example.com/posts/1";

    const PAGE: &str = r#"<html lang="en-GB"><head>
<title>Example Article</title>
<meta name="author" content="by Jane Doe">
<meta property="article:published_time" content="2024-03-09T12:00:00Z">
</head><body><article>
<p>Some text.</p>
<p><img src="https://x/y.png"></p>
</article></body></html>"#;

    fn options(dir: &TempDir) -> ConvertOptions {
        ConvertOptions {
            url: PAGE_URL.to_string(),
            path: Some(dir.path().join("out")),
            epub: EpubOptions {
                temp_dir: Some(dir.path().join("tmp")),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn convert(client: &MockHttpClient, options: &ConvertOptions) -> Result<PathBuf, ConvertError> {
        convert_url(client, None::<&MediaAcquirer<YtDlp>>, options, NoopReporter::shared()).await
    }

    fn read_entry(zip: &mut ZipArchive<File>, name: &str) -> String {
        let mut contents = String::new();
        zip.by_name(name).unwrap().read_to_string(&mut contents).unwrap();
        contents
    }

    #[tokio::test]
    async fn page_becomes_an_epub_with_its_image() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let client = MockHttpClient::default()
            .with(PAGE_URL, PAGE.as_bytes())
            .with("https://x/y.png", b"png");

        let output = convert(&client, &options(&dir)).await.unwrap();

        assert_eq!(output, dir.path().join("out/2024-03-09_example-article.epub"));
        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        {
            let first = zip.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);
        }

        let images: Vec<String> = zip
            .file_names()
            .filter(|n| n.starts_with("OEBPS/images/"))
            .map(str::to_string)
            .collect();
        assert_eq!(images.len(), 1);
        assert!(images[0].ends_with(".png"));

        let chapter = read_entry(&mut zip, "OEBPS/0_example-article.xhtml");
        let relative = images[0].trim_start_matches("OEBPS/");
        assert!(chapter.contains(&format!(r#"src="{relative}""#)));
    }

    #[tokio::test]
    async fn local_files_named_by_the_page_stay_out_of_the_book() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let secret = dir.path().join("secret.png");
        std::fs::write(&secret, b"private").unwrap();
        let src = Url::from_file_path(&secret).unwrap();
        let page = format!(
            r#"<html><head><title>Example Article</title></head><body><article><p>Text.</p><img src="{src}"><video src="{src}"></video></article></body></html>"#
        );
        let client = MockHttpClient::default().with(PAGE_URL, page.as_bytes());

        let output = convert(&client, &options(&dir)).await.unwrap();

        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        assert!(!zip.file_names().any(|n| n.starts_with("OEBPS/images/") || n.starts_with("OEBPS/audiovideo/")));
        let chapter_name = zip
            .file_names()
            .find(|n| n.ends_with("_example-article.xhtml"))
            .unwrap()
            .to_string();
        let chapter = read_entry(&mut zip, &chapter_name);
        assert!(!chapter.contains("file:"));
        assert!(secret.exists());
    }

    #[tokio::test]
    async fn metadata_defaults_come_from_the_page() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let client = MockHttpClient::default()
            .with(PAGE_URL, PAGE.as_bytes())
            .with("https://x/y.png", b"png");

        let output = convert(&client, &options(&dir)).await.unwrap();
        let mut zip = ZipArchive::new(File::open(&output).unwrap()).unwrap();
        let opf = read_entry(&mut zip, "OEBPS/content.opf");

        assert!(opf.contains(">Jane Doe</dc:creator>"));
        assert!(opf.contains("<dc:publisher>example</dc:publisher>"));
        assert!(opf.contains("<dc:language>en</dc:language>"));
        assert!(opf.contains("<dc:date>2024-03-09T12:00:00Z</dc:date>"));
        assert!(!opf.contains(r#"<itemref idref="toc" />"#));

        let references = read_entry(&mut zip, "OEBPS/1_references.xhtml");
        assert!(references.contains("Sat, 09 Mar 2024 12:00:00 GMT"));
        assert!(references.contains(&content_hash("Some text.")));
        assert!(references.contains(r#"href="https://www.example.com/posts/1""#));
    }

    #[tokio::test]
    async fn missing_title_writes_no_archive() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let client = MockHttpClient::default().with(PAGE_URL, b"<html><body><p>No title here.</p></body></html>");

        let result = convert(&client, &options(&dir)).await;

        assert!(matches!(result, Err(ConvertError::Build(BuildError::MissingTitle))));
        assert_eq!(std::fs::read_dir(dir.path().join("out")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn subfolders_are_named_after_the_site() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::default().with(PAGE_URL, PAGE.as_bytes());
        let opts = ConvertOptions {
            create_subfolders: true,
            ..options(&dir)
        };

        let output = convert(&client, &opts).await.unwrap();

        assert_eq!(output, dir.path().join("out/example/2024-03-09_example-article.epub"));
        assert!(output.exists());
    }

    #[tokio::test]
    async fn explicit_output_wins() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::default().with(PAGE_URL, PAGE.as_bytes());
        let opts = ConvertOptions {
            output: Some(dir.path().join("book.epub")),
            create_subfolders: true,
            ..options(&dir)
        };

        let output = convert(&client, &opts).await.unwrap();

        assert_eq!(output, dir.path().join("book.epub"));
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn progress_is_reported_in_order() {
        let dir = tempdir().unwrap();
        let client = MockHttpClient::default().with(PAGE_URL, PAGE.as_bytes());
        let reporter = Arc::new(RecordingReporter::default());
        let opts = ConvertOptions {
            output: Some(dir.path().join("book.epub")),
            ..options(&dir)
        };

        convert_url(&client, None::<&MediaAcquirer<YtDlp>>, &opts, reporter.clone())
            .await
            .unwrap();

        let events = reporter.events.lock().unwrap();
        assert!(matches!(events.first(), Some(ProgressEvent::FetchingPage { .. })));
        assert!(matches!(
            &events[1],
            ProgressEvent::ArticleExtracted { title, site_name } if title == "Example Article" && site_name == "example"
        ));
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
    }

    #[test]
    fn byline_prefix_is_dropped() {
        let article = Article {
            byline: Some("by Ann".to_string()),
            ..Default::default()
        };
        assert_eq!(author(&article, "site"), "Ann");
        assert_eq!(author(&Article::default(), "site"), "site");
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
