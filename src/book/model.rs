// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::warn;
use url::Url;
use uuid::Uuid;

use super::options::{ContentSource, EpubOptions, EpubVersion};
use super::slug::slug;
use crate::content::{AllowList, ContentTransformer};
use crate::error::BuildError;
use crate::media::{MediaAsset, MediaLocator, MediaRegistry, resolve_type};

pub const COVER_HREF: &str = "cover.xhtml";

pub const TOC_HREF: &str = "toc.xhtml";

const UNTITLED: &str = "no title";

/// Bytes a generated href keeps free for its `<index>_` prefix and suffix
const HREF_RESERVED: usize = 6;

/// Explicit cover image of a book
#[derive(Debug, Clone)]
pub struct Cover {
    /// The configured reference
    pub source: String,
    pub locator: MediaLocator,
    pub media_type: String,
    pub extension: String,
}

impl Cover {
    /// File name of the image inside `OEBPS`
    pub fn file_name(&self) -> String {
        format!("cover.{}", self.extension)
    }
}

/// One chapter of the book, rendered to its own XHTML file
#[derive(Debug, Clone)]
pub struct ContentItem {
    /// `item_<n>` in insertion order
    pub id: String,
    pub href: String,
    pub title: String,
    pub raw_data: String,
    pub transformed_data: String,
    pub source_url: Option<String>,
    pub authors: Vec<String>,
    pub is_cover: bool,
    pub exclude_from_toc: bool,
    pub before_toc: bool,
}

impl ContentItem {
    /// Rendering position class: cover, then front matter, then the rest
    fn bucket(&self) -> u8 {
        if self.is_cover {
            0
        } else if self.before_toc {
            1
        } else {
            2
        }
    }
}

/// Template files replacing the built-in ones
#[derive(Debug, Clone, Default)]
pub struct CustomTemplates {
    pub opf: Option<PathBuf>,
    pub ncx: Option<PathBuf>,
    pub html_toc: Option<PathBuf>,
    pub html_cover: Option<PathBuf>,
}

impl CustomTemplates {
    fn configured(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.opf, &self.ncx, &self.html_toc, &self.html_cover]
            .into_iter()
            .flatten()
    }
}

/// Everything needed to render one book
#[derive(Debug)]
pub struct DocumentModel {
    /// Unique per build; names the build directory
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub publisher: String,
    pub language: String,
    pub date: DateTime<Utc>,
    pub toc_title: String,
    pub append_chapter_titles: bool,
    pub show_toc: bool,
    pub version: EpubVersion,
    pub cover: Option<Cover>,
    pub first_image_is_cover: bool,
    pub css: Option<String>,
    pub fonts: Vec<PathBuf>,
    pub templates: CustomTemplates,
    pub temp_root: PathBuf,
    items: Vec<ContentItem>,
    media: MediaRegistry,
}

impl DocumentModel {
    /// Validate `options` and transform every content source
    ///
    /// Fails without touching the filesystem when the title is missing, the
    /// version is unknown, a configured template or font doesn't exist, or the
    /// cover's media type can't be resolved.
    pub fn new(options: &EpubOptions, contents: Vec<ContentSource>) -> Result<Self, BuildError> {
        let title = options
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(BuildError::MissingTitle)?
            .to_string();
        let version = EpubVersion::try_from(options.version)?;

        let templates = CustomTemplates {
            opf: options.custom_opf_template.clone(),
            ncx: options.custom_ncx_template.clone(),
            html_toc: options.custom_html_toc_template.clone(),
            html_cover: options.custom_html_cover_template.clone(),
        };
        if let Some(missing) = templates.configured().find(|p| !p.is_file()) {
            return Err(BuildError::MissingTemplate { path: missing.clone() });
        }
        if let Some(missing) = options.fonts.iter().find(|p| !p.is_file()) {
            return Err(BuildError::FontNotFound { path: missing.clone() });
        }

        let cover = options.cover.as_deref().map(resolve_cover).transpose()?;
        let authors = non_empty_or_anonymous(&options.authors);
        let date = parse_date(options.date.as_deref());

        let allow_list = AllowList::new(&options.allowed_attributes, &options.allowed_xhtml11_tags);
        let transformer = ContentTransformer::new(version, &allow_list);
        let mut media = MediaRegistry::new(version);
        let mut items = Vec::with_capacity(contents.len() + 1);
        // Package documents the renderer writes next to the content
        let mut hrefs: HashSet<String> = [COVER_HREF, TOC_HREF].into_iter().map(str::to_string).collect();

        if cover.is_some() {
            items.push(ContentItem {
                id: "item_0".to_string(),
                href: COVER_HREF.to_string(),
                title: "cover".to_string(),
                raw_data: String::new(),
                transformed_data: String::new(),
                source_url: None,
                authors: Vec::new(),
                is_cover: true,
                exclude_from_toc: true,
                before_toc: true,
            });
        }

        let offset = items.len();
        for (i, content) in contents.into_iter().enumerate() {
            let index = offset + i;
            let item_title = content
                .title
                .clone()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string());
            let href = unique_href(href_for(index, &item_title, content.filename.as_deref()), index, &mut hrefs);
            let base = content.url.as_deref().and_then(|u| Url::parse(u).ok());
            let transformed = transformer.transform(index, &content.data, base.as_ref(), &mut media);

            items.push(ContentItem {
                id: format!("item_{index}"),
                href,
                title: item_title,
                raw_data: content.data,
                transformed_data: transformed,
                source_url: content.url,
                authors: content.authors,
                is_cover: false,
                exclude_from_toc: content.exclude_from_toc,
                before_toc: content.before_toc,
            });
        }

        // Stable: insertion order survives within each bucket
        items.sort_by_key(ContentItem::bucket);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            title,
            description: options.description.clone(),
            authors,
            publisher: options.publisher.clone(),
            language: options.language_code(),
            date,
            toc_title: options.toc_title.clone(),
            append_chapter_titles: options.append_chapter_titles,
            show_toc: options.show_toc,
            version,
            first_image_is_cover: options.first_image_is_cover && cover.is_none(),
            cover,
            css: options.css.clone(),
            fonts: options.fonts.clone(),
            templates,
            temp_root: options.temp_root(),
            items,
            media,
        })
    }

    /// Content items in rendering order
    pub fn items(&self) -> &[ContentItem] {
        &self.items
    }

    pub fn media(&self) -> &MediaRegistry {
        &self.media
    }

    /// Directory this build renders into
    pub fn build_dir(&self) -> PathBuf {
        self.temp_root.join(&self.id)
    }

    /// Image standing in as cover when no explicit cover is set
    pub fn cover_image(&self) -> Option<&MediaAsset> {
        if self.first_image_is_cover {
            self.media.images().next()
        } else {
            None
        }
    }

    /// Items listed in the tables of contents
    pub fn toc_items(&self) -> impl Iterator<Item = &ContentItem> {
        self.items.iter().filter(|item| !item.exclude_from_toc)
    }
}

fn resolve_cover(source: &str) -> Result<Cover, BuildError> {
    let invalid = || BuildError::InvalidCover {
        locator: source.to_string(),
    };
    let locator = MediaLocator::parse_with_local_paths(source).ok_or_else(invalid)?;
    let type_source = match &locator {
        MediaLocator::Remote(url) => url.path().to_string(),
        MediaLocator::LocalFile(path) => path.to_string_lossy().into_owned(),
    };
    let resolved = resolve_type(&type_source)
        .filter(|r| r.media_type.starts_with("image/"))
        .ok_or_else(invalid)?;

    Ok(Cover {
        source: source.to_string(),
        locator,
        media_type: resolved.media_type,
        extension: resolved.extension,
    })
}

fn href_for(index: usize, title: &str, filename: Option<&str>) -> String {
    match filename.map(str::trim).filter(|f| !f.is_empty()) {
        Some(name) if name.ends_with(".xhtml") => name.to_string(),
        Some(name) => format!("{name}.xhtml"),
        None => {
            let prefix = format!("{index}_");
            format!("{prefix}{}.xhtml", slug(title, prefix.len() + HREF_RESERVED))
        }
    }
}

/// Explicit file names may collide; later ones get their index prepended,
/// then a counter until the name is free
fn unique_href(href: String, index: usize, taken: &mut HashSet<String>) -> String {
    let mut candidate = href.clone();
    let mut attempt = 0;
    while taken.contains(&candidate) {
        candidate = match attempt {
            0 => format!("{index}_{href}"),
            n => format!("{index}_{n}_{href}"),
        };
        attempt += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

fn non_empty_or_anonymous(authors: &[String]) -> Vec<String> {
    let authors: Vec<String> = authors
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    if authors.is_empty() {
        vec!["anonymous".to_string()]
    } else {
        authors
    }
}

fn parse_date(date: Option<&str>) -> DateTime<Utc> {
    let Some(date) = date else {
        return Utc::now();
    };
    match DateTime::parse_from_rfc3339(date) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(e) => {
            warn!(date, error = %e, "unparseable date, using the current time");
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(title: &str) -> EpubOptions {
        EpubOptions {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    fn flagged(title: &str, before_toc: bool) -> ContentSource {
        ContentSource {
            before_toc,
            ..ContentSource::new(title, "<p>text</p>")
        }
    }

    #[test]
    fn missing_title_is_fatal() {
        let result = DocumentModel::new(&EpubOptions::default(), vec![ContentSource::new("a", "<p>a</p>")]);
        assert!(matches!(result, Err(BuildError::MissingTitle)));

        let result = DocumentModel::new(&options("   "), Vec::new());
        assert!(matches!(result, Err(BuildError::MissingTitle)));
    }

    #[test]
    fn unknown_version_is_fatal() {
        let opts = EpubOptions {
            version: 4,
            ..options("Book")
        };
        assert!(matches!(
            DocumentModel::new(&opts, Vec::new()),
            Err(BuildError::UnsupportedVersion(4))
        ));
    }

    #[test]
    fn defaults_are_applied() {
        let opts = EpubOptions {
            authors: vec![" ".to_string()],
            lang: "de-DE".to_string(),
            ..options("Book")
        };
        let model = DocumentModel::new(&opts, Vec::new()).unwrap();

        assert_eq!(model.authors, vec!["anonymous"]);
        assert_eq!(model.language, "de");
        assert_eq!(model.version, EpubVersion::V3);
        assert!(model.cover.is_none());
    }

    #[test]
    fn build_ids_are_unique() {
        let a = DocumentModel::new(&options("Book"), Vec::new()).unwrap();
        let b = DocumentModel::new(&options("Book"), Vec::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.build_dir(), b.build_dir());
    }

    #[test]
    fn cover_and_front_matter_come_first() {
        let opts = EpubOptions {
            cover: Some("https://x/cover.jpg".to_string()),
            ..options("Book")
        };
        let contents = vec![
            flagged("one", false),
            flagged("front", true),
            flagged("two", false),
            flagged("preface", true),
        ];

        let model = DocumentModel::new(&opts, contents).unwrap();
        let titles: Vec<&str> = model.items().iter().map(|i| i.title.as_str()).collect();

        assert_eq!(titles, vec!["cover", "front", "preface", "one", "two"]);
        assert!(model.items()[0].is_cover);
        assert_eq!(model.items()[0].href, COVER_HREF);
    }

    #[test]
    fn hrefs_come_from_titles_or_filenames() {
        let contents = vec![
            ContentSource::new("Hello World", "<p>a</p>"),
            ContentSource {
                filename: Some("appendix".to_string()),
                ..ContentSource::new("Appendix", "<p>b</p>")
            },
            ContentSource {
                filename: Some("notes.xhtml".to_string()),
                ..ContentSource::new("Notes", "<p>c</p>")
            },
            ContentSource {
                title: None,
                ..ContentSource::new("", "<p>d</p>")
            },
        ];

        let model = DocumentModel::new(&options("Book"), contents).unwrap();
        let hrefs: Vec<&str> = model.items().iter().map(|i| i.href.as_str()).collect();
        let ids: Vec<&str> = model.items().iter().map(|i| i.id.as_str()).collect();

        assert_eq!(hrefs, vec!["0_hello-world.xhtml", "appendix.xhtml", "notes.xhtml", "3_no-title.xhtml"]);
        assert_eq!(ids, vec!["item_0", "item_1", "item_2", "item_3"]);
    }

    #[test]
    fn colliding_filenames_stay_unique() {
        let same = |title: &str| ContentSource {
            filename: Some("chapter".to_string()),
            ..ContentSource::new(title, "<p>x</p>")
        };
        let model = DocumentModel::new(&options("Book"), vec![same("a"), same("b")]).unwrap();

        assert_eq!(model.items()[0].href, "chapter.xhtml");
        assert_eq!(model.items()[1].href, "1_chapter.xhtml");
    }

    #[test]
    fn prefixed_names_are_checked_again() {
        let named = |filename: &str| ContentSource {
            filename: Some(filename.to_string()),
            ..ContentSource::new(filename, "<p>x</p>")
        };
        let model = DocumentModel::new(&options("Book"), vec![named("2_x"), named("x"), named("x"), named("2_x")])
            .unwrap();
        let hrefs: Vec<&str> = model.items().iter().map(|i| i.href.as_str()).collect();

        assert_eq!(hrefs, vec!["2_x.xhtml", "x.xhtml", "2_1_x.xhtml", "3_2_x.xhtml"]);
    }

    #[test]
    fn package_document_names_are_reserved() {
        let named = |filename: &str| ContentSource {
            filename: Some(filename.to_string()),
            ..ContentSource::new(filename, "<p>x</p>")
        };
        let model = DocumentModel::new(&options("Book"), vec![named("toc"), named("cover.xhtml")]).unwrap();
        let hrefs: Vec<&str> = model.items().iter().map(|i| i.href.as_str()).collect();

        assert_eq!(hrefs, vec!["0_toc.xhtml", "1_cover.xhtml"]);
    }

    #[test]
    fn content_is_transformed_into_the_registry() {
        let model = DocumentModel::new(
            &options("Book"),
            vec![ContentSource::new("One", r#"<p><img src="https://x/y.png"></p>"#)],
        )
        .unwrap();

        let asset = &model.media().assets()[0];
        let item = &model.items()[0];
        assert!(item.transformed_data.contains(&asset.relative_path()));
        assert_eq!(item.raw_data, r#"<p><img src="https://x/y.png"></p>"#);
    }

    #[test]
    fn relative_media_resolves_against_content_url() {
        let content = ContentSource {
            url: Some("https://example.com/post/1".to_string()),
            ..ContentSource::new("One", r#"<img src="/img/a.png">"#)
        };
        let model = DocumentModel::new(&options("Book"), vec![content]).unwrap();

        assert_eq!(
            model.media().assets()[0].locator,
            MediaLocator::Remote(Url::parse("https://example.com/img/a.png").unwrap())
        );
    }

    #[test]
    fn cover_type_must_resolve() {
        let opts = EpubOptions {
            cover: Some("https://x/cover".to_string()),
            ..options("Book")
        };
        assert!(matches!(
            DocumentModel::new(&opts, Vec::new()),
            Err(BuildError::InvalidCover { .. })
        ));
    }

    #[test]
    fn first_image_can_stand_in_as_cover() {
        let opts = EpubOptions {
            first_image_is_cover: true,
            ..options("Book")
        };
        let model = DocumentModel::new(
            &opts,
            vec![ContentSource::new("One", r#"<img src="https://x/a.png"><img src="https://x/b.png">"#)],
        )
        .unwrap();

        let cover = model.cover_image().unwrap();
        assert_eq!(cover.source, "https://x/a.png");
        assert!(model.items().iter().all(|i| !i.is_cover));
    }

    #[test]
    fn missing_custom_template_is_fatal() {
        let dir = tempdir().unwrap();
        let opts = EpubOptions {
            custom_opf_template: Some(dir.path().join("missing.opf")),
            ..options("Book")
        };
        assert!(matches!(
            DocumentModel::new(&opts, Vec::new()),
            Err(BuildError::MissingTemplate { .. })
        ));
    }

    #[test]
    fn missing_font_is_fatal() {
        let dir = tempdir().unwrap();
        let opts = EpubOptions {
            fonts: vec![dir.path().join("missing.ttf")],
            ..options("Book")
        };
        assert!(matches!(
            DocumentModel::new(&opts, Vec::new()),
            Err(BuildError::FontNotFound { .. })
        ));
    }

    #[test]
    fn explicit_dates_are_parsed() {
        let opts = EpubOptions {
            date: Some("2024-03-09T12:00:00+02:00".to_string()),
            ..options("Book")
        };
        let model = DocumentModel::new(&opts, Vec::new()).unwrap();
        assert_eq!(model.date.to_rfc3339(), "2024-03-09T10:00:00+00:00");
    }

    #[test]
    fn excluded_items_are_left_out_of_the_toc() {
        let contents = vec![
            ContentSource {
                exclude_from_toc: true,
                ..ContentSource::new("hidden", "<p>a</p>")
            },
            ContentSource::new("shown", "<p>b</p>"),
        ];
        let model = DocumentModel::new(&options("Book"), contents).unwrap();
        let toc: Vec<&str> = model.toc_items().map(|i| i.title.as_str()).collect();
        assert_eq!(toc, vec!["shown"]);
    }
}
