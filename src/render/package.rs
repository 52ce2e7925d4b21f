// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Files computed from the whole document: pages, manifest, tables of contents

use std::borrow::Cow;
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use super::cover::CoverImage;
use super::templates::{Templates, document_header, fill};
use crate::book::{COVER_HREF, ContentItem, DocumentModel, EpubVersion, TOC_HREF};

const COVER_IMAGE_ID: &str = "image_cover";

/// Everything the package files are computed from
pub(super) struct Package<'a> {
    pub model: &'a DocumentModel,
    pub templates: &'a Templates,
    pub cover: Option<&'a CoverImage>,
    /// File names below `fonts/`
    pub fonts: &'a [String],
    /// Ids of assets that could not be placed
    pub skipped: &'a HashSet<String>,
}

impl Package<'_> {
    fn header(&self) -> String {
        document_header(self.model.version, &self.model.language)
    }

    /// XHTML page of one content item
    pub fn content_document(&self, item: &ContentItem) -> String {
        if item.is_cover {
            return self.cover_document();
        }

        let header = self.header();
        let title = text(&item.title);
        let heading = if self.model.append_chapter_titles {
            chapter_heading(item)
        } else {
            String::new()
        };

        fill(
            &self.templates.content,
            &[
                ("header", header.as_str()),
                ("title", &*title),
                ("heading", heading.as_str()),
                ("body", item.transformed_data.as_str()),
                ("lang", self.model.language.as_str()),
            ],
        )
    }

    fn cover_document(&self) -> String {
        let header = self.header();
        let title = text(&self.model.title);
        let (file_name, width, height) = match self.cover {
            Some(cover) => (cover.file_name.as_str(), cover.width.to_string(), cover.height.to_string()),
            None => ("", "0".to_string(), "0".to_string()),
        };

        fill(
            &self.templates.cover,
            &[
                ("header", header.as_str()),
                ("title", &*title),
                ("cover_file", file_name),
                ("width", width.as_str()),
                ("height", height.as_str()),
                ("lang", self.model.language.as_str()),
            ],
        )
    }

    /// `toc.xhtml`: the navigation document under EPUB 3, a plain page under EPUB 2
    pub fn html_toc(&self) -> String {
        let header = self.header();
        let toc_title = text(&self.model.toc_title);
        let entries: Vec<String> = self
            .model
            .toc_items()
            .map(|item| match self.model.version {
                EpubVersion::V2 => format!(
                    r#"<p class="table-of-content"><a href="{}">{}</a>{}</p>"#,
                    attr(&item.href),
                    text(&item.title),
                    toc_authors(item)
                ),
                EpubVersion::V3 => format!(
                    r#"<li class="table-of-content"><a href="{}">{}</a>{}</li>"#,
                    attr(&item.href),
                    text(&item.title),
                    toc_authors(item)
                ),
            })
            .collect();

        fill(
            &self.templates.html_toc,
            &[
                ("header", header.as_str()),
                ("toc_title", &*toc_title),
                ("entries", entries.join("\n").as_str()),
                ("landmarks", self.landmarks().as_str()),
                ("lang", self.model.language.as_str()),
            ],
        )
    }

    fn landmarks(&self) -> String {
        if self.model.version == EpubVersion::V2 {
            return String::new();
        }

        let mut entries = Vec::new();
        if self.model.cover.is_some() {
            entries.push(format!(r#"<li><a epub:type="cover" href="{COVER_HREF}">Cover</a></li>"#));
        }
        if self.model.show_toc {
            entries.push(format!(
                r#"<li><a epub:type="toc" href="{TOC_HREF}">{}</a></li>"#,
                text(&self.model.toc_title)
            ));
        }
        if let Some(first) = self.first_body_item() {
            entries.push(format!(
                r#"<li><a epub:type="bodymatter" href="{}">Begin Reading</a></li>"#,
                attr(&first.href)
            ));
        }

        format!(
            "<nav epub:type=\"landmarks\" hidden=\"hidden\">\n<ol>\n{}\n</ol>\n</nav>",
            entries.join("\n")
        )
    }

    /// `toc.ncx`, only written for EPUB 2
    pub fn ncx(&self) -> String {
        let mut points = Vec::new();
        let mut play_order = 0;
        let mut nav_point = |id: &str, title: &str, href: &str| {
            play_order += 1;
            format!(
                r#"<navPoint id="{}" playOrder="{play_order}" class="chapter"><navLabel><text>{}</text></navLabel><content src="{}" /></navPoint>"#,
                attr(id),
                text(title),
                attr(href)
            )
        };

        let (front, body): (Vec<&ContentItem>, Vec<&ContentItem>) =
            self.model.toc_items().partition(|item| item.before_toc);
        for item in front {
            points.push(nav_point(&item.id, &item.title, &item.href));
        }
        if self.model.show_toc {
            points.push(nav_point("toc", &self.model.toc_title, TOC_HREF));
        }
        for item in body {
            points.push(nav_point(&item.id, &item.title, &item.href));
        }

        fill(
            &self.templates.ncx,
            &[
                ("id", self.model.id.as_str()),
                ("title", &*text(&self.model.title)),
                ("author", &*text(&self.model.authors.join(", "))),
                ("nav_points", points.join("\n").as_str()),
            ],
        )
    }

    /// `content.opf`
    pub fn opf(&self, modified: DateTime<Utc>) -> String {
        let model = self.model;
        let description = model
            .description
            .as_deref()
            .map(|d| format!("<dc:description>{}</dc:description>", text(d)))
            .unwrap_or_default();

        fill(
            &self.templates.opf,
            &[
                ("id", model.id.as_str()),
                ("title", &*text(&model.title)),
                ("lang", model.language.as_str()),
                ("date", model.date.format("%Y-%m-%dT%H:%M:%SZ").to_string().as_str()),
                ("modified", modified.format("%Y-%m-%dT%H:%M:%SZ").to_string().as_str()),
                ("creators", self.creators().as_str()),
                ("publisher", &*text(&model.publisher)),
                ("description", description.as_str()),
                ("cover_meta", self.cover_meta().as_str()),
                ("manifest", self.manifest().as_str()),
                ("spine", self.spine().as_str()),
                ("guide", self.guide().as_str()),
            ],
        )
    }

    fn creators(&self) -> String {
        self.model
            .authors
            .iter()
            .enumerate()
            .map(|(i, author)| match self.model.version {
                EpubVersion::V2 => format!(r#"<dc:creator opf:role="aut">{}</dc:creator>"#, text(author)),
                EpubVersion::V3 => format!(
                    "<dc:creator id=\"creator-{i}\">{}</dc:creator>\n<meta refines=\"#creator-{i}\" property=\"role\" scheme=\"marc:relators\">aut</meta>",
                    text(author)
                ),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn cover_meta(&self) -> String {
        if self.cover.is_some() {
            return format!(r#"<meta name="cover" content="{COVER_IMAGE_ID}" />"#);
        }
        match self.cover_image_manifest_id() {
            Some(id) => format!(r#"<meta name="cover" content="{id}" />"#),
            None => String::new(),
        }
    }

    /// Manifest id of the first image when it stands in as cover
    fn cover_image_manifest_id(&self) -> Option<String> {
        let asset = self.model.cover_image()?;
        if self.skipped.contains(&asset.id) {
            return None;
        }
        self.model
            .media()
            .images()
            .position(|image| image.id == asset.id)
            .map(|index| format!("image_{index}"))
    }

    fn manifest(&self) -> String {
        let model = self.model;
        let v3 = model.version == EpubVersion::V3;
        let mut lines = Vec::new();

        if v3 {
            lines.push(manifest_item("toc", TOC_HREF, "application/xhtml+xml", Some("nav")));
        } else {
            lines.push(manifest_item("ncx", "toc.ncx", "application/x-dtbncx+xml", None));
            lines.push(manifest_item("toc", TOC_HREF, "application/xhtml+xml", None));
        }
        lines.push(manifest_item("css", "style.css", "text/css", None));

        if let (Some(cover), Some(image)) = (&model.cover, self.cover) {
            let properties = v3.then_some("cover-image");
            lines.push(manifest_item(COVER_IMAGE_ID, &image.file_name, &cover.media_type, properties));
        }

        for (index, font) in self.fonts.iter().enumerate() {
            let media_type = mime_guess::from_path(font).first_or_octet_stream();
            lines.push(manifest_item(
                &format!("font_{index}"),
                &format!("fonts/{font}"),
                media_type.essence_str(),
                None,
            ));
        }

        for item in model.items() {
            let properties = (v3 && item.transformed_data.contains("<svg")).then_some("svg");
            let properties = if item.is_cover && v3 { Some("svg") } else { properties };
            lines.push(manifest_item(&item.id, &item.href, "application/xhtml+xml", properties));
        }

        let cover_image_id = self.cover_image_manifest_id();
        for (index, asset) in model.media().images().enumerate() {
            if self.skipped.contains(&asset.id) {
                continue;
            }
            let id = format!("image_{index}");
            let properties = (v3 && cover_image_id.as_deref() == Some(id.as_str())).then_some("cover-image");
            lines.push(manifest_item(&id, &asset.relative_path(), &asset.media_type, properties));
        }
        for (index, asset) in model.media().audio_video().enumerate() {
            if self.skipped.contains(&asset.id) {
                continue;
            }
            lines.push(manifest_item(
                &format!("media_{index}"),
                &asset.relative_path(),
                &asset.media_type,
                None,
            ));
        }

        lines.join("\n")
    }

    fn spine(&self) -> String {
        let itemref = |id: &str| format!(r#"<itemref idref="{}" />"#, attr(id));
        let (front, body): (Vec<&ContentItem>, Vec<&ContentItem>) = self
            .model
            .items()
            .iter()
            .partition(|item| item.is_cover || item.before_toc);

        let mut refs: Vec<String> = front.iter().map(|item| itemref(&item.id)).collect();
        if self.model.show_toc {
            refs.push(itemref("toc"));
        }
        refs.extend(body.iter().map(|item| itemref(&item.id)));
        refs.join("\n")
    }

    fn guide(&self) -> String {
        let mut references = Vec::new();
        if self.model.cover.is_some() {
            references.push(format!(r#"<reference type="cover" title="Cover" href="{COVER_HREF}" />"#));
        }
        if self.model.show_toc {
            references.push(format!(
                r#"<reference type="toc" title="{}" href="{TOC_HREF}" />"#,
                attr(&self.model.toc_title)
            ));
        }
        if let Some(first) = self.first_body_item() {
            references.push(format!(
                r#"<reference type="text" title="{}" href="{}" />"#,
                attr(&first.title),
                attr(&first.href)
            ));
        }
        references.join("\n")
    }

    fn first_body_item(&self) -> Option<&ContentItem> {
        self.model.items().iter().find(|item| !item.is_cover && !item.before_toc)
    }
}

fn manifest_item(id: &str, href: &str, media_type: &str, properties: Option<&str>) -> String {
    match properties {
        Some(properties) => format!(
            r#"<item id="{}" href="{}" media-type="{}" properties="{properties}" />"#,
            attr(id),
            attr(href),
            attr(media_type)
        ),
        None => format!(
            r#"<item id="{}" href="{}" media-type="{}" />"#,
            attr(id),
            attr(href),
            attr(media_type)
        ),
    }
}

fn chapter_heading(item: &ContentItem) -> String {
    let mut heading = format!("<h1>{}</h1>\n", text(&item.title));
    if !item.authors.is_empty() {
        heading.push_str(&format!(
            "<p class=\"epub-author\">{}</p>\n",
            text(&item.authors.join(", "))
        ));
    }
    if let Some(url) = &item.source_url {
        heading.push_str(&format!(
            "<p class=\"epub-link\"><a href=\"{}\">{}</a></p>\n",
            attr(url),
            text(url)
        ));
    }
    heading
}

fn toc_authors(item: &ContentItem) -> Cow<'static, str> {
    if item.authors.is_empty() {
        Cow::Borrowed("")
    } else {
        Cow::Owned(format!(
            r#" - <small class="toc-author">{}</small>"#,
            text(&item.authors.join(", "))
        ))
    }
}
