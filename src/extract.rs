// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Reader-mode extraction of an article from a fetched page

use kuchikiki::NodeRef;
use kuchikiki::iter::NodeIterator;
use kuchikiki::traits::TendrilSink;
use tracing::debug;
use url::Url;

use crate::content::prepare_for_extraction;
use crate::content::xhtml::serialize_children;
use crate::error::ExtractError;

/// Candidates for the article body, most specific first
const CONTENT_ROOTS: &[&str] = &["article", "main", "[role=main]", "body"];

/// Elements dropped from the article body
const NOISE: &str = "script, style, noscript, template, nav";

const URL_ATTRIBUTES: &[&str] = &["src", "href", "poster"];

const MEDIA: &str = "img, video, audio, iframe";

/// An article as found on a page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub excerpt: Option<String>,
    pub language: Option<String>,
    pub published_time: Option<String>,
    /// Body markup with absolute references
    pub html_content: String,
    /// Whitespace-normalized text of the body
    pub text_content: String,
}

/// Turns a fetched page into an [`Article`]
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, base_url: &Url) -> Result<Article, ExtractError>;
}

/// Extractor driven by page metadata and semantic containers
#[derive(Debug, Default, Clone, Copy)]
pub struct MetaExtractor;

impl Extractor for MetaExtractor {
    fn extract(&self, html: &str, base_url: &Url) -> Result<Article, ExtractError> {
        let document = kuchikiki::parse_html().one(html);
        prepare_for_extraction(&document);

        let title = meta(&document, &["og:title", "twitter:title"])
            .or_else(|| first_text(&document, "title"))
            .or_else(|| first_text(&document, "h1"));
        let byline = meta(&document, &["author", "article:author"]).or_else(|| first_text(&document, "[rel=author]"));
        let published_time =
            meta(&document, &["article:published_time"]).or_else(|| first_attribute(&document, "time", "datetime"));
        let language = first_attribute(&document, "html", "lang");

        let root = content_root(&document).ok_or_else(|| ExtractError::NoContent {
            url: base_url.to_string(),
        })?;
        remove_all(&root, NOISE);
        absolutize(&root, base_url);

        let text_content = normalize_whitespace(&root.text_contents());
        let has_media = root.select_first(MEDIA).is_ok();
        if text_content.is_empty() && !has_media {
            return Err(ExtractError::NoContent {
                url: base_url.to_string(),
            });
        }
        debug!(url = %base_url, title = ?title, "article extracted");

        Ok(Article {
            title,
            byline,
            site_name: meta(&document, &["og:site_name"]),
            excerpt: meta(&document, &["og:description", "description", "twitter:description"]),
            language,
            published_time,
            html_content: serialize_children(&root),
            text_content,
        })
    }
}

/// Content of the first `meta` whose `property` or `name` is one of `keys`,
/// in the order of `keys`
fn meta(document: &NodeRef, keys: &[&str]) -> Option<String> {
    let Ok(metas) = document.select("meta") else {
        return None;
    };
    let metas: Vec<_> = metas.collect();

    keys.iter().find_map(|key| {
        metas.iter().find_map(|meta| {
            let attributes = meta.attributes.borrow();
            let name = attributes.get("property").or_else(|| attributes.get("name"))?;
            if !name.eq_ignore_ascii_case(key) {
                return None;
            }
            attributes
                .get("content")
                .map(normalize_whitespace)
                .filter(|c| !c.is_empty())
        })
    })
}

fn first_text(document: &NodeRef, selector: &str) -> Option<String> {
    let element = document.select_first(selector).ok()?;
    Some(normalize_whitespace(&element.text_contents())).filter(|t| !t.is_empty())
}

/// Trimmed, non-empty `name` attribute of the first `tag` carrying it
fn first_attribute(document: &NodeRef, tag: &str, name: &str) -> Option<String> {
    let selector = format!("{tag}[{name}]");
    let element = document.select_first(&selector).ok()?;
    let attributes = element.attributes.borrow();
    let value = attributes.get(name)?.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn content_root(document: &NodeRef) -> Option<NodeRef> {
    CONTENT_ROOTS
        .iter()
        .find_map(|selector| document.select_first(selector).ok())
        .map(|element| element.as_node().clone())
}

fn remove_all(root: &NodeRef, selector: &str) {
    let Ok(found) = root.select(selector) else {
        return;
    };
    let nodes: Vec<NodeRef> = found.map(|e| e.as_node().clone()).collect();
    for node in nodes {
        node.detach();
    }
}

/// Resolve relative references against the page URL; fragment links stay
fn absolutize(root: &NodeRef, base: &Url) {
    for element in root.descendants().elements() {
        let mut attributes = element.attributes.borrow_mut();
        for name in URL_ATTRIBUTES {
            let Some(value) = attributes.get(*name) else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() || value.starts_with('#') {
                continue;
            }
            if let Ok(resolved) = base.join(value) {
                attributes.insert(*name, resolved.to_string());
            }
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
