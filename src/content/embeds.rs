// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Replacement of embedded players with packaged media
//!
//! Work happens in three steps so that no parsed tree is held across an
//! await: embeds are marked and planned, media is acquired, then the marked
//! fragment is parsed again and the replacements are applied.

use std::path::{Path, PathBuf};

use kuchikiki::NodeRef;
use tracing::{debug, warn};
use url::Url;

use super::xhtml::{new_element, parse_fragment, serialize_children};
use crate::acquire::{MediaAcquirer, MediaDownloader};
use crate::book::site_name_from_url;
use crate::progress::{ProgressEvent, SharedProgressReporter};

/// Cascade for video platforms: small video plus modest non-opus audio first
pub const VIDEO_FORMATS: &[&str] = &[
    "worstvideo[vcodec!*=av01][height>=?420]+bestaudio[acodec!*=opus][abr<120]",
    "worstvideo[vcodec!*=av01][height>=?360]+bestaudio[acodec!*=opus][abr<120]",
    "worstvideo+worstaudio",
];

/// Cascade for media attached to quoted posts
pub const QUOTE_FORMATS: &[&str] = &[
    "worstvideo[vcodec!*=av01][height>=?420]+bestaudio[abr<120]",
    "worstvideo+worstaudio",
    "bestaudio[abr<120]",
];

const VIDEO_HOSTS: &[&str] = &["youtube", "youtu.be"];
const QUOTE_HOSTS: &[&str] = &["twitter", "x"];
const MARKER: &str = "data-embed-marker";

/// Where and how embedded media is acquired
pub struct EmbedSettings<'a, D: MediaDownloader> {
    /// `None` disables acquisition; embeds still become links
    pub acquirer: Option<&'a MediaAcquirer<D>>,
    pub work_dir: &'a Path,
    /// Cascade replacing the built-in ones
    pub formats: Option<&'a [String]>,
    /// Base for protocol-relative and relative embed URLs
    pub base: Option<&'a Url>,
    pub reporter: SharedProgressReporter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EmbedKind {
    Frame,
    Quote,
}

#[derive(Debug)]
struct PlannedEmbed {
    marker: usize,
    kind: EmbedKind,
    url: String,
    host: String,
    /// Empty when nothing is to be acquired
    formats: Vec<String>,
}

/// Replace `iframe`s and look for media in quoted posts
pub async fn replace_embeds<D: MediaDownloader>(html: &str, settings: &EmbedSettings<'_, D>) -> String {
    let (marked, plans) = plan_embeds(html, settings);
    if plans.is_empty() {
        return marked;
    }

    let mut acquired = Vec::with_capacity(plans.len());
    for plan in &plans {
        acquired.push(acquire_for(plan, settings).await);
    }

    apply_embeds(&marked, &plans, &acquired)
}

fn plan_embeds<D: MediaDownloader>(html: &str, settings: &EmbedSettings<'_, D>) -> (String, Vec<PlannedEmbed>) {
    let root = parse_fragment(html);
    let download = settings.acquirer.is_some();
    let mut plans = Vec::new();

    for frame in select_all(&root, "iframe") {
        let Some(url) = attribute(&frame, "src").and_then(|src| resolve(&src, settings.base)) else {
            continue;
        };
        let host = site_name_from_url(&url);
        let formats = if download && VIDEO_HOSTS.contains(&host.as_str()) {
            cascade(settings.formats, VIDEO_FORMATS)
        } else {
            Vec::new()
        };
        mark(&frame, plans.len());
        plans.push(PlannedEmbed {
            marker: plans.len(),
            kind: EmbedKind::Frame,
            url: url.to_string(),
            host,
            formats,
        });
    }

    if download {
        for quote in select_all(&root, "blockquote") {
            let Some(url) = quote_link(&quote).and_then(|href| resolve(&href, settings.base)) else {
                continue;
            };
            let host = site_name_from_url(&url);
            if !QUOTE_HOSTS.contains(&host.as_str()) {
                continue;
            }
            mark(&quote, plans.len());
            plans.push(PlannedEmbed {
                marker: plans.len(),
                kind: EmbedKind::Quote,
                url: url.to_string(),
                host,
                formats: cascade(settings.formats, QUOTE_FORMATS),
            });
        }
    }

    (serialize_children(&root), plans)
}

async fn acquire_for<D: MediaDownloader>(plan: &PlannedEmbed, settings: &EmbedSettings<'_, D>) -> Option<PathBuf> {
    let acquirer = settings.acquirer?;
    if plan.formats.is_empty() {
        return None;
    }

    match acquirer.acquire(&plan.url, settings.work_dir, &plan.formats).await {
        Ok(path) => Some(path),
        Err(e) => {
            // Quotes are probed speculatively, so failing there is expected
            match plan.kind {
                EmbedKind::Frame => warn!(url = %plan.url, error = %e, "embedded media could not be acquired"),
                EmbedKind::Quote => debug!(url = %plan.url, error = %e, "no media acquired for quote"),
            }
            settings.reporter.report(ProgressEvent::MediaFailed {
                url: plan.url.clone(),
                error: e.to_string(),
            });
            None
        }
    }
}

fn apply_embeds(marked: &str, plans: &[PlannedEmbed], acquired: &[Option<PathBuf>]) -> String {
    let root = parse_fragment(marked);

    for (plan, media) in plans.iter().zip(acquired) {
        let selector = format!("[{MARKER}=\"{}\"]", plan.marker);
        let Ok(found) = root.select_first(&selector) else {
            // Already replaced together with an enclosing embed
            continue;
        };
        let node = found.as_node().clone();
        unmark(&node);

        let element = media.as_deref().and_then(media_element);
        match plan.kind {
            EmbedKind::Frame => replace_frame(&root, &node, plan, element),
            EmbedKind::Quote => {
                if let Some(element) = element {
                    let paragraph = new_element("p", &[]);
                    paragraph.append(element);
                    node.insert_after(paragraph);
                }
            }
        }
    }

    serialize_children(&root)
}

fn replace_frame(root: &NodeRef, frame: &NodeRef, plan: &PlannedEmbed, media: Option<NodeRef>) {
    // Climb to the outermost ancestor that has no siblings
    let mut target = frame.clone();
    while let Some(parent) = target.parent() {
        if parent == *root || parent.children().count() > 1 {
            break;
        }
        target = parent;
    }

    let link = new_element("a", &[("href", plan.url.as_str())]);
    let replacement = match media {
        Some(media) => {
            link.append(NodeRef::new_text(format!("Watch on {}.", plan.host)));
            let caption = new_element("figcaption", &[]);
            caption.append(link);
            let figure = new_element("figure", &[]);
            figure.append(media);
            figure.append(caption);
            figure
        }
        None => {
            link.append(NodeRef::new_text(format!("Visit {}.", plan.host)));
            let paragraph = new_element("p", &[]);
            paragraph.append(link);
            paragraph
        }
    };

    target.insert_before(replacement);
    target.detach();
}

/// `video` for MP4 results, `audio` otherwise, pointing at the local file
fn media_element(path: &Path) -> Option<NodeRef> {
    let src = Url::from_file_path(path).ok()?;
    let kind = if path.extension().is_some_and(|e| e == "mp4") {
        "video"
    } else {
        "audio"
    };
    let element = new_element(kind, &[("src", src.as_str()), ("controls", "controls")]);
    element.append(NodeRef::new_text(format!(
        "There is {kind} content at this location that is not currently supported on your device."
    )));
    Some(element)
}

/// Link at the end of a quote's last paragraph, as embedded posts end
fn quote_link(quote: &NodeRef) -> Option<String> {
    let paragraph = last_element_child(quote)?;
    if !is_tag(&paragraph, "p") {
        return None;
    }
    let link = last_element_child(&paragraph)?;
    if !is_tag(&link, "a") {
        return None;
    }
    attribute(&link, "href")
}

fn last_element_child(node: &NodeRef) -> Option<NodeRef> {
    node.children()
        .rev()
        .find(|child| child.as_element().is_some() || child.as_text().is_some_and(|t| !t.borrow().trim().is_empty()))
        .filter(|child| child.as_element().is_some())
}

fn is_tag(node: &NodeRef, tag: &str) -> bool {
    node.as_element().is_some_and(|e| &*e.name.local == tag)
}

fn attribute(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()?.attributes.borrow().get(name).map(str::to_string)
}

fn mark(node: &NodeRef, marker: usize) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().insert(MARKER, marker.to_string());
    }
}

fn unmark(node: &NodeRef) {
    if let Some(element) = node.as_element() {
        element.attributes.borrow_mut().remove(MARKER);
    }
}

fn select_all(root: &NodeRef, selector: &str) -> Vec<NodeRef> {
    match root.select(selector) {
        Ok(found) => found.map(|e| e.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    }
}

fn resolve(reference: &str, base: Option<&Url>) -> Option<Url> {
    match Url::parse(reference) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(reference).ok(),
        Err(_) => None,
    }
}

fn cascade(custom: Option<&[String]>, defaults: &[&str]) -> Vec<String> {
    match custom {
        Some(formats) if !formats.is_empty() => formats.to_vec(),
        _ => defaults.iter().map(|f| f.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::{AcquireOptions, DownloadRequest, DownloadRun, RunExit};
    use crate::error::AcquireError;
    use crate::progress::NoopReporter;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// Writes a file for every request, or fails them all as unavailable
    #[derive(Clone)]
    struct FakeDownloader {
        succeed: bool,
        requests: Arc<Mutex<Vec<DownloadRequest>>>,
    }

    impl FakeDownloader {
        fn new(succeed: bool) -> Self {
            Self {
                succeed,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    struct FinishedRun {
        exit: RunExit,
    }

    #[async_trait]
    impl DownloadRun for FinishedRun {
        async fn next_line(&mut self) -> std::io::Result<Option<String>> {
            Ok(None)
        }

        async fn cancel(&mut self) {}

        async fn wait(self: Box<Self>) -> std::io::Result<RunExit> {
            Ok(self.exit)
        }
    }

    #[async_trait]
    impl MediaDownloader for FakeDownloader {
        async fn start(&self, request: &DownloadRequest) -> Result<Box<dyn DownloadRun>, AcquireError> {
            self.requests.lock().unwrap().push(request.clone());
            let exit = if self.succeed {
                std::fs::write(&request.output, b"media").unwrap();
                RunExit::Completed
            } else {
                RunExit::Failed {
                    code: Some(1),
                    stderr: "ERROR: Requested format is not available".to_string(),
                }
            };
            Ok(Box::new(FinishedRun { exit }))
        }
    }

    async fn run(html: &str, downloader: Option<&FakeDownloader>, work_dir: &Path) -> String {
        let acquirer = downloader
            .cloned()
            .map(|d| MediaAcquirer::new(d, AcquireOptions::default(), NoopReporter::shared()));
        let settings = EmbedSettings {
            acquirer: acquirer.as_ref(),
            work_dir,
            formats: None,
            base: None,
            reporter: NoopReporter::shared(),
        };
        replace_embeds(html, &settings).await
    }

    #[tokio::test]
    async fn frames_become_links_without_download() {
        let dir = tempdir().unwrap();
        let out = run(
            r#"<p>before</p><div><iframe src="https://www.youtube.com/embed/abc"></iframe></div>"#,
            None::<&FakeDownloader>,
            dir.path(),
        )
        .await;

        assert_eq!(
            out,
            r#"<p>before</p><p><a href="https://www.youtube.com/embed/abc">Visit youtube.</a></p>"#
        );
    }

    #[tokio::test]
    async fn video_frames_are_replaced_by_figures() {
        let dir = tempdir().unwrap();
        let downloader = FakeDownloader::new(true);
        let out = run(
            r#"<p>text</p><iframe src="https://www.youtube.com/embed/abc"></iframe>"#,
            Some(&downloader),
            dir.path(),
        )
        .await;

        assert!(out.contains("<figure><video "));
        assert!(out.contains(r#"src="file://"#));
        assert!(out.contains(r#"<figcaption><a href="https://www.youtube.com/embed/abc">Watch on youtube.</a></figcaption>"#));
        assert!(!out.contains(MARKER));

        let requests = downloader.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].format, VIDEO_FORMATS[0]);
    }

    #[tokio::test]
    async fn failed_acquisition_falls_back_to_link() {
        let dir = tempdir().unwrap();
        let downloader = FakeDownloader::new(false);
        let out = run(
            r#"<p>text</p><iframe src="https://youtu.be/abc"></iframe>"#,
            Some(&downloader),
            dir.path(),
        )
        .await;

        assert!(out.contains("Visit youtu.be."));
        assert_eq!(downloader.requests.lock().unwrap().len(), VIDEO_FORMATS.len());
    }

    #[tokio::test]
    async fn other_frames_never_download() {
        let dir = tempdir().unwrap();
        let downloader = FakeDownloader::new(true);
        let out = run(
            r#"<p>a</p><iframe src="https://maps.example.org/embed"></iframe>"#,
            Some(&downloader),
            dir.path(),
        )
        .await;

        assert!(out.contains("Visit maps.example.org."));
        assert!(downloader.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn quotes_get_media_appended() {
        let dir = tempdir().unwrap();
        let downloader = FakeDownloader::new(true);
        let out = run(
            r#"<blockquote><p>Look at this <a href="https://twitter.com/u/status/1">link</a></p></blockquote><p>after</p>"#,
            Some(&downloader),
            dir.path(),
        )
        .await;

        let quote_end = out.find("</blockquote>").unwrap();
        let media = out.find("<p><video ").unwrap();
        assert!(media > quote_end);
        assert!(out.ends_with("<p>after</p>"));
        assert_eq!(downloader.requests.lock().unwrap()[0].format, QUOTE_FORMATS[0]);
    }

    #[tokio::test]
    async fn unrelated_quotes_are_ignored() {
        let dir = tempdir().unwrap();
        let downloader = FakeDownloader::new(true);
        let html = r#"<blockquote><p>Quote <a href="https://example.com/">src</a></p></blockquote>"#;
        let out = run(html, Some(&downloader), dir.path()).await;

        assert_eq!(out, html);
        assert!(downloader.requests.lock().unwrap().is_empty());
    }
}
