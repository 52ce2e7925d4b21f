// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use kuchikiki::NodeRef;
use kuchikiki::iter::NodeIterator;
use tracing::debug;
use url::Url;

use super::xhtml::{parse_fragment, serialize_children};

/// Elements removed together with their content
const REMOVED_ELEMENTS: &[&str] = &[
    "script", "style", "iframe", "frame", "frameset", "object", "embed", "applet", "form", "button", "textarea",
    "select", "template", "link", "meta", "base", "noscript",
];

/// Attributes holding URLs
const URL_ATTRIBUTES: &[&str] = &["href", "src", "action", "formaction", "poster", "xlink:href"];

/// Elements allowed to keep `file:` references to media acquired by this run
const LOCAL_MEDIA_ELEMENTS: &[&str] = &["img", "audio", "video"];

/// Makes untrusted HTML safe to embed in a book
pub trait Sanitizer: Send + Sync {
    /// Sanitize an HTML fragment
    ///
    /// With a `local_media_root`, `file:` references on `img`, `audio` and
    /// `video` that point below that directory survive. Every other `file:`
    /// reference is dropped.
    fn sanitize(&self, html: &str, local_media_root: Option<&Path>) -> String;
}

/// Removes active content, event handlers and script URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSanitizer;

impl Sanitizer for DefaultSanitizer {
    fn sanitize(&self, html: &str, local_media_root: Option<&Path>) -> String {
        let root = parse_fragment(html);
        remove_active_elements(&root);
        clean_attributes(&root, local_media_root);
        serialize_children(&root)
    }
}

fn remove_active_elements(root: &NodeRef) {
    let doomed: Vec<NodeRef> = root
        .descendants()
        .elements()
        .filter(|e| REMOVED_ELEMENTS.contains(&&*e.name.local))
        .map(|e| e.as_node().clone())
        .collect();

    for node in doomed {
        node.detach();
    }
}

fn clean_attributes(root: &NodeRef, local_media_root: Option<&Path>) {
    for element in root.descendants().elements() {
        let tag = element.name.local.to_string();
        let local_root = local_media_root.filter(|_| LOCAL_MEDIA_ELEMENTS.contains(&tag.as_str()));

        element.attributes.borrow_mut().map.retain(|name, attribute| {
            let name = &*name.local;
            if name.to_ascii_lowercase().starts_with("on") {
                return false;
            }
            if !URL_ATTRIBUTES.contains(&name) {
                return true;
            }
            let keep = is_safe_url(&attribute.value, local_root);
            if !keep {
                debug!(tag = %tag, attribute = name, "dropping unsafe URL");
            }
            keep
        });
    }
}

fn is_safe_url(value: &str, local_root: Option<&Path>) -> bool {
    // Browsers ignore embedded whitespace and control characters in schemes
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();

    if compact.starts_with("javascript:") || compact.starts_with("vbscript:") {
        return false;
    }
    if compact.starts_with("file:") {
        return local_root.is_some_and(|root| is_below(value, root));
    }
    if compact.starts_with("data:") {
        return compact.starts_with("data:image/");
    }
    true
}

/// Whether the `file:` URL `value` names a path inside `root`
fn is_below(value: &str, root: &Path) -> bool {
    Url::parse(value.trim())
        .ok()
        .and_then(|url| url.to_file_path().ok())
        .is_some_and(|path| path.starts_with(root))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(html: &str) -> String {
        DefaultSanitizer.sanitize(html, None)
    }

    #[test]
    fn scripts_and_frames_are_removed() {
        assert_eq!(
            clean(r#"<p>a</p><script>alert(1)</script><iframe src="https://x/"></iframe><p>b</p>"#),
            "<p>a</p><p>b</p>"
        );
    }

    #[test]
    fn event_handlers_are_removed() {
        assert_eq!(clean(r#"<p onclick="x()" OnMouseOver="y()">a</p>"#), "<p>a</p>");
    }

    #[test]
    fn script_urls_are_removed() {
        assert_eq!(clean(r#"<a href="java&#x09;script:alert(1)">a</a>"#), "<a>a</a>");
        assert_eq!(clean(r#"<a href="https://example.com/">a</a>"#), r#"<a href="https://example.com/">a</a>"#);
    }

    #[test]
    fn local_media_needs_a_media_root() {
        let html = r#"<video src="file:///tmp/run/a.mp4"></video><a href="file:///tmp/run/a.mp4">x</a>"#;

        assert_eq!(clean(html), "<video></video><a>x</a>");
        assert_eq!(
            DefaultSanitizer.sanitize(html, Some(Path::new("/tmp/run"))),
            r#"<video src="file:///tmp/run/a.mp4"></video><a>x</a>"#
        );
    }

    #[test]
    fn local_media_outside_the_media_root_is_dropped() {
        let root = Some(Path::new("/tmp/run"));

        assert_eq!(
            DefaultSanitizer.sanitize(r#"<img src="file:///home/user/.ssh/id_rsa.png">"#, root),
            r#"<img />"#
        );
        assert_eq!(
            DefaultSanitizer.sanitize(r#"<audio src="file:///tmp/run/../secret/a.mp3"></audio>"#, root),
            "<audio></audio>"
        );
        assert_eq!(
            DefaultSanitizer.sanitize(r#"<img src="file:///tmp/running/a.png">"#, root),
            r#"<img />"#
        );
    }

    #[test]
    fn inline_images_survive() {
        let html = r#"<img src="data:image/png;base64,AAAA" />"#;
        assert_eq!(clean(html), html);
        assert_eq!(clean(r#"<a href="data:text/html,hi">x</a>"#), "<a>x</a>");
    }
}
