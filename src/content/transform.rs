// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use kuchikiki::NodeRef;
use kuchikiki::iter::NodeIterator;
use tracing::{debug, warn};
use url::Url;

use super::allowlist::AllowList;
use super::xhtml::{new_element, parse_fragment, serialize_children};
use crate::book::EpubVersion;
use crate::media::{MediaKind, MediaRegistry, Registration};

/// `alt` text given to images that have none
pub const IMAGE_PLACEHOLDER_ALT: &str = "image-placeholder";

/// Turns an HTML fragment into XHTML fit for one EPUB version
///
/// Two passes run in order: attribute and tag validation against the
/// allow-list, then media rewriting through the registry.
pub struct ContentTransformer<'a> {
    version: EpubVersion,
    allow_list: &'a AllowList,
}

impl<'a> ContentTransformer<'a> {
    pub fn new(version: EpubVersion, allow_list: &'a AllowList) -> Self {
        Self { version, allow_list }
    }

    /// Transform the fragment of content item `index`
    ///
    /// Relative media references are resolved against `base`.
    pub fn transform(&self, index: usize, html: &str, base: Option<&Url>, registry: &mut MediaRegistry) -> String {
        let body = parse_fragment(html);
        self.validate(index, &body);
        self.rewrite_media(&body, base, registry);
        serialize_children(&body)
    }

    fn validate(&self, index: usize, root: &NodeRef) {
        // Collect first: demotion replaces nodes while we walk
        let elements: Vec<NodeRef> = root.descendants().elements().map(|e| e.as_node().clone()).collect();

        for node in elements {
            let Some(element) = node.as_element() else {
                continue;
            };
            let tag = element.name.local.to_string();

            {
                let mut attributes = element.attributes.borrow_mut();
                if tag == "img" && attributes.get("alt").is_none_or(|alt| alt.trim().is_empty()) {
                    attributes.insert("alt", IMAGE_PLACEHOLDER_ALT.to_string());
                }
                attributes
                    .map
                    .retain(|name, _| self.allow_list.allows_attribute(&name.local));
                if attributes.contains("controls") {
                    attributes.insert("controls", "controls".to_string());
                }
            }

            if self.version == EpubVersion::V2 && !self.allow_list.allows_xhtml11_tag(&tag) {
                warn!(item = index, tag = %tag, "tag isn't allowed on EPUB 2/XHTML 1.1, demoting to div");
                demote_to_div(&node);
            }
        }
    }

    fn rewrite_media(&self, root: &NodeRef, base: Option<&Url>, registry: &mut MediaRegistry) {
        for element in root.descendants().elements() {
            let Some(kind) = MediaKind::for_tag(&element.name.local) else {
                continue;
            };
            let mut attributes = element.attributes.borrow_mut();
            let Some(source) = attributes.get("src").map(str::to_string) else {
                continue;
            };

            match registry.register(&source, kind, base) {
                Registration::Registered(asset) => {
                    attributes.insert("src", asset.relative_path());
                }
                Registration::Unresolvable => debug!(source = %source, "leaving unresolvable media reference untouched"),
                Registration::Unsupported => debug!(source = %source, "media kind not packaged for this EPUB version"),
            }
        }
    }
}

/// Replace `node` by a `div` carrying the same attributes and children
fn demote_to_div(node: &NodeRef) {
    let Some(element) = node.as_element() else {
        return;
    };
    let div = new_element("div", &[]);
    if let Some(div_element) = div.as_element() {
        div_element.attributes.borrow_mut().map = element.attributes.borrow().map.clone();
    }

    while let Some(child) = node.first_child() {
        div.append(child);
    }
    node.insert_before(div);
    node.detach();
}
