// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

const DEFAULT_ALLOWED_ATTRIBUTES: &[&str] = &[
    "content",
    "alt",
    "id",
    "title",
    "src",
    "href",
    "about",
    "accesskey",
    "aria-activedescendant",
    "aria-atomic",
    "aria-autocomplete",
    "aria-busy",
    "aria-checked",
    "aria-controls",
    "aria-describedat",
    "aria-describedby",
    "aria-disabled",
    "aria-dropeffect",
    "aria-expanded",
    "aria-flowto",
    "aria-grabbed",
    "aria-haspopup",
    "aria-hidden",
    "aria-invalid",
    "aria-label",
    "aria-labelledby",
    "aria-level",
    "aria-live",
    "aria-multiline",
    "aria-multiselectable",
    "aria-orientation",
    "aria-owns",
    "aria-posinset",
    "aria-pressed",
    "aria-readonly",
    "aria-relevant",
    "aria-required",
    "aria-selected",
    "aria-setsize",
    "aria-sort",
    "aria-valuemax",
    "aria-valuemin",
    "aria-valuenow",
    "aria-valuetext",
    "class",
    "contenteditable",
    "contextmenu",
    "controls",
    "datatype",
    "dir",
    "draggable",
    "dropzone",
    "hidden",
    "hreflang",
    "inlist",
    "itemid",
    "itemref",
    "itemscope",
    "itemtype",
    "lang",
    "media",
    "prefix",
    "property",
    "rel",
    "resource",
    "rev",
    "role",
    "spellcheck",
    "style",
    "tabindex",
    "target",
    "type",
    "typeof",
    "vocab",
    "xml:base",
    "xml:lang",
    "xml:space",
    "colspan",
    "rowspan",
    "epub:type",
    "epub:prefix",
];

/// Tags valid under the XHTML 1.1 DTD used by EPUB 2
const DEFAULT_ALLOWED_XHTML11_TAGS: &[&str] = &[
    "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "dl", "dt", "dd", "address", "hr", "pre",
    "blockquote", "center", "ins", "del", "a", "span", "bdo", "br", "em", "strong", "dfn", "code", "samp", "kbd",
    "cite", "abbr", "acronym", "q", "sub", "sup", "tt", "i", "b", "big", "small", "u", "s", "strike", "basefont",
    "font", "object", "param", "img", "table", "caption", "colgroup", "col", "thead", "tfoot", "tbody", "tr", "th",
    "td", "map", "noscript", "var",
];

pub fn default_allowed_attributes() -> Vec<String> {
    DEFAULT_ALLOWED_ATTRIBUTES.iter().map(|s| s.to_string()).collect()
}

pub fn default_allowed_xhtml11_tags() -> Vec<String> {
    DEFAULT_ALLOWED_XHTML11_TAGS.iter().map(|s| s.to_string()).collect()
}

/// Attributes kept on every element and tags kept under EPUB 2
#[derive(Debug, Clone)]
pub struct AllowList {
    attributes: HashSet<String>,
    xhtml11_tags: HashSet<String>,
}

impl AllowList {
    pub fn new<A, T>(attributes: A, xhtml11_tags: T) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        Self {
            attributes: attributes.into_iter().map(|a| a.as_ref().to_ascii_lowercase()).collect(),
            xhtml11_tags: xhtml11_tags.into_iter().map(|t| t.as_ref().to_ascii_lowercase()).collect(),
        }
    }

    pub fn allows_attribute(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    pub fn allows_xhtml11_tag(&self, tag: &str) -> bool {
        self.xhtml11_tags.contains(tag)
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_ATTRIBUTES, DEFAULT_ALLOWED_XHTML11_TAGS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_common_attributes() {
        let allow = AllowList::default();
        for name in ["src", "href", "alt", "class", "epub:type", "colspan"] {
            assert!(allow.allows_attribute(name), "{name} should be allowed");
        }
    }

    #[test]
    fn defaults_reject_event_handlers() {
        let allow = AllowList::default();
        assert!(!allow.allows_attribute("onclick"));
        assert!(!allow.allows_attribute("onload"));
        assert!(!allow.allows_attribute("srcset"));
        assert!(allow.allows_attribute("type"));
    }

    #[test]
    fn legacy_tags_exclude_html5_elements() {
        let allow = AllowList::default();
        assert!(allow.allows_xhtml11_tag("p"));
        assert!(allow.allows_xhtml11_tag("img"));
        for tag in ["figure", "figcaption", "video", "audio", "section", "article"] {
            assert!(!allow.allows_xhtml11_tag(tag), "{tag} is not XHTML 1.1");
        }
    }

    #[test]
    fn custom_lists_are_case_insensitive() {
        let allow = AllowList::new(["SRC"], ["P"]);
        assert!(allow.allows_attribute("src"));
        assert!(allow.allows_xhtml11_tag("p"));
        assert!(!allow.allows_attribute("href"));
    }
}
