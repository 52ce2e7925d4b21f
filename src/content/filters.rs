// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Page clean-up applied before article extraction

use kuchikiki::NodeRef;
use kuchikiki::iter::NodeIterator;

use super::xhtml::new_element;

/// Preferred `type` of `picture` sources, best first
const PICTURE_TYPE_PRIORITY: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/jxl", "image/avif"];

pub const UNSUPPORTED_VIDEO_TEXT: &str =
    "There is video content at this location that is not currently supported on your device.";

#[derive(Debug, PartialEq, Eq)]
struct ChosenSource {
    src: String,
    alt: Option<String>,
}

/// Run all filters on a parsed page
pub fn prepare_for_extraction(document: &NodeRef) {
    choose_picture_sources(document);
    choose_video_sources(document);
}

/// Replace each `picture` by a single `img` using its best source
pub fn choose_picture_sources(document: &NodeRef) {
    for picture in select_all(document, "picture") {
        let Some(chosen) = choose_source(&picture, PICTURE_TYPE_PRIORITY, true) else {
            continue;
        };
        let img = match &chosen.alt {
            Some(alt) if !alt.is_empty() => new_element("img", &[("src", chosen.src.as_str()), ("alt", alt.as_str())]),
            _ => new_element("img", &[("src", chosen.src.as_str())]),
        };
        picture.insert_before(img);
        picture.detach();
    }
}

/// Give `video` elements without `src` the best of their `source` children
pub fn choose_video_sources(document: &NodeRef) {
    for video in select_all(document, "video") {
        let (has_src, title) = match video.as_element() {
            Some(element) => {
                let attributes = element.attributes.borrow();
                (
                    attributes.get("src").is_some_and(|s| !s.is_empty()),
                    attributes.get("title").map(str::to_string),
                )
            }
            None => continue,
        };
        if has_src {
            continue;
        }
        let Some(chosen) = choose_source(&video, &[], false) else {
            continue;
        };

        let mut attributes = vec![("src", chosen.src.as_str()), ("controls", "controls")];
        if let Some(title) = &title {
            attributes.push(("title", title.as_str()));
        }
        let replacement = new_element("video", &attributes);
        replacement.append(NodeRef::new_text(UNSUPPORTED_VIDEO_TEXT));
        video.insert_before(replacement);
        video.detach();
    }
}

fn select_all(document: &NodeRef, selector: &str) -> Vec<NodeRef> {
    match document.select(selector) {
        Ok(found) => found.map(|e| e.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    }
}

fn type_rank(priority: &[&str], media_type: Option<&str>) -> usize {
    media_type
        .and_then(|t| priority.iter().position(|p| *p == t))
        .unwrap_or(priority.len())
}

/// Pick a source among the children of a `picture` or `video`
///
/// For pictures an `img` child with a usable `src` wins outright. Otherwise
/// `source` children compete on type priority, and within one `srcset` the
/// widest candidate wins. Any other child element means the container isn't
/// understood and nothing is chosen.
fn choose_source(container: &NodeRef, type_priority: &[&str], is_picture: bool) -> Option<ChosenSource> {
    let mut chosen: Option<(String, usize)> = None;
    let mut alt = None;

    for child in container.children().elements() {
        let attributes = child.attributes.borrow();
        match &*child.name.local {
            "img" if is_picture => {
                alt = attributes.get("alt").map(str::to_string);
                if let Some(src) = attributes.get("src").filter(|s| is_usable(s)) {
                    chosen = Some((src.to_string(), 0));
                    break;
                }
            }
            "source" => {
                let rank = type_rank(type_priority, attributes.get("type"));
                if chosen.as_ref().is_some_and(|(_, best)| rank >= *best) {
                    continue;
                }
                let candidates = [attributes.get("src"), attributes.get("srcset"), attributes.get("data-srcset")]
                    .into_iter()
                    .flatten()
                    .find(|s| is_usable(s));
                if let Some(src) = candidates.and_then(best_candidate) {
                    chosen = Some((src, rank));
                }
            }
            _ => return None,
        }
    }

    chosen.map(|(src, _)| ChosenSource { src, alt })
}

fn is_usable(src: &&str) -> bool {
    !src.is_empty() && !src.starts_with("data:")
}

/// Widest entry of a `srcset`; an entry without a width descriptor wins outright
fn best_candidate(srcset: &str) -> Option<String> {
    let mut best: Option<(&str, u32)> = None;

    for entry in srcset.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if entry.contains(".m3u8") {
            continue;
        }
        let Some((url, descriptor)) = entry.split_once(char::is_whitespace) else {
            return Some(entry.to_string());
        };
        let digits: String = descriptor.trim().chars().take_while(char::is_ascii_digit).collect();
        let Ok(width) = digits.parse::<u32>() else {
            return Some(url.to_string());
        };
        if best.is_none_or(|(_, w)| width >= w) {
            best = Some((url, width));
        }
    }

    best.map(|(url, _)| url.to_string())
}
