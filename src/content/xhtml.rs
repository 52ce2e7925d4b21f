// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! XML-compatible serialization of parsed HTML

use html5ever::{LocalName, Namespace, QualName};
use kuchikiki::{Attribute, ExpandedName, NodeData, NodeRef};

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

/// Parse an HTML fragment and return its `body` element
///
/// The parser wraps fragments in a full document, so the body always exists.
pub fn parse_fragment(html: &str) -> NodeRef {
    use kuchikiki::traits::TendrilSink;

    let document = kuchikiki::parse_html().one(html);
    match document.select_first("body") {
        Ok(body) => body.as_node().clone(),
        Err(()) => document,
    }
}

/// Create a detached HTML element with the given attributes
pub fn new_element(tag: &str, attributes: &[(&str, &str)]) -> NodeRef {
    NodeRef::new_element(
        QualName::new(None, Namespace::from(XHTML_NAMESPACE), LocalName::from(tag)),
        attributes.iter().map(|(name, value)| {
            (
                ExpandedName::new(Namespace::from(""), LocalName::from(*name)),
                Attribute {
                    prefix: None,
                    value: value.to_string(),
                },
            )
        }),
    )
}

/// Serialize the children of `node` as well-formed XHTML
pub fn serialize_children(node: &NodeRef) -> String {
    let namespace = element_namespace(node);
    let mut out = String::new();
    for child in node.children() {
        write_node(&child, &mut out, &namespace);
    }
    out
}

/// Serialize `node` itself, including its tag
pub fn serialize_node(node: &NodeRef) -> String {
    let namespace = node
        .parent()
        .map(|parent| element_namespace(&parent))
        .unwrap_or_else(|| Namespace::from(XHTML_NAMESPACE));
    let mut out = String::new();
    write_node(node, &mut out, &namespace);
    out
}

/// Namespace children of `node` inherit; XHTML outside any element
fn element_namespace(node: &NodeRef) -> Namespace {
    match node.as_element() {
        Some(element) => element.name.ns.clone(),
        None => Namespace::from(XHTML_NAMESPACE),
    }
}

fn write_node(node: &NodeRef, out: &mut String, inherited: &Namespace) {
    match node.data() {
        NodeData::Element(element) => {
            let name = qualified_name(&element.name);
            out.push('<');
            out.push_str(&name);

            let attributes = element.attributes.borrow();
            if element.name.ns != *inherited && !element.name.ns.is_empty() {
                write_attribute(out, "xmlns", &element.name.ns);
            }
            for (prefix, namespace) in undeclared_prefixes(&attributes.map) {
                write_attribute(out, &format!("xmlns:{prefix}"), &namespace);
            }
            for (attr_name, attr) in attributes.map.iter() {
                // The default namespace follows the element itself
                if attr.prefix.is_none() && &*attr_name.local == "xmlns" {
                    continue;
                }
                let name = match &attr.prefix {
                    Some(prefix) => format!("{}:{}", prefix, attr_name.local),
                    None => attr_name.local.to_string(),
                };
                write_attribute(out, &name, &attr.value);
            }

            if VOID_ELEMENTS.contains(&&*element.name.local) {
                out.push_str(" />");
                return;
            }

            out.push('>');
            for child in node.children() {
                write_node(&child, out, &element.name.ns);
            }
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
        }
        NodeData::Text(text) => out.push_str(&html_escape::encode_text(&*text.borrow())),
        NodeData::Document(_) | NodeData::DocumentFragment => {
            for child in node.children() {
                write_node(&child, out, inherited);
            }
        }
        // Comments, doctypes and processing instructions are dropped
        _ => {}
    }
}

fn write_attribute(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&html_escape::encode_double_quoted_attribute(value));
    out.push('"');
}

/// Attribute prefixes (such as `xlink`) used on an element without an
/// `xmlns:<prefix>` declaration next to them
fn undeclared_prefixes<'a>(
    map: impl IntoIterator<Item = (&'a ExpandedName, &'a Attribute)> + Copy,
) -> Vec<(String, String)> {
    let declared: Vec<&str> = map
        .into_iter()
        .filter(|(_, attr)| attr.prefix.as_deref() == Some("xmlns"))
        .map(|(name, _)| &*name.local)
        .collect();

    let mut missing: Vec<(String, String)> = Vec::new();
    for (name, attr) in map {
        let Some(prefix) = attr.prefix.as_deref() else {
            continue;
        };
        if matches!(prefix, "xml" | "xmlns") || name.ns.is_empty() || declared.contains(&prefix) {
            continue;
        }
        if !missing.iter().any(|(p, _)| p == prefix) {
            missing.push((prefix.to_string(), name.ns.to_string()));
        }
    }
    missing
}

fn qualified_name(name: &QualName) -> String {
    match &name.prefix {
        Some(prefix) => format!("{}:{}", prefix, name.local),
        None => name.local.to_string(),
    }
}
