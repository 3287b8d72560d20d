//! Link absolutization for fetched theme documents.

use url::Url;

use super::{Document, NodeId};

/// (element, attribute) pairs that carry a URL.
const LINK_ATTRIBUTES: &[(&str, &str)] = &[
    ("a", "href"),
    ("area", "href"),
    ("link", "href"),
    ("base", "href"),
    ("img", "src"),
    ("script", "src"),
    ("iframe", "src"),
    ("frame", "src"),
    ("embed", "src"),
    ("source", "src"),
    ("track", "src"),
    ("audio", "src"),
    ("video", "src"),
    ("video", "poster"),
    ("input", "src"),
    ("form", "action"),
    ("object", "data"),
    ("blockquote", "cite"),
    ("q", "cite"),
    ("del", "cite"),
    ("ins", "cite"),
    ("body", "background"),
];

/// Rewrite every relative link in `doc` against `base`.
///
/// Empty values and same-document fragments (`#top`) are left alone.
/// Returns the number of attributes rewritten.
pub fn make_links_absolute(doc: &mut Document, base: &Url) -> usize {
    let elements: Vec<NodeId> = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|n| doc.is_element(*n))
        .collect();

    let mut rewritten = 0;
    for id in elements {
        let Some(tag) = doc.tag_name(id).map(str::to_ascii_lowercase) else {
            continue;
        };
        for (_, attr) in LINK_ATTRIBUTES.iter().filter(|(t, _)| *t == tag) {
            let Some(value) = doc.attr(id, attr) else {
                continue;
            };
            let trimmed = value.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Ok(joined) = base.join(trimmed) else {
                continue;
            };
            if joined.as_str() != value {
                if let Some(attrs) = doc.attrs_mut(id) {
                    attrs.set(*attr, joined.to_string());
                    rewritten += 1;
                }
            }
        }
    }
    rewritten
}
