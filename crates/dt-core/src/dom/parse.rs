//! HTML parsing through html5ever into the arena.

use html5ever::tendril::TendrilSink;
use html5ever::{parse_document, ParseOpts};
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

use super::{charset, Attributes, Child, Document, NodeData, NodeId};

/// Parse an HTML string. Parsing never fails; malformed markup is repaired
/// the way browsers repair it.
pub fn parse_html(html: &str) -> Document {
    let dom = parse_document(RcDom::default(), ParseOpts::default()).one(html);
    let mut doc = Document::new();
    let root = doc.root();

    let mut stack: Vec<(NodeId, Handle)> = dom
        .document
        .children
        .borrow()
        .iter()
        .rev()
        .map(|h| (root, h.clone()))
        .collect();

    while let Some((parent, handle)) = stack.pop() {
        let id = match &handle.data {
            RcNodeData::Document => continue,
            RcNodeData::Text { contents } => {
                doc.append_child(parent, Child::Text(contents.borrow().to_string()));
                continue;
            }
            RcNodeData::Comment { contents } => doc.create_node(NodeData::Comment(contents.to_string())),
            RcNodeData::Doctype {
                name,
                public_id,
                system_id,
            } => doc.create_node(NodeData::Doctype {
                name: name.to_string(),
                public_id: public_id.to_string(),
                system_id: system_id.to_string(),
            }),
            RcNodeData::ProcessingInstruction { target, contents } => {
                doc.create_node(NodeData::ProcessingInstruction {
                    target: target.to_string(),
                    data: contents.to_string(),
                })
            }
            RcNodeData::Element { name, attrs, .. } => {
                let attrs: Attributes = attrs
                    .borrow()
                    .iter()
                    .map(|a| {
                        let key = match &a.name.prefix {
                            Some(prefix) => format!("{}:{}", prefix, a.name.local),
                            None => a.name.local.to_string(),
                        };
                        (key, a.value.to_string())
                    })
                    .collect();
                doc.create_node(NodeData::Element {
                    name: name.local.to_string(),
                    attrs,
                })
            }
        };
        doc.append_child(parent, Child::Node(id));

        // <template> keeps its parsed children in a separate fragment.
        let children = match &handle.data {
            RcNodeData::Element {
                template_contents, ..
            } => match template_contents.borrow().as_ref() {
                Some(fragment) => fragment.children.borrow().clone(),
                None => handle.children.borrow().clone(),
            },
            _ => handle.children.borrow().clone(),
        };
        stack.extend(children.into_iter().rev().map(|h| (id, h)));
    }

    doc
}

/// Decode `bytes` using the charset from `content_type` (or the document's
/// own declaration) and parse the result.
pub fn parse_html_bytes(bytes: &[u8], content_type: Option<&str>) -> Document {
    let (text, _) = charset::decode_html(bytes, content_type);
    parse_html(&text)
}
