//! Arena-backed mutable HTML tree.
//!
//! Every node lives in a single `Vec` owned by the [`Document`] and is
//! addressed by a [`NodeId`]. A node's children are an ordered sequence of
//! [`Child`] values, so text runs and element references interleave exactly
//! as they appear in the markup. The "text" of an element is the leading text
//! run of its children; the "tail" of a node is the text run that follows it
//! in its parent. Both are positional: removing a node leaves its tail where
//! it was, merged with whatever text precedes it.
//!
//! Detached nodes stay in the arena as orphans. A document is small enough
//! per request that compaction is never worth it.

mod charset;
mod links;
mod parse;
mod serialize;

pub use charset::{charset_from_content_type, decode_html};
pub use links::make_links_absolute;
pub use parse::{parse_html, parse_html_bytes};
pub use serialize::{serialize, serialize_node, VOID_ELEMENTS};

// ============================================================================
// Identifiers and payloads
// ============================================================================

/// Index of a node inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Element attributes in source order. Names are unique.
#[derive(Debug, Clone, Default, Eq)]
pub struct Attributes {
    items: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|(k, _)| k == name)
    }

    /// Set `name`, overwriting any existing value in place.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.items.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.items.push((name, value)),
        }
    }

    /// Set `name` only when absent. Returns whether the value was stored.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.items.push((name, value.into()));
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self.items.iter().position(|(k, _)| k == name)?;
        Some(self.items.remove(pos).1)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }
}

// Attribute order carries no meaning for equality.
impl PartialEq for Attributes {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromIterator<(String, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.set(k, v);
        }
        attrs
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Doctype {
        name: String,
        public_id: String,
        system_id: String,
    },
    Element {
        name: String,
        attrs: Attributes,
    },
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

/// One entry of a node's child sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Child {
    Text(String),
    Node(NodeId),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<Child>,
    from_content: bool,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: None,
            children: Vec::new(),
            from_content: false,
        }
    }
}

// ============================================================================
// Document
// ============================================================================

/// A mutable HTML tree. `clone()` yields an independent deep copy.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Document)],
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id.0].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[Child] {
        &self.nodes[id.0].children
    }

    pub fn child_nodes(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().filter_map(|c| match c {
            Child::Node(n) => Some(*n),
            Child::Text(_) => None,
        })
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.child_nodes(id).filter(move |n| self.is_element(*n))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].data, NodeData::Element { .. })
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn set_tag_name(&mut self, id: NodeId, new_name: &str) {
        if let NodeData::Element { name, .. } = &mut self.nodes[id.0].data {
            *name = new_name.to_string();
        }
    }

    pub fn attrs(&self, id: NodeId) -> Option<&Attributes> {
        match &self.nodes[id.0].data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn attrs_mut(&mut self, id: NodeId) -> Option<&mut Attributes> {
        match &mut self.nodes[id.0].data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id).and_then(|a| a.get(name))
    }

    /// Leading text run of `id`, or `""`.
    pub fn text(&self, id: NodeId) -> &str {
        match self.nodes[id.0].children.first() {
            Some(Child::Text(t)) => t,
            _ => "",
        }
    }

    /// Text run following `id` in its parent, or `""`.
    pub fn tail(&self, id: NodeId) -> &str {
        let Some(parent) = self.parent(id) else {
            return "";
        };
        let Some(pos) = self.position(id) else {
            return "";
        };
        match self.nodes[parent.0].children.get(pos + 1) {
            Some(Child::Text(t)) => t,
            _ => "",
        }
    }

    /// Concatenated descendant text.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for child in &self.nodes[id.0].children {
            match child {
                Child::Text(t) => out.push_str(t),
                Child::Node(n) => {
                    if self.is_element(*n) {
                        self.collect_text(*n, out);
                    }
                }
            }
        }
    }

    /// Whether `id` has any text or child nodes.
    pub fn has_content(&self, id: NodeId) -> bool {
        !self.nodes[id.0].children.is_empty()
    }

    /// Index of `id` within its parent's child sequence.
    pub fn position(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == Child::Node(id))
    }

    pub fn previous_element(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let pos = self.position(id)?;
        self.nodes[parent.0].children[..pos]
            .iter()
            .rev()
            .find_map(|c| match c {
                Child::Node(n) if self.is_element(*n) => Some(*n),
                _ => None,
            })
    }

    pub fn next_element(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let pos = self.position(id)?;
        self.nodes[parent.0].children[pos + 1..]
            .iter()
            .find_map(|c| match c {
                Child::Node(n) if self.is_element(*n) => Some(*n),
                _ => None,
            })
    }

    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    pub fn create_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(data));
        id
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.create_node(NodeData::Element {
            name: name.to_ascii_lowercase(),
            attrs: Attributes::new(),
        })
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.create_node(NodeData::Comment(text.to_string()))
    }

    /// Append a text run or a detached node to `parent`.
    pub fn append_child(&mut self, parent: NodeId, child: Child) {
        let len = self.nodes[parent.0].children.len();
        self.insert_children(parent, len, vec![child]);
    }

    /// Insert pieces into `parent` at `index` of its child sequence.
    ///
    /// Node pieces must be detached. Adjacent text runs are merged afterwards.
    pub fn insert_children(&mut self, parent: NodeId, index: usize, pieces: Vec<Child>) {
        for piece in &pieces {
            if let Child::Node(n) = piece {
                debug_assert!(self.nodes[n.0].parent.is_none(), "inserting an attached node");
                self.nodes[n.0].parent = Some(parent);
            }
        }
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.splice(index..index, pieces);
        normalize(children);
    }

    /// Insert pieces directly before `sibling`, after any text preceding it.
    pub fn insert_before(&mut self, sibling: NodeId, pieces: Vec<Child>) {
        if let (Some(parent), Some(pos)) = (self.parent(sibling), self.position(sibling)) {
            self.insert_children(parent, pos, pieces);
        }
    }

    /// Insert pieces after `sibling` and its tail.
    pub fn insert_after(&mut self, sibling: NodeId, pieces: Vec<Child>) {
        if let (Some(parent), Some(pos)) = (self.parent(sibling), self.position(sibling)) {
            let mut index = pos + 1;
            if matches!(self.nodes[parent.0].children.get(index), Some(Child::Text(_))) {
                index += 1;
            }
            self.insert_children(parent, index, pieces);
        }
    }

    /// Remove `id` from its parent. Its tail stays in place.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(pos) = self.position(id) {
            let children = &mut self.nodes[parent.0].children;
            children.remove(pos);
            normalize(children);
        }
        self.nodes[id.0].parent = None;
    }

    /// Remove the text run at `index` of `parent` if it still reads `text`.
    pub fn remove_text(&mut self, parent: NodeId, index: usize, text: &str) -> bool {
        let children = &mut self.nodes[parent.0].children;
        match children.get(index) {
            Some(Child::Text(t)) if t == text => {
                children.remove(index);
                normalize(children);
                true
            }
            _ => false,
        }
    }

    /// Move the tail of `id` in front of it, joining any preceding text.
    pub fn move_tail_before(&mut self, id: NodeId) {
        let (Some(parent), Some(pos)) = (self.parent(id), self.position(id)) else {
            return;
        };
        let children = &mut self.nodes[parent.0].children;
        if matches!(children.get(pos + 1), Some(Child::Text(_))) {
            let tail = children.remove(pos + 1);
            children.insert(pos, tail);
            normalize(children);
        }
    }

    /// Put `pieces` where `id` was and detach `id`.
    pub fn replace_with(&mut self, id: NodeId, pieces: Vec<Child>) {
        let (Some(parent), Some(pos)) = (self.parent(id), self.position(id)) else {
            return;
        };
        self.nodes[parent.0].children.remove(pos);
        self.nodes[id.0].parent = None;
        self.insert_children(parent, pos, pieces);
    }

    /// Detach and return the whole child sequence of `id`.
    pub fn take_children(&mut self, id: NodeId) -> Vec<Child> {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in &children {
            if let Child::Node(n) = child {
                self.nodes[n.0].parent = None;
            }
        }
        children
    }

    pub fn clear_children(&mut self, id: NodeId) {
        self.take_children(id);
    }

    /// Replace `id` by its own children (flatten the element).
    pub fn unwrap(&mut self, id: NodeId) {
        let children = self.take_children(id);
        self.replace_with(id, children);
    }

    /// Deep-copy a subtree of `src` into this arena. The copy is detached.
    pub fn import(&mut self, src: &Document, id: NodeId) -> NodeId {
        let copy = self.create_node(src.nodes[id.0].data.clone());
        let mut stack = vec![(id, copy)];
        while let Some((from, to)) = stack.pop() {
            let mut children = Vec::with_capacity(src.nodes[from.0].children.len());
            for child in &src.nodes[from.0].children {
                match child {
                    Child::Text(t) => children.push(Child::Text(t.clone())),
                    Child::Node(n) => {
                        let new_id = self.create_node(src.nodes[n.0].data.clone());
                        self.nodes[new_id.0].parent = Some(to);
                        stack.push((*n, new_id));
                        children.push(Child::Node(new_id));
                    }
                }
            }
            self.nodes[to.0].children = children;
        }
        copy
    }

    /// Import one child-sequence entry from `src`.
    pub fn import_child(&mut self, src: &Document, child: &Child) -> Child {
        match child {
            Child::Text(t) => Child::Text(t.clone()),
            Child::Node(n) => Child::Node(self.import(src, *n)),
        }
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Descendant nodes of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.child_nodes(id).collect();
        stack.reverse();
        while let Some(n) = stack.pop() {
            out.push(n);
            let start = stack.len();
            stack.extend(self.child_nodes(n));
            stack[start..].reverse();
        }
        out
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |n| self.parent(*n))
    }

    /// Preorder rank of every attached node, indexed by arena slot.
    /// Detached nodes get `usize::MAX`.
    pub fn document_order(&self) -> Vec<usize> {
        let mut order = vec![usize::MAX; self.nodes.len()];
        order[0] = 0;
        for (rank, n) in self.descendants(self.root()).into_iter().enumerate() {
            order[n.0] = rank + 1;
        }
        order
    }

    /// The `<html>` element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.element_children(self.root()).next()
    }

    pub fn child_element(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.element_children(parent)
            .find(|n| self.tag_name(*n).is_some_and(|t| t.eq_ignore_ascii_case(name)))
    }

    pub fn head(&self) -> Option<NodeId> {
        self.child_element(self.document_element()?, "head")
    }

    pub fn body(&self) -> Option<NodeId> {
        self.child_element(self.document_element()?, "body")
    }

    pub fn doctype(&self) -> Option<NodeId> {
        self.child_nodes(self.root())
            .find(|n| matches!(self.data(*n), NodeData::Doctype { .. }))
    }

    // ------------------------------------------------------------------
    // Content-origin marks
    // ------------------------------------------------------------------

    pub fn mark_from_content(&mut self, id: NodeId) {
        self.nodes[id.0].from_content = true;
    }

    /// Whether `id` or any ancestor was spliced in from a content document.
    pub fn is_from_content(&self, id: NodeId) -> bool {
        self.nodes[id.0].from_content || self.ancestors(id).any(|a| self.nodes[a.0].from_content)
    }

    pub fn clear_content_marks(&mut self) {
        for node in &mut self.nodes {
            node.from_content = false;
        }
    }
}

/// Merge adjacent text runs and drop empty ones.
fn normalize(children: &mut Vec<Child>) {
    let mut out: Vec<Child> = Vec::with_capacity(children.len());
    for child in children.drain(..) {
        match child {
            Child::Text(t) if t.is_empty() => {}
            Child::Text(t) => match out.last_mut() {
                Some(Child::Text(prev)) => prev.push_str(&t),
                _ => out.push(Child::Text(t)),
            },
            node => out.push(node),
        }
    }
    *children = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        // <div>lead<a/>tail-a<b/>tail-b</div>
        let mut doc = Document::new();
        let div = doc.create_element("div");
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let root = doc.root();
        doc.append_child(root, Child::Node(div));
        doc.append_child(div, Child::Text("lead".into()));
        doc.append_child(div, Child::Node(a));
        doc.append_child(div, Child::Text("tail-a".into()));
        doc.append_child(div, Child::Node(b));
        doc.append_child(div, Child::Text("tail-b".into()));
        (doc, div, a, b)
    }

    #[test]
    fn test_text_and_tail() {
        let (doc, div, a, b) = sample();
        assert_eq!(doc.text(div), "lead");
        assert_eq!(doc.tail(a), "tail-a");
        assert_eq!(doc.tail(b), "tail-b");
        assert_eq!(doc.text_content(div), "leadtail-atail-b");
    }

    #[test]
    fn test_detach_keeps_tail_in_place() {
        let (mut doc, div, a, b) = sample();
        doc.detach(a);
        assert_eq!(doc.parent(a), None);
        assert_eq!(
            doc.children(div),
            &[Child::Text("leadtail-a".into()), Child::Node(b), Child::Text("tail-b".into())]
        );
    }

    #[test]
    fn test_insert_after_skips_tail() {
        let (mut doc, div, a, _) = sample();
        let c = doc.create_element("c");
        doc.insert_after(a, vec![Child::Node(c)]);
        assert_eq!(doc.children(div)[2], Child::Text("tail-a".into()));
        assert_eq!(doc.children(div)[3], Child::Node(c));
        assert_eq!(doc.parent(c), Some(div));
    }

    #[test]
    fn test_move_tail_before_joins_previous_text() {
        let (mut doc, div, a, b) = sample();
        doc.move_tail_before(b);
        assert_eq!(
            doc.children(div),
            &[
                Child::Text("lead".into()),
                Child::Node(a),
                Child::Text("tail-atail-b".into()),
                Child::Node(b)
            ]
        );
        // No tail left to move.
        doc.move_tail_before(b);
        assert_eq!(doc.children(div).len(), 4);
    }

    #[test]
    fn test_remove_text_checks_run() {
        let (mut doc, div, a, _) = sample();
        assert!(!doc.remove_text(div, 2, "other"));
        assert!(doc.remove_text(div, 2, "tail-a"));
        assert_eq!(doc.tail(a), "");
        assert_eq!(doc.children(div).len(), 4);
    }

    #[test]
    fn test_unwrap_flattens() {
        let (mut doc, div, a, _) = sample();
        doc.append_child(a, Child::Text("inner".into()));
        doc.unwrap(a);
        assert_eq!(doc.text(div), "leadinnertail-a");
    }

    #[test]
    fn test_import_deep_copies() {
        let (src, div, _, _) = sample();
        let mut dst = Document::new();
        let copy = dst.import(&src, div);
        assert_eq!(dst.parent(copy), None);
        assert_eq!(dst.text_content(copy), "leadtail-atail-b");
        assert_eq!(dst.element_children(copy).count(), 2);
    }

    #[test]
    fn test_content_marks_follow_ancestors() {
        let (mut doc, div, a, _) = sample();
        assert!(!doc.is_from_content(a));
        doc.mark_from_content(div);
        assert!(doc.is_from_content(a));
        doc.clear_content_marks();
        assert!(!doc.is_from_content(a));
    }

    #[test]
    fn test_document_order() {
        let (doc, div, a, b) = sample();
        let order = doc.document_order();
        assert!(order[div.index()] < order[a.index()]);
        assert!(order[a.index()] < order[b.index()]);
    }

    #[test]
    fn test_attributes_set_default_and_equality() {
        let mut attrs = Attributes::new();
        attrs.set("class", "x");
        assert!(!attrs.set_default("class", "y"));
        assert!(attrs.set_default("id", "z"));
        assert_eq!(attrs.get("class"), Some("x"));

        let other: Attributes = vec![
            ("id".to_string(), "z".to_string()),
            ("class".to_string(), "x".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(attrs, other);
        assert_eq!(attrs.remove("id"), Some("z".to_string()));
        assert_ne!(attrs, other);
    }
}
