//! Typed selectors: `TYPE:` prefixes, `||` fallback chains, and the CSS and
//! XPath compilers behind them.
//!
//! ```text
//! [not:][TYPE:|attributes(a,b):]EXPR [|| [TYPE:]EXPR]*
//! ```
//!
//! An expression starting with `/` is XPath, anything else is CSS. Both
//! compile into the same location-path AST and share one evaluator.

mod ast;
mod css;
mod eval;
mod xpath;

use std::collections::BTreeSet;
use std::fmt;

use crate::dom::{Child, Document, NodeId};
use crate::error::SyntaxError;
use ast::Expr;
use eval::{Evaluator, Loc};

/// What a selector addresses in the nodes it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SelectorType {
    /// The matched elements themselves.
    Elements,
    /// The text and child nodes inside the matched elements.
    Children,
    /// Attributes of the matched elements.
    Attributes,
    /// Tag name and attributes, without the subtree.
    Tag,
}

impl SelectorType {
    pub fn name(self) -> &'static str {
        match self {
            SelectorType::Elements => "elements",
            SelectorType::Children => "children",
            SelectorType::Attributes => "attributes",
            SelectorType::Tag => "tag",
        }
    }

    fn from_prefix(name: &str) -> Option<Self> {
        match name {
            "elements" | "element" => Some(SelectorType::Elements),
            "children" => Some(SelectorType::Children),
            "attributes" | "attribute" => Some(SelectorType::Attributes),
            "tag" => Some(SelectorType::Tag),
            _ => None,
        }
    }

    /// `children` and `elements` mix freely; every other type only with itself.
    pub fn compatible(self, other: SelectorType) -> bool {
        match self {
            SelectorType::Children | SelectorType::Elements => {
                matches!(other, SelectorType::Children | SelectorType::Elements)
            }
            _ => self == other,
        }
    }
}

impl fmt::Display for SelectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry of a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Node(NodeId),
    /// A text run or attribute value, with the element it was found in.
    /// `index` locates a text run in the parent's child sequence and is
    /// `None` for attribute values.
    Text {
        text: String,
        parent: NodeId,
        index: Option<usize>,
    },
}

impl Item {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Item::Node(n) => Some(*n),
            Item::Text { .. } => None,
        }
    }
}

/// Result of evaluating a [`Selector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub kind: SelectorType,
    pub items: Vec<Item>,
    pub attributes: Option<Vec<String>>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Element items, skipping text.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.items.iter().filter_map(Item::node)
    }
}

/// One `||` alternative.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub kind: SelectorType,
    pub attributes: Option<Vec<String>>,
    /// Expression text without its type prefix.
    pub source: String,
    expr: Expr,
}

#[derive(Debug, Clone)]
pub struct Selector {
    pub major: SelectorType,
    pub attributes: Option<Vec<String>>,
    pub alternatives: Vec<Alternative>,
    /// Set by a leading `not:`, which only guards accept.
    pub inverted: bool,
    source: String,
}

/// Split a `TYPE:` or `attributes(a,b):` prefix off `expr`.
fn split_prefix(expr: &str) -> Result<(Option<SelectorType>, Option<Vec<String>>, &str), SyntaxError> {
    if let Some(rest) = expr.strip_prefix("attributes(") {
        let Some(close) = rest.find("):") else {
            return Err(SyntaxError::new(format!("unterminated attribute list in selector {expr:?}")));
        };
        let names: Vec<String> = rest[..close]
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(bad) = names
            .iter()
            .find(|n| !n.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
        {
            return Err(SyntaxError::new(format!("bad attribute name {bad:?} in selector {expr:?}")));
        }
        return Ok((Some(SelectorType::Attributes), Some(names), &rest[close + 2..]));
    }
    if let Some(colon) = expr.find(':') {
        if let Some(kind) = SelectorType::from_prefix(&expr[..colon]) {
            return Ok((Some(kind), None, &expr[colon + 1..]));
        }
    }
    Ok((None, None, expr))
}

fn compile_expr(source: &str) -> Result<Expr, SyntaxError> {
    let result = if source.starts_with('/') {
        xpath::compile(source)
    } else {
        css::compile(source)
    };
    result.map_err(|e| SyntaxError::new(format!("bad selector {source:?}: {e}")))
}

impl Selector {
    /// Parse with `elements` as the default type.
    pub fn parse(expr: &str) -> Result<Self, SyntaxError> {
        Self::parse_with_default(expr, SelectorType::Elements)
    }

    pub fn parse_with_default(expr: &str, default: SelectorType) -> Result<Self, SyntaxError> {
        if expr.trim_start().starts_with("not:") {
            return Err(SyntaxError::new(format!(
                "'not:' is only allowed in if-content selectors: {expr:?}"
            )));
        }
        Self::build(expr, default, false)
    }

    /// Parse an `if-content` guard, which may be inverted with `not:`.
    pub fn parse_guard(expr: &str) -> Result<Self, SyntaxError> {
        let trimmed = expr.trim_start();
        match trimmed.strip_prefix("not:") {
            Some(rest) => Self::build(rest.trim_start(), SelectorType::Elements, true),
            None => Self::build(trimmed, SelectorType::Elements, false),
        }
    }

    fn build(expr: &str, default: SelectorType, inverted: bool) -> Result<Self, SyntaxError> {
        let (major, attributes, rest) = split_prefix(expr.trim_start())?;
        let major = major.unwrap_or(default);
        let mut alternatives = Vec::new();
        for part in rest.split("||") {
            let part = part.trim();
            if part.is_empty() {
                return Err(SyntaxError::new(format!("empty alternative in selector {expr:?}")));
            }
            let (kind, alt_attributes, source) = split_prefix(part)?;
            let kind = kind.unwrap_or(major);
            if !kind.compatible(major) {
                return Err(SyntaxError::new(format!(
                    "expression {part:?} in selector {expr:?} uses the type {kind}, \
                     which is not compatible with the type {major} declared earlier"
                )));
            }
            let source = source.trim();
            alternatives.push(Alternative {
                kind,
                attributes: alt_attributes,
                expr: compile_expr(source)?,
                source: source.to_string(),
            });
        }
        Ok(Self {
            major,
            attributes,
            alternatives,
            inverted,
            source: expr.to_string(),
        })
    }

    /// The expression this selector was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `doc`; the first non-empty alternative wins.
    pub fn evaluate(&self, doc: &Document) -> Selection {
        self.evaluate_filtered(doc, |_| true)
    }

    /// Like [`evaluate`](Self::evaluate), dropping items whose node (or
    /// containing element, for text) fails `keep` before the emptiness test.
    pub fn evaluate_filtered<F>(&self, doc: &Document, keep: F) -> Selection
    where
        F: Fn(NodeId) -> bool,
    {
        let evaluator = Evaluator::new(doc);
        for alt in &self.alternatives {
            let items: Vec<Item> = evaluator
                .select(&alt.expr)
                .into_iter()
                .filter_map(|loc| to_item(doc, &evaluator, loc))
                .filter(|item| match item {
                    Item::Node(n) => keep(*n),
                    Item::Text { parent, .. } => keep(*parent),
                })
                .collect();
            if !items.is_empty() {
                return Selection {
                    kind: alt.kind,
                    items,
                    attributes: alt.attributes.clone().or_else(|| self.attributes.clone()),
                };
            }
        }
        Selection {
            kind: self.major,
            items: Vec::new(),
            attributes: self.attributes.clone(),
        }
    }

    /// Every type used by an alternative.
    pub fn selector_types(&self) -> BTreeSet<SelectorType> {
        self.alternatives.iter().map(|a| a.kind).collect()
    }
}

fn to_item(doc: &Document, evaluator: &Evaluator<'_>, loc: Loc) -> Option<Item> {
    match loc {
        Loc::Node(n) if n == doc.root() => None,
        Loc::Node(n) => Some(Item::Node(n)),
        Loc::Text(parent, index) => match doc.children(parent).get(index) {
            Some(Child::Text(text)) => Some(Item::Text {
                text: text.clone(),
                parent,
                index: Some(index),
            }),
            _ => None,
        },
        Loc::Attr(parent, _) => Some(Item::Text {
            text: evaluator.string_value(loc),
            parent,
            index: None,
        }),
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            f.write_str("not:")?;
        }
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" || ")?;
            }
            match alt.attributes.as_ref().or(if i == 0 { self.attributes.as_ref() } else { None }) {
                Some(names) => write!(f, "{}({}):{}", alt.kind, names.join(","), alt.source)?,
                None => write!(f, "{}:{}", alt.kind, alt.source)?,
            }
        }
        Ok(())
    }
}
