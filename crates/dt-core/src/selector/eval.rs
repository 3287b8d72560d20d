//! Location-path evaluation over a [`Document`].

use std::collections::{HashMap, HashSet};

use super::ast::{AttrOp, Axis, BinaryOp, Expr, LocationPath, NodeTest};
use crate::dom::{Child, Document, NodeData, NodeId};

/// A position in the tree a path can stop at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Loc {
    Node(NodeId),
    /// A text run: parent and index in its child sequence.
    Text(NodeId, usize),
    /// An attribute: element and index in its attribute list.
    Attr(NodeId, usize),
}

#[derive(Debug, Clone)]
enum Value {
    Locs(Vec<Loc>),
    Str(String),
    Num(f64),
    Bool(bool),
}

/// Ranks of nodes and text runs in document order.
struct OrderIndex {
    nodes: Vec<usize>,
    texts: HashMap<(NodeId, usize), usize>,
}

impl OrderIndex {
    fn build(doc: &Document) -> Self {
        let mut index = OrderIndex {
            nodes: vec![usize::MAX; doc.document_order().len()],
            texts: HashMap::new(),
        };
        let mut rank = 0usize;
        index.nodes[doc.root().index()] = rank;
        // Preorder walk that also numbers text runs between children.
        let mut frames: Vec<(NodeId, usize)> = vec![(doc.root(), 0)];
        while let Some((node, i)) = frames.pop() {
            let children = doc.children(node);
            if i >= children.len() {
                continue;
            }
            frames.push((node, i + 1));
            rank += 1;
            match &children[i] {
                Child::Text(_) => {
                    index.texts.insert((node, i), rank);
                }
                Child::Node(child) => {
                    index.nodes[child.index()] = rank;
                    frames.push((*child, 0));
                }
            }
        }
        index
    }

    fn key(&self, loc: Loc) -> (usize, usize) {
        match loc {
            Loc::Node(n) => (self.nodes.get(n.index()).copied().unwrap_or(usize::MAX), 0),
            Loc::Text(p, i) => (self.texts.get(&(p, i)).copied().unwrap_or(usize::MAX), 0),
            Loc::Attr(e, i) => (self.nodes.get(e.index()).copied().unwrap_or(usize::MAX), i + 1),
        }
    }
}

pub(crate) struct Evaluator<'d> {
    doc: &'d Document,
    order: OrderIndex,
}

impl<'d> Evaluator<'d> {
    pub(crate) fn new(doc: &'d Document) -> Self {
        Self {
            doc,
            order: OrderIndex::build(doc),
        }
    }

    /// Evaluate a node-set expression from the document root.
    pub(crate) fn select(&self, expr: &Expr) -> Vec<Loc> {
        match self.eval(expr, Loc::Node(self.doc.root()), 1, 1) {
            Value::Locs(locs) => locs,
            _ => Vec::new(),
        }
    }

    fn sort_unique(&self, locs: &mut Vec<Loc>) {
        let mut seen = HashSet::new();
        locs.retain(|l| seen.insert(*l));
        locs.sort_by_key(|l| self.order.key(*l));
    }

    fn select_path(&self, path: &LocationPath, context: Loc) -> Vec<Loc> {
        let mut current = if path.absolute {
            vec![Loc::Node(self.doc.root())]
        } else {
            vec![context]
        };
        for step in &path.steps {
            let mut next = Vec::new();
            for ctx in &current {
                let mut candidates: Vec<Loc> = self
                    .axis(*ctx, step.axis)
                    .into_iter()
                    .filter(|c| self.test(*c, &step.test, step.axis))
                    .collect();
                for predicate in &step.predicates {
                    let size = candidates.len();
                    candidates = candidates
                        .into_iter()
                        .enumerate()
                        .filter(|(i, c)| self.predicate(predicate, *c, i + 1, size))
                        .map(|(_, c)| c)
                        .collect();
                }
                next.extend(candidates);
            }
            self.sort_unique(&mut next);
            current = next;
        }
        current
    }

    fn predicate(&self, expr: &Expr, ctx: Loc, pos: usize, size: usize) -> bool {
        match self.eval(expr, ctx, pos, size) {
            Value::Num(n) => n == pos as f64,
            other => self.to_bool(&other),
        }
    }

    // ------------------------------------------------------------------
    // Axes and node tests
    // ------------------------------------------------------------------

    fn child_locs(&self, node: NodeId) -> Vec<Loc> {
        self.doc
            .children(node)
            .iter()
            .enumerate()
            .map(|(i, c)| match c {
                Child::Text(_) => Loc::Text(node, i),
                Child::Node(n) => Loc::Node(*n),
            })
            .collect()
    }

    fn descendant_locs(&self, node: NodeId, out: &mut Vec<Loc>) {
        for loc in self.child_locs(node) {
            out.push(loc);
            if let Loc::Node(n) = loc {
                self.descendant_locs(n, out);
            }
        }
    }

    fn parent_of(&self, loc: Loc) -> Option<NodeId> {
        match loc {
            Loc::Node(n) => self.doc.parent(n),
            Loc::Text(p, _) | Loc::Attr(p, _) => Some(p),
        }
    }

    /// Siblings of `loc` as (parent, index in child sequence).
    fn sibling_position(&self, loc: Loc) -> Option<(NodeId, usize)> {
        match loc {
            Loc::Node(n) => Some((self.doc.parent(n)?, self.doc.position(n)?)),
            Loc::Text(p, i) => Some((p, i)),
            Loc::Attr(..) => None,
        }
    }

    fn axis(&self, ctx: Loc, axis: Axis) -> Vec<Loc> {
        match axis {
            Axis::Child => match ctx {
                Loc::Node(n) => self.child_locs(n),
                _ => Vec::new(),
            },
            Axis::Descendant | Axis::DescendantOrSelf => {
                let mut out = Vec::new();
                if axis == Axis::DescendantOrSelf {
                    out.push(ctx);
                }
                if let Loc::Node(n) = ctx {
                    self.descendant_locs(n, &mut out);
                }
                out
            }
            Axis::Parent => self.parent_of(ctx).map(Loc::Node).into_iter().collect(),
            Axis::Ancestor | Axis::AncestorOrSelf => {
                let mut out = Vec::new();
                if axis == Axis::AncestorOrSelf {
                    out.push(ctx);
                }
                let mut cur = self.parent_of(ctx);
                while let Some(n) = cur {
                    out.push(Loc::Node(n));
                    cur = self.doc.parent(n);
                }
                out
            }
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                let Some((parent, index)) = self.sibling_position(ctx) else {
                    return Vec::new();
                };
                let siblings = self.child_locs(parent);
                if axis == Axis::FollowingSibling {
                    siblings.into_iter().skip(index + 1).collect()
                } else {
                    siblings.into_iter().take(index).rev().collect()
                }
            }
            Axis::SelfNode => vec![ctx],
            Axis::Attribute => match ctx {
                Loc::Node(n) => self
                    .doc
                    .attrs(n)
                    .map(|a| (0..a.len()).map(|i| Loc::Attr(n, i)).collect())
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
        }
    }

    fn test(&self, loc: Loc, test: &NodeTest, axis: Axis) -> bool {
        if axis == Axis::Attribute {
            let Loc::Attr(e, i) = loc else {
                return false;
            };
            return match test {
                NodeTest::Name(name) => self.attr_name(e, i).is_some_and(|n| n.eq_ignore_ascii_case(name)),
                NodeTest::AnyName | NodeTest::Node => true,
                _ => false,
            };
        }
        match (test, loc) {
            (NodeTest::Node, _) => true,
            (NodeTest::Text, Loc::Text(..)) => true,
            (NodeTest::Comment, Loc::Node(n)) => matches!(self.doc.data(n), NodeData::Comment(_)),
            (NodeTest::AnyName, Loc::Node(n)) => self.doc.is_element(n),
            (NodeTest::Name(name), Loc::Node(n)) => self
                .doc
                .tag_name(n)
                .is_some_and(|t| t.eq_ignore_ascii_case(name)),
            _ => false,
        }
    }

    fn attr_name(&self, element: NodeId, index: usize) -> Option<&'d str> {
        self.doc.attrs(element)?.iter().nth(index).map(|(k, _)| k)
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    pub(crate) fn string_value(&self, loc: Loc) -> String {
        match loc {
            Loc::Node(n) => match self.doc.data(n) {
                NodeData::Comment(text) => text.clone(),
                NodeData::ProcessingInstruction { data, .. } => data.clone(),
                _ => self.doc.text_content(n),
            },
            Loc::Text(p, i) => match self.doc.children(p).get(i) {
                Some(Child::Text(t)) => t.clone(),
                _ => String::new(),
            },
            Loc::Attr(e, i) => self
                .doc
                .attrs(e)
                .and_then(|a| a.iter().nth(i))
                .map(|(_, v)| v.to_string())
                .unwrap_or_default(),
        }
    }

    fn to_string(&self, value: &Value) -> String {
        match value {
            Value::Locs(locs) => locs.first().map(|l| self.string_value(*l)).unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => format_number(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => self.to_string(other).trim().parse().unwrap_or(f64::NAN),
        }
    }

    fn to_bool(&self, value: &Value) -> bool {
        match value {
            Value::Locs(locs) => !locs.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn eval(&self, expr: &Expr, ctx: Loc, pos: usize, size: usize) -> Value {
        match expr {
            Expr::Path(path) => Value::Locs(self.select_path(path, ctx)),
            Expr::Union(parts) => {
                let mut all = Vec::new();
                for part in parts {
                    if let Value::Locs(locs) = self.eval(part, ctx, pos, size) {
                        all.extend(locs);
                    }
                }
                self.sort_unique(&mut all);
                Value::Locs(all)
            }
            Expr::Literal(s) => Value::Str(s.clone()),
            Expr::Number(n) => Value::Num(*n),
            Expr::Negate(inner) => Value::Num(-self.to_number(&self.eval(inner, ctx, pos, size))),
            Expr::Binary(left, op, right) => self.binary(left, *op, right, ctx, pos, size),
            Expr::Function(name, args) => self.function(name, args, ctx, pos, size),
            Expr::AttrMatch { name, op, value } => Value::Bool(self.attr_match(ctx, name, *op, value)),
            Expr::NthChild {
                a,
                b,
                from_end,
                of_type,
            } => Value::Bool(self.nth_child(ctx, *a, *b, *from_end, *of_type)),
            Expr::Empty => Value::Bool(match ctx {
                Loc::Node(n) => self.doc.is_element(n) && self.doc.children(n).iter().all(|c| match c {
                    Child::Text(_) => false,
                    Child::Node(child) => !self.doc.is_element(*child),
                }),
                _ => false,
            }),
        }
    }

    fn binary(&self, left: &Expr, op: BinaryOp, right: &Expr, ctx: Loc, pos: usize, size: usize) -> Value {
        match op {
            BinaryOp::Or => {
                let l = self.eval(left, ctx, pos, size);
                Value::Bool(self.to_bool(&l) || self.to_bool(&self.eval(right, ctx, pos, size)))
            }
            BinaryOp::And => {
                let l = self.eval(left, ctx, pos, size);
                Value::Bool(self.to_bool(&l) && self.to_bool(&self.eval(right, ctx, pos, size)))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                let l = self.to_number(&self.eval(left, ctx, pos, size));
                let r = self.to_number(&self.eval(right, ctx, pos, size));
                Value::Num(match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    _ => l % r,
                })
            }
            _ => {
                let l = self.eval(left, ctx, pos, size);
                let r = self.eval(right, ctx, pos, size);
                Value::Bool(self.compare(&l, op, &r))
            }
        }
    }

    /// XPath 1.0 comparison, including the existential node-set rules.
    fn compare(&self, left: &Value, op: BinaryOp, right: &Value) -> bool {
        match (left, right) {
            (Value::Locs(l), Value::Locs(r)) => {
                let rs: Vec<String> = r.iter().map(|x| self.string_value(*x)).collect();
                l.iter().any(|x| {
                    let ls = self.string_value(*x);
                    rs.iter().any(|y| compare_atoms(&Value::Str(ls.clone()), op, &Value::Str(y.clone()), self))
                })
            }
            (Value::Locs(l), Value::Bool(_)) => {
                compare_atoms(&Value::Bool(!l.is_empty()), op, right, self)
            }
            (Value::Bool(_), Value::Locs(r)) => {
                compare_atoms(left, op, &Value::Bool(!r.is_empty()), self)
            }
            (Value::Locs(l), other) => l
                .iter()
                .any(|x| compare_atoms(&Value::Str(self.string_value(*x)), op, other, self)),
            (other, Value::Locs(r)) => r
                .iter()
                .any(|y| compare_atoms(other, op, &Value::Str(self.string_value(*y)), self)),
            _ => compare_atoms(left, op, right, self),
        }
    }

    fn function(&self, name: &str, args: &[Expr], ctx: Loc, pos: usize, size: usize) -> Value {
        let arg = |i: usize| self.eval(&args[i], ctx, pos, size);
        let str_arg = |i: usize| {
            if args.len() > i {
                self.to_string(&arg(i))
            } else {
                self.string_value(ctx)
            }
        };
        match name {
            "position" => Value::Num(pos as f64),
            "last" => Value::Num(size as f64),
            "count" => match arg(0) {
                Value::Locs(locs) => Value::Num(locs.len() as f64),
                _ => Value::Num(0.0),
            },
            "not" => Value::Bool(!self.to_bool(&arg(0))),
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "boolean" => Value::Bool(self.to_bool(&arg(0))),
            "string" => Value::Str(str_arg(0)),
            "number" => {
                if args.is_empty() {
                    Value::Num(self.string_value(ctx).trim().parse().unwrap_or(f64::NAN))
                } else {
                    Value::Num(self.to_number(&arg(0)))
                }
            }
            "concat" => Value::Str(args.iter().map(|a| self.to_string(&self.eval(a, ctx, pos, size))).collect()),
            "contains" => Value::Bool(str_arg(0).contains(&str_arg(1))),
            "starts-with" => Value::Bool(str_arg(0).starts_with(&str_arg(1))),
            "ends-with" => Value::Bool(str_arg(0).ends_with(&str_arg(1))),
            "normalize-space" => Value::Str(str_arg(0).split_whitespace().collect::<Vec<_>>().join(" ")),
            "string-length" => Value::Num(str_arg(0).chars().count() as f64),
            "name" | "local-name" => {
                let target = if args.is_empty() {
                    Some(ctx)
                } else {
                    match arg(0) {
                        Value::Locs(locs) => locs.first().copied(),
                        _ => None,
                    }
                };
                Value::Str(match target {
                    Some(Loc::Node(n)) => self.doc.tag_name(n).unwrap_or_default().to_string(),
                    Some(Loc::Attr(e, i)) => self.attr_name(e, i).unwrap_or_default().to_string(),
                    _ => String::new(),
                })
            }
            _ => Value::Bool(false),
        }
    }

    fn attr_match(&self, ctx: Loc, name: &str, op: AttrOp, expected: &str) -> bool {
        let Loc::Node(n) = ctx else {
            return false;
        };
        let Some(actual) = self.doc.attr(n, name) else {
            return false;
        };
        match op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Word => actual.split_whitespace().any(|w| w == expected),
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(expected),
            AttrOp::Contains => !expected.is_empty() && actual.contains(expected),
            AttrOp::DashMatch => {
                actual == expected
                    || actual
                        .strip_prefix(expected)
                        .is_some_and(|rest| rest.starts_with('-'))
            }
        }
    }

    fn nth_child(&self, ctx: Loc, a: i64, b: i64, from_end: bool, of_type: bool) -> bool {
        let Loc::Node(n) = ctx else {
            return false;
        };
        let (Some(parent), Some(tag)) = (self.doc.parent(n), self.doc.tag_name(n)) else {
            return false;
        };
        let mut siblings: Vec<NodeId> = self
            .doc
            .element_children(parent)
            .filter(|s| !of_type || self.doc.tag_name(*s).is_some_and(|t| t.eq_ignore_ascii_case(tag)))
            .collect();
        if from_end {
            siblings.reverse();
        }
        let Some(index) = siblings.iter().position(|s| *s == n) else {
            return false;
        };
        let index = index as i64 + 1;
        if a == 0 {
            index == b
        } else {
            let diff = index - b;
            diff % a == 0 && diff / a >= 0
        }
    }
}

fn compare_atoms(left: &Value, op: BinaryOp, right: &Value, ev: &Evaluator<'_>) -> bool {
    match op {
        BinaryOp::Eq | BinaryOp::NotEq => {
            let equal = match (left, right) {
                (Value::Bool(_), _) | (_, Value::Bool(_)) => ev.to_bool(left) == ev.to_bool(right),
                (Value::Num(_), _) | (_, Value::Num(_)) => ev.to_number(left) == ev.to_number(right),
                _ => ev.to_string(left) == ev.to_string(right),
            };
            if op == BinaryOp::Eq {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let (l, r) = (ev.to_number(left), ev.to_number(right));
            match op {
                BinaryOp::Lt => l < r,
                BinaryOp::LtEq => l <= r,
                BinaryOp::Gt => l > r,
                _ => l >= r,
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
