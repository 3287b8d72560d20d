//! Location-path AST shared by the XPath and CSS compilers.

/// Traversal direction of a location step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    SelfNode,
    Attribute,
}

impl Axis {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "child" => Some(Axis::Child),
            "descendant" => Some(Axis::Descendant),
            "descendant-or-self" => Some(Axis::DescendantOrSelf),
            "parent" => Some(Axis::Parent),
            "ancestor" => Some(Axis::Ancestor),
            "ancestor-or-self" => Some(Axis::AncestorOrSelf),
            "following-sibling" => Some(Axis::FollowingSibling),
            "preceding-sibling" => Some(Axis::PrecedingSibling),
            "self" => Some(Axis::SelfNode),
            "attribute" => Some(Axis::Attribute),
            _ => None,
        }
    }

    /// Reverse axes number their candidates nearest-first.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent | Axis::Ancestor | Axis::AncestorOrSelf | Axis::PrecedingSibling
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// Element (or attribute) with this name, compared ASCII case-insensitively.
    Name(String),
    /// `*`
    AnyName,
    /// `node()`
    Node,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    pub fn new(axis: Axis, test: NodeTest) -> Self {
        Self {
            axis,
            test,
            predicates: Vec::new(),
        }
    }

    /// The `descendant-or-self::node()` step that `//` abbreviates.
    pub fn descendant_or_self() -> Self {
        Self::new(Axis::DescendantOrSelf, NodeTest::Node)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    pub absolute: bool,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// CSS attribute operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `[a]`
    Exists,
    /// `[a=v]`
    Equals,
    /// `[a~=v]`
    Word,
    /// `[a^=v]`
    Prefix,
    /// `[a$=v]`
    Suffix,
    /// `[a*=v]`
    Contains,
    /// `[a|=v]`
    DashMatch,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(LocationPath),
    Union(Vec<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Negate(Box<Expr>),
    /// Attribute test on the context element.
    AttrMatch {
        name: String,
        op: AttrOp,
        value: String,
    },
    /// `an+b` position among the context element's element siblings.
    NthChild {
        a: i64,
        b: i64,
        from_end: bool,
        of_type: bool,
    },
    /// Element without element or text children.
    Empty,
}

impl Expr {
    /// Whether the expression yields nodes (and can be a selector).
    pub fn is_node_set(&self) -> bool {
        match self {
            Expr::Path(_) => true,
            Expr::Union(parts) => parts.iter().all(Expr::is_node_set),
            _ => false,
        }
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary(Box::new(left), op, Box::new(right))
    }
}
