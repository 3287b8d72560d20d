//! CSS subset compiled into location paths.
//!
//! `div.note > p` becomes the equivalent of
//! `/descendant::div[@class~='note']/child::p`. Supported: type and universal
//! selectors, `#id`, `.class`, attribute selectors with `= ~= ^= $= *= |=`,
//! the four combinators, selector lists and the structural pseudo-classes
//! listed in [`parse_pseudo`](Parser::parse_pseudo).

use super::ast::{AttrOp, Axis, BinaryOp, Expr, LocationPath, NodeTest, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    NextSibling,
    SubsequentSibling,
}

/// One compound selector: an optional type plus conditions.
#[derive(Debug, Clone)]
struct Compound {
    test: NodeTest,
    conditions: Vec<Expr>,
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            source,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn error(&self, message: &str) -> String {
        format!("{message} at offset {} in {:?}", self.pos, self.source)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Result<String, String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                match self.peek() {
                    Some(escaped) => {
                        out.push(escaped);
                        self.pos += 1;
                    }
                    None => break,
                }
            } else if c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii() {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if out.is_empty() {
            Err(self.error("expected an identifier"))
        } else {
            Ok(out)
        }
    }

    fn string_or_ident(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.peek() {
                        Some(c) if c == q => {
                            self.pos += 1;
                            return Ok(out);
                        }
                        Some('\\') => {
                            self.pos += 1;
                            if let Some(c) = self.peek() {
                                out.push(c);
                                self.pos += 1;
                            }
                        }
                        Some(c) => {
                            out.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated string")),
                    }
                }
            }
            _ => self.ident(),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<LocationPath>, String> {
        let mut paths = Vec::new();
        loop {
            self.skip_ws();
            paths.push(self.parse_complex()?);
            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                None => return Ok(paths),
                Some(c) => return Err(self.error(&format!("unexpected {c:?}"))),
            }
        }
    }

    fn parse_complex(&mut self) -> Result<LocationPath, String> {
        let first = self.parse_compound()?;
        let mut steps = compound_steps(Combinator::Descendant, first);

        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.peek() {
                Some('>') => Combinator::Child,
                Some('+') => Combinator::NextSibling,
                Some('~') => Combinator::SubsequentSibling,
                Some(',') | None => break,
                Some(_) if had_ws => Combinator::Descendant,
                Some(c) => return Err(self.error(&format!("unexpected {c:?}"))),
            };
            if combinator != Combinator::Descendant {
                self.pos += 1;
                self.skip_ws();
            }
            let compound = self.parse_compound()?;
            steps.extend(compound_steps(combinator, compound));
        }

        Ok(LocationPath {
            absolute: true,
            steps,
        })
    }

    fn parse_compound(&mut self) -> Result<Compound, String> {
        let mut test = NodeTest::AnyName;
        let mut conditions = Vec::new();
        let start = self.pos;

        if self.eat('*') {
            test = NodeTest::AnyName;
        } else if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_' || c == '\\') {
            test = NodeTest::Name(self.ident()?.to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    conditions.push(Expr::AttrMatch {
                        name: "id".to_string(),
                        op: AttrOp::Equals,
                        value: self.ident()?,
                    });
                }
                Some('.') => {
                    self.pos += 1;
                    conditions.push(Expr::AttrMatch {
                        name: "class".to_string(),
                        op: AttrOp::Word,
                        value: self.ident()?,
                    });
                }
                Some('[') => {
                    self.pos += 1;
                    conditions.push(self.parse_attribute()?);
                }
                Some(':') => {
                    self.pos += 1;
                    conditions.push(self.parse_pseudo()?);
                }
                _ => break,
            }
        }

        if self.pos == start {
            return Err(self.error("expected a selector"));
        }
        Ok(Compound { test, conditions })
    }

    fn parse_attribute(&mut self) -> Result<Expr, String> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(Expr::AttrMatch {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                });
            }
            Some('=') => AttrOp::Equals,
            Some('~') => AttrOp::Word,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('*') => AttrOp::Contains,
            Some('|') => AttrOp::DashMatch,
            _ => return Err(self.error("expected an attribute operator")),
        };
        self.pos += 1;
        if op != AttrOp::Equals && !self.eat('=') {
            return Err(self.error("expected '='"));
        }
        self.skip_ws();
        let value = self.string_or_ident()?;
        self.skip_ws();
        if !self.eat(']') {
            return Err(self.error("expected ']'"));
        }
        Ok(Expr::AttrMatch { name, op, value })
    }

    /// `:first-child`, `:last-child`, `:only-child`, `:first-of-type`,
    /// `:last-of-type`, `:only-of-type`, `:nth-child()`, `:nth-last-child()`,
    /// `:nth-of-type()`, `:nth-last-of-type()`, `:empty`, `:root` and
    /// `:not(compound)`.
    fn parse_pseudo(&mut self) -> Result<Expr, String> {
        let name = self.ident()?.to_ascii_lowercase();
        let nth = |a: i64, b: i64, from_end: bool, of_type: bool| Expr::NthChild {
            a,
            b,
            from_end,
            of_type,
        };
        let simple = match name.as_str() {
            "first-child" => Some(nth(0, 1, false, false)),
            "last-child" => Some(nth(0, 1, true, false)),
            "first-of-type" => Some(nth(0, 1, false, true)),
            "last-of-type" => Some(nth(0, 1, true, true)),
            "only-child" => Some(Expr::binary(
                nth(0, 1, false, false),
                BinaryOp::And,
                nth(0, 1, true, false),
            )),
            "only-of-type" => Some(Expr::binary(
                nth(0, 1, false, true),
                BinaryOp::And,
                nth(0, 1, true, true),
            )),
            "empty" => Some(Expr::Empty),
            "root" => Some(Expr::Function(
                "not".to_string(),
                vec![Expr::Path(LocationPath {
                    absolute: false,
                    steps: vec![Step::new(Axis::Parent, NodeTest::AnyName)],
                })],
            )),
            _ => None,
        };
        if let Some(expr) = simple {
            return Ok(expr);
        }

        if !self.eat('(') {
            return Err(self.error(&format!("unsupported pseudo-class :{name}")));
        }
        self.skip_ws();
        let expr = match name.as_str() {
            "nth-child" | "nth-last-child" | "nth-of-type" | "nth-last-of-type" => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c != ')') {
                    self.pos += 1;
                }
                let arg: String = self.chars[start..self.pos].iter().collect();
                let (a, b) = parse_nth(arg.trim()).ok_or_else(|| self.error("invalid an+b expression"))?;
                nth(a, b, name.contains("last"), name.ends_with("of-type"))
            }
            "not" => {
                let inner = self.parse_compound()?;
                let mut step = Step::new(Axis::SelfNode, inner.test);
                step.predicates = inner.conditions;
                Expr::Function(
                    "not".to_string(),
                    vec![Expr::Path(LocationPath {
                        absolute: false,
                        steps: vec![step],
                    })],
                )
            }
            _ => return Err(self.error(&format!("unsupported pseudo-class :{name}()"))),
        };
        self.skip_ws();
        if !self.eat(')') {
            return Err(self.error("expected ')'"));
        }
        Ok(expr)
    }
}

fn compound_steps(combinator: Combinator, compound: Compound) -> Vec<Step> {
    let Compound { test, conditions } = compound;
    match combinator {
        Combinator::Descendant | Combinator::Child | Combinator::SubsequentSibling => {
            let axis = match combinator {
                Combinator::Descendant => Axis::Descendant,
                Combinator::Child => Axis::Child,
                _ => Axis::FollowingSibling,
            };
            let mut step = Step::new(axis, test);
            step.predicates = conditions;
            vec![step]
        }
        Combinator::NextSibling => {
            let mut adjacent = Step::new(Axis::FollowingSibling, NodeTest::AnyName);
            adjacent.predicates.push(Expr::Number(1.0));
            let mut check = Step::new(Axis::SelfNode, test);
            check.predicates = conditions;
            vec![adjacent, check]
        }
    }
}

/// Parse `an+b`, `odd`, `even` or a bare integer.
fn parse_nth(arg: &str) -> Option<(i64, i64)> {
    let arg: String = arg.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_lowercase();
    match arg.as_str() {
        "odd" => return Some((2, 1)),
        "even" => return Some((2, 0)),
        _ => {}
    }
    let Some(n_pos) = arg.find('n') else {
        return arg.parse().ok().map(|b| (0, b));
    };
    let a = match &arg[..n_pos] {
        "" | "+" => 1,
        "-" => -1,
        coef => coef.parse().ok()?,
    };
    let rest = &arg[n_pos + 1..];
    let b = if rest.is_empty() {
        0
    } else {
        rest.strip_prefix('+').unwrap_or(rest).parse().ok()?
    };
    Some((a, b))
}

/// Compile a CSS selector list.
pub fn compile(source: &str) -> Result<Expr, String> {
    let mut parser = Parser::new(source);
    let mut paths = parser.parse_list()?;
    if paths.len() == 1 {
        if let Some(path) = paths.pop() {
            return Ok(Expr::Path(path));
        }
    }
    Ok(Expr::Union(paths.into_iter().map(Expr::Path).collect()))
}
