//! XPath subset: lexer and recursive-descent parser.
//!
//! Supported: absolute and relative location paths, `//`, `.`, `..`, `@`,
//! explicit axes, name / `*` / `text()` / `node()` / `comment()` tests,
//! predicates, `|`, comparison, boolean and arithmetic operators, and a small
//! function library (see [`FUNCTIONS`]). Variables, namespaces and filter
//! expressions on parenthesized paths are not supported.

use super::ast::{Axis, BinaryOp, Expr, LocationPath, NodeTest, Step};

/// Supported functions with their (min, max) arity.
pub const FUNCTIONS: &[(&str, usize, usize)] = &[
    ("position", 0, 0),
    ("last", 0, 0),
    ("count", 1, 1),
    ("not", 1, 1),
    ("true", 0, 0),
    ("false", 0, 0),
    ("boolean", 1, 1),
    ("string", 0, 1),
    ("number", 0, 1),
    ("concat", 2, usize::MAX),
    ("contains", 2, 2),
    ("starts-with", 2, 2),
    ("ends-with", 2, 2),
    ("normalize-space", 0, 1),
    ("string-length", 0, 1),
    ("name", 0, 1),
    ("local-name", 0, 1),
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DoubleDot,
    At,
    Pipe,
    Plus,
    Minus,
    Star,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    DoubleColon,
    Number(f64),
    Str(String),
    Name(String),
    Eof,
}

// ============================================================================
// Lexer
// ============================================================================

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let (token, width) = match c {
            '/' if next == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            '.' if next == Some('.') => (Token::DoubleDot, 2),
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => read_number(&chars, i),
            '.' => (Token::Dot, 1),
            '@' => (Token::At, 1),
            '|' => (Token::Pipe, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '=' => (Token::Eq, 1),
            '!' if next == Some('=') => (Token::NotEq, 2),
            '<' if next == Some('=') => (Token::LtEq, 2),
            '<' => (Token::Lt, 1),
            '>' if next == Some('=') => (Token::GtEq, 2),
            '>' => (Token::Gt, 1),
            '(' => (Token::LeftParen, 1),
            ')' => (Token::RightParen, 1),
            '[' => (Token::LeftBracket, 1),
            ']' => (Token::RightBracket, 1),
            ',' => (Token::Comma, 1),
            ':' if next == Some(':') => (Token::DoubleColon, 2),
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| format!("unterminated string literal at offset {i}"))?;
                let value: String = chars[i + 1..i + 1 + end].iter().collect();
                (Token::Str(value), end + 2)
            }
            '0'..='9' => read_number(&chars, i),
            _ if is_name_start(c) => {
                let len = chars[i..].iter().take_while(|&&ch| is_name_char(ch)).count();
                let name: String = chars[i..i + len].iter().collect();
                (Token::Name(name), len)
            }
            _ => return Err(format!("unexpected character {c:?} at offset {i}")),
        };
        tokens.push(token);
        i += width;
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> (Token, usize) {
    let mut end = start;
    let mut seen_dot = false;
    while end < chars.len() {
        let c = chars[end];
        if c.is_ascii_digit() {
            end += 1;
        } else if c == '.' && !seen_dot && chars.get(end + 1).is_some_and(|n| n.is_ascii_digit()) {
            seen_dot = true;
            end += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..end].iter().collect();
    (Token::Number(text.parse().unwrap_or(f64::NAN)), end - start)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos + 1).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        if *self.current() == token {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", token, self.current()))
        }
    }

    /// Operator keywords are only keywords where an operator may appear,
    /// so `//div` and `//or` still parse as element names.
    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.current(), Token::Name(n) if n == word)
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.at_keyword("or") {
            self.advance();
            left = Expr::binary(left, BinaryOp::Or, self.parse_and()?);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_equality()?;
        while self.at_keyword("and") {
            self.advance();
            left = Expr::binary(left, BinaryOp::And, self.parse_equality()?);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.current() {
                Token::Eq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                _ => break,
            };
            self.advance();
            left = Expr::binary(left, op, self.parse_relational()?);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.current() {
                Token::Lt => BinaryOp::Lt,
                Token::LtEq => BinaryOp::LtEq,
                Token::Gt => BinaryOp::Gt,
                Token::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            self.advance();
            left = Expr::binary(left, op, self.parse_additive()?);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            left = Expr::binary(left, op, self.parse_multiplicative()?);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Name(n) if n == "div" => BinaryOp::Div,
                Token::Name(n) if n == "mod" => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            left = Expr::binary(left, op, self.parse_unary()?);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if *self.current() == Token::Minus {
            self.advance();
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, String> {
        let first = self.parse_path_expr()?;
        if *self.current() != Token::Pipe {
            return Ok(first);
        }
        let mut parts = vec![first];
        while *self.current() == Token::Pipe {
            self.advance();
            parts.push(self.parse_path_expr()?);
        }
        if !parts.iter().all(Expr::is_node_set) {
            return Err("operands of '|' must be location paths".to_string());
        }
        Ok(Expr::Union(parts))
    }

    fn parse_path_expr(&mut self) -> Result<Expr, String> {
        match self.current().clone() {
            Token::Slash => {
                self.advance();
                let mut path = LocationPath {
                    absolute: true,
                    steps: Vec::new(),
                };
                if self.starts_step() {
                    self.parse_relative_into(&mut path)?;
                }
                Ok(Expr::Path(path))
            }
            Token::DoubleSlash => {
                self.advance();
                let mut path = LocationPath {
                    absolute: true,
                    steps: vec![Step::descendant_or_self()],
                };
                self.parse_relative_into(&mut path)?;
                Ok(Expr::Path(path))
            }
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(s))
            }
            Token::LeftParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::Name(name) if *self.peek() == Token::LeftParen && !is_node_type(&name) => {
                self.advance();
                self.advance();
                let args = self.parse_args()?;
                check_function(&name, args.len())?;
                Ok(Expr::Function(name, args))
            }
            _ if self.starts_step() => {
                let mut path = LocationPath {
                    absolute: false,
                    steps: Vec::new(),
                };
                self.parse_relative_into(&mut path)?;
                Ok(Expr::Path(path))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.current(),
            Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DoubleDot
        )
    }

    fn parse_relative_into(&mut self, path: &mut LocationPath) -> Result<(), String> {
        path.steps.push(self.parse_step()?);
        loop {
            match self.current() {
                Token::Slash => {
                    self.advance();
                    path.steps.push(self.parse_step()?);
                }
                Token::DoubleSlash => {
                    self.advance();
                    path.steps.push(Step::descendant_or_self());
                    path.steps.push(self.parse_step()?);
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step, String> {
        match self.current() {
            Token::Dot => {
                self.advance();
                return Ok(Step::new(Axis::SelfNode, NodeTest::Node));
            }
            Token::DoubleDot => {
                self.advance();
                return Ok(Step::new(Axis::Parent, NodeTest::Node));
            }
            _ => {}
        }

        let mut axis = Axis::Child;
        if *self.current() == Token::At {
            self.advance();
            axis = Axis::Attribute;
        } else if let (Token::Name(name), Token::DoubleColon) = (self.current(), self.peek()) {
            axis = Axis::from_name(name).ok_or_else(|| format!("unsupported axis {name:?}"))?;
            self.advance();
            self.advance();
        }

        let test = match self.current().clone() {
            Token::Star => {
                self.advance();
                NodeTest::AnyName
            }
            Token::Name(name) if *self.peek() == Token::LeftParen => {
                self.advance();
                self.advance();
                self.expect(Token::RightParen)?;
                match name.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => return Err(format!("unsupported node test {name}()")),
                }
            }
            Token::Name(name) => {
                self.advance();
                NodeTest::Name(name.to_ascii_lowercase())
            }
            other => return Err(format!("expected a node test, found {other:?}")),
        };

        let mut step = Step::new(axis, test);
        while *self.current() == Token::LeftBracket {
            self.advance();
            step.predicates.push(self.parse_expr()?);
            self.expect(Token::RightBracket)?;
        }
        Ok(step)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        if *self.current() != Token::RightParen {
            args.push(self.parse_expr()?);
            while *self.current() == Token::Comma {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(Token::RightParen)?;
        Ok(args)
    }
}

fn is_node_type(name: &str) -> bool {
    matches!(name, "node" | "text" | "comment")
}

fn check_function(name: &str, arity: usize) -> Result<(), String> {
    let (_, min, max) = FUNCTIONS
        .iter()
        .find(|(n, _, _)| *n == name)
        .ok_or_else(|| format!("unsupported function {name}()"))?;
    if arity < *min || arity > *max {
        return Err(format!("{name}() called with {arity} argument(s)"));
    }
    Ok(())
}

/// Parse an XPath expression.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    if *parser.current() != Token::Eof {
        return Err(format!("unexpected trailing {:?}", parser.current()));
    }
    Ok(expr)
}

/// Parse an XPath expression that must select nodes.
pub fn compile(input: &str) -> Result<Expr, String> {
    let expr = parse(input)?;
    if !expr.is_node_set() {
        return Err(format!("XPath {input:?} does not select nodes"));
    }
    Ok(expr)
}
