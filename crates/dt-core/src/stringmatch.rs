//! String and header matchers used to classify pages.
//!
//! A pattern is written `kind:pattern`, for example `wildcard:*.example.com`
//! or `path:/blog`. When the kind is omitted the caller's default applies.

use std::collections::BTreeMap;
use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::SyntaxError;
use crate::types::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    Wildcard,
    WildcardInsensitive,
    Regex,
    Path,
    Exact,
    ExactInsensitive,
    Contains,
    ContainsInsensitive,
    Boolean,
}

impl MatchKind {
    pub const ALL: [MatchKind; 9] = [
        MatchKind::Wildcard,
        MatchKind::WildcardInsensitive,
        MatchKind::Regex,
        MatchKind::Path,
        MatchKind::Exact,
        MatchKind::ExactInsensitive,
        MatchKind::Contains,
        MatchKind::ContainsInsensitive,
        MatchKind::Boolean,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MatchKind::Wildcard => "wildcard",
            MatchKind::WildcardInsensitive => "wildcard-insensitive",
            MatchKind::Regex => "regex",
            MatchKind::Path => "path",
            MatchKind::Exact => "exact",
            MatchKind::ExactInsensitive => "exact-insensitive",
            MatchKind::Contains => "contains",
            MatchKind::ContainsInsensitive => "contains-insensitive",
            MatchKind::Boolean => "boolean",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone)]
enum Compiled {
    Regex(Regex),
    /// Literal, pre-lowercased for the insensitive kinds.
    Literal(String),
    Boolean(bool),
}

/// A compiled single-string predicate.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    kind: MatchKind,
    pattern: String,
    compiled: Compiled,
}

/// Split a leading `kind:` prefix made of `[a-z_-]`.
fn split_kind(s: &str) -> Option<(&str, &str)> {
    let (head, rest) = s.split_once(':')?;
    let valid = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '_' || c == '-');
    valid.then_some((head, rest))
}

impl StringMatcher {
    /// Compile `kind:pattern`, falling back to `default` when no kind is given.
    pub fn compile(s: &str, default: Option<MatchKind>) -> Result<Self, SyntaxError> {
        let (kind, pattern) = match split_kind(s) {
            Some((name, rest)) => {
                let kind = MatchKind::from_name(name).ok_or_else(|| {
                    SyntaxError::new(format!("the match type {:?} is not valid", format!("{name}:")))
                })?;
                (kind, rest.trim_start())
            }
            None => {
                let kind = default.ok_or_else(|| {
                    SyntaxError::new(format!(
                        "you must provide a match type (like type:) in the pattern {s:?}"
                    ))
                })?;
                (kind, s)
            }
        };
        Self::with_kind(kind, pattern)
    }

    pub fn with_kind(kind: MatchKind, pattern: &str) -> Result<Self, SyntaxError> {
        let compiled = match kind {
            MatchKind::Wildcard => Compiled::Regex(compile_regex(&wildcard_to_regex(pattern), false)?),
            MatchKind::WildcardInsensitive => {
                Compiled::Regex(compile_regex(&wildcard_to_regex(pattern), true)?)
            }
            MatchKind::Regex => Compiled::Regex(compile_regex(&format!("^(?:{pattern})"), false)?),
            MatchKind::Path => Compiled::Literal(pattern.trim_end_matches('/').to_string()),
            MatchKind::Exact | MatchKind::Contains => Compiled::Literal(pattern.to_string()),
            MatchKind::ExactInsensitive | MatchKind::ContainsInsensitive => {
                Compiled::Literal(pattern.to_lowercase())
            }
            MatchKind::Boolean => {
                let p = pattern.trim();
                let wanted = if p.is_empty() {
                    true
                } else if p.eq_ignore_ascii_case("not") {
                    false
                } else {
                    parse_bool(p).ok_or_else(|| {
                        SyntaxError::new(format!("boolean matcher expects true/false/not, got {p:?}"))
                    })?
                };
                Compiled::Boolean(wanted)
            }
        };
        Ok(Self {
            kind,
            pattern: pattern.to_string(),
            compiled,
        })
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, value: &str) -> bool {
        match (&self.compiled, self.kind) {
            (Compiled::Regex(re), _) => re.is_match(value),
            (Compiled::Boolean(wanted), _) => parse_bool(value).unwrap_or(false) == *wanted,
            (Compiled::Literal(p), MatchKind::Path) => {
                value == p
                    || value
                        .strip_prefix(p.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            (Compiled::Literal(p), MatchKind::Exact) => value == p,
            (Compiled::Literal(p), MatchKind::ExactInsensitive) => value.to_lowercase() == *p,
            (Compiled::Literal(p), MatchKind::Contains) => value.contains(p.as_str()),
            (Compiled::Literal(p), MatchKind::ContainsInsensitive) => {
                value.to_lowercase().contains(p.as_str())
            }
            (Compiled::Literal(_), _) => false,
        }
    }

    /// The literal prefix a matching value is known to start with, for the
    /// kinds that have one.
    pub fn strip_prefix(&self) -> Option<&str> {
        match (&self.compiled, self.kind) {
            (Compiled::Literal(p), MatchKind::Path | MatchKind::Exact) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for StringMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.name(), self.pattern)
    }
}

fn compile_regex(source: &str, insensitive: bool) -> Result<Regex, SyntaxError> {
    RegexBuilder::new(source)
        .case_insensitive(insensitive)
        .build()
        .map_err(|e| SyntaxError::new(format!("invalid regular expression {source:?}: {e}")))
}

/// Translate a shell glob (`*`, `?`, `[seq]`, `[!seq]`) into an anchored regex.
pub fn wildcard_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut j = i;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }
                if j >= chars.len() {
                    out.push_str(r"\[");
                } else {
                    let mut class: String = chars[i..j].iter().collect();
                    i = j + 1;
                    class = class.replace('\\', r"\\");
                    if let Some(rest) = class.strip_prefix('!') {
                        class = format!("^{rest}");
                    } else if class.starts_with('^') {
                        class = format!(r"\{class}");
                    }
                    out.push('[');
                    out.push_str(&class);
                    out.push(']');
                }
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push_str(r"\z");
    out
}

/// Parse the usual spellings of a boolean.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Header matching
// ============================================================================

/// Something headers can be looked up in: HTTP headers (case-insensitive)
/// or the server environment (case-sensitive).
pub trait HeaderSource {
    fn header_value(&self, name: &str) -> Option<String>;
    fn header_names(&self) -> Vec<String>;
}

impl HeaderSource for HeaderMap {
    fn header_value(&self, name: &str) -> Option<String> {
        self.get_joined(name)
    }

    fn header_names(&self) -> Vec<String> {
        self.names().into_iter().map(str::to_string).collect()
    }
}

impl HeaderSource for BTreeMap<String, String> {
    fn header_value(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }

    fn header_names(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

/// `Header: pattern`, where the header name may itself contain `*`.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    header: String,
    name_pattern: Option<Regex>,
    pattern: StringMatcher,
}

impl HeaderMatcher {
    pub fn compile(s: &str, default: Option<MatchKind>) -> Result<Self, SyntaxError> {
        let (header, pattern) = s.split_once(':').ok_or_else(|| {
            SyntaxError::new(format!(
                "a header match must look like 'Header: pattern'; there is no header in {s:?}"
            ))
        })?;
        let header = header.trim().to_string();
        let pattern = StringMatcher::compile(pattern.trim_start(), default)?;
        let name_pattern = if header.contains('*') {
            Some(compile_regex(&wildcard_to_regex(&header), true)?)
        } else {
            None
        };
        Ok(Self {
            header,
            name_pattern,
            pattern,
        })
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Returns whether a header matched and the header names considered.
    /// A missing header is matched as the empty string.
    pub fn evaluate<S: HeaderSource + ?Sized>(&self, source: &S) -> (bool, Vec<String>) {
        let Some(name_re) = &self.name_pattern else {
            let value = source.header_value(&self.header).unwrap_or_default();
            return (self.pattern.matches(&value), vec![self.header.clone()]);
        };
        let mut considered = Vec::new();
        for name in source.header_names() {
            if !name_re.is_match(&name) {
                continue;
            }
            let value = source.header_value(&name).unwrap_or_default();
            if self.pattern.matches(&value) {
                return (true, vec![name]);
            }
            considered.push(name);
        }
        (false, considered)
    }
}

impl fmt::Display for HeaderMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.header, self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(s: &str) -> StringMatcher {
        StringMatcher::compile(s, None).unwrap()
    }

    #[test]
    fn test_wildcard() {
        assert!(m("wildcard:*.example.com").matches("www.example.com"));
        assert!(!m("wildcard:*.example.com").matches("www.EXAMPLE.com"));
        assert!(m("wildcard-insensitive:*.example.com").matches("www.EXAMPLE.com"));
        assert!(m("wildcard:file?.[ch]").matches("file1.c"));
        assert!(!m("wildcard:file?.[!ch]").matches("file1.c"));
        assert!(!m("wildcard:abc").matches("abcd"));
    }

    #[test]
    fn test_regex_anchored_at_start() {
        assert!(m("regex:/blog/\\d+").matches("/blog/12/comments"));
        assert!(!m("regex:\\d+").matches("/blog/12"));
        assert!(StringMatcher::compile("regex:(unclosed", None).is_err());
    }

    #[test]
    fn test_path() {
        let p = m("path:/blog/");
        assert!(p.matches("/blog"));
        assert!(p.matches("/blog/post"));
        assert!(!p.matches("/blogger"));
        assert_eq!(p.strip_prefix(), Some("/blog"));
    }

    #[test]
    fn test_exact_and_contains() {
        assert!(m("exact:/admin").matches("/admin"));
        assert!(!m("exact:/admin").matches("/Admin"));
        assert!(m("exact-insensitive:/admin").matches("/Admin"));
        assert!(m("contains:min").matches("/admin"));
        assert!(m("contains-insensitive:MIN").matches("/admin"));
    }

    #[test]
    fn test_boolean() {
        assert!(m("boolean:").matches("yes"));
        assert!(!m("boolean:").matches("garbage"));
        assert!(m("boolean:not").matches("0"));
        assert!(m("boolean:not").matches("garbage"));
    }

    #[test]
    fn test_default_and_errors() {
        let p = StringMatcher::compile("/foo", Some(MatchKind::Path)).unwrap();
        assert_eq!(p.kind(), MatchKind::Path);
        assert_eq!(p.to_string(), "path:/foo");
        assert!(StringMatcher::compile("/foo", None).is_err());
        assert!(StringMatcher::compile("bogus:foo", None).is_err());
        assert_eq!(m("EXACT: x").pattern(), "x");
    }

    #[test]
    fn test_header_matcher() {
        let mut headers = HeaderMap::new();
        headers.append("X-Requested-With", "XMLHttpRequest");
        headers.append("Content-Type", "text/html");

        let hm = HeaderMatcher::compile("x-requested-with: exact:XMLHttpRequest", None).unwrap();
        assert_eq!(hm.evaluate(&headers), (true, vec!["x-requested-with".to_string()]));

        let missing = HeaderMatcher::compile("X-Missing: exact:", None).unwrap();
        assert!(missing.evaluate(&headers).0);

        let wild = HeaderMatcher::compile("X-*: contains:Http", None).unwrap();
        assert_eq!(wild.evaluate(&headers), (true, vec!["X-Requested-With".to_string()]));

        let wild_miss = HeaderMatcher::compile("X-*: exact:nope", None).unwrap();
        assert_eq!(wild_miss.evaluate(&headers), (false, vec!["X-Requested-With".to_string()]));

        assert!(HeaderMatcher::compile("no colon here", Some(MatchKind::Exact)).is_err());
    }

    #[test]
    fn test_environ_is_case_sensitive() {
        let mut environ = BTreeMap::new();
        environ.insert("REMOTE_USER".to_string(), "bob".to_string());
        let hm = HeaderMatcher::compile("REMOTE_USER: bob", Some(MatchKind::Exact)).unwrap();
        assert!(hm.evaluate(&environ).0);
        let lower = HeaderMatcher::compile("remote_user: bob", Some(MatchKind::Exact)).unwrap();
        assert!(!lower.evaluate(&environ).0);
    }
}
