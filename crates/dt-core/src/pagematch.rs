//! `<match>` predicates: classify a request/response pair into rule classes.

use std::collections::HashMap;
use std::fmt;

use crate::error::{AbortTheme, SourceLocation, SyntaxError};
use crate::log::ThemeLog;
use crate::stringmatch::{HeaderMatcher, MatchKind, StringMatcher};
use crate::types::{HeaderMap, Request};

// ============================================================================
// Hooks
// ============================================================================

/// What an extension hook decided about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookVerdict {
    Reject,
    Accept,
    AddClasses(Vec<String>),
}

/// Host-supplied predicate referenced from `<match hook="name">`.
pub trait MatchHook: Send + Sync {
    fn check(&self, request: &Request, response_headers: &HeaderMap, log: &mut ThemeLog) -> HookVerdict;
}

impl<F> MatchHook for F
where
    F: Fn(&Request, &HeaderMap) -> HookVerdict + Send + Sync,
{
    fn check(&self, request: &Request, response_headers: &HeaderMap, _log: &mut ThemeLog) -> HookVerdict {
        self(request, response_headers)
    }
}

/// Named hooks plus the gate that decides whether any of them may run.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Box<dyn MatchHook>>,
    allowed: bool,
}

impl HookRegistry {
    pub fn new(allowed: bool) -> Self {
        Self {
            hooks: HashMap::new(),
            allowed,
        }
    }

    pub fn register(&mut self, name: impl Into<String>, hook: impl MatchHook + 'static) {
        self.hooks.insert(name.into(), Box::new(hook));
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn set_allowed(&mut self, allowed: bool) {
        self.allowed = allowed;
    }

    fn get(&self, name: &str) -> Option<&dyn MatchHook> {
        self.hooks.get(name).map(|h| h.as_ref())
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.hooks.keys().collect();
        names.sort();
        f.debug_struct("HookRegistry")
            .field("hooks", &names)
            .field("allowed", &self.allowed)
            .finish()
    }
}

// ============================================================================
// Match
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    No,
    Yes,
    /// Matched, and a hook contributed these classes on top of the declared ones.
    Classes(Vec<String>),
}

impl MatchOutcome {
    pub fn matched(&self) -> bool {
        !matches!(self, MatchOutcome::No)
    }
}

#[derive(Debug, Clone)]
pub struct Match {
    pub classes: Vec<String>,
    pub abort: bool,
    pub last: bool,
    pub path: Option<StringMatcher>,
    pub domain: Option<StringMatcher>,
    pub request_header: Option<HeaderMatcher>,
    pub response_header: Option<HeaderMatcher>,
    pub environ: Option<HeaderMatcher>,
    pub hook: Option<String>,
    pub location: Option<SourceLocation>,
}

impl Match {
    /// Default kinds for patterns that carry no `kind:` prefix.
    pub const PATH_DEFAULT: MatchKind = MatchKind::Path;
    pub const DOMAIN_DEFAULT: MatchKind = MatchKind::Wildcard;
    pub const HEADER_DEFAULT: MatchKind = MatchKind::Exact;

    pub fn new(classes: Vec<String>, abort: bool, hook: Option<String>) -> Result<Self, SyntaxError> {
        if !abort && classes.is_empty() && hook.is_none() {
            return Err(SyntaxError::new("you must provide some classes in the class attribute"));
        }
        if abort && !classes.is_empty() {
            return Err(SyntaxError::new(format!(
                "you cannot provide both abort=\"1\" and class=\"{}\"",
                classes.join(" ")
            )));
        }
        Ok(Self {
            classes,
            abort,
            last: false,
            path: None,
            domain: None,
            request_header: None,
            response_header: None,
            environ: None,
            hook,
            location: None,
        })
    }

    fn class_label(&self) -> String {
        if self.abort {
            "abort".to_string()
        } else if self.classes.len() == 1 {
            self.classes[0].clone()
        } else {
            format!("({})", self.classes.join(" "))
        }
    }

    /// Check every configured axis in order; the first failing one decides.
    pub fn evaluate(
        &self,
        request: &Request,
        response_headers: &HeaderMap,
        hooks: Option<&HookRegistry>,
        log: &mut ThemeLog,
    ) -> MatchOutcome {
        let label = self.class_label();
        if let Some(path) = &self.path {
            if !path.matches(&request.path) {
                log.debug(
                    self,
                    format!(
                        "skipping class {label} because request URL ({}) does not match path=\"{path}\"",
                        request.path
                    ),
                );
                return MatchOutcome::No;
            }
        }
        if let Some(domain) = &self.domain {
            if !domain.matches(&request.host) {
                log.debug(
                    self,
                    format!(
                        "skipping class {label} because request domain ({}) does not match domain=\"{domain}\"",
                        request.host
                    ),
                );
                return MatchOutcome::No;
            }
        }
        if let Some(matcher) = &self.request_header {
            let (ok, names) = matcher.evaluate(&request.headers);
            if !ok {
                log.debug(
                    self,
                    format!(
                        "skipping class {label} because request headers {} do not match request-header=\"{matcher}\"",
                        names.join(", ")
                    ),
                );
                return MatchOutcome::No;
            }
        }
        if let Some(matcher) = &self.response_header {
            let (ok, names) = matcher.evaluate(response_headers);
            if !ok {
                log.debug(
                    self,
                    format!(
                        "skipping class {label} because the response headers {} do not match response-header=\"{matcher}\"",
                        names.join(", ")
                    ),
                );
                return MatchOutcome::No;
            }
        }
        if let Some(matcher) = &self.environ {
            let (ok, keys) = matcher.evaluate(&request.environ);
            if !ok {
                log.debug(
                    self,
                    format!(
                        "skipping class {label} because the request environ (keys {}) did not match environ=\"{matcher}\"",
                        keys.join(", ")
                    ),
                );
                return MatchOutcome::No;
            }
        }
        match &self.hook {
            Some(name) => self.run_hook(name, request, response_headers, hooks, log),
            None => MatchOutcome::Yes,
        }
    }

    fn run_hook(
        &self,
        name: &str,
        request: &Request,
        response_headers: &HeaderMap,
        hooks: Option<&HookRegistry>,
        log: &mut ThemeLog,
    ) -> MatchOutcome {
        let Some(registry) = hooks.filter(|r| r.is_allowed()) else {
            log.error(self, format!("hook {name:?} was not run because hooks are disabled"));
            return MatchOutcome::Yes;
        };
        let Some(hook) = registry.get(name) else {
            log.error(self, format!("no hook named {name:?} is registered"));
            return MatchOutcome::Yes;
        };
        match hook.check(request, response_headers, log) {
            HookVerdict::Reject => {
                log.debug(self, format!("skipping class {} because hook {name:?} rejected the request", self.class_label()));
                MatchOutcome::No
            }
            HookVerdict::Accept => MatchOutcome::Yes,
            HookVerdict::AddClasses(classes) => MatchOutcome::Classes(classes),
        }
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<match")?;
        if !self.classes.is_empty() {
            write!(f, " class=\"{}\"", self.classes.join(" "))?;
        }
        if let Some(path) = &self.path {
            write!(f, " path=\"{path}\"")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, " domain=\"{domain}\"")?;
        }
        for (attr, value) in [
            ("request-header", &self.request_header),
            ("response-header", &self.response_header),
            ("environ", &self.environ),
        ] {
            if let Some(value) = value {
                write!(f, " {attr}=\"{value}\"")?;
            }
        }
        if let Some(hook) = &self.hook {
            write!(f, " hook=\"{hook}\"")?;
        }
        if self.abort {
            f.write_str(" abort=\"1\"")?;
        }
        if self.last {
            f.write_str(" last=\"1\"")?;
        }
        f.write_str(" />")
    }
}

/// Run `matches` in order and collect the distinct classes they yield.
///
/// A matching `abort` match fails the whole pass; a matching `last` match
/// stops it after its classes are added.
pub fn run_matches(
    matches: &[Match],
    request: &Request,
    response_headers: &HeaderMap,
    hooks: Option<&HookRegistry>,
    log: &mut ThemeLog,
) -> Result<Vec<String>, AbortTheme> {
    let mut classes: Vec<String> = Vec::new();
    for (index, m) in matches.iter().enumerate() {
        let outcome = m.evaluate(request, response_headers, hooks, log);
        if !outcome.matched() {
            continue;
        }
        if m.abort {
            log.debug(m, "<match> matched request, aborting");
            return Err(AbortTheme::new("<match> matched request, aborting"));
        }
        let extra = match outcome {
            MatchOutcome::Classes(extra) => extra,
            _ => Vec::new(),
        };
        let added: Vec<&String> = m.classes.iter().chain(extra.iter()).collect();
        log.debug(
            m,
            format!(
                "<match> matched request, adding classes {}",
                added.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
            ),
        );
        for class in added {
            if !classes.contains(class) {
                classes.push(class.clone());
            }
        }
        if m.last {
            log.debug(
                m,
                format!("stopping matches (skipping {} matches)", matches.len() - index - 1),
            );
            break;
        }
    }
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn path_match(class: &str, pattern: &str) -> Match {
        let mut m = Match::new(classes(&[class]), false, None).unwrap();
        m.path = Some(StringMatcher::compile(pattern, Some(Match::PATH_DEFAULT)).unwrap());
        m
    }

    #[test]
    fn test_construction_rules() {
        assert!(Match::new(vec![], false, None).is_err());
        assert!(Match::new(classes(&["a"]), true, None).is_err());
        assert!(Match::new(vec![], true, None).is_ok());
        assert!(Match::new(vec![], false, Some("h".into())).is_ok());
    }

    #[test]
    fn test_axes() {
        let req = Request::new("http://www.example.com:8080/blog/post")
            .unwrap()
            .with_header("User-Agent", "Mozilla/5.0")
            .with_environ("REMOTE_USER", "bob");
        let mut resp_headers = HeaderMap::new();
        resp_headers.insert("Content-Type", "text/html");
        let mut log = ThemeLog::new();

        let mut m = path_match("blog", "/blog");
        m.domain = Some(StringMatcher::compile("*.example.com", Some(Match::DOMAIN_DEFAULT)).unwrap());
        m.request_header = Some(HeaderMatcher::compile("user-agent: contains:Mozilla", None).unwrap());
        m.response_header = Some(HeaderMatcher::compile("Content-Type: text/html", Some(Match::HEADER_DEFAULT)).unwrap());
        m.environ = Some(HeaderMatcher::compile("REMOTE_USER: bob", Some(Match::HEADER_DEFAULT)).unwrap());
        assert_eq!(m.evaluate(&req, &resp_headers, None, &mut log), MatchOutcome::Yes);

        m.environ = Some(HeaderMatcher::compile("remote_user: bob", Some(Match::HEADER_DEFAULT)).unwrap());
        assert_eq!(m.evaluate(&req, &resp_headers, None, &mut log), MatchOutcome::No);
        assert!(log.entries().last().unwrap().message.contains("environ"));
    }

    #[test]
    fn test_default_classes_accumulate_distinct() {
        let req = Request::new("http://example.com/a/b").unwrap();
        let mut log = ThemeLog::new();
        let matches = vec![
            path_match("x", "/a"),
            path_match("y", "/nope"),
            path_match("x", "/a/b"),
            path_match("z", "/"),
        ];
        let found = run_matches(&matches, &req, &HeaderMap::new(), None, &mut log).unwrap();
        assert_eq!(found, classes(&["x", "z"]));
    }

    #[test]
    fn test_last_stops_matching() {
        let req = Request::new("http://example.com/").unwrap();
        let mut first = path_match("a", "/");
        first.last = true;
        let second = path_match("b", "/");
        let mut log = ThemeLog::new();
        let found = run_matches(&[first, second], &req, &HeaderMap::new(), None, &mut log).unwrap();
        assert_eq!(found, classes(&["a"]));
    }

    #[test]
    fn test_abort() {
        let req = Request::new("http://example.com/admin").unwrap();
        let mut abort = Match::new(vec![], true, None).unwrap();
        abort.path = Some(StringMatcher::compile("exact:/admin", Some(Match::PATH_DEFAULT)).unwrap());
        let mut log = ThemeLog::new();
        let result = run_matches(&[path_match("a", "/"), abort], &req, &HeaderMap::new(), None, &mut log);
        assert!(result.is_err());
    }

    #[test]
    fn test_hooks() {
        let req = Request::new("http://example.com/").unwrap();
        let mut registry = HookRegistry::new(true);
        registry.register("mobile", |_: &Request, _: &HeaderMap| HookVerdict::AddClasses(vec!["mobile".into()]));
        registry.register("never", |_: &Request, _: &HeaderMap| HookVerdict::Reject);

        let mut log = ThemeLog::new();
        let hooked = Match::new(classes(&["base"]), false, Some("mobile".into())).unwrap();
        let found = run_matches(&[hooked.clone()], &req, &HeaderMap::new(), Some(&registry), &mut log).unwrap();
        assert_eq!(found, classes(&["base", "mobile"]));

        let rejected = Match::new(classes(&["r"]), false, Some("never".into())).unwrap();
        assert_eq!(rejected.evaluate(&req, &HeaderMap::new(), Some(&registry), &mut log), MatchOutcome::No);

        // Gated off: error logged, the declarative result stands.
        registry.set_allowed(false);
        assert_eq!(rejected.evaluate(&req, &HeaderMap::new(), Some(&registry), &mut log), MatchOutcome::Yes);
        assert_eq!(log.entries().last().unwrap().level, crate::log::Level::Error);

        let unknown = Match::new(classes(&["u"]), false, Some("missing".into())).unwrap();
        registry.set_allowed(true);
        assert_eq!(unknown.evaluate(&req, &HeaderMap::new(), Some(&registry), &mut log), MatchOutcome::Yes);
    }

    #[test]
    fn test_display() {
        let mut m = path_match("blog", "/blog");
        m.last = true;
        assert_eq!(m.to_string(), "<match class=\"blog\" path=\"path:/blog\" last=\"1\" />");
    }
}
