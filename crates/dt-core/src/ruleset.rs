//! The `<ruleset>`: classification, rule selection and themed rendering.
//!
//! One [`RuleSet`] is compiled per ruleset source and shared across requests.
//! [`RuleSet::apply_rules`] is all-or-nothing: every [`AbortTheme`] raised
//! while matching or applying rules is absorbed and the original response is
//! returned untouched.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use url::Url;

use crate::cache::ThemeCache;
use crate::config::ThemeConfig;
use crate::dom::{make_links_absolute, parse_html_bytes, serialize, Child, Document};
use crate::error::{AbortTheme, FetchError, SourceLocation, SyntaxError};
use crate::fetch::ResourceFetcher;
use crate::log::ThemeLog;
use crate::pagematch::{run_matches, HookRegistry, Match};
use crate::rules::{Action, ActionKind, NoMatchPolicy, Rule, RuleEnv, ThemeRef, Transform};
use crate::selector::Selector;
use crate::types::{HeaderMap, Request, Response};

/// Everything outside the ruleset that one application needs.
pub struct ApplyContext<'a> {
    pub config: &'a ThemeConfig,
    pub fetcher: &'a dyn ResourceFetcher,
    pub cache: Option<&'a ThemeCache>,
    pub hooks: Option<&'a HookRegistry>,
}

impl<'a> ApplyContext<'a> {
    pub fn new(config: &'a ThemeConfig, fetcher: &'a dyn ResourceFetcher) -> Self {
        Self {
            config,
            fetcher,
            cache: None,
            hooks: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a ThemeCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_hooks(mut self, hooks: &'a HookRegistry) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The hook registry, if the configuration lets hooks run at all.
    fn active_hooks(&self) -> Option<&'a HookRegistry> {
        self.hooks.filter(|_| self.config.execute_hooks)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub matches: Vec<Match>,
    pub rules: Vec<Rule>,
    /// Class name to indices into `rules`, in registration order.
    pub rules_by_class: HashMap<String, Vec<usize>>,
    pub theme: Option<ThemeRef>,
    pub debug: bool,
    pub location: Option<SourceLocation>,
}

impl RuleSet {
    pub fn new(matches: Vec<Match>, rules: Vec<Rule>, theme: Option<ThemeRef>) -> Self {
        let mut rules_by_class: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            for class in &rule.classes {
                rules_by_class.entry(class.clone()).or_default().push(index);
            }
        }
        Self {
            matches,
            rules,
            rules_by_class,
            theme,
            debug: false,
            location: None,
        }
    }

    /// Page classes for a request, `["default"]` when nothing matched.
    pub fn classify(
        &self,
        request: &Request,
        response: &Response,
        ctx: &ApplyContext<'_>,
        log: &mut ThemeLog,
    ) -> Result<Vec<String>, AbortTheme> {
        let content = parse_html_bytes(&response.body, response.content_type());
        let headers = effective_headers(&response.headers, &content);
        self.classify_headers(request, &headers, ctx, log)
    }

    fn classify_headers(
        &self,
        request: &Request,
        headers: &HeaderMap,
        ctx: &ApplyContext<'_>,
        log: &mut ThemeLog,
    ) -> Result<Vec<String>, AbortTheme> {
        let mut classes = run_matches(&self.matches, request, headers, ctx.active_hooks(), log)?;
        if let Some(value) = headers.get_joined(&ctx.config.page_class_header) {
            log.debug(self, format!("found page class {} in headers", value.trim()));
            add_classes(&mut classes, &value);
        }
        if let Some(value) = request.environ.get(&ctx.config.page_class_environ) {
            log.debug(self, format!("found page class {} in the request environ", value.trim()));
            add_classes(&mut classes, value);
        }
        if classes.is_empty() {
            classes.push(Rule::DEFAULT_CLASS.to_string());
        }
        Ok(classes)
    }

    /// Rules for `classes` in first-seen order, each once, plus the theme
    /// named by the last of them that names one.
    pub fn select_rules(&self, classes: &[String]) -> (Vec<&Rule>, Option<&ThemeRef>) {
        let mut picked: Vec<usize> = Vec::new();
        for class in classes {
            for &index in self.rules_by_class.get(class).into_iter().flatten() {
                if !picked.contains(&index) {
                    picked.push(index);
                }
            }
        }
        let rules: Vec<&Rule> = picked.iter().map(|&i| &self.rules[i]).collect();
        let theme = rules.iter().rev().find_map(|r| r.theme.as_ref());
        (rules, theme)
    }

    /// Theme `response` for `request`. Returns the response unchanged when it
    /// is not HTML, when no theme is configured, or when theming aborts.
    pub fn apply_rules(
        &self,
        request: &Request,
        response: Response,
        ctx: &ApplyContext<'_>,
        log: &mut ThemeLog,
    ) -> Response {
        if !response.is_html() {
            log.debug(
                self,
                format!(
                    "not theming a response of type {}",
                    response.content_type().unwrap_or_default()
                ),
            );
            return response;
        }
        match self.render(request, &response, ctx, log) {
            Ok(Some(body)) => {
                let mime = response
                    .content_type()
                    .and_then(|ct| ct.split(';').next())
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "text/html".to_string());
                let mut themed = response;
                themed.headers.insert("Content-Type", format!("{mime}; charset=utf-8"));
                themed.set_body(body);
                themed
            }
            Ok(None) => response,
            Err(abort) => {
                log.info(self, format!("theming aborted, returning the original response: {}", abort.reason));
                response
            }
        }
    }

    fn render(
        &self,
        request: &Request,
        response: &Response,
        ctx: &ApplyContext<'_>,
        log: &mut ThemeLog,
    ) -> Result<Option<Vec<u8>>, AbortTheme> {
        let mut content = parse_html_bytes(&response.body, response.content_type());
        let headers = effective_headers(&response.headers, &content);
        let classes = self.classify_headers(request, &headers, ctx, log)?;
        let (rules, rule_theme) = self.select_rules(&classes);

        let fallback;
        let theme_ref = match rule_theme.or(self.theme.as_ref()) {
            Some(theme) => theme,
            None => match &ctx.config.default_theme {
                Some(href) => {
                    fallback = ThemeRef {
                        href: href.clone(),
                        location: self.location.clone(),
                    };
                    &fallback
                }
                None => {
                    log.error(self, "no theme has been defined for the request");
                    return Ok(None);
                }
            },
        };

        let theme_url = self.resolve_theme_href(theme_ref, request, log)?;
        let mut theme = self.load_theme(&theme_url, ctx, log)?;

        let env = RuleEnv {
            fetcher: ctx.fetcher,
            base_url: &request.url,
            debug: self.debug || ctx.config.debug,
        };
        let mut run_standard = true;
        for rule in rules {
            log.debug(rule, format!("applying rule for classes {}", rule.classes.join(" ")));
            rule.apply(&mut content, &mut theme, &env, log)?;
            if rule.suppress_standard {
                run_standard = false;
            }
        }
        if run_standard {
            standard_rule()?.apply(&mut content, &mut theme, &env, log)?;
        }

        if theme.doctype().is_none() {
            if let Some(doctype) = content.doctype() {
                let copy = theme.import(&content, doctype);
                let root = theme.root();
                theme.insert_children(root, 0, vec![Child::Node(copy)]);
            }
        }
        theme.clear_content_marks();
        Ok(Some(serialize(&theme).into_bytes()))
    }

    fn resolve_theme_href(&self, theme: &ThemeRef, request: &Request, log: &mut ThemeLog) -> Result<Url, AbortTheme> {
        let here = theme
            .location
            .as_ref()
            .or(self.location.as_ref())
            .map(|l| parent_dir(&l.source).to_string())
            .unwrap_or_default();
        let href = substitute_vars(&theme.href, |name| {
            request
                .environ
                .get(name)
                .cloned()
                .or_else(|| request.headers.get_joined(name))
                .or_else(|| (name == "here").then(|| here.clone()))
        })
        .map_err(|name| {
            log.error(self, format!("no variable {{{name}}} for theme href=\"{}\"", theme.href));
            AbortTheme::new(format!("unknown variable {{{name}}} in theme href"))
        })?;
        if href != theme.href {
            log.debug(self, format!("rewrote theme href=\"{}\" to \"{href}\"", theme.href));
        }
        request.url.join(&href).map_err(|e| {
            log.error(self, format!("cannot resolve theme href=\"{href}\": {e}"));
            AbortTheme::new(format!("bad theme href {href:?}"))
        })
    }

    /// Fetch and parse the theme, through the cache when there is one. The
    /// returned document is a private working copy.
    fn load_theme(&self, url: &Url, ctx: &ApplyContext<'_>, log: &mut ThemeLog) -> Result<Document, AbortTheme> {
        log.info(self, format!("fetching theme from {url}"));
        log.set_theme_url(url.as_str());
        let fetch = || -> Result<Document, FetchError> {
            let bytes = ctx.fetcher.fetch(url.as_str())?;
            let mut doc = parse_html_bytes(&bytes, None);
            make_links_absolute(&mut doc, url);
            Ok(doc)
        };
        let loaded = match ctx.cache {
            Some(cache) => cache.get(url.as_str(), fetch).map(|doc| Document::clone(&doc)),
            None => fetch(),
        };
        loaded.map_err(|err| {
            log.error(self, format!("the theme could not be fetched: {err}"));
            err.into()
        })
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "<ruleset> ({location})"),
            None => f.write_str("<ruleset>"),
        }
    }
}

fn add_classes(classes: &mut Vec<String>, extra: &str) {
    for class in extra.split_whitespace() {
        if !classes.iter().any(|c| c == class) {
            classes.push(class.to_string());
        }
    }
}

/// Response headers plus any `<meta http-equiv>` pairs from the document.
fn effective_headers(headers: &HeaderMap, content: &Document) -> HeaderMap {
    let mut merged = headers.clone();
    for node in content.descendants(content.root()) {
        if content.tag_name(node) != Some("meta") {
            continue;
        }
        let name = content.attr(node, "http-equiv").map(str::trim).unwrap_or_default();
        let value = content.attr(node, "content").unwrap_or_default();
        if !name.is_empty() && !value.is_empty() {
            merged.append(name, value);
        }
    }
    merged
}

/// Replace `{name}` placeholders. Returns the first unknown name on failure.
fn substitute_vars<F>(template: &str, lookup: F) -> Result<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..open + close];
        out.push_str(&lookup(name).ok_or_else(|| name.to_string())?);
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn parent_dir(source: &str) -> &str {
    source.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default()
}

/// The implicit rule that merges `<title>`, `<link>`, `<script>` and
/// `<style>` from the content head into the theme head.
fn standard_rule() -> Result<&'static Rule, AbortTheme> {
    static STANDARD: OnceLock<Result<Rule, SyntaxError>> = OnceLock::new();
    STANDARD
        .get_or_init(build_standard_rule)
        .as_ref()
        .map_err(|e| AbortTheme::new(format!("standard rule is invalid: {e}")))
}

fn build_standard_rule() -> Result<Rule, SyntaxError> {
    let step = |kind: ActionKind, content: &str, theme: &str| -> Result<Action, SyntaxError> {
        let mut transform = Transform::new(Selector::parse(content)?, Selector::parse(theme)?);
        transform.nocontent = NoMatchPolicy::Ignore;
        Action::transform(kind, transform)
    };
    let actions = vec![
        step(ActionKind::Replace, "children:/html/head/title", "children:/html/head/title")?,
        step(ActionKind::Prepend, "elements:/html/head/link", "children:/html/head")?,
        step(ActionKind::Prepend, "elements:/html/head/script", "children:/html/head")?,
        step(ActionKind::Prepend, "elements:/html/head/style", "children:/html/head")?,
    ];
    let mut rule = Rule::new(vec![], actions);
    rule.location = Some(SourceLocation::new("dovetail::standard_rule", None));
    Ok(rule)
}
