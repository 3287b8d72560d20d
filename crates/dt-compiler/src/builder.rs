//! Ruleset builder: XML element tree to [`RuleSet`].
//!
//! Children of `<ruleset>` are dispatched through a table of handlers; action
//! elements inside `<rule>` are looked up with [`ActionKind::from_name`].
//! Every error carries the source name and the line of the offending element.

use dt_core::pagematch::Match;
use dt_core::rules::{Action, ActionKind, DropAction, ManyPolicy, NoMatchPolicy, Rule, ThemeRef, Transform};
use dt_core::selector::Selector;
use dt_core::stringmatch::{parse_bool, HeaderMatcher, MatchKind, StringMatcher};
use dt_core::{RuleSet, SourceLocation, SyntaxError};

use crate::parser::XmlElement;

type ElementHandler = fn(&XmlElement, &SourceLocation, &mut Parts) -> Result<(), SyntaxError>;

/// Handlers for the children of `<ruleset>`.
const RULESET_ELEMENTS: &[(&str, ElementHandler)] = &[
    ("match", add_match),
    ("rule", add_rule),
    ("theme", set_theme),
    ("proxy", ignore_element),
    ("server-settings", ignore_element),
];

#[derive(Default)]
struct Parts {
    matches: Vec<Match>,
    rules: Vec<Rule>,
    theme: Option<ThemeRef>,
}

/// Build a [`RuleSet`] from a parsed `<ruleset>` element read from `source`.
pub fn build_ruleset(root: &XmlElement, source: &str) -> Result<RuleSet, SyntaxError> {
    let location = locate(root, source);
    if root.name != "ruleset" {
        return Err(SyntaxError::new(format!(
            "the root element must be <ruleset>, not <{}>",
            root.name
        ))
        .at(Some(&location)));
    }
    let debug = bool_attr(root, "debug", false, &location)?;

    let mut parts = Parts::default();
    for child in &root.children {
        let child_location = locate(child, source);
        let handler = RULESET_ELEMENTS
            .iter()
            .find(|(name, _)| *name == child.name)
            .map(|(_, handler)| *handler)
            .ok_or_else(|| {
                SyntaxError::new(format!(
                    "invalid tag {} (unknown tag name {:?})",
                    child.start_tag(),
                    child.name
                ))
                .at(Some(&child_location))
            })?;
        handler(child, &child_location, &mut parts)?;
    }

    log::debug!(
        "built ruleset from {source}: {} matches, {} rules",
        parts.matches.len(),
        parts.rules.len()
    );
    let mut ruleset = RuleSet::new(parts.matches, parts.rules, parts.theme);
    ruleset.debug = debug;
    ruleset.location = Some(SourceLocation::new(source, None));
    Ok(ruleset)
}

fn locate(el: &XmlElement, source: &str) -> SourceLocation {
    SourceLocation::new(source, Some(el.line))
}

fn ignore_element(el: &XmlElement, location: &SourceLocation, _: &mut Parts) -> Result<(), SyntaxError> {
    log::debug!("ignoring <{}> at {location}", el.name);
    Ok(())
}

fn bool_attr(el: &XmlElement, name: &str, default: bool, location: &SourceLocation) -> Result<bool, SyntaxError> {
    match el.attr(name) {
        None => Ok(default),
        Some(value) if value.trim().is_empty() => Ok(default),
        Some(value) => parse_bool(value).ok_or_else(|| {
            SyntaxError::new(format!("{name}=\"{value}\" is not a boolean value")).at(Some(location))
        }),
    }
}

fn classes_attr(el: &XmlElement) -> Vec<String> {
    el.attr("class")
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

// ============================================================================
// <match> and <theme>
// ============================================================================

fn add_match(el: &XmlElement, location: &SourceLocation, parts: &mut Parts) -> Result<(), SyntaxError> {
    let at = |e: SyntaxError| e.at(Some(location));
    let abort = bool_attr(el, "abort", false, location)?;
    let hook = el.attr("hook").map(str::to_string).filter(|h| !h.is_empty());
    let mut m = Match::new(classes_attr(el), abort, hook).map_err(at)?;
    m.last = bool_attr(el, "last", false, location)?;
    m.path = string_matcher(el, "path", Match::PATH_DEFAULT).map_err(at)?;
    m.domain = string_matcher(el, "domain", Match::DOMAIN_DEFAULT).map_err(at)?;
    m.request_header = header_matcher(el, "request-header").map_err(at)?;
    m.response_header = header_matcher(el, "response-header").map_err(at)?;
    m.environ = header_matcher(el, "environ").map_err(at)?;
    m.location = Some(location.clone());
    parts.matches.push(m);
    Ok(())
}

fn string_matcher(el: &XmlElement, attr: &str, default: MatchKind) -> Result<Option<StringMatcher>, SyntaxError> {
    el.attr(attr)
        .map(|value| StringMatcher::compile(value, Some(default)))
        .transpose()
}

fn header_matcher(el: &XmlElement, attr: &str) -> Result<Option<HeaderMatcher>, SyntaxError> {
    el.attr(attr)
        .map(|value| HeaderMatcher::compile(value, Some(Match::HEADER_DEFAULT)))
        .transpose()
}

fn theme_ref(el: &XmlElement, location: &SourceLocation) -> Result<ThemeRef, SyntaxError> {
    match el.attr("href").map(str::trim).filter(|h| !h.is_empty()) {
        Some(href) => Ok(ThemeRef {
            href: href.to_string(),
            location: Some(location.clone()),
        }),
        None => Err(SyntaxError::new("<theme> requires an href attribute").at(Some(location))),
    }
}

fn set_theme(el: &XmlElement, location: &SourceLocation, parts: &mut Parts) -> Result<(), SyntaxError> {
    if parts.theme.is_some() {
        log::warn!("{location}: a second <theme> replaces the earlier one");
    }
    parts.theme = Some(theme_ref(el, location)?);
    Ok(())
}

// ============================================================================
// <rule> and actions
// ============================================================================

fn add_rule(el: &XmlElement, location: &SourceLocation, parts: &mut Parts) -> Result<(), SyntaxError> {
    let source = &location.source;
    let suppress_standard = bool_attr(el, "suppress-standard", false, location)?;
    let mut theme = None;
    let mut actions = Vec::new();
    for child in &el.children {
        let child_location = locate(child, source);
        if child.name == "theme" {
            theme = Some(theme_ref(child, &child_location)?);
            continue;
        }
        actions.push(build_action(child, &child_location)?);
    }
    let mut rule = Rule::new(classes_attr(el), actions);
    rule.theme = theme;
    rule.suppress_standard = suppress_standard;
    rule.location = Some(location.clone());
    parts.rules.push(rule);
    Ok(())
}

/// Build one action element.
pub fn build_action(el: &XmlElement, location: &SourceLocation) -> Result<Action, SyntaxError> {
    let kind = ActionKind::from_name(&el.name).ok_or_else(|| {
        SyntaxError::new(format!("there is no rule with the name <{}>", el.name)).at(Some(location))
    })?;
    let at = |e: SyntaxError| e.at(Some(location));
    let if_content = el
        .attr("if-content")
        .map(Selector::parse_guard)
        .transpose()
        .map_err(at)?;
    let nocontent = NoMatchPolicy::parse("nocontent", el.attr("nocontent")).map_err(at)?;
    let notheme = NoMatchPolicy::parse("notheme", el.attr("notheme")).map_err(at)?;

    if kind == ActionKind::Drop {
        let drop = DropAction {
            content: optional_selector(el, "content").map_err(at)?,
            theme: optional_selector(el, "theme").map_err(at)?,
            if_content,
            nocontent,
            notheme,
            location: Some(location.clone()),
        };
        return Action::drop(drop);
    }

    let content = optional_selector(el, "content")
        .map_err(at)?
        .ok_or_else(|| at(SyntaxError::new(format!("<{}> requires a content attribute", el.name))))?;
    let theme = optional_selector(el, "theme")
        .map_err(at)?
        .ok_or_else(|| at(SyntaxError::new(format!("<{}> requires a theme attribute", el.name))))?;
    let mut transform = Transform::new(content, theme);
    transform.if_content = if_content;
    transform.content_href = el.attr("href").map(str::to_string).filter(|h| !h.is_empty());
    transform.move_content = bool_attr(el, "move", true, location)?;
    transform.nocontent = nocontent;
    transform.notheme = notheme;
    transform.manycontent = ManyPolicy::parse("manycontent", el.attr("manycontent")).map_err(at)?;
    transform.manytheme = ManyPolicy::parse("manytheme", el.attr("manytheme")).map_err(at)?;
    transform.location = Some(location.clone());
    Action::transform(kind, transform)
}

fn optional_selector(el: &XmlElement, attr: &str) -> Result<Option<Selector>, SyntaxError> {
    el.attr(attr).map(Selector::parse).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile_ruleset;
    use dt_core::{ApplyContext, Request, Response, StaticFetcher, ThemeConfig, ThemeLog};

    const THEME: &str = "<html><head><title>Theme</title></head><body>\
        <div id=nav>N</div><div id=main>M</div></body></html>";
    const CONTENT: &str = "<html><head><title>Page</title></head><body>\
        <div id=content><p>one</p></div><div id=extra>E</div></body></html>";

    fn themed(xml: &str, url: &str, content: &str) -> (Response, ThemeLog) {
        let ruleset = compile_ruleset(xml, "test.xml").unwrap();
        let fetcher = StaticFetcher::new().with("http://example.com/theme.html", THEME);
        let config = ThemeConfig::default();
        let ctx = ApplyContext::new(&config, &fetcher);
        let mut log = ThemeLog::new();
        let request = Request::new(url).unwrap();
        let out = ruleset.apply_rules(&request, Response::html(content), &ctx, &mut log);
        (out, log)
    }

    fn text(resp: &Response) -> String {
        String::from_utf8_lossy(&resp.body).into_owned()
    }

    #[test]
    fn test_build_ruleset_structure() {
        let xml = r##"<ruleset debug="1">
            <theme href="/theme.html"/>
            <proxy path="/"><dest href="http://localhost:8000"/></proxy>
            <match path="regex:^/blog" class="blog" last="1"/>
            <match abort="1" path="/static"/>
            <rule class="blog" suppress-standard="yes">
                <theme href="/blog-theme.html"/>
                <replace content="#a" theme="#b" move="0" manytheme="last"/>
                <drop theme="#c"/>
            </rule>
            <rule><copy content="children:#x" theme="children:#y" href="/other.html"/></rule>
        </ruleset>"##;
        let rs = compile_ruleset(xml, "site.xml").unwrap();
        assert!(rs.debug);
        assert_eq!(rs.matches.len(), 2);
        assert!(rs.matches[0].last);
        assert!(rs.matches[1].abort);
        assert_eq!(rs.rules.len(), 2);
        assert!(rs.rules[0].suppress_standard);
        assert_eq!(rs.rules[0].theme.as_ref().unwrap().href, "/blog-theme.html");
        assert_eq!(rs.rules[1].classes, vec!["default".to_string()]);
        assert_eq!(rs.rules_by_class["blog"], vec![0]);
        assert_eq!(rs.theme.as_ref().unwrap().href, "/theme.html");
        match &rs.rules[1].actions[0] {
            Action::Copy(t) => assert_eq!(t.content_href.as_deref(), Some("/other.html")),
            other => panic!("unexpected action {other}"),
        }
    }

    #[test]
    fn test_syntax_errors_carry_lines() {
        let err = compile_ruleset("<ruleset>\n<rule>\n<swap content=\"#a\" theme=\"#b\"/>\n</rule>\n</ruleset>", "bad.xml")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("swap"), "{message}");
        assert!(message.contains("bad.xml:3"), "{message}");

        assert!(compile_ruleset("<ruleset><bogus/></ruleset>", "x").is_err());
        assert!(compile_ruleset("<rules/>", "x").is_err());
        assert!(compile_ruleset("<ruleset><match path=\"/\"/></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><match class=\"a\" abort=\"1\"/></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><match class=\"a\" last=\"maybe\"/></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><rule><replace content=\"#a\"/></rule></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><rule><drop/></rule></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><rule><append content=\"tag:a\" theme=\"tag:b\"/></rule></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><rule><replace content=\"#a\" theme=\"#b\" nocontent=\"explode\"/></rule></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><match class=\"a\" path=\"regex:[\"/></ruleset>", "x").is_err());
        assert!(compile_ruleset("<ruleset><theme/></ruleset>", "x").is_err());
    }

    #[test]
    fn test_default_rule_replaces_title_and_body() {
        let xml = r#"<ruleset><theme href="/theme.html"/>
            <rule><replace content="children:#content" theme="children:#main"/></rule>
        </ruleset>"#;
        let (out, _) = themed(xml, "http://example.com/page", CONTENT);
        let html = text(&out);
        assert!(html.contains("<title>Page</title>"), "{html}");
        assert!(html.contains("<div id=\"main\"><p>one</p></div>"), "{html}");
        assert!(html.contains("<div id=\"nav\">N</div>"), "{html}");
    }

    #[test]
    fn test_last_match_limits_rules() {
        let xml = r#"<ruleset><theme href="/theme.html"/>
            <match path="/docs" class="docs" last="1"/>
            <match path="/" class="site"/>
            <rule class="docs"><replace content="children:#content" theme="children:#main"/></rule>
            <rule class="site"><replace content="children:#extra" theme="children:#nav"/></rule>
        </ruleset>"#;
        let (out, _) = themed(xml, "http://example.com/docs/intro", CONTENT);
        let html = text(&out);
        assert!(html.contains("<div id=\"main\"><p>one</p></div>"));
        assert!(html.contains("<div id=\"nav\">N</div>"));

        let (out, _) = themed(xml, "http://example.com/about", CONTENT);
        let html = text(&out);
        assert!(html.contains("<div id=\"nav\">E</div>"));
        assert!(html.contains("<div id=\"main\">M</div>"));
    }

    #[test]
    fn test_abort_match_returns_original() {
        let xml = r#"<ruleset><theme href="/missing.html"/>
            <match path="/raw" abort="1"/>
            <rule><replace content="children:#content" theme="children:#main"/></rule>
        </ruleset>"#;
        let (out, log) = themed(xml, "http://example.com/raw/file", CONTENT);
        assert_eq!(out.body, CONTENT.as_bytes());
        assert!(log.theme_url().is_none());
    }

    #[test]
    fn test_selector_fallback_chain() {
        let xml = r#"<ruleset><theme href="/theme.html"/>
            <rule><replace content="children:#nothing || children:#extra" theme="children:#main"/></rule>
        </ruleset>"#;
        let (out, _) = themed(xml, "http://example.com/", CONTENT);
        assert!(text(&out).contains("<div id=\"main\">E</div>"));
    }

    #[test]
    fn test_nocontent_abort_is_byte_identical() {
        let xml = r##"<ruleset><theme href="/theme.html"/>
            <rule><replace content="#nothing" theme="#main" nocontent="abort"/></rule>
        </ruleset>"##;
        let original = "<p>caf\u{e9}</p>";
        let (out, _) = themed(xml, "http://example.com/", original);
        assert_eq!(out.body, original.as_bytes());
    }

    #[test]
    fn test_serialized_output_reparses() {
        let xml = r##"<ruleset><theme href="/theme.html"/>
            <rule><append content="#extra" theme="children:#nav"/></rule>
        </ruleset>"##;
        let (out, _) = themed(xml, "http://example.com/", CONTENT);
        let html = text(&out);
        let reparsed = dt_core::parse_html(&html);
        assert_eq!(dt_core::serialize(&reparsed), html);
    }
}
