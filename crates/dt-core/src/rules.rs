//! `<rule>` sections and the actions inside them.
//!
//! An action selects in the content document and in the theme document and
//! splices one into the other. What gets spliced, and where, depends on the
//! selector types on both sides:
//!
//! | action            | content               | theme                 |
//! |-------------------|-----------------------|-----------------------|
//! | replace           | children, elements    | children, elements    |
//! |                   | attributes            | attributes            |
//! |                   | tag                   | tag                   |
//! | append / prepend  | children, elements    | children, elements    |
//! |                   | attributes            | attributes            |
//! | copy              | children, elements    | children              |
//!
//! Illegal pairs are rejected when the action is built. `drop` takes a theme
//! selector, a content selector or both, and applies each independently.

use std::fmt;

use url::Url;

use crate::dom::{parse_html_bytes, Child, Document, NodeData, NodeId};
use crate::error::{AbortTheme, SourceLocation, SyntaxError};
use crate::fetch::ResourceFetcher;
use crate::log::ThemeLog;
use crate::selector::{Item, Selection, Selector, SelectorType};

// ============================================================================
// Error policies
// ============================================================================

/// What to do when a selector finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoMatchPolicy {
    Ignore,
    #[default]
    Warn,
    Abort,
}

impl NoMatchPolicy {
    pub fn name(self) -> &'static str {
        match self {
            NoMatchPolicy::Ignore => "ignore",
            NoMatchPolicy::Warn => "warn",
            NoMatchPolicy::Abort => "abort",
        }
    }

    /// Parse a `nocontent=` / `notheme=` value. Missing or empty means `warn`.
    pub fn parse(attr: &str, value: Option<&str>) -> Result<Self, SyntaxError> {
        let value = value.map(|v| v.trim().to_ascii_lowercase()).unwrap_or_default();
        match value.as_str() {
            "" | "warn" => Ok(NoMatchPolicy::Warn),
            "ignore" => Ok(NoMatchPolicy::Ignore),
            "abort" => Ok(NoMatchPolicy::Abort),
            other => Err(SyntaxError::new(format!(
                "the attribute {attr}=\"{other}\" should have a value of one of: ignore, abort, warn"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    #[default]
    First,
    Last,
}

/// What to do when a selector finds more than the one node an action needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ManyPolicy {
    pub action: NoMatchPolicy,
    pub pick: TieBreak,
}

const MANY_ALLOWED: &str = "ignore, abort, warn, last, first, ignore:first, ignore:last, warn:first, warn:last";

impl ManyPolicy {
    /// Parse a `manycontent=` / `manytheme=` value. Missing means `warn:first`.
    pub fn parse(attr: &str, value: Option<&str>) -> Result<Self, SyntaxError> {
        let value = value.map(|v| v.trim().to_ascii_lowercase()).unwrap_or_default();
        let (action, pick) = match value.as_str() {
            "" | "warn" | "warn:first" => (NoMatchPolicy::Warn, TieBreak::First),
            "warn:last" => (NoMatchPolicy::Warn, TieBreak::Last),
            "ignore" | "first" | "ignore:first" => (NoMatchPolicy::Ignore, TieBreak::First),
            "last" | "ignore:last" => (NoMatchPolicy::Ignore, TieBreak::Last),
            "abort" => (NoMatchPolicy::Abort, TieBreak::First),
            other => {
                return Err(SyntaxError::new(format!(
                    "the attribute {attr}=\"{other}\" should have a value of one of: {MANY_ALLOWED}"
                )))
            }
        };
        Ok(Self { action, pick })
    }
}

impl fmt::Display for ManyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pick {
            TieBreak::Last => write!(f, "{}:last", self.action.name()),
            TieBreak::First => f.write_str(self.action.name()),
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Replace,
    Append,
    Prepend,
    Copy,
    Drop,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Replace,
        ActionKind::Append,
        ActionKind::Prepend,
        ActionKind::Copy,
        ActionKind::Drop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::Replace => "replace",
            ActionKind::Append => "append",
            ActionKind::Prepend => "prepend",
            ActionKind::Copy => "copy",
            ActionKind::Drop => "drop",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    /// Whether content of type `content` may be spliced into theme type `theme`.
    pub fn compatible(self, content: SelectorType, theme: SelectorType) -> bool {
        use SelectorType::*;
        let structural = |t: SelectorType| matches!(t, Children | Elements);
        match self {
            ActionKind::Replace => {
                (structural(content) && structural(theme))
                    || (content == Attributes && theme == Attributes)
                    || (content == Tag && theme == Tag)
            }
            ActionKind::Append | ActionKind::Prepend => {
                (structural(content) && structural(theme)) || (content == Attributes && theme == Attributes)
            }
            ActionKind::Copy => structural(content) && theme == Children,
            ActionKind::Drop => true,
        }
    }
}

/// A `<theme href>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeRef {
    pub href: String,
    pub location: Option<SourceLocation>,
}

impl ThemeRef {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            location: None,
        }
    }
}

/// Attributes shared by replace, append, prepend and copy.
#[derive(Debug, Clone)]
pub struct Transform {
    pub content: Selector,
    pub theme: Selector,
    pub if_content: Option<Selector>,
    /// Fetch the content from here instead of using the response body.
    pub content_href: Option<String>,
    pub move_content: bool,
    pub nocontent: NoMatchPolicy,
    pub notheme: NoMatchPolicy,
    pub manycontent: ManyPolicy,
    pub manytheme: ManyPolicy,
    pub location: Option<SourceLocation>,
}

impl Transform {
    pub fn new(content: Selector, theme: Selector) -> Self {
        Self {
            content,
            theme,
            if_content: None,
            content_href: None,
            move_content: true,
            nocontent: NoMatchPolicy::default(),
            notheme: NoMatchPolicy::default(),
            manycontent: ManyPolicy::default(),
            manytheme: ManyPolicy::default(),
            location: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DropAction {
    pub content: Option<Selector>,
    pub theme: Option<Selector>,
    pub if_content: Option<Selector>,
    pub nocontent: NoMatchPolicy,
    pub notheme: NoMatchPolicy,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone)]
pub enum Action {
    Replace(Transform),
    Append(Transform),
    Prepend(Transform),
    Copy(Transform),
    Drop(DropAction),
}

impl Action {
    /// Build a splicing action, checking every selector type pair.
    pub fn transform(kind: ActionKind, transform: Transform) -> Result<Self, SyntaxError> {
        for content_type in transform.content.selector_types() {
            for theme_type in transform.theme.selector_types() {
                if !kind.compatible(content_type, theme_type) {
                    return Err(SyntaxError::new(format!(
                        "selector type {content_type} (from content=\"{}\") and type {theme_type} \
                         (from theme=\"{}\") are not compatible in <{}>",
                        transform.content,
                        transform.theme,
                        kind.name()
                    ))
                    .at(transform.location.as_ref()));
                }
            }
        }
        match kind {
            ActionKind::Replace => Ok(Action::Replace(transform)),
            ActionKind::Append => Ok(Action::Append(transform)),
            ActionKind::Prepend => Ok(Action::Prepend(transform)),
            ActionKind::Copy => Ok(Action::Copy(transform)),
            ActionKind::Drop => Err(SyntaxError::new("<drop> takes no content-to-theme transform")
                .at(transform.location.as_ref())),
        }
    }

    pub fn drop(action: DropAction) -> Result<Self, SyntaxError> {
        if action.content.is_none() && action.theme.is_none() {
            return Err(SyntaxError::new("<drop> needs a content or theme attribute (or both)")
                .at(action.location.as_ref()));
        }
        Ok(Action::Drop(action))
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Replace(_) => ActionKind::Replace,
            Action::Append(_) => ActionKind::Append,
            Action::Prepend(_) => ActionKind::Prepend,
            Action::Copy(_) => ActionKind::Copy,
            Action::Drop(_) => ActionKind::Drop,
        }
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Action::Replace(t) | Action::Append(t) | Action::Prepend(t) | Action::Copy(t) => t.location.as_ref(),
            Action::Drop(d) => d.location.as_ref(),
        }
    }

    fn if_content(&self) -> Option<&Selector> {
        match self {
            Action::Replace(t) | Action::Append(t) | Action::Prepend(t) | Action::Copy(t) => t.if_content.as_ref(),
            Action::Drop(d) => d.if_content.as_ref(),
        }
    }
}

/// Per-request collaborators an action needs.
pub struct RuleEnv<'a> {
    pub fetcher: &'a dyn ResourceFetcher,
    /// Request URL, for resolving `href=`.
    pub base_url: &'a Url,
    /// Bracket edits with marker comments.
    pub debug: bool,
}

// ============================================================================
// Application
// ============================================================================

impl Action {
    pub fn apply(
        &self,
        content: &mut Document,
        theme: &mut Document,
        env: &RuleEnv<'_>,
        log: &mut ThemeLog,
    ) -> Result<(), AbortTheme> {
        match self {
            Action::Drop(drop) => self.apply_drop(drop, content, theme, env, log),
            Action::Replace(t) | Action::Append(t) | Action::Prepend(t) | Action::Copy(t) => {
                self.apply_transform(t, content, theme, env, log)
            }
        }
    }

    fn fetch_content(&self, href: &str, env: &RuleEnv<'_>, log: &mut ThemeLog) -> Result<Document, AbortTheme> {
        let url = env.base_url.join(href).map_err(|e| {
            log.error(self, format!("cannot resolve href=\"{href}\": {e}"));
            AbortTheme::new(format!("bad content href {href:?}"))
        })?;
        match env.fetcher.fetch(url.as_str()) {
            Ok(bytes) => {
                log.debug(self, format!("fetched content from href=\"{href}\" ({url})"));
                Ok(parse_html_bytes(&bytes, None))
            }
            Err(err) => {
                log.error(self, format!("could not fetch href=\"{href}\": {err}"));
                Err(err.into())
            }
        }
    }

    /// Whether the `if-content` guard (if any) lets this action run.
    fn guard_passes(&self, content: &Document, log: &mut ThemeLog) -> bool {
        let Some(guard) = self.if_content() else {
            return true;
        };
        let found = guard.evaluate(content);
        let matched = match found.kind {
            SelectorType::Elements | SelectorType::Tag => !found.is_empty(),
            SelectorType::Children => found
                .nodes()
                .any(|n| content.is_element(n) && content.has_content(n)),
            SelectorType::Attributes => found.nodes().any(|n| match (content.attrs(n), &found.attributes) {
                (Some(attrs), Some(names)) => names.iter().any(|name| attrs.contains(name)),
                (Some(attrs), None) => !attrs.is_empty(),
                (None, _) => false,
            }),
        };
        if matched == guard.inverted {
            log.info(self, format!("skipping rule because if-content=\"{guard}\" does not match"));
            return false;
        }
        true
    }

    fn no_match(&self, policy: NoMatchPolicy, what: &str, selector: &Selector, log: &mut ThemeLog) -> Result<(), AbortTheme> {
        match policy {
            NoMatchPolicy::Abort => {
                log.debug(self, format!("aborting theming because nothing matches {what}=\"{selector}\""));
                Err(AbortTheme::new(format!("no {what} matches {what}=\"{selector}\"")))
            }
            NoMatchPolicy::Ignore => {
                log.debug(self, format!("skipping rule because nothing matches {what}=\"{selector}\""));
                Ok(())
            }
            NoMatchPolicy::Warn => {
                log.warn(self, format!("skipping rule because nothing matches {what}=\"{selector}\""));
                Ok(())
            }
        }
    }

    fn pick_one(
        &self,
        policy: ManyPolicy,
        what: &str,
        selector: &Selector,
        nodes: &[NodeId],
        doc: &Document,
        log: &mut ThemeLog,
    ) -> Result<NodeId, AbortTheme> {
        let (first, last) = match (nodes.first(), nodes.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(AbortTheme::new(format!("nothing matches {what}=\"{selector}\""))),
        };
        if nodes.len() == 1 {
            return Ok(first);
        }
        let pick = match policy.pick {
            TieBreak::First => "first",
            TieBreak::Last => "last",
        };
        let message = format!(
            "{} elements ({}) match {what}=\"{selector}\", using the {pick} match",
            nodes.len(),
            format_tags(doc, nodes)
        );
        match policy.action {
            NoMatchPolicy::Abort => {
                log.debug(self, format!("aborting theming because {message}"));
                return Err(AbortTheme::new(format!("many elements match {what}=\"{selector}\"")));
            }
            NoMatchPolicy::Warn => log.warn(self, message),
            NoMatchPolicy::Ignore => log.debug(self, message),
        }
        Ok(match policy.pick {
            TieBreak::First => first,
            TieBreak::Last => last,
        })
    }

    fn apply_transform(
        &self,
        t: &Transform,
        content: &mut Document,
        theme: &mut Document,
        env: &RuleEnv<'_>,
        log: &mut ThemeLog,
    ) -> Result<(), AbortTheme> {
        let mut fetched: Document;
        let content: &mut Document = match &t.content_href {
            Some(href) => {
                fetched = self.fetch_content(href, env, log)?;
                &mut fetched
            }
            None => content,
        };
        if !self.guard_passes(content, log) {
            return Ok(());
        }

        let found = t.content.evaluate(content);
        if found.is_empty() {
            return self.no_match(t.nocontent, "content", &t.content, log);
        }

        let targets = select_theme(&t.theme, theme);
        let theme_type = targets.kind;
        let theme_nodes: Vec<NodeId> = targets.nodes().collect();
        if theme_nodes.is_empty() {
            return self.no_match(t.notheme, "theme", &t.theme, log);
        }
        let theme_el = self.pick_one(t.manytheme, "theme", &t.theme, &theme_nodes, theme, log)?;
        let attributes = join_attributes(found.attributes.as_deref(), targets.attributes.as_deref());

        match (found.kind, theme_type) {
            (SelectorType::Attributes, _) => {
                let Some(source) = self.pick_content_element(t, &found, content, log)? else {
                    return Ok(());
                };
                self.edit_attributes(t, source, attributes.as_deref(), theme_el, content, theme, env.debug, log);
            }
            (SelectorType::Tag, _) => {
                let Some(source) = self.pick_content_element(t, &found, content, log)? else {
                    return Ok(());
                };
                self.retag(source, theme_el, content, theme, env.debug, log);
            }
            (content_type, _) => {
                let detach = t.move_content && !matches!(self, Action::Copy(_));
                let children = content_type == SelectorType::Children;
                // Moving elements detaches them first, which pulls nested
                // matches out of their matched ancestors before import.
                if detach && !children {
                    detach_selection(&found, content);
                }
                let pieces = import_pieces(content_type, &found, content, theme);
                let pieces = self.bracket(theme, pieces, env.debug);
                self.splice(theme_type, theme_el, pieces, theme);
                if detach && children {
                    for node in found.nodes() {
                        content.detach(node);
                    }
                }
                log.debug(
                    self,
                    format!(
                        "{} {} of content {} {} theme element <{}>",
                        if detach { "moved" } else { "copied" },
                        content_type,
                        format_tags(content, &found.nodes().collect::<Vec<_>>()),
                        match self {
                            Action::Replace(_) if theme_type == SelectorType::Elements => "in place of",
                            Action::Replace(_) => "into the emptied",
                            Action::Prepend(_) if theme_type == SelectorType::Elements => "before",
                            Action::Prepend(_) => "to the beginning of",
                            _ if theme_type == SelectorType::Elements => "after",
                            _ => "to the end of",
                        },
                        theme.tag_name(theme_el).unwrap_or_default()
                    ),
                );
            }
        }
        Ok(())
    }

    /// Content element for attribute and tag edits, applying `manycontent`.
    fn pick_content_element(
        &self,
        t: &Transform,
        found: &Selection,
        content: &Document,
        log: &mut ThemeLog,
    ) -> Result<Option<NodeId>, AbortTheme> {
        let elements: Vec<NodeId> = found.nodes().filter(|n| content.is_element(*n)).collect();
        if elements.is_empty() {
            self.no_match(t.nocontent, "content", &t.content, log)?;
            return Ok(None);
        }
        self.pick_one(t.manycontent, "content", &t.content, &elements, content, log)
            .map(Some)
    }

    fn splice(&self, theme_type: SelectorType, target: NodeId, pieces: Vec<Child>, theme: &mut Document) {
        let structural_children = theme_type == SelectorType::Children;
        match self {
            Action::Replace(_) if structural_children => {
                theme.clear_children(target);
                theme.insert_children(target, 0, pieces);
            }
            Action::Replace(_) => {
                theme.move_tail_before(target);
                theme.replace_with(target, pieces);
            }
            Action::Prepend(_) if structural_children => theme.insert_children(target, 0, pieces),
            Action::Prepend(_) => theme.insert_before(target, pieces),
            _ if structural_children => {
                let end = theme.children(target).len();
                theme.insert_children(target, end, pieces);
            }
            _ => theme.insert_after(target, pieces),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn edit_attributes(
        &self,
        t: &Transform,
        source: NodeId,
        names: Option<&[String]>,
        target: NodeId,
        content: &mut Document,
        theme: &mut Document,
        debug: bool,
        log: &mut ThemeLog,
    ) {
        let incoming: Vec<(String, String)> = content
            .attrs(source)
            .map(|a| {
                a.iter()
                    .filter(|(k, _)| names.map_or(true, |names| names.iter().any(|n| n.as_str() == *k)))
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let mut skipped = Vec::new();
        if let Some(attrs) = theme.attrs_mut(target) {
            match self {
                Action::Replace(_) => {
                    attrs.clear();
                    for (k, v) in &incoming {
                        attrs.set(k.as_str(), v.as_str());
                    }
                }
                Action::Append(_) => {
                    for (k, v) in &incoming {
                        if !attrs.set_default(k.as_str(), v.as_str()) {
                            skipped.push(k.as_str());
                        }
                    }
                }
                _ => {
                    for (k, v) in &incoming {
                        attrs.set(k.as_str(), v.as_str());
                    }
                }
            }
        }
        if t.move_content {
            if let Some(attrs) = content.attrs_mut(source) {
                match names {
                    Some(names) => {
                        for name in names {
                            attrs.remove(name);
                        }
                    }
                    None => attrs.clear(),
                }
            }
        }
        self.bracket_element(theme, target, debug);

        let copied: Vec<&str> = incoming.iter().map(|(k, _)| k.as_str()).collect();
        let mut message = format!(
            "{} {} from the content element <{}> to the theme element <{}>",
            if t.move_content { "moved" } else { "copied" },
            format_attribute_names(&copied),
            content.tag_name(source).unwrap_or_default(),
            theme.tag_name(target).unwrap_or_default()
        );
        if !skipped.is_empty() {
            message.push_str(&format!(
                ", and did not copy the {} because they were already present in the theme element",
                format_attribute_names(&skipped)
            ));
        }
        log.debug(self, message);
    }

    fn retag(
        &self,
        source: NodeId,
        target: NodeId,
        content: &Document,
        theme: &mut Document,
        debug: bool,
        log: &mut ThemeLog,
    ) {
        let old = theme.tag_name(target).unwrap_or_default().to_string();
        let new = content.tag_name(source).unwrap_or_default().to_string();
        theme.set_tag_name(target, &new);
        if let (Some(attrs), Some(incoming)) = (theme.attrs_mut(target), content.attrs(source)) {
            attrs.clear();
            for (k, v) in incoming.iter() {
                attrs.set(k, v);
            }
        }
        self.bracket_element(theme, target, debug);
        log.debug(
            self,
            format!("changed the tag name of the theme element <{old}> to the name of the content element <{new}>"),
        );
    }

    fn apply_drop(
        &self,
        drop: &DropAction,
        content: &mut Document,
        theme: &mut Document,
        env: &RuleEnv<'_>,
        log: &mut ThemeLog,
    ) -> Result<(), AbortTheme> {
        if !self.guard_passes(content, log) {
            return Ok(());
        }
        if let Some(selector) = &drop.theme {
            self.drop_in(theme, selector, drop.notheme, "theme", env.debug, log)?;
        }
        if let Some(selector) = &drop.content {
            self.drop_in(content, selector, drop.nocontent, "content", false, log)?;
        }
        Ok(())
    }

    fn drop_in(
        &self,
        doc: &mut Document,
        selector: &Selector,
        policy: NoMatchPolicy,
        what: &str,
        debug: bool,
        log: &mut ThemeLog,
    ) -> Result<(), AbortTheme> {
        let found = if what == "theme" {
            select_theme(selector, doc)
        } else {
            selector.evaluate(doc)
        };
        let nodes: Vec<NodeId> = match found.kind {
            SelectorType::Elements => found.nodes().collect(),
            _ => found.nodes().filter(|n| doc.is_element(*n)).collect(),
        };
        if nodes.is_empty() {
            return self.no_match(policy, what, selector, log);
        }
        let tags = format_tags(doc, &nodes);
        match found.kind {
            SelectorType::Elements => {
                for node in &nodes {
                    if debug {
                        let markers = self.bracket(doc, Vec::new(), true);
                        doc.insert_before(*node, markers);
                    }
                    doc.detach(*node);
                }
                log.debug(self, format!("dropping {what} {tags}"));
            }
            SelectorType::Children => {
                for node in &nodes {
                    doc.clear_children(*node);
                    if debug {
                        let markers = self.bracket(doc, Vec::new(), true);
                        doc.insert_children(*node, 0, markers);
                    }
                }
                log.debug(self, format!("dropping the children of {what} {tags}"));
            }
            SelectorType::Attributes => {
                for node in &nodes {
                    if let Some(attrs) = doc.attrs_mut(*node) {
                        match &found.attributes {
                            Some(names) => {
                                for name in names {
                                    attrs.remove(name);
                                }
                            }
                            None => attrs.clear(),
                        }
                    }
                    self.bracket_element(doc, *node, debug);
                }
                match &found.attributes {
                    Some(names) => log.debug(
                        self,
                        format!("dropping the {} from the {what} {tags}", format_attribute_names(names)),
                    ),
                    None => log.debug(self, format!("dropping all the attributes of {what} {tags}")),
                }
            }
            SelectorType::Tag => {
                for node in &nodes {
                    let children = doc.take_children(*node);
                    let pieces = self.bracket(doc, children, debug);
                    doc.replace_with(*node, pieces);
                }
                log.debug(self, format!("dropping the tag (flattening the element) of {what} {tags}"));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Debug markers
    // ------------------------------------------------------------------

    fn marker(&self, doc: &mut Document, phase: &str) -> NodeId {
        let text = format!(" dovetail: {phase} {self} ").replace("--", "- -");
        doc.create_comment(&text)
    }

    /// Wrap `pieces` in marker comments when `debug` is set.
    fn bracket(&self, doc: &mut Document, pieces: Vec<Child>, debug: bool) -> Vec<Child> {
        if !debug {
            return pieces;
        }
        let mut out = Vec::with_capacity(pieces.len() + 2);
        out.push(Child::Node(self.marker(doc, "applying")));
        out.extend(pieces);
        out.push(Child::Node(self.marker(doc, "done")));
        out
    }

    /// Put marker comments directly around `element`, inside its tail.
    fn bracket_element(&self, doc: &mut Document, element: NodeId, debug: bool) {
        if !debug {
            return;
        }
        let (Some(parent), Some(pos)) = (doc.parent(element), doc.position(element)) else {
            return;
        };
        let done = self.marker(doc, "done");
        doc.insert_children(parent, pos + 1, vec![Child::Node(done)]);
        let applying = self.marker(doc, "applying");
        doc.insert_children(parent, pos, vec![Child::Node(applying)]);
    }
}

/// Theme selection: content-derived nodes and non-elements never count.
fn select_theme(selector: &Selector, theme: &Document) -> Selection {
    let mut found = selector.evaluate_filtered(theme, |n| theme.is_element(n) && !theme.is_from_content(n));
    found.items.retain(|item| matches!(item, Item::Node(_)));
    found
}

/// Remove moved content from its tree: text runs first (highest index first
/// so earlier indices stay valid), then nodes. Attribute values stay.
fn detach_selection(found: &Selection, content: &mut Document) {
    let mut runs: Vec<(NodeId, usize, &str)> = found
        .items
        .iter()
        .filter_map(|item| match item {
            Item::Text {
                text,
                parent,
                index: Some(index),
            } => Some((*parent, *index, text.as_str())),
            _ => None,
        })
        .collect();
    runs.sort_by(|a, b| b.1.cmp(&a.1));
    for (parent, index, text) in runs {
        content.remove_text(parent, index, text);
    }
    for node in found.nodes() {
        content.detach(node);
    }
}

/// Copy the selected content into `theme`'s arena as a splice sequence.
///
/// For `children` content, a matched node inside another matched node is
/// skipped: its children already come along with the outer match.
fn import_pieces(kind: SelectorType, found: &Selection, content: &Document, theme: &mut Document) -> Vec<Child> {
    let matched: Vec<NodeId> = found.nodes().collect();
    let mut pieces = Vec::new();
    for item in &found.items {
        match (kind, item) {
            (SelectorType::Children, Item::Node(n)) => {
                if !content.is_element(*n) || content.ancestors(*n).any(|a| matched.contains(&a)) {
                    continue;
                }
                for child in content.children(*n) {
                    let piece = theme.import_child(content, child);
                    if let Child::Node(id) = piece {
                        theme.mark_from_content(id);
                    }
                    pieces.push(piece);
                }
            }
            (SelectorType::Children, Item::Text { .. }) => {}
            (_, Item::Node(n)) => {
                let id = theme.import(content, *n);
                theme.mark_from_content(id);
                pieces.push(Child::Node(id));
            }
            (_, Item::Text { text, .. }) => pieces.push(Child::Text(text.clone())),
        }
    }
    pieces
}

/// Union of two attribute-name lists, in first-seen order.
fn join_attributes(a: Option<&[String]>, b: Option<&[String]>) -> Option<Vec<String>> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.to_vec()),
        (Some(x), Some(y)) => {
            let mut out = x.to_vec();
            for name in y {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Some(out)
        }
    }
}

fn format_tags(doc: &Document, nodes: &[NodeId]) -> String {
    if nodes.is_empty() {
        return "(none)".to_string();
    }
    nodes
        .iter()
        .map(|n| match doc.data(*n) {
            NodeData::Element { name, .. } => format!("<{name}>"),
            NodeData::Comment(_) => "<!-- -->".to_string(),
            _ => "#node".to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_attribute_names<S: AsRef<str>>(names: &[S]) -> String {
    match names.len() {
        0 => "no attributes".to_string(),
        1 => format!("attribute {}", names[0].as_ref()),
        _ => format!(
            "attributes {}",
            names.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn quote(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.kind().name())?;
        match self {
            Action::Drop(d) => {
                if let Some(content) = &d.content {
                    write!(f, " content=\"{}\"", quote(&content.to_string()))?;
                }
                if d.nocontent != NoMatchPolicy::Warn {
                    write!(f, " nocontent=\"{}\"", d.nocontent.name())?;
                }
                if let Some(theme) = &d.theme {
                    write!(f, " theme=\"{}\"", quote(&theme.to_string()))?;
                }
                if d.notheme != NoMatchPolicy::Warn {
                    write!(f, " notheme=\"{}\"", d.notheme.name())?;
                }
            }
            Action::Replace(t) | Action::Append(t) | Action::Prepend(t) | Action::Copy(t) => {
                write!(f, " content=\"{}\"", quote(&t.content.to_string()))?;
                if let Some(href) = &t.content_href {
                    write!(f, " href=\"{}\"", quote(href))?;
                }
                if !t.move_content {
                    f.write_str(" move=\"0\"")?;
                }
                if t.nocontent != NoMatchPolicy::Warn {
                    write!(f, " nocontent=\"{}\"", t.nocontent.name())?;
                }
                if t.manycontent != ManyPolicy::default() {
                    write!(f, " manycontent=\"{}\"", t.manycontent)?;
                }
                write!(f, " theme=\"{}\"", quote(&t.theme.to_string()))?;
                if t.notheme != NoMatchPolicy::Warn {
                    write!(f, " notheme=\"{}\"", t.notheme.name())?;
                }
                if t.manytheme != ManyPolicy::default() {
                    write!(f, " manytheme=\"{}\"", t.manytheme)?;
                }
            }
        }
        if let Some(guard) = self.if_content() {
            write!(f, " if-content=\"{}\"", quote(&guard.to_string()))?;
        }
        f.write_str(" />")
    }
}

// ============================================================================
// Rule
// ============================================================================

/// One `<rule>`: the classes it serves and its ordered actions.
#[derive(Debug, Clone)]
pub struct Rule {
    pub classes: Vec<String>,
    pub actions: Vec<Action>,
    pub theme: Option<ThemeRef>,
    pub suppress_standard: bool,
    pub location: Option<SourceLocation>,
}

impl Rule {
    pub const DEFAULT_CLASS: &'static str = "default";

    /// A rule without classes serves the `default` class.
    pub fn new(classes: Vec<String>, actions: Vec<Action>) -> Self {
        let classes = if classes.is_empty() {
            vec![Self::DEFAULT_CLASS.to_string()]
        } else {
            classes
        };
        Self {
            classes,
            actions,
            theme: None,
            suppress_standard: false,
            location: None,
        }
    }

    pub fn apply(
        &self,
        content: &mut Document,
        theme: &mut Document,
        env: &RuleEnv<'_>,
        log: &mut ThemeLog,
    ) -> Result<(), AbortTheme> {
        for action in &self.actions {
            action.apply(content, theme, env, log)?;
        }
        Ok(())
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<rule class=\"{}\"", self.classes.join(" "))?;
        if self.suppress_standard {
            f.write_str(" suppress-standard=\"1\"")?;
        }
        f.write_str(">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_html, serialize_node};
    use crate::fetch::StaticFetcher;

    const THEME: &str = "<html><head><title>Old</title></head><body>\
        <div id=header>H</div><div id=main class=slot>placeholder</div>tail<div id=footer>F</div>\
        </body></html>";

    const CONTENT: &str = "<html><head><title>Hello</title></head><body>\
        <div id=content class=c><p>one</p>between<p>two</p></div>after\
        <span class=extra lang=en>x</span>\
        </body></html>";

    struct Fixture {
        content: Document,
        theme: Document,
        fetcher: StaticFetcher,
        base: Url,
        log: ThemeLog,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with(CONTENT, THEME)
        }

        fn with(content: &str, theme: &str) -> Self {
            Self {
                content: parse_html(content),
                theme: parse_html(theme),
                fetcher: StaticFetcher::new(),
                base: Url::parse("http://example.com/page").unwrap(),
                log: ThemeLog::new(),
            }
        }

        fn run(&mut self, action: &Action, debug: bool) -> Result<(), AbortTheme> {
            let env = RuleEnv {
                fetcher: &self.fetcher,
                base_url: &self.base,
                debug,
            };
            action.apply(&mut self.content, &mut self.theme, &env, &mut self.log)
        }
    }

    fn inner(doc: &Document, id: NodeId) -> String {
        doc.children(id)
            .iter()
            .map(|c| match c {
                Child::Text(t) => t.clone(),
                Child::Node(n) => serialize_node(doc, *n),
            })
            .collect()
    }

    fn body(doc: &Document) -> String {
        doc.body().map(|b| inner(doc, b)).unwrap_or_default()
    }

    fn transform(content: &str, theme: &str) -> Transform {
        Transform::new(Selector::parse(content).unwrap(), Selector::parse(theme).unwrap())
    }

    fn build(kind: ActionKind, t: Transform) -> Action {
        Action::transform(kind, t).unwrap()
    }

    #[test]
    fn test_replace_title_children() {
        let mut fx = Fixture::new();
        let mut t = transform("children:/html/head/title", "children:/html/head/title");
        t.nocontent = NoMatchPolicy::Ignore;
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        let title = fx.theme.child_element(fx.theme.head().unwrap(), "title").unwrap();
        assert_eq!(serialize_node(&fx.theme, title), "<title>Hello</title>");
        assert!(body(&fx.theme).contains("placeholder"));
    }

    #[test]
    fn test_replace_children_moves_content() {
        let mut fx = Fixture::new();
        let t = transform("children:#content", "children:#main");
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert!(body(&fx.theme).contains("<div id=\"main\" class=\"slot\"><p>one</p>between<p>two</p></div>tail"));
        // The emptied content element is gone; its tail stays put.
        assert!(fx.content.body().is_some());
        assert_eq!(body(&fx.content), "after<span class=\"extra\" lang=\"en\">x</span>");
    }

    #[test]
    fn test_move_false_leaves_content() {
        let mut fx = Fixture::new();
        let before = body(&fx.content);
        let mut t = transform("#content p", "children:#main");
        t.move_content = false;
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        assert_eq!(body(&fx.content), before);
        let main = fx.theme.body().and_then(|b| fx.theme.element_children(b).nth(1)).unwrap();
        assert_eq!(inner(&fx.theme, main), "placeholder<p>one</p><p>two</p>");
    }

    #[test]
    fn test_move_detaches_elements_and_keeps_tails() {
        let mut fx = Fixture::new();
        let t = transform("#content p", "children:#main");
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        let content_div = fx.content.body().and_then(|b| fx.content.element_children(b).next()).unwrap();
        assert_eq!(inner(&fx.content, content_div), "between");
    }

    #[test]
    fn test_replace_elements_moves_theme_tail_up() {
        let mut fx = Fixture::new();
        let t = transform("span", "#main");
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert_eq!(
            body(&fx.theme),
            "<div id=\"header\">H</div>tail<span class=\"extra\" lang=\"en\">x</span><div id=\"footer\">F</div>"
        );
    }

    #[test]
    fn test_nested_element_matches_move_once() {
        let mut fx = Fixture::with(
            "<html><body><div id=o><div id=i>x</div>y</div></body></html>",
            "<html><body><div id=main></div></body></html>",
        );
        let t = transform("body div", "children:#main");
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        let themed = body(&fx.theme);
        assert_eq!(themed.matches("id=\"i\"").count(), 1);
        assert_eq!(themed, "<div id=\"main\"><div id=\"o\">y</div><div id=\"i\">x</div></div>");
        assert_eq!(body(&fx.content), "");
    }

    #[test]
    fn test_nested_children_matches_import_once() {
        let mut fx = Fixture::with(
            "<html><body><div id=o><div id=i>x</div>y</div></body></html>",
            "<html><body><div id=main></div></body></html>",
        );
        let t = transform("children:body div", "children:#main");
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert_eq!(body(&fx.theme), "<div id=\"main\"><div id=\"i\">x</div>y</div>");
        assert_eq!(body(&fx.content), "");

        let mut fx = Fixture::with(
            "<html><body><div id=o><div id=i>x</div>y</div></body></html>",
            "<html><body><div id=main></div></body></html>",
        );
        let mut t = transform("children:body div", "children:#main");
        t.move_content = false;
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert_eq!(body(&fx.theme), "<div id=\"main\"><div id=\"i\">x</div>y</div>");
        assert!(body(&fx.content).contains("id=\"o\""));
    }

    #[test]
    fn test_mixed_text_and_elements_keep_order() {
        let mut fx = Fixture::new();
        let t = transform("/html/body/div/node()", "children:#main");
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        let main = fx.theme.body().and_then(|b| fx.theme.element_children(b).nth(1)).unwrap();
        assert_eq!(inner(&fx.theme, main), "<p>one</p>between<p>two</p>");
        // The moved text run leaves the content along with the elements.
        let content_div = fx.content.body().and_then(|b| fx.content.element_children(b).next()).unwrap();
        assert_eq!(inner(&fx.content, content_div), "");
    }

    #[test]
    fn test_copied_text_stays_in_content() {
        let mut fx = Fixture::new();
        let t = transform("/html/body/div/text()", "children:#main");
        fx.run(&build(ActionKind::Copy, t), false).unwrap();
        let main = fx.theme.body().and_then(|b| fx.theme.element_children(b).nth(1)).unwrap();
        assert_eq!(inner(&fx.theme, main), "placeholderbetween");
        let content_div = fx.content.body().and_then(|b| fx.content.element_children(b).next()).unwrap();
        assert_eq!(inner(&fx.content, content_div), "<p>one</p>between<p>two</p>");
    }

    #[test]
    fn test_append_and_prepend_elements_positions() {
        let mut fx = Fixture::new();
        let t = transform("span", "#main");
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        assert!(body(&fx.theme).contains("placeholder</div>tail<span"));

        let mut fx = Fixture::new();
        let t = transform("span", "#main");
        fx.run(&build(ActionKind::Prepend, t), false).unwrap();
        assert!(body(&fx.theme).contains("H</div><span class=\"extra\" lang=\"en\">x</span><div id=\"main\""));
    }

    #[test]
    fn test_prepend_children_goes_first() {
        let mut fx = Fixture::new();
        let t = transform("children:#content", "children:#main");
        fx.run(&build(ActionKind::Prepend, t), false).unwrap();
        assert!(body(&fx.theme).contains("<p>one</p>between<p>two</p>placeholder</div>"));
    }

    #[test]
    fn test_attribute_precedence() {
        let mut fx = Fixture::new();
        let t = transform("attributes:span", "attributes:#main");
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        let main = fx.theme.body().and_then(|b| fx.theme.element_children(b).nth(1)).unwrap();
        assert_eq!(fx.theme.attr(main, "class"), Some("slot"));
        assert_eq!(fx.theme.attr(main, "lang"), Some("en"));

        let mut fx = Fixture::new();
        let t = transform("attributes:span", "attributes:#main");
        fx.run(&build(ActionKind::Prepend, t), false).unwrap();
        let main = fx.theme.body().and_then(|b| fx.theme.element_children(b).nth(1)).unwrap();
        assert_eq!(fx.theme.attr(main, "class"), Some("extra"));
        assert_eq!(fx.theme.attr(main, "id"), Some("main"));
        let span = fx.content.body().and_then(|b| fx.content.element_children(b).nth(1)).unwrap();
        assert!(fx.content.attrs(span).unwrap().is_empty());
    }

    #[test]
    fn test_replace_named_attributes() {
        let mut fx = Fixture::new();
        let t = transform("attributes(lang):span", "attributes:#main");
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        let main = fx.theme.body().and_then(|b| fx.theme.element_children(b).nth(1)).unwrap();
        let names: Vec<&str> = fx.theme.attrs(main).unwrap().names().collect();
        assert_eq!(names, vec!["lang"]);
        let span = fx.content.body().and_then(|b| fx.content.element_children(b).nth(1)).unwrap();
        assert_eq!(fx.content.attr(span, "class"), Some("extra"));
    }

    #[test]
    fn test_replace_tag() {
        let mut fx = Fixture::new();
        let t = transform("tag:span", "tag:#header");
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert!(body(&fx.theme).starts_with("<span class=\"extra\" lang=\"en\">H</span>"));
    }

    #[test]
    fn test_incompatible_pairs_rejected() {
        let t = transform("tag:span", "tag:#header");
        assert!(Action::transform(ActionKind::Append, t).is_err());
        let t = transform("span", "#header");
        assert!(Action::transform(ActionKind::Copy, t).is_err());
        let t = transform("attributes:span", "children:#header");
        assert!(Action::transform(ActionKind::Replace, t).is_err());
        assert!(Action::drop(DropAction::default()).is_err());
    }

    #[test]
    fn test_nocontent_policies() {
        let mut fx = Fixture::new();
        let mut t = transform("#missing", "#main");
        t.nocontent = NoMatchPolicy::Abort;
        assert!(fx.run(&build(ActionKind::Replace, t), false).is_err());

        let mut fx = Fixture::new();
        let before = body(&fx.theme);
        let mut t = transform("#missing", "#main");
        t.nocontent = NoMatchPolicy::Ignore;
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert_eq!(body(&fx.theme), before);
        assert!(fx.log.at_least(crate::log::Level::Warn).next().is_none());

        let mut fx = Fixture::new();
        let t = transform("#missing", "#main");
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert_eq!(fx.log.at_least(crate::log::Level::Warn).count(), 1);
    }

    #[test]
    fn test_manytheme_pick_last_and_abort() {
        let mut fx = Fixture::new();
        let mut t = transform("span", "children:body > div");
        t.manytheme = ManyPolicy::parse("manytheme", Some("last")).unwrap();
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        assert!(body(&fx.theme).ends_with("F<span class=\"extra\" lang=\"en\">x</span></div>"));

        let mut fx = Fixture::new();
        let mut t = transform("span", "children:body > div");
        t.manytheme = ManyPolicy::parse("manytheme", Some("abort")).unwrap();
        assert!(fx.run(&build(ActionKind::Append, t), false).is_err());
    }

    #[test]
    fn test_content_nodes_are_not_theme_targets() {
        let mut fx = Fixture::new();
        let t = transform("children:#content", "children:#main");
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        // The moved <p> elements are now in the theme but may not be selected.
        let t = transform("span", "children:p");
        fx.run(&build(ActionKind::Append, t), false).unwrap();
        assert_eq!(fx.log.at_least(crate::log::Level::Warn).count(), 1);
        assert!(!body(&fx.theme).contains("<span"));
    }

    #[test]
    fn test_if_content_guard() {
        let mut fx = Fixture::new();
        let mut t = transform("span", "#main");
        t.if_content = Some(Selector::parse_guard("#nothing").unwrap());
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert!(body(&fx.theme).contains("placeholder"));

        let mut fx = Fixture::new();
        let mut t = transform("span", "#main");
        t.if_content = Some(Selector::parse_guard("not:#nothing").unwrap());
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert!(!body(&fx.theme).contains("placeholder"));

        let mut fx = Fixture::new();
        let mut t = transform("span", "#main");
        t.if_content = Some(Selector::parse_guard("attributes(title):span").unwrap());
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert!(body(&fx.theme).contains("placeholder"));
    }

    #[test]
    fn test_copy_never_detaches() {
        let mut fx = Fixture::new();
        let before = body(&fx.content);
        let t = transform("#content p", "children:#footer");
        fx.run(&build(ActionKind::Copy, t), false).unwrap();
        assert_eq!(body(&fx.content), before);
        assert!(body(&fx.theme).ends_with("F<p>one</p><p>two</p></div>"));
    }

    #[test]
    fn test_drop_targets() {
        let mut fx = Fixture::new();
        let drop = DropAction {
            theme: Some(Selector::parse("#header").unwrap()),
            content: Some(Selector::parse("attributes(lang):span").unwrap()),
            ..DropAction::default()
        };
        fx.run(&Action::drop(drop).unwrap(), false).unwrap();
        assert!(body(&fx.theme).starts_with("<div id=\"main\""));
        let span = fx.content.body().and_then(|b| fx.content.element_children(b).nth(1)).unwrap();
        assert_eq!(fx.content.attr(span, "lang"), None);
        assert_eq!(fx.content.attr(span, "class"), Some("extra"));
    }

    #[test]
    fn test_drop_targets_are_independent() {
        let mut fx = Fixture::new();
        let drop = DropAction {
            theme: Some(Selector::parse("#nothing").unwrap()),
            content: Some(Selector::parse("span").unwrap()),
            notheme: NoMatchPolicy::Ignore,
            ..DropAction::default()
        };
        fx.run(&Action::drop(drop).unwrap(), false).unwrap();
        assert!(!body(&fx.content).contains("span"));
    }

    #[test]
    fn test_drop_children_and_tag() {
        let mut fx = Fixture::new();
        let drop = DropAction {
            theme: Some(Selector::parse("children:#main").unwrap()),
            ..DropAction::default()
        };
        fx.run(&Action::drop(drop).unwrap(), false).unwrap();
        assert!(body(&fx.theme).contains("<div id=\"main\" class=\"slot\"></div>tail"));

        let mut fx = Fixture::new();
        let drop = DropAction {
            theme: Some(Selector::parse("tag:#main").unwrap()),
            ..DropAction::default()
        };
        fx.run(&Action::drop(drop).unwrap(), false).unwrap();
        assert!(body(&fx.theme).contains("H</div>placeholdertail<div id=\"footer\">"));
    }

    #[test]
    fn test_debug_markers() {
        let mut fx = Fixture::new();
        let t = transform("span", "#main");
        fx.run(&build(ActionKind::Replace, t), true).unwrap();
        let html = body(&fx.theme);
        let applying = html.find("<!-- dovetail: applying <replace").unwrap();
        let span = html.find("<span").unwrap();
        let done = html.find("<!-- dovetail: done <replace").unwrap();
        assert!(applying < span && span < done);
    }

    #[test]
    fn test_content_href_fetch() {
        let mut fx = Fixture::new();
        fx.fetcher.insert("http://example.com/extra.html", "<p id=remote>remote</p>");
        let mut t = transform("#remote", "#main");
        t.content_href = Some("/extra.html".to_string());
        fx.run(&build(ActionKind::Replace, t), false).unwrap();
        assert!(body(&fx.theme).contains("<p id=\"remote\">remote</p>tail"));

        let mut fx = Fixture::new();
        let mut t = transform("#remote", "#main");
        t.content_href = Some("/gone.html".to_string());
        assert!(fx.run(&build(ActionKind::Replace, t), false).is_err());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(NoMatchPolicy::parse("nocontent", None).unwrap(), NoMatchPolicy::Warn);
        assert_eq!(NoMatchPolicy::parse("nocontent", Some("IGNORE")).unwrap(), NoMatchPolicy::Ignore);
        assert!(NoMatchPolicy::parse("nocontent", Some("last")).is_err());
        let p = ManyPolicy::parse("manytheme", Some("warn:last")).unwrap();
        assert_eq!((p.action, p.pick), (NoMatchPolicy::Warn, TieBreak::Last));
        assert_eq!(p.to_string(), "warn:last");
        assert!(ManyPolicy::parse("manytheme", Some("abort:last")).is_err());
    }

    #[test]
    fn test_display_and_default_class() {
        let mut t = transform("children:#a", "children:#b");
        t.nocontent = NoMatchPolicy::Ignore;
        t.move_content = false;
        let a = build(ActionKind::Replace, t);
        assert_eq!(
            a.to_string(),
            "<replace content=\"children:#a\" move=\"0\" nocontent=\"ignore\" theme=\"children:#b\" />"
        );
        let rule = Rule::new(vec![], vec![a]);
        assert_eq!(rule.classes, vec!["default".to_string()]);
    }
}
