//! Dovetail Core Library
//!
//! This crate provides the theming engine for Dovetail. It merges an origin
//! response (the *content*) into a site-wide HTML template (the *theme*)
//! according to a compiled ruleset.
//!
//! # Architecture
//!
//! Both documents are parsed into arena-backed trees. A [`RuleSet`] classifies
//! the request with its `<match>` predicates, picks the rules registered for
//! the resulting classes and runs their actions in order. Each action locates
//! nodes with a [`Selector`] on both sides and splices content into the theme.
//! Any abort along the way returns the original response unchanged.
//!
//! # Modules
//!
//! - `dom`: arena tree, HTML parsing and serialization, link rewriting, charsets
//! - `selector`: CSS and XPath subsets compiled to one location-path AST
//! - `stringmatch`: pattern and header matchers used by `<match>`
//! - `pagematch`: `<match>` predicates and request classification
//! - `rules`: `<rule>` actions and their error policies
//! - `ruleset`: rule selection, theme resolution and application
//! - `cache`: time-based theme cache
//! - `fetch`: resource fetching capability
//! - `log`: per-request theming log
//! - `config`: engine configuration
//! - `types`: request, response and header types

pub mod cache;
pub mod config;
pub mod dom;
pub mod error;
pub mod fetch;
pub mod log;
pub mod pagematch;
pub mod rules;
pub mod ruleset;
pub mod selector;
pub mod stringmatch;
pub mod types;

// Re-export commonly used types
pub use cache::ThemeCache;
pub use config::ThemeConfig;
pub use dom::{parse_html, serialize, Document, NodeId};
pub use error::{AbortTheme, FetchError, SourceLocation, SyntaxError};
pub use fetch::{ResourceFetcher, StaticFetcher};
pub use self::log::{Level, LogEntry, ThemeLog};
pub use pagematch::{HookRegistry, HookVerdict, Match, MatchHook};
pub use rules::{Action, ActionKind, DropAction, ManyPolicy, NoMatchPolicy, Rule, ThemeRef, Transform};
pub use ruleset::{ApplyContext, RuleSet};
pub use selector::{Selector, SelectorType};
pub use types::{HeaderMap, Request, Response};
