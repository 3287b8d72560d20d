//! Engine configuration.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_CLASS_HEADER: &str = "X-Dovetail-Page-Class";
pub const DEFAULT_PAGE_CLASS_ENVIRON: &str = "dovetail.page_classes";

/// Knobs that apply to every request a [`crate::RuleSet`] themes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Bracket every edit with marker comments.
    pub debug: bool,
    /// Theme used when neither a rule nor the ruleset names one.
    pub default_theme: Option<String>,
    /// How long a fetched theme stays fresh. Zero disables caching.
    pub theme_cache_ttl_secs: u64,
    /// Whether `<match hook=…>` hooks may run.
    pub execute_hooks: bool,
    /// Response header carrying extra page classes.
    pub page_class_header: String,
    /// Environ key carrying extra page classes.
    pub page_class_environ: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_theme: None,
            theme_cache_ttl_secs: 60,
            execute_hooks: false,
            page_class_header: DEFAULT_PAGE_CLASS_HEADER.to_string(),
            page_class_environ: DEFAULT_PAGE_CLASS_ENVIRON.to_string(),
        }
    }
}
