//! Error types shared across the engine.

use std::fmt;

/// Where a ruleset construct came from, for error messages and log entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub source: String,
    pub line: Option<u32>,
}

impl SourceLocation {
    pub fn new(source: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            source: source.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.source, line),
            None => write!(f, "{}", self.source),
        }
    }
}

/// A malformed ruleset, selector or matcher pattern. Fatal at load time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}{}", location_suffix(.location))]
pub struct SyntaxError {
    pub message: String,
    pub location: Option<SourceLocation>,
}

fn location_suffix(location: &Option<SourceLocation>) -> String {
    match location {
        Some(l) => format!(" (at {l})"),
        None => String::new(),
    }
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Attach a location unless one is already set.
    pub fn at(mut self, location: Option<&SourceLocation>) -> Self {
        if self.location.is_none() {
            self.location = location.cloned();
        }
        self
    }
}

/// Abandon theming for the current request and pass the content through.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("theming aborted: {reason}")]
pub struct AbortTheme {
    pub reason: String,
}

impl AbortTheme {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Failure reported by a [`crate::fetch::ResourceFetcher`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("{url} not found")]
    NotFound { url: String },
    #[error("failed to fetch {url}: {reason}")]
    Other { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. } | FetchError::NotFound { url } | FetchError::Other { url, .. } => url,
        }
    }
}

impl From<FetchError> for AbortTheme {
    fn from(err: FetchError) -> Self {
        AbortTheme::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new("bad selector");
        assert_eq!(err.to_string(), "bad selector");

        let err = err.at(Some(&SourceLocation::new("rules.xml", Some(12))));
        assert_eq!(err.to_string(), "bad selector (at rules.xml:12)");
    }

    #[test]
    fn test_at_keeps_first_location() {
        let err = SyntaxError::new("x")
            .at(Some(&SourceLocation::new("a.xml", Some(1))))
            .at(Some(&SourceLocation::new("b.xml", Some(2))));
        assert_eq!(err.location.unwrap().source, "a.xml");
    }

    #[test]
    fn test_fetch_error_into_abort() {
        let err = FetchError::Status {
            url: "http://x/theme.html".to_string(),
            status: 404,
        };
        assert_eq!(err.url(), "http://x/theme.html");
        let abort: AbortTheme = err.into();
        assert!(abort.reason.contains("404"));
    }
}
