//! Resource fetching capability.
//!
//! The engine never performs I/O itself: themes and `href=` content are
//! requested through a [`ResourceFetcher`] supplied by the host.

use std::collections::HashMap;

use crate::error::FetchError;

/// Blocking `url -> bytes` lookup. Retries, timeouts and transport are the
/// implementor's business.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

impl<F> ResourceFetcher for F
where
    F: Fn(&str) -> Result<Vec<u8>, FetchError> + Send + Sync,
{
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self(url)
    }
}

/// In-memory fetcher keyed by absolute URL.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    resources: HashMap<String, Vec<u8>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.resources.insert(url.into(), body.into());
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn contains(&self, url: &str) -> bool {
        self.resources.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.resources
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound { url: url.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_fetcher() {
        let fetcher = StaticFetcher::new().with("http://x/theme.html", "<html></html>");
        assert_eq!(fetcher.fetch("http://x/theme.html").unwrap(), b"<html></html>");
        assert!(matches!(
            fetcher.fetch("http://x/missing"),
            Err(FetchError::NotFound { .. })
        ));
    }

    #[test]
    fn test_closure_fetcher() {
        let fetcher = |url: &str| -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 503,
            })
        };
        assert_eq!(fetcher.fetch("http://x/").unwrap_err().url(), "http://x/");
    }
}
