//! Shared request/response types.

use std::collections::BTreeMap;

use url::Url;

use crate::error::SyntaxError;

// ============================================================================
// Headers
// ============================================================================

/// Ordered, multi-valued HTTP headers with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name` joined with `", "`.
    pub fn get_joined(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self.get_all(name).collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.entries.push((name, value.into()));
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Distinct header names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (k, _) in &self.entries {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(k)) {
                names.push(k);
            }
        }
        names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in iter {
            map.append(k, v);
        }
        map
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// The request whose response is being themed.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    /// URL path, percent-encoded as received.
    pub path: String,
    /// Host name without port.
    pub host: String,
    pub headers: HeaderMap,
    /// Server-side variables. Keys are case-sensitive.
    pub environ: BTreeMap<String, String>,
}

impl Request {
    pub fn new(url: &str) -> Result<Self, SyntaxError> {
        let url = Url::parse(url).map_err(|e| SyntaxError::new(format!("invalid request URL {url:?}: {e}")))?;
        Ok(Self::from_url(url))
    }

    pub fn from_url(url: Url) -> Self {
        let host = url.host_str().unwrap_or_default().to_string();
        let path = url.path().to_string();
        let mut headers = HeaderMap::new();
        if !host.is_empty() {
            match url.port() {
                Some(port) => headers.insert("Host", format!("{host}:{port}")),
                None => headers.insert("Host", host.clone()),
            }
        }
        Self {
            url,
            path,
            host,
            headers,
            environ: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_environ(mut self, key: &str, value: &str) -> Self {
        self.environ.insert(key.to_string(), value.to_string());
        self
    }
}

/// An origin response: status, headers and raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    /// A 200 `text/html` response.
    pub fn html(body: impl Into<Vec<u8>>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/html; charset=utf-8");
        Self::new(200, headers, body.into())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("Content-Type")
    }

    /// Replace the body, keeping `Content-Length` in step when present.
    pub fn set_body(&mut self, body: Vec<u8>) {
        if self.headers.contains("Content-Length") {
            self.headers.insert("Content-Length", body.len().to_string());
        }
        self.body = body;
    }

    /// Whether the body looks like HTML that can be themed.
    pub fn is_html(&self) -> bool {
        match self.content_type() {
            None => true,
            Some(ct) => {
                let mime = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
                mime == "text/html" || mime == "application/xhtml+xml"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.append("X-Thing", "a");
        headers.append("x-thing", "b");
        assert_eq!(headers.get("X-THING"), Some("a"));
        assert_eq!(headers.get_joined("x-Thing"), Some("a, b".to_string()));
        assert_eq!(headers.names(), vec!["X-Thing"]);
        headers.insert("X-Thing", "c");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_request_from_url() {
        let req = Request::new("http://example.com:8080/blog/post?x=1").unwrap();
        assert_eq!(req.host, "example.com");
        assert_eq!(req.path, "/blog/post");
        assert_eq!(req.headers.get("host"), Some("example.com:8080"));
        assert!(Request::new("not a url").is_err());
    }

    #[test]
    fn test_set_body_updates_length() {
        let mut resp = Response::html("abc");
        resp.set_body(b"abcdef".to_vec());
        assert!(!resp.headers.contains("Content-Length"));

        resp.headers.insert("Content-Length", "6");
        resp.set_body(b"xy".to_vec());
        assert_eq!(resp.headers.get("content-length"), Some("2"));
    }

    #[test]
    fn test_is_html() {
        assert!(Response::html("x").is_html());
        let mut resp = Response::html("x");
        resp.headers.insert("Content-Type", "image/png");
        assert!(!resp.is_html());
    }
}
