//! Request, content and configuration inputs for the commands.

use std::collections::BTreeMap;
use std::fs;

use serde::Deserialize;

use dt_core::{HeaderMap, Request, ResourceFetcher, Response, RuleSet, ThemeConfig};

/// Optional request details read from `--request FILE`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RequestFile {
    pub headers: BTreeMap<String, String>,
    pub environ: BTreeMap<String, String>,
    pub response_headers: BTreeMap<String, String>,
    pub status: Option<u16>,
}

pub fn load_request_file(path: Option<&str>) -> Result<RequestFile, String> {
    let Some(path) = path else {
        return Ok(RequestFile::default());
    };
    let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid request file '{}': {}", path, e))
}

pub fn build_request(url: &str, req_file: &RequestFile) -> Result<Request, String> {
    let mut request = Request::new(url).map_err(|e| e.to_string())?;
    for (name, value) in &req_file.headers {
        request.headers.insert(name.as_str(), value.as_str());
    }
    request.environ.extend(req_file.environ.clone());
    Ok(request)
}

/// The response to theme: `--content` from disk, or the URL itself fetched.
pub fn load_response(
    content: Option<&str>,
    request: &Request,
    req_file: &RequestFile,
    fetcher: &dyn ResourceFetcher,
) -> Result<Response, String> {
    let body = match content {
        Some(path) => fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?,
        None => fetcher
            .fetch(request.url.as_str())
            .map_err(|e| format!("Failed to fetch content: {}", e))?,
    };
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", "text/html");
    for (name, value) in &req_file.response_headers {
        headers.insert(name.as_str(), value.as_str());
    }
    Ok(Response::new(req_file.status.unwrap_or(200), headers, body))
}

pub fn load_config(path: Option<&str>, debug: bool) -> Result<ThemeConfig, String> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
            serde_json::from_str(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))?
        }
        None => ThemeConfig::default(),
    };
    if debug {
        config.debug = true;
    }
    Ok(config)
}

pub fn load_ruleset(path: &str) -> Result<RuleSet, String> {
    dt_compiler::compile_ruleset_file(path).map_err(|e| format!("Failed to load ruleset '{}': {}", path, e))
}
