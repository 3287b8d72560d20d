//! Resource lookup for the CLI: `--resource` overrides, then local files,
//! then the network when built with the `http` feature.

use std::collections::HashMap;
use std::fs;

use dt_core::{FetchError, ResourceFetcher};

#[derive(Debug, Default)]
pub struct LayeredFetcher {
    overrides: HashMap<String, String>,
}

impl LayeredFetcher {
    /// Build from `URL=PATH` pairs.
    pub fn from_pairs(pairs: &[String]) -> Result<Self, String> {
        let mut overrides = HashMap::new();
        for pair in pairs {
            let (url, path) = pair
                .split_once('=')
                .ok_or_else(|| format!("Invalid resource '{}': expected URL=PATH", pair))?;
            overrides.insert(url.trim().to_string(), path.trim().to_string());
        }
        Ok(Self { overrides })
    }

    fn read_file(url: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FetchError::NotFound { url: url.to_string() },
            _ => FetchError::Other {
                url: url.to_string(),
                reason: e.to_string(),
            },
        })
    }
}

impl ResourceFetcher for LayeredFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = self.overrides.get(url) {
            log::debug!("fetching {url} from {path}");
            return Self::read_file(url, path);
        }
        if let Some(path) = url.strip_prefix("file://") {
            return Self::read_file(url, path);
        }
        fetch_remote(url)
    }
}

#[cfg(feature = "http")]
fn fetch_remote(url: &str) -> Result<Vec<u8>, FetchError> {
    log::info!("fetching {url}");
    let response = reqwest::blocking::get(url).map_err(|e| FetchError::Other {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response
        .bytes()
        .map(|b| b.to_vec())
        .map_err(|e| FetchError::Other {
            url: url.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(not(feature = "http"))]
fn fetch_remote(url: &str) -> Result<Vec<u8>, FetchError> {
    Err(FetchError::Other {
        url: url.to_string(),
        reason: "no --resource given and network fetching is disabled (build with --features http)".to_string(),
    })
}
