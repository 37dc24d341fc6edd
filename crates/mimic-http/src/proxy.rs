//! Proxy configuration normalization and per-URL selection

use serde::Deserialize;
use std::collections::HashMap;

/// Proxy configuration as callers supply it: one URL for every scheme, or a
/// scheme-keyed mapping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProxySpec {
    Url(String),
    Map(HashMap<String, String>),
}

impl From<&str> for ProxySpec {
    fn from(url: &str) -> Self {
        ProxySpec::Url(url.to_string())
    }
}

impl From<String> for ProxySpec {
    fn from(url: String) -> Self {
        ProxySpec::Url(url)
    }
}

impl From<HashMap<String, String>> for ProxySpec {
    fn from(map: HashMap<String, String>) -> Self {
        ProxySpec::Map(map)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ProxySpec {
    fn from(pairs: [(&str, &str); N]) -> Self {
        ProxySpec::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Canonical proxy mapping. Only the `http` and `https` keys exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyMap {
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyMap {
    /// Same proxy for both schemes.
    pub fn all(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            http: Some(url.clone()),
            https: Some(url),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.http.is_none() && self.https.is_none()
    }

    /// Proxy configured for `scheme`, if that scheme is one of the two keys.
    pub fn get(&self, scheme: &str) -> Option<&str> {
        match scheme {
            "http" => self.http.as_deref(),
            "https" => self.https.as_deref(),
            _ => None,
        }
    }

    /// Overlay the entries present in `other`.
    pub fn merge(&mut self, other: &ProxyMap) {
        if let Some(http) = &other.http {
            self.http = Some(http.clone());
        }
        if let Some(https) = &other.https {
            self.https = Some(https.clone());
        }
    }

    /// `None` when no entry survived.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

/// Normalize heterogeneous proxy configuration.
///
/// A URL maps to both schemes. A mapping has its keys lower-cased, keeps only
/// `http`/`https`, and drops empty values. Empty input or an empty result
/// yields `None`.
pub fn normalize(value: Option<&ProxySpec>) -> Option<ProxyMap> {
    match value? {
        ProxySpec::Url(url) if url.is_empty() => None,
        ProxySpec::Url(url) => Some(ProxyMap::all(url.as_str())),
        ProxySpec::Map(map) => {
            let mut out = ProxyMap::default();
            for (key, proxy) in map {
                if proxy.is_empty() {
                    continue;
                }
                match key.to_ascii_lowercase().as_str() {
                    "http" => out.http = Some(proxy.clone()),
                    "https" => out.https = Some(proxy.clone()),
                    _ => {}
                }
            }
            out.into_option()
        }
    }
}

/// Select the proxy for `url`.
///
/// Looks up the URL's scheme (`https` when it has none), then falls back to
/// the `https` entry, then the `http` entry.
pub fn pick<'a>(url: &str, proxies: Option<&'a ProxyMap>) -> Option<&'a str> {
    let proxies = proxies?;
    let scheme = url_scheme(url);
    proxies
        .get(&scheme)
        .or(proxies.https.as_deref())
        .or(proxies.http.as_deref())
}

/// True for `socks4://`, `socks5://`, `socks5h://` and friends.
pub fn is_socks(proxy: &str) -> bool {
    proxy
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("socks"))
}

fn url_scheme(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.scheme().to_ascii_lowercase(),
        Err(_) => "https".to_string(),
    }
}
