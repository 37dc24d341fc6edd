//! Session configuration and per-request options

use crate::error::{HttpError, HttpResult};
use crate::proxy::ProxySpec;
use crate::tls::Verify;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a session. Immutable once the session is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Headers sent with every request
    pub headers: HashMap<String, String>,

    /// Cookies sent to every host the session contacts
    pub cookies: HashMap<String, String>,

    /// Default per-request timeout; `None` disables it
    #[serde(deserialize_with = "lenient_secs")]
    pub timeout: Option<Duration>,

    /// Default TLS verification policy
    pub verify: Verify,

    /// Default proxy for both schemes; wins over `proxies`
    pub proxy: Option<String>,

    /// Default scheme-keyed proxies
    pub proxies: Option<ProxySpec>,

    /// Browser fingerprint to impersonate (preferred backend only)
    pub impersonate: Option<String>,

    /// HTTP protocol version pin (preferred backend only)
    pub http_version: Option<String>,

    /// Extra PEM roots added to the trust store
    pub ca_bundle: Option<PathBuf>,

    /// Honour proxy environment variables when no proxy is configured
    pub trust_env: bool,

    /// Redirect hop limit when redirects are followed
    pub max_redirects: usize,

    /// User-Agent header value
    pub user_agent: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            cookies: HashMap::new(),
            timeout: None,
            verify: Verify::default(),
            proxy: None,
            proxies: None,
            impersonate: None,
            http_version: None,
            ca_bundle: None,
            trust_env: true,
            max_redirects: 10,
            user_agent: format!("mimic-http/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl SessionConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from a TOML document
    pub fn from_toml_str(source: &str) -> HttpResult<Self> {
        toml::from_str(source)
            .map_err(|e| HttpError::Configuration(format!("invalid session config: {}", e)))
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set timeout from seconds
    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = secs_to_duration(secs);
        self
    }

    pub fn verify(mut self, verify: impl Into<Verify>) -> Self {
        self.verify = verify.into();
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    pub fn proxies(mut self, proxies: impl Into<ProxySpec>) -> Self {
        self.proxies = Some(proxies.into());
        self
    }

    pub fn impersonate(mut self, target: impl Into<String>) -> Self {
        self.impersonate = Some(target.into());
        self
    }

    pub fn http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = Some(version.into());
        self
    }

    pub fn ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    pub fn trust_env(mut self, enabled: bool) -> Self {
        self.trust_env = enabled;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.max_redirects = max;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Request body types
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body
    #[default]
    None,
    /// JSON body
    Json(serde_json::Value),
    /// Form data (application/x-www-form-urlencoded)
    Form(Vec<(String, String)>),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Raw text
    Text(String),
}

/// Per-call overrides. Unset fields fall back to the session defaults.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Return a live, unread response instead of buffering the body
    pub stream: bool,
    /// Follow redirects
    pub allow_redirects: bool,
    pub timeout: Option<Duration>,
    pub verify: Option<Verify>,
    /// Proxy for both schemes; wins over `proxies`
    pub proxy: Option<String>,
    pub proxies: Option<ProxySpec>,
    pub impersonate: Option<String>,
    pub http_version: Option<String>,
    /// Extra headers, merged over the session headers
    pub headers: Vec<(String, String)>,
    /// Query parameters
    pub params: Vec<(String, String)>,
    pub body: RequestBody,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            stream: false,
            allow_redirects: true,
            timeout: None,
            verify: None,
            proxy: None,
            proxies: None,
            impersonate: None,
            http_version: None,
            headers: Vec::new(),
            params: Vec::new(),
            body: RequestBody::None,
        }
    }
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn allow_redirects(mut self, follow: bool) -> Self {
        self.allow_redirects = follow;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = secs_to_duration(secs);
        self
    }

    pub fn verify(mut self, verify: impl Into<Verify>) -> Self {
        self.verify = Some(verify.into());
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    pub fn proxies(mut self, proxies: impl Into<ProxySpec>) -> Self {
        self.proxies = Some(proxies.into());
        self
    }

    pub fn impersonate(mut self, target: impl Into<String>) -> Self {
        self.impersonate = Some(target.into());
        self
    }

    pub fn http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = Some(version.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Set JSON body
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Set form body
    pub fn form<K: Into<String>, V: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.body = RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set raw bytes body
    pub fn bytes(mut self, data: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(data);
        self
    }

    /// Set raw text body
    pub fn text(mut self, data: impl Into<String>) -> Self {
        self.body = RequestBody::Text(data.into());
        self
    }

    /// Impersonation or protocol hints the caller supplied.
    pub fn hints(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("impersonate", self.impersonate.as_deref()),
            ("http_version", self.http_version.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
    }
}

/// Negative, NaN and infinite seconds mean "no timeout".
fn secs_to_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// Accept a number of seconds; anything else means "no timeout".
fn lenient_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(n) => secs_to_duration(n as f64),
        Raw::Float(f) => secs_to_duration(f),
        Raw::Other(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.timeout.is_none());
        assert!(!config.verify.is_disabled());
        assert!(config.trust_env);
        assert_eq!(config.max_redirects, 10);
        assert!(config.user_agent.starts_with("mimic-http/"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = SessionConfig::new()
            .header("X-Client", "mimic")
            .cookie("sid", "abc")
            .timeout_secs(2.5)
            .verify("off")
            .proxy("http://proxy:3128");

        assert_eq!(config.headers["X-Client"], "mimic");
        assert_eq!(config.cookies["sid"], "abc");
        assert_eq!(config.timeout, Some(Duration::from_millis(2500)));
        assert!(config.verify.is_disabled());
        assert_eq!(config.proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn test_from_toml() {
        let config = SessionConfig::from_toml_str(
            r#"
            timeout = 15
            verify = "no"
            impersonate = "chrome"

            [headers]
            Accept = "application/json"

            [proxies]
            https = "http://secure-proxy:8443"
            "#,
        )
        .unwrap();

        assert_eq!(config.timeout, Some(Duration::from_secs(15)));
        assert!(config.verify.is_disabled());
        assert_eq!(config.impersonate.as_deref(), Some("chrome"));
        assert_eq!(config.headers["Accept"], "application/json");
        assert!(matches!(config.proxies, Some(ProxySpec::Map(_))));
    }

    #[test]
    fn test_from_toml_non_numeric_timeout_is_none() {
        let config = SessionConfig::from_toml_str(r#"timeout = "soon""#).unwrap();
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        let err = SessionConfig::from_toml_str(r#"max_redirects = "many""#).unwrap_err();
        assert!(matches!(err, HttpError::Configuration(_)));
    }

    #[test]
    fn test_request_options_defaults() {
        let options = RequestOptions::default();
        assert!(!options.stream);
        assert!(options.allow_redirects);
        assert!(options.verify.is_none());
        assert_eq!(options.hints().count(), 0);
    }

    #[test]
    fn test_request_options_hints() {
        let options = RequestOptions::new().impersonate("chrome124").http_version("2");
        let hints: Vec<_> = options.hints().collect();
        assert_eq!(hints, vec![("impersonate", "chrome124"), ("http_version", "2")]);
    }

    #[test]
    fn test_negative_timeout_disables() {
        assert!(RequestOptions::new().timeout_secs(-1.0).timeout.is_none());
        assert!(RequestOptions::new().timeout_secs(f64::NAN).timeout.is_none());
    }
}
