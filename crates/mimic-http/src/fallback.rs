//! Fallback backend built on reqwest
//!
//! Emulates the preferred engine's request contract: per-request proxy
//! selection (SOCKS included), per-request TLS policy, redirect control, and
//! buffered or streamed bodies.
//!
//! reqwest fixes proxy, TLS and redirect policy per `Client`, so the
//! persistent engine session is a set of clients keyed by those three
//! settings. They share one cookie jar and the session headers. SOCKS
//! requests get an isolated client of their own, owned by the response.

use crate::backend::{self, Backend, BackendCapabilities, Capabilities};
use crate::config::{RequestBody, RequestOptions, SessionConfig};
use crate::error::{sanitize, HttpError, HttpResult};
use crate::proxy::{self, ProxyMap};
use crate::response::Response;
use crate::tls::{TlsContext, TrustStore};
use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use mimic_common::HttpMethod;
use parking_lot::Mutex;
use reqwest::cookie::Jar;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Identifies one persistent engine client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    proxy: Option<String>,
    verify: bool,
    follow_redirects: bool,
}

/// Where a single request is dispatched.
#[derive(Debug, PartialEq, Eq)]
enum Route {
    /// Shared persistent client, optionally through an HTTP(S) proxy
    Shared(Option<String>),
    /// Temporary client bound to a SOCKS proxy
    Socks(String),
}

/// Session backed by the generic engine.
///
/// Cloning is cheap; clones share the same engine clients.
#[derive(Clone)]
pub struct FallbackSession {
    inner: Arc<FallbackInner>,
}

struct FallbackInner {
    config: SessionConfig,
    capabilities: Capabilities,
    default_proxies: Option<ProxyMap>,
    default_headers: HeaderMap,
    trust_store: TrustStore,
    jar: Arc<Jar>,
    clients: Mutex<HashMap<ClientKey, reqwest::Client>>,
    seeded_hosts: Mutex<HashSet<String>>,
    closed: AtomicBool,
}

impl FallbackSession {
    /// Build a session using this process's capabilities.
    pub fn new(config: SessionConfig) -> HttpResult<Self> {
        Self::with_capabilities(config, backend::capabilities())
    }

    /// Build a session against explicit capabilities.
    pub fn with_capabilities(config: SessionConfig, capabilities: Capabilities) -> HttpResult<Self> {
        let default_headers = header_map(config.headers.iter())?;
        let trust_store = match &config.ca_bundle {
            Some(path) => TrustStore::from_pem_file(path)?,
            None => TrustStore::system(),
        };

        let mut default_proxies = proxy::normalize(config.proxies.as_ref());
        if let Some(url) = config.proxy.as_deref().filter(|u| !u.is_empty()) {
            default_proxies = Some(ProxyMap::all(url));
        }

        if config.impersonate.is_some() || config.http_version.is_some() {
            debug!(
                impersonate = ?config.impersonate,
                http_version = ?config.http_version,
                "fallback backend ignores impersonation hints"
            );
        }

        Ok(Self {
            inner: Arc::new(FallbackInner {
                config,
                capabilities,
                default_proxies,
                default_headers,
                trust_store,
                jar: Arc::new(Jar::default()),
                clients: Mutex::new(HashMap::new()),
                seeded_hosts: Mutex::new(HashSet::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Session-level proxy map after normalization.
    pub fn default_proxies(&self) -> Option<&ProxyMap> {
        self.inner.default_proxies.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of persistent engine clients built so far.
    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().len()
    }

    /// Issue a request.
    ///
    /// Per-call options override the session defaults. Connection failures
    /// and timeouts surface as [`HttpError::Transport`]; a SOCKS proxy without
    /// SOCKS support fails with [`HttpError::Configuration`] before any
    /// network activity.
    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> HttpResult<Response> {
        if self.is_closed() {
            return Err(HttpError::Usage("session is closed".to_string()));
        }

        let timeout = options.timeout.or(self.inner.config.timeout);
        let proxies = self.resolve_proxies(&options);
        let proxy_url = proxy::pick(url, proxies.as_ref()).map(str::to_owned);
        let verify = options.verify.as_ref().unwrap_or(&self.inner.config.verify);
        let tls = TlsContext::build(verify, &self.inner.trust_store);

        for (hint, value) in options.hints() {
            debug!(hint, value, "fallback backend ignores request hint");
        }

        let route = match proxy_url {
            Some(p) if proxy::is_socks(&p) => {
                if !self.inner.capabilities.socks {
                    return Err(HttpError::Configuration(
                        "SOCKS proxy requested but SOCKS support is not available".to_string(),
                    ));
                }
                Route::Socks(p)
            }
            other => Route::Shared(other),
        };

        let target = Url::parse(url)?;
        self.seed_cookies(&target);

        debug!(
            method = %method,
            url = %sanitize(url),
            route = %route_label(&route),
            verify = tls.is_verified(),
            stream = options.stream,
            "dispatching request"
        );

        let (client, owned) = match &route {
            Route::Shared(proxy_url) => (
                self.shared_client(ClientKey {
                    proxy: proxy_url.clone(),
                    verify: tls.is_verified(),
                    follow_redirects: options.allow_redirects,
                })?,
                false,
            ),
            Route::Socks(proxy_url) => (
                self.build_client(Some(proxy_url.as_str()), &tls, options.allow_redirects, timeout)?,
                true,
            ),
        };

        let request = build_request(&client, method, target, &options, timeout);
        let response = request.send().await.map_err(HttpError::from_engine)?;

        let response = Response::from_engine(response, owned.then_some(client));
        if options.stream {
            Ok(response)
        } else {
            response.materialize().await
        }
    }

    /// Session proxies, then per-call `proxies`, then per-call `proxy` for
    /// both schemes.
    fn resolve_proxies(&self, options: &RequestOptions) -> Option<ProxyMap> {
        let mut merged = self.inner.default_proxies.clone().unwrap_or_default();
        if let Some(extra) = proxy::normalize(options.proxies.as_ref()) {
            merged.merge(&extra);
        }
        if let Some(url) = options.proxy.as_deref().filter(|u| !u.is_empty()) {
            merged = ProxyMap::all(url);
        }
        merged.into_option()
    }

    fn shared_client(&self, key: ClientKey) -> HttpResult<reqwest::Client> {
        let mut clients = self.inner.clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }
        let tls = if key.verify {
            TlsContext::Verified(self.inner.trust_store.clone())
        } else {
            TlsContext::Disabled
        };
        let client = self.build_client(key.proxy.as_deref(), &tls, key.follow_redirects, None)?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    fn build_client(
        &self,
        proxy_url: Option<&str>,
        tls: &TlsContext,
        follow_redirects: bool,
        timeout: Option<Duration>,
    ) -> HttpResult<reqwest::Client> {
        let config = &self.inner.config;
        let mut builder = reqwest::Client::builder()
            .default_headers(self.inner.default_headers.clone())
            .cookie_provider(self.inner.jar.clone())
            .user_agent(&config.user_agent);

        builder = if follow_redirects {
            builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        } else {
            builder.redirect(reqwest::redirect::Policy::none())
        };

        builder = tls.apply(builder);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        match proxy_url {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url).map_err(|e| {
                    HttpError::Configuration(format!("invalid proxy {}: {}", sanitize(url), e))
                })?;
                builder = builder.proxy(proxy);
            }
            None if !config.trust_env => builder = builder.no_proxy(),
            None => {}
        }

        builder.build().map_err(HttpError::from_engine)
    }

    /// Make session cookies visible to `target`'s host.
    fn seed_cookies(&self, target: &Url) {
        if self.inner.config.cookies.is_empty() {
            return;
        }
        let Some(host) = target.host_str() else {
            return;
        };
        if !self.inner.seeded_hosts.lock().insert(host.to_string()) {
            return;
        }
        for (name, value) in &self.inner.config.cookies {
            self.inner
                .jar
                .add_cookie_str(&format!("{}={}; Path=/", name, value), target);
        }
    }

    /// Drop every persistent client. Idempotent.
    pub async fn close(&self) -> HttpResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.inner.clients.lock().clear();
        debug!("fallback session closed");
        Ok(())
    }
}

#[async_trait]
impl Backend for FallbackSession {
    fn name(&self) -> &'static str {
        "fallback"
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            impersonation: false,
            http_version_pinning: false,
            socks: self.inner.capabilities.socks,
        }
    }

    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> HttpResult<Response> {
        FallbackSession::request(self, method, url, options).await
    }

    async fn close(&self) -> HttpResult<()> {
        FallbackSession::close(self).await
    }
}

impl std::fmt::Debug for FallbackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackSession")
            .field("timeout", &self.inner.config.timeout)
            .field("socks", &self.inner.capabilities.socks)
            .field("clients", &self.client_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn route_label(route: &Route) -> String {
    match route {
        Route::Shared(None) => "direct".to_string(),
        Route::Shared(Some(p)) => format!("proxy {}", sanitize(p)),
        Route::Socks(p) => format!("socks {}", sanitize(p)),
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

fn header_map<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> HttpResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::Configuration(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::Configuration(format!("invalid value for header {}: {}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn build_request(
    client: &reqwest::Client,
    method: HttpMethod,
    target: Url,
    options: &RequestOptions,
    timeout: Option<Duration>,
) -> reqwest::RequestBuilder {
    let mut builder = client.request(to_reqwest_method(method), target);

    for (name, value) in &options.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    if !options.params.is_empty() {
        builder = builder.query(&options.params);
    }

    builder = match &options.body {
        RequestBody::None => builder,
        RequestBody::Json(value) => builder.json(value),
        RequestBody::Form(fields) => builder.form(fields),
        RequestBody::Bytes(data) => builder.body(data.clone()),
        RequestBody::Text(data) => builder.body(data.clone()),
    };

    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(config: SessionConfig) -> FallbackSession {
        FallbackSession::with_capabilities(config, Capabilities::fallback()).unwrap()
    }

    #[test]
    fn test_singular_proxy_wins_over_mapping() {
        let s = session(SessionConfig::new());
        let options = RequestOptions::new()
            .proxies([("https", "http://p1:8080")])
            .proxy("http://p2:8080");
        assert_eq!(s.resolve_proxies(&options), Some(ProxyMap::all("http://p2:8080")));
    }

    #[test]
    fn test_call_proxies_merge_over_session_proxies() {
        let s = session(SessionConfig::new().proxies([
            ("http", "http://session-http"),
            ("https", "http://session-https"),
        ]));
        let merged = s
            .resolve_proxies(&RequestOptions::new().proxies([("https", "http://call-https")]))
            .unwrap();
        assert_eq!(merged.http.as_deref(), Some("http://session-http"));
        assert_eq!(merged.https.as_deref(), Some("http://call-https"));
    }

    #[test]
    fn test_session_proxy_overrides_session_proxies() {
        let s = session(
            SessionConfig::new()
                .proxies([("https", "http://mapped")])
                .proxy("http://single"),
        );
        assert_eq!(s.default_proxies(), Some(&ProxyMap::all("http://single")));
    }

    #[test]
    fn test_no_proxies_resolves_to_none() {
        let s = session(SessionConfig::new());
        assert_eq!(s.resolve_proxies(&RequestOptions::new()), None);
        assert_eq!(s.resolve_proxies(&RequestOptions::new().proxy("")), None);
    }

    #[test]
    fn test_https_entry_serves_plain_http_urls() {
        let s = session(SessionConfig::new());
        let proxies = s.resolve_proxies(&RequestOptions::new().proxies([("https", "http://p1")]));
        assert_eq!(proxy::pick("http://host", proxies.as_ref()), Some("http://p1"));
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let err = FallbackSession::with_capabilities(
            SessionConfig::new().header("bad header", "x"),
            Capabilities::fallback(),
        )
        .unwrap_err();
        assert!(matches!(err, HttpError::Configuration(_)));
    }

    #[test]
    fn test_missing_ca_bundle_is_configuration_error() {
        let err = FallbackSession::with_capabilities(
            SessionConfig::new().ca_bundle("/nonexistent/ca.pem"),
            Capabilities::fallback(),
        )
        .unwrap_err();
        assert!(matches!(err, HttpError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_shared_clients_are_reused_per_key() {
        let s = session(SessionConfig::new());
        let key = ClientKey {
            proxy: None,
            verify: true,
            follow_redirects: true,
        };
        s.shared_client(key.clone()).unwrap();
        s.shared_client(key).unwrap();
        s.shared_client(ClientKey {
            proxy: None,
            verify: false,
            follow_redirects: true,
        })
        .unwrap();
        assert_eq!(s.client_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_requests() {
        let s = session(SessionConfig::new());
        s.close().await.unwrap();
        s.close().await.unwrap();
        let err = s
            .request(HttpMethod::Get, "http://127.0.0.1:9/", RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Usage(_)));
    }

    #[tokio::test]
    async fn test_socks_without_support_fails_before_parsing_url() {
        let caps = Capabilities {
            preferred: false,
            socks: false,
        };
        let s = FallbackSession::with_capabilities(
            SessionConfig::new().proxy("socks5://127.0.0.1:1080"),
            caps,
        )
        .unwrap();
        let err = s
            .request(HttpMethod::Get, "not a url", RequestOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Configuration(_)));
    }

    #[test]
    fn test_fallback_reports_degraded_capabilities() {
        let s = session(SessionConfig::new());
        let caps = Backend::capabilities(&s);
        assert!(!caps.impersonation);
        assert!(!caps.http_version_pinning);
    }
}
