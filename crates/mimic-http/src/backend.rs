//! Backend interface and process-wide backend selection

use crate::config::{RequestOptions, SessionConfig};
use crate::error::{HttpError, HttpResult};
use crate::response::Response;
use async_trait::async_trait;
use mimic_common::HttpMethod;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

/// What a bound backend can honour beyond the common surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendCapabilities {
    /// Browser TLS fingerprint impersonation (`impersonate` hint)
    pub impersonation: bool,
    /// Pinning the HTTP protocol version (`http_version` hint)
    pub http_version_pinning: bool,
    /// Routing through `socks*://` proxies
    pub socks: bool,
}

/// Interface every transport backend implements.
///
/// The session facade forwards to exactly one implementation chosen at
/// construction time.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> BackendCapabilities;

    async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> HttpResult<Response>;

    async fn get(&self, url: &str, options: RequestOptions) -> HttpResult<Response> {
        self.request(HttpMethod::Get, url, options).await
    }

    async fn post(&self, url: &str, options: RequestOptions) -> HttpResult<Response> {
        self.request(HttpMethod::Post, url, options).await
    }

    async fn delete(&self, url: &str, options: RequestOptions) -> HttpResult<Response> {
        self.request(HttpMethod::Delete, url, options).await
    }

    /// Release the backend's engine sessions. Idempotent.
    async fn close(&self) -> HttpResult<()>;
}

/// Hook through which an external crate supplies the preferred engine.
pub trait PreferredEngine: Send + Sync {
    /// Check that the engine can be loaded in this environment.
    fn probe(&self) -> Result<(), String>;

    /// Open a backend for one session.
    fn connect(&self, config: &SessionConfig) -> HttpResult<Arc<dyn Backend>>;
}

/// Transport capabilities of this process, resolved once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// A preferred engine was registered and its probe succeeded
    pub preferred: bool,
    /// The fallback engine was built with SOCKS support
    pub socks: bool,
}

impl Capabilities {
    /// Fallback-only capabilities for this build.
    pub fn fallback() -> Self {
        Self {
            preferred: false,
            socks: cfg!(feature = "socks"),
        }
    }
}

/// Engine slot, settled by whichever comes first: a registration or the
/// first [`capabilities`] call (which fixes it to `None`).
static PREFERRED_ENGINE: OnceLock<Option<Box<dyn PreferredEngine>>> = OnceLock::new();
static CAPABILITIES: OnceLock<Capabilities> = OnceLock::new();

/// Register the preferred engine.
///
/// Must happen before the first [`capabilities`] call (and therefore before
/// the first session is built); later registrations are rejected.
pub fn register_preferred_engine(engine: impl PreferredEngine + 'static) -> HttpResult<()> {
    PREFERRED_ENGINE
        .set(Some(Box::new(engine)))
        .map_err(|_| match PREFERRED_ENGINE.get() {
            Some(Some(_)) => {
                HttpError::Configuration("preferred engine already registered".to_string())
            }
            _ => HttpError::Configuration(
                "backend selection already resolved for this process".to_string(),
            ),
        })
}

/// Process-wide capabilities. The first call probes; the result never changes.
pub fn capabilities() -> Capabilities {
    *CAPABILITIES.get_or_init(probe)
}

pub(crate) fn preferred_engine() -> Option<&'static dyn PreferredEngine> {
    PREFERRED_ENGINE.get_or_init(|| None).as_deref()
}

fn probe() -> Capabilities {
    let mut caps = Capabilities::fallback();
    match preferred_engine() {
        Some(engine) => match engine.probe() {
            Ok(()) => {
                caps.preferred = true;
                info!("preferred HTTP engine available");
            }
            Err(reason) => warn!(%reason, "preferred HTTP engine unavailable, using fallback"),
        },
        None => info!(socks = caps.socks, "no preferred HTTP engine registered, using fallback"),
    }
    caps
}
