//! Caller-facing session facade
//!
//! A [`Session`] binds to one backend when it is built and forwards every
//! call to it for the rest of its life.

use crate::backend::{self, Backend, BackendCapabilities};
use crate::config::{RequestOptions, SessionConfig};
use crate::error::HttpResult;
use crate::fallback::FallbackSession;
use crate::response::Response;
use futures::future::BoxFuture;
use mimic_common::HttpMethod;
use std::sync::Arc;
use tracing::debug;

/// The backend a session is bound to.
#[derive(Debug, Clone)]
pub enum BoundBackend {
    /// Externally registered engine
    Preferred(Arc<dyn Backend>),
    /// Built-in reqwest backend
    Fallback(FallbackSession),
}

impl BoundBackend {
    fn as_backend(&self) -> &dyn Backend {
        match self {
            BoundBackend::Preferred(backend) => backend.as_ref(),
            BoundBackend::Fallback(session) => session,
        }
    }
}

/// Async HTTP session with the same surface on every backend
///
/// # Example
///
/// ```ignore
/// use mimic_http::{RequestOptions, Session, SessionConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let session = Session::new(SessionConfig::new().timeout_secs(30.0))?;
///
///     let mut response = session
///         .get("https://api.example.com/users/1", RequestOptions::new())
///         .await?;
///     println!("{}: {}", response.status_code, response.text().await?);
///
///     session.close().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    backend: BoundBackend,
}

impl Session {
    /// Bind to the preferred engine when this process has one, otherwise to
    /// the fallback backend.
    pub fn new(config: SessionConfig) -> HttpResult<Self> {
        let caps = backend::capabilities();
        let bound = match backend::preferred_engine() {
            Some(engine) if caps.preferred => BoundBackend::Preferred(engine.connect(&config)?),
            _ => BoundBackend::Fallback(FallbackSession::with_capabilities(config, caps)?),
        };
        debug!(backend = bound.as_backend().name(), "session bound");
        Ok(Self { backend: bound })
    }

    /// Bind to an explicit backend.
    pub fn with_backend(backend: BoundBackend) -> Self {
        Self { backend }
    }

    /// The bound backend, for backend-specific needs.
    pub fn backend(&self) -> &BoundBackend {
        &self.backend
    }

    /// The fallback session, when that is what this session is bound to.
    pub fn fallback(&self) -> Option<&FallbackSession> {
        match &self.backend {
            BoundBackend::Fallback(session) => Some(session),
            BoundBackend::Preferred(_) => None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.as_backend().name()
    }

    /// Features the bound backend honours; hints it cannot honour are ignored.
    pub fn capabilities(&self) -> BackendCapabilities {
        self.backend.as_backend().capabilities()
    }

    pub async fn request(
        &self,
        method: HttpMethod,
        url: &str,
        options: RequestOptions,
    ) -> HttpResult<Response> {
        self.backend.as_backend().request(method, url, options).await
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> HttpResult<Response> {
        self.backend.as_backend().get(url, options).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> HttpResult<Response> {
        self.backend.as_backend().post(url, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> HttpResult<Response> {
        self.backend.as_backend().delete(url, options).await
    }

    pub async fn close(&self) -> HttpResult<()> {
        self.backend.as_backend().close().await
    }

    /// Run `f` with this session and close it afterwards, whatever `f`
    /// returned. An error from `f` takes precedence over a close error.
    pub async fn scoped<T, F>(self, f: F) -> HttpResult<T>
    where
        F: for<'a> FnOnce(&'a Session) -> BoxFuture<'a, HttpResult<T>>,
    {
        let out = f(&self).await;
        let closed = self.close().await;
        let value = out?;
        closed?;
        Ok(value)
    }
}
