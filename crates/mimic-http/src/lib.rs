//! mimic-http: one async HTTP session API over interchangeable transports
//!
//! Callers build a [`Session`] and issue requests; the session is bound at
//! construction to either a registered preferred engine or the built-in
//! reqwest fallback, and behaves the same either way: same options, same
//! streaming behaviour, same error kinds.
//!
//! # Architecture
//!
//! - `proxy`: proxy normalization and per-URL selection
//! - `tls`: verification flag interpretation
//! - `response`: buffered/streamed response wrapper with idempotent release
//! - `fallback`: request orchestration on reqwest, including SOCKS routing
//! - `backend`: the backend trait and once-per-process backend selection
//! - `session`: the caller-facing facade

pub mod backend;
pub mod config;
pub mod error;
pub mod fallback;
pub mod proxy;
pub mod response;
pub mod session;
pub mod tls;

pub use backend::{
    capabilities, register_preferred_engine, Backend, BackendCapabilities, Capabilities,
    PreferredEngine,
};
pub use config::{RequestBody, RequestOptions, SessionConfig};
pub use error::{HttpError, HttpErrorCategory, HttpResult};
pub use fallback::FallbackSession;
pub use proxy::{ProxyMap, ProxySpec};
pub use response::Response;
pub use session::{BoundBackend, Session};
pub use tls::{TlsContext, TrustStore, Verify};

pub use mimic_common::{HttpMethod, HttpStatus};
