//! TLS verification policy

use crate::error::{HttpError, HttpResult};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Verification flag as callers pass it: a boolean, a number, or a string
/// token such as `"off"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Verify {
    Flag(bool),
    Number(i64),
    Token(String),
}

/// String tokens that switch verification off. Matching is exact.
const DISABLED_TOKENS: &[&str] = &["0", "false", "False", "no", "off"];

impl Verify {
    /// True when the value is one of the explicit "off" values.
    pub fn is_disabled(&self) -> bool {
        match self {
            Verify::Flag(enabled) => !enabled,
            Verify::Number(n) => *n == 0,
            Verify::Token(token) => DISABLED_TOKENS.contains(&token.as_str()),
        }
    }
}

impl Default for Verify {
    fn default() -> Self {
        Verify::Flag(true)
    }
}

impl From<bool> for Verify {
    fn from(enabled: bool) -> Self {
        Verify::Flag(enabled)
    }
}

impl From<i64> for Verify {
    fn from(n: i64) -> Self {
        Verify::Number(n)
    }
}

impl From<&str> for Verify {
    fn from(token: &str) -> Self {
        Verify::Token(token.to_string())
    }
}

impl From<String> for Verify {
    fn from(token: String) -> Self {
        Verify::Token(token)
    }
}

/// Root certificates trusted by verified contexts.
///
/// The engine's own trust store is always in effect; `extra` holds any
/// additional roots loaded from a PEM bundle.
#[derive(Clone, Default)]
pub struct TrustStore {
    extra: Arc<[reqwest::Certificate]>,
}

impl TrustStore {
    /// The engine's platform trust store with no additions.
    pub fn system() -> Self {
        Self::default()
    }

    /// Platform trust store plus every certificate in a PEM bundle.
    pub fn with_pem_bundle(pem: &[u8]) -> HttpResult<Self> {
        let certs = reqwest::Certificate::from_pem_bundle(pem)
            .map_err(|e| HttpError::Configuration(format!("invalid CA bundle: {}", e)))?;
        Ok(Self {
            extra: certs.into(),
        })
    }

    /// Read a PEM bundle from disk.
    pub fn from_pem_file(path: &Path) -> HttpResult<Self> {
        let pem = std::fs::read(path).map_err(|e| {
            HttpError::Configuration(format!("cannot read CA bundle {}: {}", path.display(), e))
        })?;
        Self::with_pem_bundle(&pem)
    }

    pub fn extra_roots(&self) -> &[reqwest::Certificate] {
        &self.extra
    }
}

impl fmt::Debug for TrustStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustStore")
            .field("extra_roots", &self.extra.len())
            .finish()
    }
}

/// Effective TLS policy for one request. Always one of the two states.
#[derive(Debug, Clone)]
pub enum TlsContext {
    /// Certificates and hostnames are not checked.
    Disabled,
    /// Certificates are checked against the trust store.
    Verified(TrustStore),
}

impl TlsContext {
    /// Interpret `verify` against `trust`. Evaluated per request.
    pub fn build(verify: &Verify, trust: &TrustStore) -> Self {
        if verify.is_disabled() {
            TlsContext::Disabled
        } else {
            TlsContext::Verified(trust.clone())
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, TlsContext::Verified(_))
    }

    /// Apply the policy to an engine client under construction.
    pub(crate) fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        match self {
            TlsContext::Disabled => builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true),
            TlsContext::Verified(store) => store
                .extra_roots()
                .iter()
                .cloned()
                .fold(builder, |b, cert| b.add_root_certificate(cert)),
        }
    }
}
