//! Tenant identity and per-request tenant context.
//!
//! Every readable or mutable entity carries a [`TenantId`]; retrieval and
//! indexing calls are gated on the context derived here.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Opaque tenant identifier.
///
/// Construction validates non-emptiness; beyond that the value is treated
/// as an opaque key in every store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Creates a tenant id from a non-empty string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TenantMissing`] when the value is empty or
    /// whitespace-only.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::TenantMissing);
        }
        Ok(Self(id))
    }

    /// Returns the tenant id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Claims extracted from an authenticated request by the (out-of-scope)
/// HTTP layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestClaims {
    /// Explicit tenant claim, when the identity provider issues one.
    pub tenant: Option<String>,
    /// Authenticated subject (user or service principal).
    pub subject: Option<String>,
}

/// Resolved tenant context for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant: TenantId,
    subject: Option<String>,
}

impl TenantContext {
    /// Derives the tenant context from request claims.
    ///
    /// The explicit tenant claim wins; single-tenant deployments that only
    /// issue a subject fall back to using the subject as the tenant key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TenantMissing`] when neither claim resolves.
    pub fn from_claims(claims: &RequestClaims) -> Result<Self> {
        let raw = claims
            .tenant
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or(claims.subject.as_deref())
            .ok_or(Error::TenantMissing)?;
        Ok(Self {
            tenant: TenantId::new(raw)?,
            subject: claims.subject.clone(),
        })
    }

    /// Builds a context directly from a tenant id (internal callers, jobs).
    #[must_use]
    pub const fn for_tenant(tenant: TenantId) -> Self {
        Self {
            tenant,
            subject: None,
        }
    }

    /// The resolved tenant.
    #[must_use]
    pub const fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// The authenticated subject, when known.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }
}
