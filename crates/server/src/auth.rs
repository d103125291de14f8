//! Session resolution and tenant-membership checks.
//!
//! Authentication itself is an external collaborator: something turns a
//! bearer session into a verified [`Caller`]. The server only depends on
//! the [`SessionResolver`] trait and checks memberships per operation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use axum::http::HeaderMap;
use metahub_core::{Caller, HubError, TenantId};

use crate::error::ApiError;

/// Resolves a bearer session token to a caller identity.
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Resolve the token, `None` when it is unknown or expired.
    async fn resolve(&self, token: &str) -> Option<Caller>;
}

/// A fixed token table. Used by tests and single-user dev setups; a real
/// deployment plugs its identity provider in behind [`SessionResolver`].
#[derive(Default)]
pub struct StaticSessionResolver {
    sessions: RwLock<HashMap<String, Caller>>,
}

impl StaticSessionResolver {
    /// Create an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session token for a caller.
    pub fn insert(&self, token: impl Into<String>, caller: Caller) {
        self.sessions
            .write()
            .expect("session map poisoned")
            .insert(token.into(), caller);
    }
}

#[async_trait]
impl SessionResolver for StaticSessionResolver {
    async fn resolve(&self, token: &str) -> Option<Caller> {
        self.sessions
            .read()
            .expect("session map poisoned")
            .get(token)
            .cloned()
    }
}

/// Extract and resolve the bearer session from the request headers.
pub async fn authenticate(
    resolver: &dyn SessionResolver,
    headers: &HeaderMap,
) -> Result<Caller, ApiError> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthenticated("missing bearer session".to_owned()))?;
    resolver
        .resolve(token)
        .await
        .ok_or_else(|| ApiError::Unauthenticated("unknown session".to_owned()))
}

/// Require the caller to be a member of `tenant`.
pub fn require_member(caller: &Caller, tenant: &TenantId) -> Result<(), ApiError> {
    if caller.is_member(tenant) {
        Ok(())
    } else {
        Err(ApiError::Hub(HubError::Auth(format!(
            "caller is not a member of tenant {tenant}"
        ))))
    }
}
