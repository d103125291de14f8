use serde::{Deserialize, Serialize};

use crate::types::{TenantId, UserId};

/// Identity resolved from a bearer session by the external auth
/// collaborator.
///
/// The core never resolves sessions itself; it only checks that the caller
/// is a member of the tenant an operation touches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Caller {
    /// Verified user identifier.
    pub user: UserId,

    /// Tenants the user is a member of.
    pub memberships: Vec<TenantId>,
}

impl Caller {
    /// Create a caller with the given memberships.
    #[must_use]
    pub fn new(user: impl Into<UserId>, memberships: Vec<TenantId>) -> Self {
        Self {
            user: user.into(),
            memberships,
        }
    }

    /// Whether the caller belongs to `tenant`.
    pub fn is_member(&self, tenant: &TenantId) -> bool {
        self.memberships.contains(tenant)
    }
}
