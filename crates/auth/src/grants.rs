//! Durable role grants and their read-time reconciliation.
//!
//! Role ownership is recorded twice: as boolean capability flags on the
//! identity record (the legacy representation) and as one `RoleGrant` row per
//! (identity, role). Nothing keeps the two physically in sync. Instead every
//! read reconciles them into a single set: a role is held if EITHER source
//! says so, and `viewer` is always held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolegate_core::Identity;

use crate::roles::{Role, RoleSet};

/// One role-assignment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleGrant {
    pub identity: Identity,
    pub role: Role,
    pub is_active: bool,
    /// Seeded by test mode rather than granted by registration/admin action.
    pub is_test_grant: bool,
    pub granted_at: DateTime<Utc>,
}

impl RoleGrant {
    pub fn active(identity: Identity, role: Role, granted_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            role,
            is_active: true,
            is_test_grant: false,
            granted_at,
        }
    }

    pub fn test_seed(identity: Identity, role: Role, granted_at: DateTime<Utc>) -> Self {
        Self {
            is_test_grant: true,
            ..Self::active(identity, role, granted_at)
        }
    }
}

/// Legacy per-role booleans on the identity record, plus the test-user flag
/// and the persisted current-role pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LegacyCapabilityFlags {
    pub is_viewer: bool,
    pub is_advertiser: bool,
    pub is_publisher: bool,
    pub is_admin: bool,
    pub is_stakeholder: bool,
    pub is_developer: bool,
    pub is_test_user: bool,
    pub current_role: Option<Role>,
}

impl LegacyCapabilityFlags {
    pub fn holds(&self, role: Role) -> bool {
        match role {
            Role::Viewer => self.is_viewer,
            Role::Advertiser => self.is_advertiser,
            Role::Publisher => self.is_publisher,
            Role::Admin => self.is_admin,
            Role::Stakeholder => self.is_stakeholder,
            Role::Developer => self.is_developer,
        }
    }

    pub fn set(&mut self, role: Role, held: bool) {
        let slot = match role {
            Role::Viewer => &mut self.is_viewer,
            Role::Advertiser => &mut self.is_advertiser,
            Role::Publisher => &mut self.is_publisher,
            Role::Admin => &mut self.is_admin,
            Role::Stakeholder => &mut self.is_stakeholder,
            Role::Developer => &mut self.is_developer,
        };
        *slot = held;
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.set(role, true);
        self
    }

    pub fn held_roles(&self) -> impl Iterator<Item = Role> + '_ {
        [
            Role::Viewer,
            Role::Advertiser,
            Role::Publisher,
            Role::Admin,
            Role::Stakeholder,
            Role::Developer,
        ]
        .into_iter()
        .filter(|role| self.holds(*role))
    }
}

/// Everything the store knows about an identity's roles, read together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSnapshot {
    /// `None` when the identity has no record yet.
    pub flags: Option<LegacyCapabilityFlags>,
    pub grants: Vec<RoleGrant>,
}

impl RoleSnapshot {
    pub fn is_test_user(&self) -> bool {
        self.flags.as_ref().is_some_and(|f| f.is_test_user)
    }

    pub fn current_role(&self) -> Option<Role> {
        self.flags.as_ref().and_then(|f| f.current_role)
    }

    pub fn held_roles(&self) -> RoleSet {
        reconcile(self.flags.as_ref(), &self.grants)
    }
}

/// `{viewer} ∪ {r : flag(r)} ∪ {r : grant(r).is_active}`.
pub fn reconcile(flags: Option<&LegacyCapabilityFlags>, grants: &[RoleGrant]) -> RoleSet {
    let mut held = RoleSet::new();
    held.insert(Role::Viewer);

    if let Some(flags) = flags {
        held.extend(flags.held_roles());
    }

    held.extend(grants.iter().filter(|g| g.is_active).map(|g| g.role));
    held
}
