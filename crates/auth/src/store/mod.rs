//! Storage contracts for role and onboarding data.
//!
//! The engine only sees these traits; schema and driver details belong to the
//! implementations (in-memory here, Postgres in `rolegate-infra`). Traits are
//! synchronous: every call is a single store round trip.

use std::sync::Arc;

use thiserror::Error;

use rolegate_core::Identity;

use crate::grants::{LegacyCapabilityFlags, RoleGrant, RoleSnapshot};
use crate::onboarding::OnboardingRecord;
use crate::roles::Role;
use crate::test_mode::TestModeSession;

pub mod memory;

pub use memory::{InMemoryOnboardingStore, InMemoryRoleStore};

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be interpreted.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Durable role data: legacy flags, grant rows, the current-role pointer and
/// test-mode sessions.
pub trait RoleStore: Send + Sync {
    /// Legacy flags (and current-role pointer) for an identity, if it has a record.
    fn load_flags(&self, identity: &Identity) -> Result<Option<LegacyCapabilityFlags>, StoreError>;

    /// All grant rows for an identity, active or not.
    fn list_grants(&self, identity: &Identity) -> Result<Vec<RoleGrant>, StoreError>;

    /// Insert or replace the grant row for (identity, role).
    fn upsert_grant(&self, grant: RoleGrant) -> Result<(), StoreError>;

    /// Mark the (identity, role) grant inactive. Returns whether a row existed.
    fn deactivate_grant(&self, identity: &Identity, role: Role) -> Result<bool, StoreError>;

    /// Persist the current-role pointer, creating the identity record if needed.
    fn set_current_role(&self, identity: &Identity, role: Role) -> Result<(), StoreError>;

    fn load_test_session(&self, identity: &Identity) -> Result<Option<TestModeSession>, StoreError>;

    fn save_test_session(&self, identity: &Identity, session: TestModeSession) -> Result<(), StoreError>;

    fn clear_test_session(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Flags and grants read together.
    fn snapshot(&self, identity: &Identity) -> Result<RoleSnapshot, StoreError> {
        Ok(RoleSnapshot {
            flags: self.load_flags(identity)?,
            grants: self.list_grants(identity)?,
        })
    }
}

/// Durable onboarding records keyed by (identity, role).
pub trait OnboardingStore: Send + Sync {
    fn get(&self, identity: &Identity, role: Role) -> Result<Option<OnboardingRecord>, StoreError>;

    fn upsert(&self, record: OnboardingRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    fn delete(&self, identity: &Identity, role: Role) -> Result<bool, StoreError>;

    /// Returns how many records were removed.
    fn delete_all(&self, identity: &Identity) -> Result<usize, StoreError>;

    fn list(&self, identity: &Identity) -> Result<Vec<OnboardingRecord>, StoreError>;
}

impl<S> RoleStore for Arc<S>
where
    S: RoleStore + ?Sized,
{
    fn load_flags(&self, identity: &Identity) -> Result<Option<LegacyCapabilityFlags>, StoreError> {
        (**self).load_flags(identity)
    }

    fn list_grants(&self, identity: &Identity) -> Result<Vec<RoleGrant>, StoreError> {
        (**self).list_grants(identity)
    }

    fn upsert_grant(&self, grant: RoleGrant) -> Result<(), StoreError> {
        (**self).upsert_grant(grant)
    }

    fn deactivate_grant(&self, identity: &Identity, role: Role) -> Result<bool, StoreError> {
        (**self).deactivate_grant(identity, role)
    }

    fn set_current_role(&self, identity: &Identity, role: Role) -> Result<(), StoreError> {
        (**self).set_current_role(identity, role)
    }

    fn load_test_session(&self, identity: &Identity) -> Result<Option<TestModeSession>, StoreError> {
        (**self).load_test_session(identity)
    }

    fn save_test_session(&self, identity: &Identity, session: TestModeSession) -> Result<(), StoreError> {
        (**self).save_test_session(identity, session)
    }

    fn clear_test_session(&self, identity: &Identity) -> Result<(), StoreError> {
        (**self).clear_test_session(identity)
    }

    fn snapshot(&self, identity: &Identity) -> Result<RoleSnapshot, StoreError> {
        (**self).snapshot(identity)
    }
}

impl<S> OnboardingStore for Arc<S>
where
    S: OnboardingStore + ?Sized,
{
    fn get(&self, identity: &Identity, role: Role) -> Result<Option<OnboardingRecord>, StoreError> {
        (**self).get(identity, role)
    }

    fn upsert(&self, record: OnboardingRecord) -> Result<(), StoreError> {
        (**self).upsert(record)
    }

    fn delete(&self, identity: &Identity, role: Role) -> Result<bool, StoreError> {
        (**self).delete(identity, role)
    }

    fn delete_all(&self, identity: &Identity) -> Result<usize, StoreError> {
        (**self).delete_all(identity)
    }

    fn list(&self, identity: &Identity) -> Result<Vec<OnboardingRecord>, StoreError> {
        (**self).list(identity)
    }
}
