//! In-memory stores for tests/dev.
//!
//! Both stores can be switched "offline" to exercise the degraded paths of the
//! engine and tracker without a real database.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use rolegate_core::Identity;

use super::{OnboardingStore, RoleStore, StoreError};
use crate::grants::{LegacyCapabilityFlags, RoleGrant};
use crate::onboarding::OnboardingRecord;
use crate::roles::Role;
use crate::test_mode::TestModeSession;

fn poisoned() -> StoreError {
    StoreError::unavailable("in-memory store lock poisoned")
}

fn offline() -> StoreError {
    StoreError::unavailable("in-memory store is offline")
}

/// In-memory role store.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
    flags: RwLock<HashMap<Identity, LegacyCapabilityFlags>>,
    grants: RwLock<HashMap<(Identity, Role), RoleGrant>>,
    sessions: RwLock<HashMap<Identity, TestModeSession>>,
    offline: AtomicBool,
}

impl InMemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace the legacy flags for an identity.
    pub fn put_flags(&self, identity: Identity, flags: LegacyCapabilityFlags) {
        if let Ok(mut map) = self.flags.write() {
            map.insert(identity, flags);
        }
    }

    /// Simulate an unreachable store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(offline())
        } else {
            Ok(())
        }
    }
}

impl RoleStore for InMemoryRoleStore {
    fn load_flags(&self, identity: &Identity) -> Result<Option<LegacyCapabilityFlags>, StoreError> {
        self.check()?;
        let map = self.flags.read().map_err(|_| poisoned())?;
        Ok(map.get(identity).cloned())
    }

    fn list_grants(&self, identity: &Identity) -> Result<Vec<RoleGrant>, StoreError> {
        self.check()?;
        let map = self.grants.read().map_err(|_| poisoned())?;
        let mut grants: Vec<RoleGrant> = map
            .iter()
            .filter(|((id, _), _)| id == identity)
            .map(|(_, grant)| grant.clone())
            .collect();
        grants.sort_by_key(|g| g.role);
        Ok(grants)
    }

    fn upsert_grant(&self, grant: RoleGrant) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.grants.write().map_err(|_| poisoned())?;
        map.insert((grant.identity.clone(), grant.role), grant);
        Ok(())
    }

    fn deactivate_grant(&self, identity: &Identity, role: Role) -> Result<bool, StoreError> {
        self.check()?;
        let mut map = self.grants.write().map_err(|_| poisoned())?;
        match map.get_mut(&(identity.clone(), role)) {
            Some(grant) => {
                grant.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_current_role(&self, identity: &Identity, role: Role) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.flags.write().map_err(|_| poisoned())?;
        map.entry(identity.clone()).or_default().current_role = Some(role);
        Ok(())
    }

    fn load_test_session(&self, identity: &Identity) -> Result<Option<TestModeSession>, StoreError> {
        self.check()?;
        let map = self.sessions.read().map_err(|_| poisoned())?;
        Ok(map.get(identity).copied())
    }

    fn save_test_session(&self, identity: &Identity, session: TestModeSession) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        map.insert(identity.clone(), session);
        Ok(())
    }

    fn clear_test_session(&self, identity: &Identity) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.sessions.write().map_err(|_| poisoned())?;
        map.remove(identity);
        Ok(())
    }
}

/// In-memory onboarding store.
#[derive(Debug, Default)]
pub struct InMemoryOnboardingStore {
    records: RwLock<HashMap<(Identity, Role), OnboardingRecord>>,
    offline: AtomicBool,
}

impl InMemoryOnboardingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an unreachable store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(offline())
        } else {
            Ok(())
        }
    }
}

impl OnboardingStore for InMemoryOnboardingStore {
    fn get(&self, identity: &Identity, role: Role) -> Result<Option<OnboardingRecord>, StoreError> {
        self.check()?;
        let map = self.records.read().map_err(|_| poisoned())?;
        Ok(map.get(&(identity.clone(), role)).cloned())
    }

    fn upsert(&self, record: OnboardingRecord) -> Result<(), StoreError> {
        self.check()?;
        let mut map = self.records.write().map_err(|_| poisoned())?;
        map.insert((record.identity.clone(), record.role), record);
        Ok(())
    }

    fn delete(&self, identity: &Identity, role: Role) -> Result<bool, StoreError> {
        self.check()?;
        let mut map = self.records.write().map_err(|_| poisoned())?;
        Ok(map.remove(&(identity.clone(), role)).is_some())
    }

    fn delete_all(&self, identity: &Identity) -> Result<usize, StoreError> {
        self.check()?;
        let mut map = self.records.write().map_err(|_| poisoned())?;
        let before = map.len();
        map.retain(|(id, _), _| id != identity);
        Ok(before - map.len())
    }

    fn list(&self, identity: &Identity) -> Result<Vec<OnboardingRecord>, StoreError> {
        self.check()?;
        let map = self.records.read().map_err(|_| poisoned())?;
        let mut records: Vec<OnboardingRecord> = map
            .iter()
            .filter(|((id, _), _)| id == identity)
            .map(|(_, record)| record.clone())
            .collect();
        records.sort_by_key(|r| r.role);
        Ok(records)
    }
}
