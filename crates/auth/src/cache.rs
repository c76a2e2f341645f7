//! Client-side role cache.
//!
//! A time-boxed mirror of a resolution, kept in string key/value client
//! storage (browser storage in the original client, an in-process map when the
//! API plays the client). Entries are advisory: UI may render from them, but
//! granting a new capability always goes back to the resolver.
//!
//! Everything read back from client storage is untrusted. Undecodable, expired
//! or future-dated entries are treated as misses.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use rolegate_core::{Clock, Identity};

use crate::roles::{Role, RoleSet};

pub const DEFAULT_FRESHNESS_WINDOW_SECS: i64 = 300;
pub const AUTH_INITIATED_KEY: &str = "auth_initiated";
pub const AUTH_TIMESTAMP_KEY: &str = "auth_timestamp";
pub const DEFAULT_TRANSITION_WINDOW_SECS: i64 = 60;

const ROLE_CACHE_PREFIX: &str = "rolegate.roles.";

/// String key/value storage owned by the client.
pub trait ClientStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: String);
    fn remove_item(&self, key: &str);
}

impl<S> ClientStorage for Arc<S>
where
    S: ClientStorage + ?Sized,
{
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: String) {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        (**self).remove_item(key)
    }
}

impl<S> ClientStorage for &S
where
    S: ClientStorage + ?Sized,
{
    fn get_item(&self, key: &str) -> Option<String> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: String) {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) {
        (**self).remove_item(key)
    }
}

/// In-memory client storage for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryClientStorage {
    items: RwLock<HashMap<String, String>>,
}

impl InMemoryClientStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStorage for InMemoryClientStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.read().ok()?.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: String) {
        if let Ok(mut items) = self.items.write() {
            items.insert(key.to_string(), value);
        }
    }

    fn remove_item(&self, key: &str) {
        if let Ok(mut items) = self.items.write() {
            items.remove(key);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCacheEntry {
    pub available_roles: RoleSet,
    pub current_role: Role,
    pub cached_at: DateTime<Utc>,
}

/// Cache contract used by the resolver.
pub trait RoleCache: Send + Sync {
    /// A fresh entry, or `None` (absent, expired and undecodable look the same).
    fn get(&self, identity: &Identity) -> Option<RoleCacheEntry>;

    fn put(&self, identity: &Identity, entry: RoleCacheEntry);

    fn invalidate(&self, identity: &Identity);

    /// Login: mark the identity as just authenticated.
    fn begin_session(&self, _identity: &Identity) {}

    /// Whether a login is still waiting for its first resolution.
    fn session_pending(&self, _identity: &Identity) -> bool {
        false
    }

    /// The first resolution after login landed.
    fn complete_session(&self, _identity: &Identity) {}

    /// Logout: drop everything cached for the identity.
    fn end_session(&self, identity: &Identity) {
        self.invalidate(identity);
    }
}

impl<C> RoleCache for Arc<C>
where
    C: RoleCache + ?Sized,
{
    fn get(&self, identity: &Identity) -> Option<RoleCacheEntry> {
        (**self).get(identity)
    }

    fn put(&self, identity: &Identity, entry: RoleCacheEntry) {
        (**self).put(identity, entry)
    }

    fn invalidate(&self, identity: &Identity) {
        (**self).invalidate(identity)
    }

    fn begin_session(&self, identity: &Identity) {
        (**self).begin_session(identity)
    }

    fn session_pending(&self, identity: &Identity) -> bool {
        (**self).session_pending(identity)
    }

    fn complete_session(&self, identity: &Identity) {
        (**self).complete_session(identity)
    }

    fn end_session(&self, identity: &Identity) {
        (**self).end_session(identity)
    }
}

/// [`RoleCache`] over [`ClientStorage`], JSON-encoded, with a freshness window.
pub struct ClientRoleCache<S> {
    storage: S,
    freshness: Duration,
    clock: Arc<dyn Clock>,
}

impl<S: ClientStorage> ClientRoleCache<S> {
    pub fn new(storage: S, freshness: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            freshness,
            clock,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Transition markers for one identity. Storage may be shared by many
    /// identities when the server plays the client.
    pub fn transition(&self, identity: &Identity) -> AuthTransition<&S> {
        AuthTransition::for_identity(&self.storage, identity)
    }

    fn key(identity: &Identity) -> String {
        format!("{ROLE_CACHE_PREFIX}{identity}")
    }
}

impl<S: ClientStorage> RoleCache for ClientRoleCache<S> {
    fn get(&self, identity: &Identity) -> Option<RoleCacheEntry> {
        let key = Self::key(identity);
        let raw = self.storage.get_item(&key)?;

        let entry: RoleCacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!(identity = %identity, error = %err, "discarding undecodable role cache entry");
                self.storage.remove_item(&key);
                return None;
            }
        };

        let age = self.clock.now().signed_duration_since(entry.cached_at);
        if age < Duration::zero() || age > self.freshness {
            self.storage.remove_item(&key);
            return None;
        }

        Some(entry)
    }

    fn put(&self, identity: &Identity, entry: RoleCacheEntry) {
        match serde_json::to_string(&entry) {
            Ok(raw) => self.storage.set_item(&Self::key(identity), raw),
            Err(err) => {
                tracing::warn!(identity = %identity, error = %err, "failed to encode role cache entry");
            }
        }
    }

    fn invalidate(&self, identity: &Identity) {
        self.storage.remove_item(&Self::key(identity));
    }

    fn begin_session(&self, identity: &Identity) {
        self.transition(identity).begin(self.clock.now());
    }

    fn session_pending(&self, identity: &Identity) -> bool {
        self.transition(identity).is_pending(self.clock.now())
    }

    fn complete_session(&self, identity: &Identity) {
        self.transition(identity).clear();
    }

    fn end_session(&self, identity: &Identity) {
        self.invalidate(identity);
        self.transition(identity).clear();
    }
}

/// `auth_initiated` / `auth_timestamp` markers bridging "just authenticated"
/// and "role resolved", so the client does not bounce back to login while the
/// first resolution is in flight.
///
/// [`AuthTransition::new`] uses the bare keys of a single-user client;
/// [`AuthTransition::for_identity`] suffixes them with the identity.
pub struct AuthTransition<S> {
    storage: S,
    initiated_key: String,
    timestamp_key: String,
    window: Duration,
}

impl<S: ClientStorage> AuthTransition<S> {
    pub fn new(storage: S) -> Self {
        Self::with_keys(storage, AUTH_INITIATED_KEY.to_string(), AUTH_TIMESTAMP_KEY.to_string())
    }

    pub fn for_identity(storage: S, identity: &Identity) -> Self {
        Self::with_keys(
            storage,
            format!("{AUTH_INITIATED_KEY}.{identity}"),
            format!("{AUTH_TIMESTAMP_KEY}.{identity}"),
        )
    }

    fn with_keys(storage: S, initiated_key: String, timestamp_key: String) -> Self {
        Self {
            storage,
            initiated_key,
            timestamp_key,
            window: Duration::seconds(DEFAULT_TRANSITION_WINDOW_SECS),
        }
    }

    pub fn begin(&self, now: DateTime<Utc>) {
        self.storage.set_item(&self.initiated_key, "true".to_string());
        self.storage
            .set_item(&self.timestamp_key, now.timestamp_millis().to_string());
    }

    /// True only when both markers parse and the timestamp is within the window.
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        let initiated = self
            .storage
            .get_item(&self.initiated_key)
            .is_some_and(|v| v.trim() == "true");
        if !initiated {
            return false;
        }

        let Some(started) = self
            .storage
            .get_item(&self.timestamp_key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis)
        else {
            return false;
        };

        let age = now.signed_duration_since(started);
        age >= Duration::zero() && age <= self.window
    }

    pub fn clear(&self) {
        self.storage.remove_item(&self.initiated_key);
        self.storage.remove_item(&self.timestamp_key);
    }
}

#[cfg(test)]
mod tests {
    use rolegate_core::ManualClock;

    use super::*;

    fn id() -> Identity {
        Identity::parse("npub_abc").unwrap()
    }

    fn setup() -> (Arc<ManualClock>, ClientRoleCache<Arc<InMemoryClientStorage>>) {
        let clock = Arc::new(ManualClock::default());
        let cache = ClientRoleCache::new(
            Arc::new(InMemoryClientStorage::new()),
            Duration::seconds(DEFAULT_FRESHNESS_WINDOW_SECS),
            clock.clone(),
        );
        (clock, cache)
    }

    fn entry(cached_at: DateTime<Utc>) -> RoleCacheEntry {
        RoleCacheEntry {
            available_roles: [Role::Viewer, Role::Advertiser].into_iter().collect(),
            current_role: Role::Advertiser,
            cached_at,
        }
    }

    #[test]
    fn fresh_entry_is_returned() {
        let (clock, cache) = setup();
        cache.put(&id(), entry(clock.now()));

        clock.advance(Duration::seconds(DEFAULT_FRESHNESS_WINDOW_SECS));
        assert_eq!(cache.get(&id()).unwrap().current_role, Role::Advertiser);
    }

    #[test]
    fn stale_entry_behaves_as_absent() {
        let (clock, cache) = setup();
        cache.put(&id(), entry(clock.now()));

        clock.advance(Duration::seconds(DEFAULT_FRESHNESS_WINDOW_SECS + 1));
        assert!(cache.get(&id()).is_none());
        // Self-invalidated.
        assert!(cache.storage().get_item("rolegate.roles.npub_abc").is_none());
    }

    #[test]
    fn future_dated_entry_is_rejected() {
        let (clock, cache) = setup();
        cache.put(&id(), entry(clock.now() + Duration::minutes(10)));
        assert!(cache.get(&id()).is_none());
    }

    #[test]
    fn torn_entry_is_a_miss() {
        let (_clock, cache) = setup();
        cache
            .storage()
            .set_item("rolegate.roles.npub_abc", "{\"availableRoles\":[\"vie".to_string());
        assert!(cache.get(&id()).is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let (clock, cache) = setup();
        cache.put(&id(), entry(clock.now()));
        cache.invalidate(&id());
        assert!(cache.get(&id()).is_none());
    }

    #[test]
    fn transition_markers_expire_and_reject_garbage() {
        let storage = Arc::new(InMemoryClientStorage::new());
        let transition = AuthTransition::new(storage.clone());
        let now = Utc::now();

        assert!(!transition.is_pending(now));

        transition.begin(now);
        assert!(transition.is_pending(now + Duration::seconds(30)));
        assert!(!transition.is_pending(now + Duration::seconds(61)));

        storage.set_item(AUTH_TIMESTAMP_KEY, "yesterday".to_string());
        assert!(!transition.is_pending(now));

        transition.clear();
        assert!(storage.get_item(AUTH_INITIATED_KEY).is_none());
    }

    #[test]
    fn end_session_clears_cache_and_markers() {
        let (clock, cache) = setup();
        cache.put(&id(), entry(clock.now()));
        cache.begin_session(&id());
        assert!(cache.session_pending(&id()));

        cache.end_session(&id());

        assert!(cache.get(&id()).is_none());
        assert!(!cache.session_pending(&id()));
        assert!(cache.storage().get_item("auth_initiated.npub_abc").is_none());
        assert!(cache.storage().get_item("auth_timestamp.npub_abc").is_none());
    }

    #[test]
    fn shared_storage_keeps_markers_per_identity() {
        let (clock, cache) = setup();
        let other = Identity::parse("npub_xyz").unwrap();

        cache.begin_session(&id());
        cache.begin_session(&other);
        cache.end_session(&other);

        assert!(cache.session_pending(&id()));
        assert!(!cache.session_pending(&other));

        cache.complete_session(&id());
        assert!(!cache.session_pending(&id()));

        cache.begin_session(&id());
        clock.advance(Duration::seconds(DEFAULT_TRANSITION_WINDOW_SECS + 1));
        assert!(!cache.session_pending(&id()));
    }
}
