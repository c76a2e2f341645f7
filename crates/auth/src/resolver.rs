//! Role resolution engine.
//!
//! Computes which roles an identity may act as and which one is current,
//! and performs role switches. The resolver is constructed explicitly with its
//! collaborators (store, client cache, notification bus, clock); it holds no
//! ambient state of its own.
//!
//! Failure policy:
//! - Reads never fail. A store error degrades the answer to `{viewer}` /
//!   `viewer` and flags it as `degraded`.
//! - Explicit writes (`switch_role`, grants, revocations) surface
//!   `StorageUnavailable` so the caller never believes a change happened when
//!   it did not.
//! - Notifications are advisory; publish failures are logged only.

use std::sync::Arc;

use serde::Serialize;

use rolegate_core::{Clock, Identity};
use rolegate_events::{EventBus, Subscription};

use crate::cache::{RoleCache, RoleCacheEntry};
use crate::context::RequestContext;
use crate::error::RoleError;
use crate::grants::{RoleGrant, RoleSnapshot};
use crate::notify::{RoleChanged, RoleChangedEnvelope};
use crate::roles::{Role, RoleSet, canonical_set};
use crate::store::RoleStore;
use crate::test_mode::{SignalBag, TestModePolicy, TestModeSession, first_signal, informational_signal};

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResolution {
    pub available_roles: RoleSet,
    pub current_role: Role,
    pub test_mode: bool,
    /// The store could not be read; this is the safe fallback.
    pub degraded: bool,
}

impl RoleResolution {
    fn fallback() -> Self {
        Self {
            available_roles: [Role::Viewer].into_iter().collect(),
            current_role: Role::Viewer,
            test_mode: false,
            degraded: true,
        }
    }

    pub fn to_cache_entry(&self, cached_at: chrono::DateTime<chrono::Utc>) -> RoleCacheEntry {
        RoleCacheEntry {
            available_roles: self.available_roles.clone(),
            current_role: self.current_role,
            cached_at,
        }
    }
}

/// Whether a resolution may write test-mode session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionWrites {
    Allowed,
    ReadOnly,
}

pub struct RoleResolver<S, C, B> {
    store: S,
    cache: C,
    bus: B,
    clock: Arc<dyn Clock>,
    policy: TestModePolicy,
}

impl<S, C, B> RoleResolver<S, C, B>
where
    S: RoleStore,
    C: RoleCache,
    B: EventBus<RoleChangedEnvelope>,
{
    pub fn new(store: S, cache: C, bus: B, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            cache,
            bus,
            clock,
            policy: TestModePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: TestModePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn policy(&self) -> &TestModePolicy {
        &self.policy
    }

    /// Authoritative resolution. Always reads the store; refreshes the client
    /// cache with the result unless it is a degraded fallback.
    pub fn resolve_roles(&self, ctx: &RequestContext) -> RoleResolution {
        let resolution = self.compute(ctx, SessionWrites::Allowed);
        if !resolution.degraded {
            self.cache.put(
                ctx.identity(),
                resolution.to_cache_entry(self.clock.now()),
            );
        }
        resolution
    }

    /// Optimistic read for rendering: a fresh cache entry is returned as-is,
    /// anything else triggers a full resolution.
    pub fn resolve_cached(&self, ctx: &RequestContext) -> RoleCacheEntry {
        if let Some(entry) = self.cache.get(ctx.identity()) {
            return entry;
        }
        self.resolve_roles(ctx).to_cache_entry(self.clock.now())
    }

    /// Store-only view of another identity, for administrators. Opens no
    /// test-mode session, collects no expired one, and leaves the cache alone.
    pub fn inspect(&self, identity: &Identity) -> RoleResolution {
        self.compute(&RequestContext::new(identity.clone()), SessionWrites::ReadOnly)
    }

    /// Authoritative capability check. Never consults the cache.
    pub fn authorize_role(&self, ctx: &RequestContext, role: Role) -> Result<(), RoleError> {
        let resolution = self.compute(ctx, SessionWrites::Allowed);
        if resolution.available_roles.contains(&role) {
            return Ok(());
        }
        if resolution.degraded {
            return Err(RoleError::StorageUnavailable(
                "role store unreachable while checking a privileged role".to_string(),
            ));
        }
        Err(RoleError::RoleNotGranted {
            attempted: role,
            available: resolution.available_roles,
        })
    }

    pub fn switch_role(&self, ctx: &RequestContext, requested: &str) -> Result<Role, RoleError> {
        let role = Role::parse_canonical(requested)?;
        let identity = ctx.identity();
        let now = self.clock.now();

        let snapshot = self.store.snapshot(identity)?;
        let previous_role = snapshot.current_role();

        if self.test_mode_active(ctx, &snapshot, SessionWrites::Allowed) {
            // Seed a grant so the role stays available going forward.
            if role != Role::Viewer && !snapshot.held_roles().contains(&role) {
                self.store
                    .upsert_grant(RoleGrant::test_seed(identity.clone(), role, now))?;
                tracing::debug!(identity = %identity, role = %role, "seeded test-mode grant");
            }
        } else {
            let available = snapshot.held_roles();
            if !available.contains(&role) {
                tracing::warn!(
                    identity = %identity,
                    attempted = %role,
                    available = ?available,
                    "role switch rejected"
                );
                return Err(RoleError::RoleNotGranted {
                    attempted: role,
                    available,
                });
            }
        }

        self.store.set_current_role(identity, role)?;
        self.cache.invalidate(identity);

        let changed = RoleChanged {
            identity: identity.clone(),
            role,
            previous_role,
            occurred_at: now,
        };
        if let Err(err) = self.bus.publish(changed.into_envelope()) {
            tracing::warn!(identity = %identity, role = %role, error = ?err, "role change notification not published");
        }

        tracing::info!(identity = %identity, role = %role, previous = ?previous_role, "role switched");
        Ok(role)
    }

    /// Administrative grant (registration or admin action).
    pub fn grant_role(&self, identity: &Identity, role: Role, is_test_grant: bool) -> Result<RoleGrant, RoleError> {
        let now = self.clock.now();
        let grant = if is_test_grant {
            RoleGrant::test_seed(identity.clone(), role, now)
        } else {
            RoleGrant::active(identity.clone(), role, now)
        };

        self.store.upsert_grant(grant.clone())?;
        self.cache.invalidate(identity);
        tracing::info!(identity = %identity, role = %role, is_test_grant, "role granted");
        Ok(grant)
    }

    /// Deactivates the grant row. Returns whether a row existed.
    pub fn revoke_role(&self, identity: &Identity, role: Role) -> Result<bool, RoleError> {
        let existed = self.store.deactivate_grant(identity, role)?;
        self.cache.invalidate(identity);

        // Union reconciliation: a legacy flag keeps the role held.
        if let Ok(Some(flags)) = self.store.load_flags(identity) {
            if flags.holds(role) {
                tracing::warn!(identity = %identity, role = %role, "revoked grant row but legacy flag still grants the role");
            }
        }

        tracing::info!(identity = %identity, role = %role, existed, "role revoked");
        Ok(existed)
    }

    /// End a live test-mode session early.
    pub fn end_test_mode(&self, identity: &Identity) -> Result<(), RoleError> {
        self.store.clear_test_session(identity)?;
        self.cache.invalidate(identity);
        Ok(())
    }

    /// Login: open the auth transition, resolve, and close the transition once
    /// roles are known. A degraded resolution leaves it pending so the client
    /// keeps waiting instead of bouncing back to the login screen.
    pub fn login(&self, ctx: &RequestContext) -> RoleResolution {
        let identity = ctx.identity();
        self.cache.begin_session(identity);

        let resolution = self.resolve_roles(ctx);
        if !resolution.degraded {
            self.cache.complete_session(identity);
        }

        tracing::info!(
            identity = %identity,
            current_role = %resolution.current_role,
            degraded = resolution.degraded,
            "login resolved"
        );
        resolution
    }

    /// Whether a login for the identity is still waiting on its resolution.
    pub fn login_pending(&self, identity: &Identity) -> bool {
        self.cache.session_pending(identity)
    }

    /// Explicit logout: drop client-side state for the identity.
    pub fn logout(&self, identity: &Identity) {
        self.cache.end_session(identity);
        tracing::debug!(identity = %identity, "client role state cleared");
    }

    /// Register an observer for role-changed notifications.
    pub fn subscribe(&self) -> Subscription<RoleChangedEnvelope> {
        self.bus.subscribe()
    }

    fn compute(&self, ctx: &RequestContext, writes: SessionWrites) -> RoleResolution {
        let identity = ctx.identity();

        let snapshot = match self.store.snapshot(identity) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::warn!(identity = %identity, error = %err, "role store read failed; degrading");
                None
            }
        };

        let empty = RoleSnapshot::default();
        if self.test_mode_active(ctx, snapshot.as_ref().unwrap_or(&empty), writes) {
            let pointer = snapshot.as_ref().and_then(RoleSnapshot::current_role);
            return RoleResolution {
                available_roles: canonical_set(),
                current_role: pointer.filter(Role::is_canonical).unwrap_or(Role::Admin),
                test_mode: true,
                degraded: snapshot.is_none(),
            };
        }

        match snapshot {
            Some(snapshot) => {
                let available = snapshot.held_roles();
                let current_role = snapshot
                    .current_role()
                    .filter(|role| available.contains(role))
                    .unwrap_or(Role::Viewer);
                RoleResolution {
                    available_roles: available,
                    current_role,
                    test_mode: false,
                    degraded: false,
                }
            }
            None => RoleResolution::fallback(),
        }
    }

    /// Signals OR a live session. Opens a session when a signal fires.
    fn test_mode_active(&self, ctx: &RequestContext, snapshot: &RoleSnapshot, writes: SessionWrites) -> bool {
        let identity = ctx.identity();
        let now = self.clock.now();
        let bag = SignalBag {
            context: ctx,
            explicit_flag: snapshot.is_test_user(),
            now,
        };

        if let Some(signal) = first_signal(&bag, &self.policy) {
            tracing::debug!(identity = %identity, signal = ?signal, "test mode signal detected");
            if writes == SessionWrites::Allowed {
                self.ensure_session(identity, now);
            }
            return true;
        }
        if let Some(signal) = informational_signal(&bag, &self.policy) {
            tracing::debug!(identity = %identity, signal = ?signal, "ignoring low-trust test mode signal");
        }

        match self.store.load_test_session(identity) {
            Ok(Some(session)) if session.is_live(now) => true,
            Ok(Some(_)) if writes == SessionWrites::ReadOnly => false,
            Ok(Some(_)) => {
                // Expired: collect it while we are here.
                if let Err(err) = self.store.clear_test_session(identity) {
                    tracing::debug!(identity = %identity, error = %err, "failed to clear expired test session");
                }
                false
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(identity = %identity, error = %err, "test session read failed");
                false
            }
        }
    }

    fn ensure_session(&self, identity: &Identity, now: chrono::DateTime<chrono::Utc>) {
        let live = matches!(
            self.store.load_test_session(identity),
            Ok(Some(session)) if session.is_live(now)
        );
        if live {
            return;
        }

        let session = TestModeSession::open(now, self.policy.session_window);
        match self.store.save_test_session(identity, session) {
            Ok(()) => {
                tracing::info!(identity = %identity, expires_at = %session.expires_at, "test mode session opened");
            }
            Err(err) => {
                tracing::debug!(identity = %identity, error = %err, "test mode session not persisted");
            }
        }
    }
}
