//! `rolegate-auth` — role and onboarding resolution.
//!
//! Answers "which roles may this identity act as, which one is current, and
//! has it finished onboarding for that role". Pure domain logic: storage sits
//! behind [`store::RoleStore`] / [`store::OnboardingStore`], notifications
//! behind `rolegate_events::EventBus`, and nothing here knows about HTTP.

pub mod cache;
pub mod context;
pub mod error;
pub mod grants;
pub mod notify;
pub mod onboarding;
pub mod redirect;
pub mod resolver;
pub mod roles;
pub mod store;
pub mod test_mode;

pub use cache::{AuthTransition, ClientRoleCache, ClientStorage, InMemoryClientStorage, RoleCache, RoleCacheEntry};
pub use context::RequestContext;
pub use error::{ErrorCode, RoleError, SwitchRoleResult};
pub use grants::{LegacyCapabilityFlags, RoleGrant, RoleSnapshot, reconcile};
pub use notify::{ROLE_CHANGED, RoleChanged, RoleChangedEnvelope};
pub use onboarding::{OnboardingError, OnboardingRecord, OnboardingState, OnboardingTracker};
pub use redirect::{landing_path, onboarding_path};
pub use resolver::{RoleResolution, RoleResolver};
pub use roles::{CANONICAL_ROLES, Role, RoleSet, UnknownRole, canonical_set};
pub use store::{InMemoryOnboardingStore, InMemoryRoleStore, OnboardingStore, RoleStore, StoreError};
pub use test_mode::{TestModePolicy, TestModeSession, TestModeSignal};
