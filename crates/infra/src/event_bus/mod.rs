//! Infrastructure event bus implementations.
//!
//! The bus abstraction lives in `rolegate-events` as pure mechanics. This
//! module provides transports that reach other server instances.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};

/// Channel used for role-changed notifications.
pub const ROLE_CHANGED_CHANNEL: &str = "rolegate:role-changed";
