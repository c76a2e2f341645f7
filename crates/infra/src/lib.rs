//! Infrastructure layer: Postgres stores, Redis notifications, config.

pub mod config;
pub mod event_bus;
pub mod store;


pub use config::{AppConfig, ConfigError, LogConfig, RolesConfig};
pub use store::{PostgresOnboardingStore, PostgresRoleStore};
