//! Durable store implementations.
//!
//! In-memory stores live next to the traits in `rolegate-auth`; this module
//! holds the Postgres-backed ones.

pub mod postgres;
pub mod schema;

pub use postgres::{PostgresOnboardingStore, PostgresRoleStore, connect, migrate};
