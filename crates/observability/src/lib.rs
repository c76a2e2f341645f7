//! Tracing/logging setup shared by binaries and tests.

pub mod tracing;

pub use self::tracing::{LogFormat, init, init_with};
