//! Post-login redirect targets.

use chrono::{DateTime, Utc};

use crate::roles::Role;

pub const ONBOARDING_PATH: &str = "/onboarding";
pub const DEFAULT_DASHBOARD_PATH: &str = "/dashboard";

/// Landing path for a role whose onboarding is complete.
pub fn landing_path(role: Role) -> &'static str {
    match role {
        Role::Viewer => "/",
        Role::Advertiser => "/dashboard/advertiser",
        Role::Publisher => "/dashboard/publisher",
        Role::Admin => "/admin",
        Role::Stakeholder => "/dashboard/stakeholder",
        Role::Developer => DEFAULT_DASHBOARD_PATH,
    }
}

/// Onboarding entry path; `t` defeats intermediate caches.
pub fn onboarding_path(role: Role, now: DateTime<Utc>) -> String {
    format!("{ONBOARDING_PATH}?role={role}&t={}", now.timestamp_millis())
}
