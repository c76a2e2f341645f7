use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marketplace role.
///
/// The canonical set is viewer, advertiser, publisher, admin and stakeholder.
/// `Developer` is a legacy value still found in stored data; it parses, but it
/// is not canonical and cannot be switched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Advertiser,
    Publisher,
    Admin,
    Stakeholder,
    Developer,
}

/// Ordered set of roles (ordering follows the enum declaration).
pub type RoleSet = BTreeSet<Role>;

pub const CANONICAL_ROLES: [Role; 5] = [
    Role::Viewer,
    Role::Advertiser,
    Role::Publisher,
    Role::Admin,
    Role::Stakeholder,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Advertiser => "advertiser",
            Role::Publisher => "publisher",
            Role::Admin => "admin",
            Role::Stakeholder => "stakeholder",
            Role::Developer => "developer",
        }
    }

    pub fn is_canonical(&self) -> bool {
        !matches!(self, Role::Developer)
    }

    /// Parse a role string, accepting only canonical roles.
    pub fn parse_canonical(raw: &str) -> Result<Role, UnknownRole> {
        match raw.parse::<Role>() {
            Ok(role) if role.is_canonical() => Ok(role),
            _ => Err(UnknownRole(raw.trim().to_string())),
        }
    }
}

pub fn canonical_set() -> RoleSet {
    CANONICAL_ROLES.into_iter().collect()
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "viewer" => Ok(Role::Viewer),
            "advertiser" => Ok(Role::Advertiser),
            "publisher" => Ok(Role::Publisher),
            "admin" => Ok(Role::Admin),
            "stakeholder" => Ok(Role::Stakeholder),
            "developer" => Ok(Role::Developer),
            _ => Err(UnknownRole(s.trim().to_string())),
        }
    }
}

/// Comma-separated rendering used in diagnostics.
pub fn display_roles(roles: &RoleSet) -> String {
    roles.iter().map(Role::as_str).collect::<Vec<_>>().join(", ")
}
