use serde::Serialize;
use thiserror::Error;

use crate::roles::{Role, RoleSet, UnknownRole, display_roles};
use crate::store::StoreError;

/// Stable error codes exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    InvalidRole,
    RoleNotGranted,
    StorageUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoleError {
    /// Requested role is outside the canonical enumeration.
    #[error("invalid role '{0}'")]
    InvalidRole(String),

    /// Caller is authenticated but does not hold the role.
    #[error("role '{attempted}' is not granted (available: {})", display_roles(.available))]
    RoleNotGranted { attempted: Role, available: RoleSet },

    /// Durable store failed; retryable.
    #[error("role storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl RoleError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RoleError::InvalidRole(_) => ErrorCode::InvalidRole,
            RoleError::RoleNotGranted { .. } => ErrorCode::RoleNotGranted,
            RoleError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, RoleError::StorageUnavailable(_))
    }
}

impl From<StoreError> for RoleError {
    fn from(value: StoreError) -> Self {
        RoleError::StorageUnavailable(value.to_string())
    }
}

impl From<UnknownRole> for RoleError {
    fn from(value: UnknownRole) -> Self {
        RoleError::InvalidRole(value.0)
    }
}

/// `{success, errorCode, message}` shape returned to the UI for a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRoleResult {
    pub success: bool,
    pub role: Option<Role>,
    pub error_code: Option<ErrorCode>,
    pub message: String,
    /// Populated on `RoleNotGranted` so the user can see what they do hold.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub available_roles: Vec<Role>,
}

impl SwitchRoleResult {
    pub fn from_outcome(outcome: &Result<Role, RoleError>) -> Self {
        match outcome {
            Ok(role) => Self {
                success: true,
                role: Some(*role),
                error_code: None,
                message: format!("switched to {role}"),
                available_roles: Vec::new(),
            },
            Err(err) => Self {
                success: false,
                role: None,
                error_code: Some(err.code()),
                message: err.to_string(),
                available_roles: match err {
                    RoleError::RoleNotGranted { available, .. } => {
                        available.iter().copied().collect()
                    }
                    _ => Vec::new(),
                },
            },
        }
    }
}
