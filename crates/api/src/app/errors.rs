use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use rolegate_auth::{OnboardingError, RoleError, SwitchRoleResult};
use rolegate_auth::roles::UnknownRole;

/// HTTP status for an engine error.
pub fn role_error_status(err: &RoleError) -> StatusCode {
    match err {
        RoleError::InvalidRole(_) => StatusCode::BAD_REQUEST,
        RoleError::RoleNotGranted { .. } => StatusCode::FORBIDDEN,
        RoleError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub fn role_error_to_response(err: RoleError) -> axum::response::Response {
    let status = role_error_status(&err);
    let code = match &err {
        RoleError::InvalidRole(_) => "invalid_role",
        RoleError::RoleNotGranted { .. } => "role_not_granted",
        RoleError::StorageUnavailable(_) => "storage_unavailable",
    };
    json_error(status, code, err.to_string())
}

/// Switch outcome in the `{success, errorCode, message}` shape.
pub fn switch_outcome_to_response(outcome: Result<rolegate_auth::Role, RoleError>) -> axum::response::Response {
    let status = match &outcome {
        Ok(_) => StatusCode::OK,
        Err(err) => role_error_status(err),
    };
    (status, axum::Json(SwitchRoleResult::from_outcome(&outcome))).into_response()
}

pub fn onboarding_error_to_response(err: OnboardingError) -> axum::response::Response {
    match err {
        OnboardingError::InvalidStep(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_step", msg),
        OnboardingError::StorageUnavailable(msg) => {
            json_error(StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable", msg)
        }
    }
}

pub fn invalid_role(err: UnknownRole) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_role", err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
