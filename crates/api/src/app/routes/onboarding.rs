//! Onboarding progress for the calling identity.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::json;

use rolegate_auth::{RequestContext, Role};

use crate::app::errors;
use crate::app::services::AppServices;

// ─────────────────────────────────────────────────────────────────────────────
// Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SaveStepRequest {
    pub step: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/onboarding", get(list_progress).delete(reset_all))
        .route("/onboarding/:role", get(get_state).delete(reset_role))
        .route("/onboarding/:role/step", put(save_step))
        .route("/onboarding/:role/complete", post(mark_complete))
}

fn parse_role(raw: &str) -> Result<Role, axum::response::Response> {
    Role::parse_canonical(raw).map_err(errors::invalid_role)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /onboarding
pub async fn list_progress(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    let records = services.onboarding.progress(ctx.identity());
    Json(json!({ "records": records }))
}

/// GET /onboarding/:role
pub async fn get_state(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(role): Path<String>,
) -> axum::response::Response {
    let role = match parse_role(&role) {
        Ok(role) => role,
        Err(resp) => return resp,
    };

    let state = services.onboarding.state(ctx.identity(), role);
    Json(json!({ "role": role, "state": state })).into_response()
}

/// PUT /onboarding/:role/step
///
/// Best effort: always 200, `recorded` says whether the step was persisted.
pub async fn save_step(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(role): Path<String>,
    Json(req): Json<SaveStepRequest>,
) -> axum::response::Response {
    let role = match parse_role(&role) {
        Ok(role) => role,
        Err(resp) => return resp,
    };

    let recorded = services.onboarding.save_step(ctx.identity(), role, &req.step);
    Json(json!({ "role": role, "recorded": recorded })).into_response()
}

/// POST /onboarding/:role/complete
pub async fn mark_complete(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(role): Path<String>,
) -> axum::response::Response {
    let role = match parse_role(&role) {
        Ok(role) => role,
        Err(resp) => return resp,
    };

    match services.onboarding.mark_complete(ctx.identity(), role) {
        Ok(state) => Json(json!({ "role": role, "state": state })).into_response(),
        Err(e) => errors::onboarding_error_to_response(e),
    }
}

/// DELETE /onboarding/:role
pub async fn reset_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(role): Path<String>,
) -> axum::response::Response {
    let role = match parse_role(&role) {
        Ok(role) => role,
        Err(resp) => return resp,
    };

    reset(&services, &ctx, Some(role))
}

/// DELETE /onboarding
pub async fn reset_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    reset(&services, &ctx, None)
}

fn reset(services: &AppServices, ctx: &RequestContext, role: Option<Role>) -> axum::response::Response {
    match services.onboarding.reset(ctx.identity(), role) {
        Ok(removed) => (StatusCode::OK, Json(json!({ "removed": removed }))).into_response(),
        Err(e) => errors::onboarding_error_to_response(e),
    }
}
