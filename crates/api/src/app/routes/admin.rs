//! Administrative grant/revoke. Every call re-checks `admin` against the
//! store; the client cache is never trusted here.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use rolegate_auth::{RequestContext, Role};
use rolegate_core::Identity;

use crate::app::errors;
use crate::app::services::AppServices;

// ─────────────────────────────────────────────────────────────────────────────
// Query Parameters
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct GrantQuery {
    /// Mark the grant as seeded for testing.
    #[serde(default)]
    pub test: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/admin/roles/:identity", get(inspect_roles))
        .route("/admin/roles/:identity/:role", post(grant_role).delete(revoke_role))
}

fn require_admin(services: &AppServices, ctx: &RequestContext) -> Result<(), axum::response::Response> {
    services
        .resolver
        .authorize_role(ctx, Role::Admin)
        .map_err(errors::role_error_to_response)
}

fn parse_target(identity: &str, role: &str) -> Result<(Identity, Role), axum::response::Response> {
    let identity = Identity::parse(identity)
        .map_err(|e| errors::json_error(StatusCode::BAD_REQUEST, "invalid_identity", e.to_string()))?;
    let role = Role::parse_canonical(role).map_err(errors::invalid_role)?;
    Ok((identity, role))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /admin/roles/:identity
///
/// Resolution as seen from the store alone (no request signals of the target,
/// no session or cache writes).
pub async fn inspect_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path(identity): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&services, &ctx) {
        return resp;
    }
    let identity = match Identity::parse(&identity) {
        Ok(identity) => identity,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_identity", e.to_string()),
    };

    Json(services.resolver.inspect(&identity)).into_response()
}

/// POST /admin/roles/:identity/:role
pub async fn grant_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path((identity, role)): Path<(String, String)>,
    Query(query): Query<GrantQuery>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&services, &ctx) {
        return resp;
    }
    let (identity, role) = match parse_target(&identity, &role) {
        Ok(target) => target,
        Err(resp) => return resp,
    };

    match services.resolver.grant_role(&identity, role, query.test) {
        Ok(grant) => {
            tracing::info!(admin = %ctx.identity(), identity = %identity, role = %role, "admin granted role");
            (StatusCode::CREATED, Json(grant)).into_response()
        }
        Err(e) => errors::role_error_to_response(e),
    }
}

/// DELETE /admin/roles/:identity/:role
pub async fn revoke_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Path((identity, role)): Path<(String, String)>,
) -> axum::response::Response {
    if let Err(resp) = require_admin(&services, &ctx) {
        return resp;
    }
    let (identity, role) = match parse_target(&identity, &role) {
        Ok(target) => target,
        Err(resp) => return resp,
    };

    match services.resolver.revoke_role(&identity, role) {
        Ok(revoked) => {
            tracing::info!(admin = %ctx.identity(), identity = %identity, role = %role, revoked, "admin revoked role");
            Json(json!({ "revoked": revoked })).into_response()
        }
        Err(e) => errors::role_error_to_response(e),
    }
}
