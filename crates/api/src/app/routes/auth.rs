//! Login, post-login routing and logout.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use rolegate_auth::RequestContext;

use crate::app::services::AppServices;

#[derive(Debug, Deserialize)]
pub struct RedirectQuery {
    /// Role the user picked at login; defaults to the resolved current role.
    pub role: Option<String>,
}

pub fn router() -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/redirect", get(post_login_redirect))
        .route("/auth/logout", post(logout))
}

/// POST /auth/login
///
/// Called once the upstream authenticator has admitted the identity.
/// `pending` stays true while the role store is unreachable.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    let resolution = services.resolver.login(&ctx);
    let pending = services.resolver.login_pending(ctx.identity());
    let location = services
        .onboarding
        .post_login_redirect(ctx.identity(), resolution.current_role.as_str());

    Json(json!({
        "roles": resolution,
        "pending": pending,
        "location": location,
    }))
}

/// GET /auth/redirect?role=
pub async fn post_login_redirect(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<RedirectQuery>,
) -> impl IntoResponse {
    let role = match query.role {
        Some(role) => role,
        None => services.resolver.resolve_roles(&ctx).current_role.to_string(),
    };

    let location = services.onboarding.post_login_redirect(ctx.identity(), &role);
    Json(json!({ "location": location }))
}

/// POST /auth/logout
pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> StatusCode {
    services.resolver.logout(ctx.identity());
    StatusCode::NO_CONTENT
}
