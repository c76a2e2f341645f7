use axum::Router;

pub mod admin;
pub mod auth;
pub mod onboarding;
pub mod roles;
pub mod system;

/// Router for all identity-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .merge(roles::router())
        .merge(onboarding::router())
        .merge(auth::router())
        .merge(admin::router())
}
