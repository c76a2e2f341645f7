use axum::{
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::app::errors::json_error;
use crate::context::{ContextError, request_context};

/// Builds the `RequestContext` for every protected route.
pub async fn identity_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ctx = match request_context(req.headers()) {
        Ok(ctx) => ctx,
        Err(ContextError::MissingIdentity) => {
            return json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "missing x-identity header");
        }
        Err(ContextError::InvalidIdentity(err)) => {
            return json_error(StatusCode::UNAUTHORIZED, "unauthenticated", err.to_string());
        }
    };

    req.extensions_mut().insert(ctx);
    next.run(req).await
}
