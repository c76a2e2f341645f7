//! Request context extraction.
//!
//! Authentication happens upstream; the authenticated identity arrives in the
//! `x-identity` header. Everything else the test-mode detector looks at
//! (cookies, headers, referrer) is copied into a `RequestContext`.

use axum::http::HeaderMap;
use axum::http::header::{COOKIE, REFERER};
use axum_extra::extract::cookie::CookieJar;

use rolegate_auth::RequestContext;
use rolegate_core::{DomainError, Identity};

pub const IDENTITY_HEADER: &str = "x-identity";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    MissingIdentity,
    InvalidIdentity(DomainError),
}

pub fn request_context(headers: &HeaderMap) -> Result<RequestContext, ContextError> {
    let raw = headers
        .get(IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ContextError::MissingIdentity)?;
    let identity = Identity::parse(raw).map_err(ContextError::InvalidIdentity)?;

    let mut ctx = RequestContext::new(identity);

    for cookie in CookieJar::from_headers(headers).iter() {
        ctx = ctx.with_cookie(cookie.name(), cookie.value());
    }

    for (name, value) in headers {
        if name.as_str() == IDENTITY_HEADER || *name == COOKIE {
            continue;
        }
        if let Ok(value) = value.to_str() {
            ctx = ctx.with_header(name.as_str(), value);
        }
    }

    if let Some(referrer) = headers.get(REFERER).and_then(|v| v.to_str().ok()) {
        ctx = ctx.with_referrer(referrer);
    }

    Ok(ctx)
}
