//! Role resolution and switching for the calling identity.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::Extension,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{delete, get, post},
};
use serde::Deserialize;
use tokio::sync::mpsc::unbounded_channel;
use tokio_stream::wrappers::UnboundedReceiverStream;

use rolegate_auth::{ROLE_CHANGED, RequestContext};

use crate::app::errors;
use crate::app::services::AppServices;

// ─────────────────────────────────────────────────────────────────────────────
// Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SwitchRoleRequest {
    pub role: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/roles", get(resolve_roles))
        .route("/roles/cached", get(resolve_cached))
        .route("/roles/switch", post(switch_role))
        .route("/roles/changes", get(role_changes))
        .route("/roles/test-mode", delete(end_test_mode))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /roles
///
/// Authoritative resolution. A store outage still answers 200 with the
/// `{viewer}` fallback and `degraded: true`.
pub async fn resolve_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    Json(services.resolver.resolve_roles(&ctx))
}

/// GET /roles/cached
pub async fn resolve_cached(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
    Json(services.resolver.resolve_cached(&ctx))
}

/// POST /roles/switch
pub async fn switch_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
    Json(req): Json<SwitchRoleRequest>,
) -> axum::response::Response {
    errors::switch_outcome_to_response(services.resolver.switch_role(&ctx, &req.role))
}

/// DELETE /roles/test-mode
pub async fn end_test_mode(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> axum::response::Response {
    match services.resolver.end_test_mode(ctx.identity()) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::role_error_to_response(e),
    }
}

/// GET /roles/changes
///
/// Server-Sent Events stream of role changes for the calling identity, so
/// sibling sessions converge without polling.
pub async fn role_changes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<RequestContext>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let identity = ctx.identity().clone();
    let (tx, rx) = unbounded_channel::<Result<SseEvent, Infallible>>();

    // Subscribe before returning so nothing published after the response starts is missed.
    let subscription = services.resolver.subscribe();

    tokio::task::spawn_blocking(move || {
        loop {
            if tx.is_closed() {
                break;
            }

            match subscription.recv_timeout(Duration::from_millis(1000)) {
                Ok(envelope) => {
                    if envelope.identity() != &identity {
                        continue;
                    }

                    let event = match SseEvent::default()
                        .event(ROLE_CHANGED)
                        .id(envelope.event_id().to_string())
                        .json_data(envelope.payload())
                    {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(identity = %identity, error = %err, "failed to encode role change event");
                            continue;
                        }
                    };

                    if tx.send(Ok(event)).is_err() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::debug!(identity = %identity, "role change stream closed");
    });

    Sse::new(UnboundedReceiverStream::new(rx)).keep_alive(KeepAlive::default())
}
