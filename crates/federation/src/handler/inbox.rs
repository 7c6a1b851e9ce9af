//! Inbox endpoints for receiving `ActivityPub` activities.
//!
//! Signature verification happens in front of these routes.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{debug, info, warn};

use crate::processor::{InboundActivity, InboxOutcome, InboxProcessor};

/// Routes for the shared inbox and per-actor inboxes.
pub fn inbox_router(processor: Arc<InboxProcessor>) -> Router {
    Router::new()
        .route("/inbox", post(inbox_handler))
        .route("/users/{username}/inbox", post(user_inbox_handler))
        .with_state(processor)
}

/// Handle a delivery to the shared inbox.
pub async fn inbox_handler(
    State(processor): State<Arc<InboxProcessor>>,
    body: Bytes,
) -> Response {
    process(&processor, &body, None).await
}

/// Handle a delivery to a single actor's inbox.
pub async fn user_inbox_handler(
    State(processor): State<Arc<InboxProcessor>>,
    Path(username): Path<String>,
    body: Bytes,
) -> Response {
    process(&processor, &body, Some(&username)).await
}

async fn process(processor: &InboxProcessor, body: &[u8], username: Option<&str>) -> Response {
    let activity: InboundActivity = match serde_json::from_slice(body) {
        Ok(activity) => activity,
        Err(e) => {
            warn!(error = %e, inbox_owner = ?username, "Failed to parse activity");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let kind = activity.kind();
    debug!(kind = %kind, inbox_owner = ?username, "Received activity");

    match processor.handle(activity).await {
        Ok(InboxOutcome::Ignored { reason }) => {
            debug!(kind = %kind, reason = %reason, "Activity accepted but ignored");
            StatusCode::ACCEPTED.into_response()
        }
        Ok(_) => {
            info!(kind = %kind, "Activity processed");
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => e.into_response(),
    }
}
