use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};

use camp_shared::webhook::WebhookEvent;

use crate::api::extract::Json;
use crate::auth::guard::{MaybeSession, require_active_organization};
use crate::auth::session::SessionContext;
use crate::response::{ServerAppResult, ServerError, ServerResponse, ServerResult};
use crate::util::app_state::AppState;
use crate::webhooks::{MessageReceipt, PortalAccess};

/// Routes under `/webhooks`. Without an active organization both answer
/// `{"data": null}` and nothing is sent. With one, only owners and admins
/// may publish events or open the portal.
pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/events", post(send_event))
        .route("/portal", get(get_portal))
}

async fn relay_session(
    state: &AppState,
    session: Option<SessionContext>,
) -> ServerResult<Option<SessionContext>> {
    let session = match session {
        Some(session) if session.active_organization_id.is_some() => session,
        other => return Ok(other),
    };
    let ctx = require_active_organization(state, session).await?;
    if !ctx.member.role.can_manage_members() {
        return Err(ServerError::forbidden(
            "Only owners and admins can manage webhooks",
        ));
    }
    Ok(Some(ctx.session))
}

async fn send_event(
    MaybeSession(session): MaybeSession,
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> ServerAppResult<Option<MessageReceipt>> {
    let event: WebhookEvent = serde_json::from_value(payload)
        .map_err(|e| ServerError::validation(&format!("Invalid webhook event: {}", e)))?;
    let session = relay_session(&state, session).await?;
    let receipt = state
        .webhooks
        .send(session.as_ref(), &event)
        .await
        .map_err(|e| e.with_fallback("Failed to send webhook event."))?;
    Ok(ServerResponse::builder().body(receipt).ok().build())
}

async fn get_portal(
    MaybeSession(session): MaybeSession,
    State(state): State<AppState>,
) -> ServerAppResult<Option<PortalAccess>> {
    let session = relay_session(&state, session).await?;
    let access = state
        .webhooks
        .portal(session.as_ref())
        .await
        .map_err(|e| e.with_fallback("Failed to open the webhook portal."))?;
    Ok(ServerResponse::builder().body(access).ok().build())
}
