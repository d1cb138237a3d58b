use axum::extract::{Path, State};
use axum::Router;
use axum::routing::{delete, post, put};

use camp_shared::org::{FullOrganization, Invitation, InviteMemberBody, UpdateMemberRoleBody};

use crate::actions::members;
use crate::api::extract::Json;
use crate::auth::guard::{ActiveOrganization, AuthSession};
use crate::response::{ServerAppResult, ServerResponse};
use crate::util::app_state::AppState;

/// Member and invitation management in the active organization, merged
/// under `/organization`.
pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/invitations", post(invite_member))
        .route("/invitations/{id}", delete(cancel_invitation))
        .route("/members/{member_id}", delete(remove_member))
        .route("/members/{member_id}/role", put(update_member_role))
}

/// Routes under `/invitations`, answered by the invitee.
pub fn invitation_route() -> Router<AppState> {
    Router::new()
        .route("/{id}/accept", post(accept_invitation))
        .route("/{id}/reject", post(reject_invitation))
}

async fn invite_member(
    ctx: ActiveOrganization,
    State(state): State<AppState>,
    Json(payload): Json<InviteMemberBody>,
) -> ServerAppResult<FullOrganization> {
    let full = members::invite_member(&state, &ctx, &payload.email, payload.role)
        .await
        .map_err(|e| e.with_fallback("Failed to send invitation. Please try again."))?;
    Ok(ServerResponse::builder().body(full).created().build())
}

async fn cancel_invitation(
    ctx: ActiveOrganization,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerAppResult<FullOrganization> {
    let full = members::cancel_invitation(&state, &ctx, &id)
        .await
        .map_err(|e| e.with_fallback("Failed to cancel invitation. Please try again."))?;
    Ok(ServerResponse::builder().body(full).ok().build())
}

async fn accept_invitation(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerAppResult<FullOrganization> {
    let full = members::accept_invitation(&state, &session, &id)
        .await
        .map_err(|e| e.with_fallback("Failed to accept invitation. Please try again."))?;
    Ok(ServerResponse::builder().body(full).ok().build())
}

async fn reject_invitation(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerAppResult<Invitation> {
    let invitation = members::reject_invitation(&state, &session, &id)
        .await
        .map_err(|e| e.with_fallback("Failed to reject invitation. Please try again."))?;
    Ok(ServerResponse::builder().body(invitation).ok().build())
}

async fn update_member_role(
    ctx: ActiveOrganization,
    State(state): State<AppState>,
    Path(member_id): Path<String>,
    Json(payload): Json<UpdateMemberRoleBody>,
) -> ServerAppResult<FullOrganization> {
    let full = members::update_member_role(&state, &ctx, &member_id, payload.role)
        .await
        .map_err(|e| e.with_fallback("Failed to update member role. Please try again."))?;
    Ok(ServerResponse::builder().body(full).ok().build())
}

async fn remove_member(
    ctx: ActiveOrganization,
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> ServerAppResult<Option<FullOrganization>> {
    let full = members::remove_member(&state, &ctx, &member_id)
        .await
        .map_err(|e| e.with_fallback("Failed to remove member. Please try again."))?;
    Ok(ServerResponse::builder().body(full).ok().build())
}
