use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};

use crate::{
    auth::session::SessionContext,
    models::member::MemberDoc,
    response::{ServerError, ServerResult},
    util::app_state::AppState,
};

/// Session required; answers `401` without one. For action routes.
#[derive(Debug, Clone)]
pub struct AuthSession(pub SessionContext);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .resolve(&parts.headers)
            .await?
            .map(AuthSession)
            .ok_or_else(|| ServerError::unauthenticated("Not authenticated"))
    }
}

/// Session if there is one. Never rejects for a missing session.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<SessionContext>);

impl FromRequestParts<AppState> for MaybeSession {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(state.sessions.resolve(&parts.headers).await?))
    }
}

/// Session required; redirects to the sign-in page without one. For page
/// routes.
#[derive(Debug, Clone)]
pub struct PageSession(pub SessionContext);

impl FromRequestParts<AppState> for PageSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.sessions.resolve(&parts.headers).await {
            Ok(Some(session)) => Ok(PageSession(session)),
            Ok(None) => Err(Redirect::to(&state.config.sign_in_path).into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}

/// Session with an active organization the user still belongs to.
#[derive(Debug, Clone)]
pub struct ActiveOrganization {
    pub session: SessionContext,
    pub organization_id: String,
    /// The caller's own membership in the active organization.
    pub member: MemberDoc,
}

impl FromRequestParts<AppState> for ActiveOrganization {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthSession(session) = AuthSession::from_request_parts(parts, state).await?;
        require_active_organization(state, session).await
    }
}

/// Fails with `NoActiveOrganization` when none is selected, distinct from
/// the unauthenticated case, and with `Forbidden` when the user is no
/// longer a member of it.
pub async fn require_active_organization(
    state: &AppState,
    session: SessionContext,
) -> ServerResult<ActiveOrganization> {
    let organization_id = session
        .active_organization_id
        .clone()
        .ok_or(ServerError::NoActiveOrganization)?;

    let member = state
        .store
        .find_member(&organization_id, session.user_id())
        .await?
        .ok_or_else(|| ServerError::forbidden("Not a member of this organization"))?;

    Ok(ActiveOrganization {
        session,
        organization_id,
        member,
    })
}
