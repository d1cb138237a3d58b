use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};

use camp_shared::org::{
    CreateOrganizationBody, DeleteOrganizationQuery, DeletedOrganization, FullOrganization,
    OrganizationSummary, SetActiveOrganizationBody, UpdateOrganizationBody,
};

use crate::actions::organization;
use crate::api::extract::{Json, Query};
use crate::auth::guard::{ActiveOrganization, AuthSession};
use crate::response::{ServerAppResult, ServerResponse};
use crate::util::app_state::AppState;

/// Routes under `/organizations`: the caller's organizations.
pub fn create_route() -> Router<AppState> {
    Router::new()
        .route("/", get(list_organizations).post(create_organization))
        .route("/active", post(set_active_organization))
}

/// Routes under `/organization`: the session's active organization.
pub fn active_route() -> Router<AppState> {
    Router::new().route(
        "/",
        get(get_organization)
            .put(update_organization)
            .delete(delete_organization),
    )
}

async fn list_organizations(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> ServerAppResult<Vec<OrganizationSummary>> {
    let organizations = organization::list_organizations(&state, &session)
        .await
        .map_err(|e| e.with_fallback("Failed to load organizations."))?;
    Ok(ServerResponse::builder().body(organizations).ok().build())
}

async fn create_organization(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Json(payload): Json<CreateOrganizationBody>,
) -> ServerAppResult<FullOrganization> {
    let full = organization::create_organization(&state, &session, payload)
        .await
        .map_err(|e| e.with_fallback("Failed to create organization. Please try again."))?;
    Ok(ServerResponse::builder().body(full).created().build())
}

async fn set_active_organization(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
    Json(payload): Json<SetActiveOrganizationBody>,
) -> ServerAppResult<Option<OrganizationSummary>> {
    let active = organization::set_active_organization(&state, &session, payload.organization_id)
        .await
        .map_err(|e| e.with_fallback("Failed to switch organization. Please try again."))?;
    Ok(ServerResponse::builder().body(active).ok().build())
}

async fn get_organization(
    ctx: ActiveOrganization,
    State(state): State<AppState>,
) -> ServerAppResult<FullOrganization> {
    let full = organization::load_full_organization(&state, &ctx.organization_id)
        .await
        .map_err(|e| e.with_fallback("Failed to load organization."))?;
    Ok(ServerResponse::builder().body(full).ok().build())
}

async fn update_organization(
    ctx: ActiveOrganization,
    State(state): State<AppState>,
    Json(payload): Json<UpdateOrganizationBody>,
) -> ServerAppResult<FullOrganization> {
    let full = organization::update_organization(&state, &ctx, payload)
        .await
        .map_err(|e| e.with_fallback("Failed to update organization. Please try again."))?;
    Ok(ServerResponse::builder().body(full).ok().build())
}

async fn delete_organization(
    ctx: ActiveOrganization,
    State(state): State<AppState>,
    Query(query): Query<DeleteOrganizationQuery>,
) -> ServerAppResult<DeletedOrganization> {
    let deleted = organization::delete_organization(&state, &ctx, query.confirm)
        .await
        .map_err(|e| e.with_fallback("Failed to delete organization. Please try again."))?;
    Ok(ServerResponse::builder()
        .body(deleted)
        .status_code(StatusCode::OK)
        .build())
}
