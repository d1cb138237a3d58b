use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};

use camp_shared::users::{CollaboratorInfo, GetUsersBody};

use crate::actions::users::{GET_USERS_FALLBACK, get_users};
use crate::response::{ActionResult, ServerError};
use crate::util::app_state::AppState;

/// Routes under `/actions`. Actions always answer `200` with a tagged
/// result so callers never see a transport failure.
pub fn create_route() -> Router<AppState> {
    Router::new().route("/users", post(get_users_action))
}

async fn get_users_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GetUsersBody>, JsonRejection>,
) -> ActionResult<Vec<CollaboratorInfo>> {
    let result = async {
        let Json(body) = payload.map_err(ServerError::from)?;
        let session = state.sessions.resolve(&headers).await?;
        get_users(&state, session, body.user_ids).await
    }
    .await;
    ActionResult::from_result(result.map_err(|e| e.with_fallback(GET_USERS_FALLBACK)))
}
