use std::collections::{HashMap, HashSet};

use camp_shared::users::CollaboratorInfo;

use crate::{
    auth::{guard::require_active_organization, session::SessionContext},
    response::{ServerError, ServerResult},
    util::{app_state::AppState, color::user_color},
};

pub const GET_USERS_FALLBACK: &str = "Failed to load users.";

/// Profiles for the candidate ids that are members of the caller's active
/// organization, in first-occurrence order of the input. Everyone else is
/// silently left out.
pub async fn get_users(
    state: &AppState,
    session: Option<SessionContext>,
    user_ids: Vec<String>,
) -> ServerResult<Vec<CollaboratorInfo>> {
    let session = session.ok_or_else(|| ServerError::unauthenticated("Not authenticated"))?;
    let ctx = require_active_organization(state, session).await?;

    let mut seen = HashSet::new();
    let candidates: Vec<String> = user_ids
        .into_iter()
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let mut users: HashMap<String, _> = state
        .store
        .list_member_users(&ctx.organization_id, &candidates)
        .await?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    Ok(candidates
        .iter()
        .filter_map(|id| users.remove(id))
        .map(|user| CollaboratorInfo {
            name: user.display_name(),
            color: user_color(&user.id).to_string(),
            id: user.id,
            email: user.email,
            image: user.image,
        })
        .collect())
}
