use serde::{Deserialize, Serialize};

/// Limited profile of a user who shares the caller's active organization.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CollaboratorInfo {
    pub id: String,
    pub name: String,
    pub email: String,
    pub image: Option<String>,
    pub color: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GetUsersBody {
    pub user_ids: Vec<String>,
}
