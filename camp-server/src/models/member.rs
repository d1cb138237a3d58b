use camp_shared::{
    org::{Member, MemberUser},
    roles::Role,
};
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::models::{rfc3339, user::UserDoc};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub role: Role,
    pub created_at: DateTime,
}

impl MemberDoc {
    pub fn to_member(&self, user: &UserDoc) -> Member {
        Member {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            user_id: self.user_id.clone(),
            role: self.role,
            created_at: rfc3339(&self.created_at),
            user: MemberUser {
                name: user.display_name(),
                email: user.email.clone(),
                image: user.image.clone(),
            },
        }
    }
}
