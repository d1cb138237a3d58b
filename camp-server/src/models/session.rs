use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// Session row written by the auth provider at sign-in. This service only
/// reads it and moves `active_organization_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub active_organization_id: Option<String>,
    pub expires_at: DateTime,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime>,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

impl SessionDoc {
    pub fn is_expired_at(&self, now: DateTime) -> bool {
        self.expires_at <= now
    }
}
