use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDoc {
    #[serde(rename = "_id")]
    pub id: String,

    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub image: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime>,
    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

impl UserDoc {
    /// Name to show for this user: name, then email, then a placeholder.
    pub fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ if !self.email.trim().is_empty() => self.email.clone(),
            _ => "Unknown User".to_string(),
        }
    }
}
