use camp_shared::org::Organization;
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::models::rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    /// Unique across all organizations.
    pub slug: String,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
    pub created_at: DateTime,
}

impl OrganizationDoc {
    pub fn to_organization(&self) -> Organization {
        Organization {
            id: self.id.clone(),
            name: self.name.clone(),
            slug: self.slug.clone(),
            logo: self.logo.clone(),
            metadata: self.metadata.clone(),
            created_at: rfc3339(&self.created_at),
        }
    }
}
