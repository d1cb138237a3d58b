use camp_shared::{
    org::{Invitation, InvitationStatus},
    roles::Role,
};
use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

use crate::models::rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvitationDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub organization_id: String,
    /// Stored lower-cased.
    pub email: String,
    pub role: Role,
    pub status: InvitationStatus,
    pub inviter_id: String,
    pub expires_at: DateTime,
    pub created_at: DateTime,
}

impl InvitationDoc {
    pub fn is_expired_at(&self, now: DateTime) -> bool {
        self.expires_at <= now
    }

    /// Pending and not yet expired: the invitation still holds a seat.
    pub fn is_open_at(&self, now: DateTime) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired_at(now)
    }

    pub fn to_invitation(&self, now: DateTime) -> Invitation {
        Invitation {
            id: self.id.clone(),
            organization_id: self.organization_id.clone(),
            email: self.email.clone(),
            role: self.role,
            status: self.status,
            inviter_id: self.inviter_id.clone(),
            expires_at: rfc3339(&self.expires_at),
            expired: self.status == InvitationStatus::Pending && self.is_expired_at(now),
        }
    }
}
