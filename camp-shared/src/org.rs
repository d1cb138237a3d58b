use serde::{Deserialize, Serialize};

use crate::roles::Role;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub logo: Option<String>,
    pub metadata: Option<String>,
    pub created_at: String,
}

/// Entry of the organization switcher: one organization the user belongs to.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OrganizationSummary {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub logo: Option<String>,
    pub role: Role,
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MemberUser {
    pub name: String,
    pub email: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub role: Role,
    pub created_at: String,
    pub user: MemberUser,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Canceled,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Rejected => "rejected",
            InvitationStatus::Canceled => "canceled",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub id: String,
    pub organization_id: String,
    pub email: String,
    pub role: Role,
    pub status: InvitationStatus,
    pub inviter_id: String,
    pub expires_at: String,
    pub expired: bool,
}

/// Organization together with its complete member and invitation lists.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FullOrganization {
    pub organization: Organization,
    pub members: Vec<Member>,
    pub invitations: Vec<Invitation>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct CreateOrganizationBody {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UpdateOrganizationBody {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct DeleteOrganizationQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeletedOrganization {
    pub id: String,
    pub redirect_to: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SetActiveOrganizationBody {
    pub organization_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InviteMemberBody {
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdateMemberRoleBody {
    pub role: Role,
}

/// What the dashboard needs to render its landing page.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionOverview {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub locale: String,
    pub active_organization: Option<OrganizationSummary>,
    pub organizations: Vec<OrganizationSummary>,
}
