//! Event schemas accepted by the webhook relay.
//!
//! Events travel as a flat JSON object tagged by `eventType`. Unknown event
//! types and unknown fields are rejected when deserializing.

use serde::{Deserialize, Serialize};

use crate::roles::Role;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "eventType")]
pub enum WebhookEvent {
    #[serde(rename = "organization.created")]
    OrganizationCreated(OrganizationEvent),
    #[serde(rename = "organization.updated")]
    OrganizationUpdated(OrganizationEvent),
    #[serde(rename = "organization.deleted")]
    OrganizationDeleted(OrganizationEvent),
    #[serde(rename = "member.invited")]
    MemberInvited(InvitationEvent),
    #[serde(rename = "member.joined")]
    MemberJoined(MemberEvent),
    #[serde(rename = "member.role_updated")]
    MemberRoleUpdated(MemberEvent),
    #[serde(rename = "member.removed")]
    MemberRemoved(MemberEvent),
    #[serde(rename = "test.ping")]
    Ping(PingEvent),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OrganizationEvent {
    pub organization_id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct InvitationEvent {
    pub invitation_id: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MemberEvent {
    pub member_id: String,
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PingEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            WebhookEvent::OrganizationCreated(_) => "organization.created",
            WebhookEvent::OrganizationUpdated(_) => "organization.updated",
            WebhookEvent::OrganizationDeleted(_) => "organization.deleted",
            WebhookEvent::MemberInvited(_) => "member.invited",
            WebhookEvent::MemberJoined(_) => "member.joined",
            WebhookEvent::MemberRoleUpdated(_) => "member.role_updated",
            WebhookEvent::MemberRemoved(_) => "member.removed",
            WebhookEvent::Ping(_) => "test.ping",
        }
    }

    /// Flat payload forwarded to the delivery provider, `eventType` included.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
