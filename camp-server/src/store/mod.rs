//! Persistence seam for the records owned by the auth provider.
//!
//! Sessions, users, organizations, members and invitations live in the
//! auth provider's datastore. This service reads and writes them only
//! through [`AuthStore`]; `db::Mongo` is the production adapter and
//! [`memory::MemoryStore`] backs local runs and tests.

pub mod memory;

use async_trait::async_trait;
use camp_shared::{org::InvitationStatus, roles::Role};

use crate::{
    models::{
        invitation::InvitationDoc, member::MemberDoc, organization::OrganizationDoc,
        session::SessionDoc, subscription::SubscriptionDoc, user::UserDoc,
    },
    response::ServerResult,
};

#[async_trait]
pub trait AuthStore: Send + Sync {
    // sessions
    async fn find_session_by_token(&self, token: &str) -> ServerResult<Option<SessionDoc>>;
    async fn set_active_organization(
        &self,
        session_id: &str,
        organization_id: Option<&str>,
    ) -> ServerResult<()>;
    /// Clears the active organization of every session pointing at
    /// `organization_id`, optionally only for one user.
    async fn clear_active_organization(
        &self,
        organization_id: &str,
        user_id: Option<&str>,
    ) -> ServerResult<()>;

    // users
    async fn get_user(&self, user_id: &str) -> ServerResult<Option<UserDoc>>;
    async fn get_user_by_email(&self, email: &str) -> ServerResult<Option<UserDoc>>;
    async fn list_users(&self, user_ids: &[String]) -> ServerResult<Vec<UserDoc>>;
    /// Users whose id is in `user_ids` and who are members of `organization_id`.
    async fn list_member_users(
        &self,
        organization_id: &str,
        user_ids: &[String],
    ) -> ServerResult<Vec<UserDoc>>;

    // organizations
    /// Fails with a validation error when the slug is taken.
    async fn insert_organization(&self, organization: OrganizationDoc) -> ServerResult<()>;
    async fn get_organization(
        &self,
        organization_id: &str,
    ) -> ServerResult<Option<OrganizationDoc>>;
    async fn get_organization_by_slug(&self, slug: &str) -> ServerResult<Option<OrganizationDoc>>;
    async fn list_organizations(&self, ids: &[String]) -> ServerResult<Vec<OrganizationDoc>>;
    async fn update_organization(
        &self,
        organization_id: &str,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> ServerResult<()>;
    /// Removes the organization with its members and invitations.
    async fn delete_organization(&self, organization_id: &str) -> ServerResult<()>;

    // members
    async fn get_member(&self, member_id: &str) -> ServerResult<Option<MemberDoc>>;
    async fn find_member(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> ServerResult<Option<MemberDoc>>;
    async fn list_members(&self, organization_id: &str) -> ServerResult<Vec<MemberDoc>>;
    async fn list_memberships_for_user(&self, user_id: &str) -> ServerResult<Vec<MemberDoc>>;
    async fn count_members(&self, organization_id: &str) -> ServerResult<u64>;
    async fn insert_member(&self, member: MemberDoc) -> ServerResult<()>;
    async fn update_member_role(&self, member_id: &str, role: Role) -> ServerResult<()>;
    async fn delete_member(&self, member_id: &str) -> ServerResult<()>;

    // invitations
    async fn get_invitation(&self, invitation_id: &str) -> ServerResult<Option<InvitationDoc>>;
    async fn list_invitations(&self, organization_id: &str) -> ServerResult<Vec<InvitationDoc>>;
    async fn insert_invitation(&self, invitation: InvitationDoc) -> ServerResult<()>;
    async fn set_invitation_status(
        &self,
        invitation_id: &str,
        status: InvitationStatus,
    ) -> ServerResult<()>;

    // billing
    async fn find_active_subscription(
        &self,
        reference_id: &str,
    ) -> ServerResult<Option<SubscriptionDoc>>;
}
