use std::collections::HashMap;

use async_trait::async_trait;
use camp_shared::{org::InvitationStatus, roles::Role};
use mongodb::bson::DateTime;
use tokio::sync::RwLock;

use crate::{
    models::{
        invitation::InvitationDoc, member::MemberDoc, organization::OrganizationDoc,
        session::SessionDoc, subscription::SubscriptionDoc, user::UserDoc,
    },
    response::{ServerError, ServerResult},
    store::AuthStore,
};

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, UserDoc>,
    sessions: HashMap<String, SessionDoc>,
    organizations: HashMap<String, OrganizationDoc>,
    members: HashMap<String, MemberDoc>,
    invitations: HashMap<String, InvitationDoc>,
    subscriptions: HashMap<String, SubscriptionDoc>,
}

/// In-process store for local runs and tests. Sessions and users are
/// seeded directly since they are normally written by the auth provider.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_user(&self, user: UserDoc) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }

    pub async fn seed_session(&self, session: SessionDoc) {
        self.state
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session);
    }

    pub async fn seed_subscription(&self, subscription: SubscriptionDoc) {
        self.state
            .write()
            .await
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    pub async fn session(&self, session_id: &str) -> Option<SessionDoc> {
        self.state.read().await.sessions.get(session_id).cloned()
    }
}

fn sorted_by_created<T, F>(mut items: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> (DateTime, String),
{
    items.sort_by_key(key);
    items
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_session_by_token(&self, token: &str) -> ServerResult<Option<SessionDoc>> {
        let state = self.state.read().await;
        Ok(state.sessions.values().find(|s| s.token == token).cloned())
    }

    async fn set_active_organization(
        &self,
        session_id: &str,
        organization_id: Option<&str>,
    ) -> ServerResult<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ServerError::not_found("Session not found"))?;
        session.active_organization_id = organization_id.map(str::to_string);
        session.updated_at = Some(DateTime::now());
        Ok(())
    }

    async fn clear_active_organization(
        &self,
        organization_id: &str,
        user_id: Option<&str>,
    ) -> ServerResult<()> {
        let mut state = self.state.write().await;
        for session in state.sessions.values_mut() {
            let matches_org = session.active_organization_id.as_deref() == Some(organization_id);
            let matches_user = user_id.is_none_or(|u| session.user_id == u);
            if matches_org && matches_user {
                session.active_organization_id = None;
            }
        }
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> ServerResult<Option<UserDoc>> {
        Ok(self.state.read().await.users.get(user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> ServerResult<Option<UserDoc>> {
        let email = email.trim().to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.email.to_lowercase() == email)
            .cloned())
    }

    async fn list_users(&self, user_ids: &[String]) -> ServerResult<Vec<UserDoc>> {
        let state = self.state.read().await;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn list_member_users(
        &self,
        organization_id: &str,
        user_ids: &[String],
    ) -> ServerResult<Vec<UserDoc>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .filter(|u| user_ids.contains(&u.id))
            .filter(|u| {
                state
                    .members
                    .values()
                    .any(|m| m.organization_id == organization_id && m.user_id == u.id)
            })
            .cloned()
            .collect())
    }

    async fn insert_organization(&self, organization: OrganizationDoc) -> ServerResult<()> {
        let mut state = self.state.write().await;
        if state
            .organizations
            .values()
            .any(|o| o.slug == organization.slug)
        {
            return Err(ServerError::validation("Organization slug is already taken"));
        }
        state
            .organizations
            .insert(organization.id.clone(), organization);
        Ok(())
    }

    async fn get_organization(
        &self,
        organization_id: &str,
    ) -> ServerResult<Option<OrganizationDoc>> {
        Ok(self
            .state
            .read()
            .await
            .organizations
            .get(organization_id)
            .cloned())
    }

    async fn get_organization_by_slug(&self, slug: &str) -> ServerResult<Option<OrganizationDoc>> {
        let state = self.state.read().await;
        Ok(state.organizations.values().find(|o| o.slug == slug).cloned())
    }

    async fn list_organizations(&self, ids: &[String]) -> ServerResult<Vec<OrganizationDoc>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.organizations.get(id).cloned())
            .collect())
    }

    async fn update_organization(
        &self,
        organization_id: &str,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> ServerResult<()> {
        let mut state = self.state.write().await;
        if let Some(slug) = slug {
            if state
                .organizations
                .values()
                .any(|o| o.slug == slug && o.id != organization_id)
            {
                return Err(ServerError::validation("Organization slug is already taken"));
            }
        }
        let org = state
            .organizations
            .get_mut(organization_id)
            .ok_or_else(|| ServerError::not_found("Organization not found"))?;
        if let Some(name) = name {
            org.name = name.to_string();
        }
        if let Some(slug) = slug {
            org.slug = slug.to_string();
        }
        Ok(())
    }

    async fn delete_organization(&self, organization_id: &str) -> ServerResult<()> {
        let mut state = self.state.write().await;
        state.organizations.remove(organization_id);
        state
            .members
            .retain(|_, m| m.organization_id != organization_id);
        state
            .invitations
            .retain(|_, i| i.organization_id != organization_id);
        Ok(())
    }

    async fn get_member(&self, member_id: &str) -> ServerResult<Option<MemberDoc>> {
        Ok(self.state.read().await.members.get(member_id).cloned())
    }

    async fn find_member(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> ServerResult<Option<MemberDoc>> {
        let state = self.state.read().await;
        Ok(state
            .members
            .values()
            .find(|m| m.organization_id == organization_id && m.user_id == user_id)
            .cloned())
    }

    async fn list_members(&self, organization_id: &str) -> ServerResult<Vec<MemberDoc>> {
        let state = self.state.read().await;
        let members = state
            .members
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(sorted_by_created(members, |m: &MemberDoc| {
            (m.created_at, m.id.clone())
        }))
    }

    async fn list_memberships_for_user(&self, user_id: &str) -> ServerResult<Vec<MemberDoc>> {
        let state = self.state.read().await;
        let members = state
            .members
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by_created(members, |m: &MemberDoc| {
            (m.created_at, m.id.clone())
        }))
    }

    async fn count_members(&self, organization_id: &str) -> ServerResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .members
            .values()
            .filter(|m| m.organization_id == organization_id)
            .count() as u64)
    }

    async fn insert_member(&self, member: MemberDoc) -> ServerResult<()> {
        let mut state = self.state.write().await;
        if state
            .members
            .values()
            .any(|m| m.organization_id == member.organization_id && m.user_id == member.user_id)
        {
            return Err(ServerError::validation(
                "User is already a member of this organization",
            ));
        }
        state.members.insert(member.id.clone(), member);
        Ok(())
    }

    async fn update_member_role(&self, member_id: &str, role: Role) -> ServerResult<()> {
        let mut state = self.state.write().await;
        let member = state
            .members
            .get_mut(member_id)
            .ok_or_else(|| ServerError::not_found("Member not found"))?;
        member.role = role;
        Ok(())
    }

    async fn delete_member(&self, member_id: &str) -> ServerResult<()> {
        self.state.write().await.members.remove(member_id);
        Ok(())
    }

    async fn get_invitation(&self, invitation_id: &str) -> ServerResult<Option<InvitationDoc>> {
        Ok(self
            .state
            .read()
            .await
            .invitations
            .get(invitation_id)
            .cloned())
    }

    async fn list_invitations(&self, organization_id: &str) -> ServerResult<Vec<InvitationDoc>> {
        let state = self.state.read().await;
        let invitations = state
            .invitations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect();
        Ok(sorted_by_created(invitations, |i: &InvitationDoc| {
            (i.created_at, i.id.clone())
        }))
    }

    async fn insert_invitation(&self, invitation: InvitationDoc) -> ServerResult<()> {
        let mut state = self.state.write().await;
        state.invitations.insert(invitation.id.clone(), invitation);
        Ok(())
    }

    async fn set_invitation_status(
        &self,
        invitation_id: &str,
        status: InvitationStatus,
    ) -> ServerResult<()> {
        let mut state = self.state.write().await;
        let invitation = state
            .invitations
            .get_mut(invitation_id)
            .ok_or_else(|| ServerError::not_found("Invitation not found"))?;
        invitation.status = status;
        Ok(())
    }

    async fn find_active_subscription(
        &self,
        reference_id: &str,
    ) -> ServerResult<Option<SubscriptionDoc>> {
        let state = self.state.read().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.reference_id == reference_id && s.is_active())
            .cloned())
    }
}
