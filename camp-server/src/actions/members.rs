use camp_shared::{
    org::{FullOrganization, Invitation, InvitationStatus},
    roles::Role,
    webhook::{InvitationEvent, MemberEvent, WebhookEvent},
};
use mongodb::bson::DateTime;
use tracing::info;

use crate::{
    actions::organization::load_full_organization,
    auth::{guard::ActiveOrganization, session::SessionContext},
    models::{invitation::InvitationDoc, member::MemberDoc},
    response::{ServerError, ServerResult},
    util::{
        app_state::AppState,
        ids::{is_valid_id, new_id},
    },
};

/// Seats available to an organization: the active plan's seat count, else
/// the configured default.
pub async fn seat_limit(state: &AppState, organization_id: &str) -> ServerResult<u64> {
    let seats = state
        .store
        .find_active_subscription(organization_id)
        .await?
        .and_then(|s| s.seats);
    Ok(seats.unwrap_or(state.config.membership_limit))
}

/// Seats taken: members plus open invitations.
async fn seats_used(state: &AppState, organization_id: &str, now: DateTime) -> ServerResult<u64> {
    let members = state.store.count_members(organization_id).await?;
    let open = state
        .store
        .list_invitations(organization_id)
        .await?
        .iter()
        .filter(|i| i.is_open_at(now))
        .count() as u64;
    Ok(members + open)
}

fn require_manager(ctx: &ActiveOrganization, action: &str) -> ServerResult<()> {
    if !ctx.member.role.can_manage_members() {
        return Err(ServerError::forbidden(&format!(
            "Only owners and admins can {}",
            action
        )));
    }
    Ok(())
}

fn normalize_email(email: &str) -> ServerResult<String> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ServerError::validation("Invalid email address"));
    }
    Ok(email)
}

fn require_member_id(member_id: &str) -> ServerResult<()> {
    if !is_valid_id(member_id) {
        return Err(ServerError::validation("Invalid member id"));
    }
    Ok(())
}

/// Member of the active organization by id. Members of other organizations
/// are reported as not found.
async fn member_in_org(
    state: &AppState,
    ctx: &ActiveOrganization,
    member_id: &str,
) -> ServerResult<MemberDoc> {
    require_member_id(member_id)?;
    state
        .store
        .get_member(member_id)
        .await?
        .filter(|m| m.organization_id == ctx.organization_id)
        .ok_or_else(|| ServerError::not_found("Member not found"))
}

pub async fn invite_member(
    state: &AppState,
    ctx: &ActiveOrganization,
    email: &str,
    role: Role,
) -> ServerResult<FullOrganization> {
    require_manager(ctx, "invite members")?;
    let email = normalize_email(email)?;
    if !Role::allows(&ctx.member.role, &role) {
        return Err(ServerError::forbidden(
            "You cannot invite a member with a higher role than your own",
        ));
    }

    let existing = match state.store.get_user_by_email(&email).await? {
        Some(user) => {
            state
                .store
                .find_member(&ctx.organization_id, &user.id)
                .await?
        }
        None => None,
    };
    if existing.is_some() {
        return Err(ServerError::validation(
            "User is already a member of this organization",
        ));
    }

    let now = DateTime::now();
    let pending = state.store.list_invitations(&ctx.organization_id).await?;
    if pending.iter().any(|i| i.email == email && i.is_open_at(now)) {
        return Err(ServerError::validation(
            "User is already invited to this organization",
        ));
    }

    let limit = seat_limit(state, &ctx.organization_id).await?;
    if seats_used(state, &ctx.organization_id, now).await? >= limit {
        return Err(ServerError::MemberLimit { limit });
    }

    let expires_in_ms = i64::try_from(state.config.invitation_expires_in_secs)
        .unwrap_or(i64::MAX / 1000)
        .saturating_mul(1000);
    let invitation = InvitationDoc {
        id: new_id(),
        organization_id: ctx.organization_id.clone(),
        email,
        role,
        status: InvitationStatus::Pending,
        inviter_id: ctx.session.user_id().to_string(),
        expires_at: DateTime::from_millis(now.timestamp_millis().saturating_add(expires_in_ms)),
        created_at: now,
    };
    state.store.insert_invitation(invitation.clone()).await?;

    info!(
        organization_id = %ctx.organization_id,
        invitation_id = %invitation.id,
        role = %role,
        "member invited"
    );
    state
        .webhooks
        .send_to_organization(
            &ctx.organization_id,
            WebhookEvent::MemberInvited(InvitationEvent {
                invitation_id: invitation.id,
                email: invitation.email,
                role,
            }),
        )
        .await;

    load_full_organization(state, &ctx.organization_id).await
}

pub async fn cancel_invitation(
    state: &AppState,
    ctx: &ActiveOrganization,
    invitation_id: &str,
) -> ServerResult<FullOrganization> {
    require_manager(ctx, "cancel invitations")?;
    let invitation = state
        .store
        .get_invitation(invitation_id)
        .await?
        .filter(|i| i.organization_id == ctx.organization_id)
        .ok_or_else(|| ServerError::not_found("Invitation not found"))?;
    if invitation.status != InvitationStatus::Pending {
        return Err(ServerError::validation("Invitation is no longer pending"));
    }

    state
        .store
        .set_invitation_status(&invitation.id, InvitationStatus::Canceled)
        .await?;
    info!(invitation_id = %invitation.id, "invitation canceled");

    load_full_organization(state, &ctx.organization_id).await
}

/// Invitation addressed to the session user that can still be answered.
async fn answerable_invitation(
    state: &AppState,
    session: &SessionContext,
    invitation_id: &str,
) -> ServerResult<InvitationDoc> {
    let invitation = state
        .store
        .get_invitation(invitation_id)
        .await?
        .filter(|i| i.email.eq_ignore_ascii_case(&session.user.email))
        .ok_or_else(|| ServerError::not_found("Invitation not found"))?;
    if invitation.status != InvitationStatus::Pending {
        return Err(ServerError::validation("Invitation is no longer pending"));
    }
    if invitation.is_expired_at(DateTime::now()) {
        return Err(ServerError::validation("Invitation has expired"));
    }
    Ok(invitation)
}

/// Joins the inviting organization and makes it the active one.
pub async fn accept_invitation(
    state: &AppState,
    session: &SessionContext,
    invitation_id: &str,
) -> ServerResult<FullOrganization> {
    let invitation = answerable_invitation(state, session, invitation_id).await?;
    let organization_id = invitation.organization_id.clone();

    if state
        .store
        .find_member(&organization_id, session.user_id())
        .await?
        .is_some()
    {
        return Err(ServerError::validation(
            "You are already a member of this organization",
        ));
    }

    // The accepted invitation already holds one of the counted seats.
    let limit = seat_limit(state, &organization_id).await?;
    if state.store.count_members(&organization_id).await? >= limit {
        return Err(ServerError::MemberLimit { limit });
    }

    let member = MemberDoc {
        id: new_id(),
        organization_id: organization_id.clone(),
        user_id: session.user_id().to_string(),
        role: invitation.role,
        created_at: DateTime::now(),
    };
    state.store.insert_member(member.clone()).await?;
    state
        .store
        .set_invitation_status(&invitation.id, InvitationStatus::Accepted)
        .await?;
    state
        .store
        .set_active_organization(&session.session_id, Some(&organization_id))
        .await?;

    info!(
        organization_id = %organization_id,
        member_id = %member.id,
        "invitation accepted"
    );
    state
        .webhooks
        .send_to_organization(&organization_id, WebhookEvent::MemberJoined(member_event(&member)))
        .await;

    load_full_organization(state, &organization_id).await
}

pub async fn reject_invitation(
    state: &AppState,
    session: &SessionContext,
    invitation_id: &str,
) -> ServerResult<Invitation> {
    let mut invitation = answerable_invitation(state, session, invitation_id).await?;
    state
        .store
        .set_invitation_status(&invitation.id, InvitationStatus::Rejected)
        .await?;
    invitation.status = InvitationStatus::Rejected;
    info!(invitation_id = %invitation.id, "invitation rejected");
    Ok(invitation.to_invitation(DateTime::now()))
}

/// Changes a member's role. Owners are never changed, and nobody grants a
/// role above their own.
pub async fn update_member_role(
    state: &AppState,
    ctx: &ActiveOrganization,
    member_id: &str,
    role: Role,
) -> ServerResult<FullOrganization> {
    require_manager(ctx, "change member roles")?;
    let target = member_in_org(state, ctx, member_id).await?;

    if target.role == Role::Owner {
        return Err(ServerError::forbidden(
            "The organization owner's role cannot be changed",
        ));
    }
    if role == Role::Owner {
        return Err(ServerError::validation("Role must be admin or member"));
    }
    if !Role::allows(&ctx.member.role, &role) {
        return Err(ServerError::forbidden(
            "You cannot grant a role higher than your own",
        ));
    }

    state.store.update_member_role(&target.id, role).await?;
    info!(
        organization_id = %ctx.organization_id,
        member_id = %target.id,
        role = %role,
        "member role updated"
    );
    state
        .webhooks
        .send_to_organization(
            &ctx.organization_id,
            WebhookEvent::MemberRoleUpdated(MemberEvent {
                member_id: target.id,
                user_id: target.user_id,
                role,
            }),
        )
        .await;

    load_full_organization(state, &ctx.organization_id).await
}

/// Removes a member. Owners and admins remove others; anyone may leave. The
/// owner is never removed. Returns `None` when the caller left, since they
/// can no longer see the organization.
pub async fn remove_member(
    state: &AppState,
    ctx: &ActiveOrganization,
    member_id: &str,
) -> ServerResult<Option<FullOrganization>> {
    let target = member_in_org(state, ctx, member_id).await?;
    if target.role == Role::Owner {
        return Err(ServerError::forbidden(
            "The organization owner cannot be removed",
        ));
    }

    let leaving = target.user_id == ctx.session.user_id();
    if !leaving {
        require_manager(ctx, "remove members")?;
    }

    state.store.delete_member(&target.id).await?;
    state
        .store
        .clear_active_organization(&ctx.organization_id, Some(&target.user_id))
        .await?;

    info!(
        organization_id = %ctx.organization_id,
        member_id = %target.id,
        leaving,
        "member removed"
    );
    state
        .webhooks
        .send_to_organization(
            &ctx.organization_id,
            WebhookEvent::MemberRemoved(member_event(&target)),
        )
        .await;

    if leaving {
        return Ok(None);
    }
    load_full_organization(state, &ctx.organization_id)
        .await
        .map(Some)
}

fn member_event(member: &MemberDoc) -> MemberEvent {
    MemberEvent {
        member_id: member.id.clone(),
        user_id: member.user_id.clone(),
        role: member.role,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::AuthStore, util::test_support::Fixture};

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" A@B.com ").unwrap(), "a@b.com");
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("@b.com").is_err());
        assert!(normalize_email("a b@c.com").is_err());
        assert!(normalize_email("a@@b.com").is_err());
        assert!(normalize_email("plain").is_err());
    }

    #[tokio::test]
    async fn test_invite_creates_pending_invitation() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let org = fx.organization("Acme", &alice).await;
        let ctx = fx.active_org(&alice, &org.id).await;

        let full = invite_member(&fx.state, &ctx, "Dan@Example.com", Role::Admin)
            .await
            .unwrap();
        assert_eq!(full.invitations.len(), 1);
        assert_eq!(full.invitations[0].email, "dan@example.com");
        assert_eq!(full.invitations[0].status, InvitationStatus::Pending);
        assert!(!full.invitations[0].expired);
        assert_eq!(fx.delivery.event_types(), vec!["member.invited"]);

        let err = invite_member(&fx.state, &ctx, "dan@example.com", Role::Member)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_invite_rejects_existing_member() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let org = fx.organization("Acme", &alice).await;
        fx.add_member(&org.id, &bob, Role::Member).await;
        let ctx = fx.active_org(&alice, &org.id).await;

        let err = invite_member(&fx.state, &ctx, &bob.email, Role::Member)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_invite_matches_existing_member_email_case_insensitively() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let erin = fx.user("Erin").await;
        let org = fx.organization("Acme", &alice).await;
        fx.add_member(&org.id, &erin, Role::Member).await;
        let ctx = fx.active_org(&alice, &org.id).await;

        let err = invite_member(&fx.state, &ctx, "erin@EXAMPLE.com", Role::Member)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
        assert!(fx.delivery.event_types().is_empty());
    }

    #[tokio::test]
    async fn test_invite_requires_manager_and_rank() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let carol = fx.user("carol").await;
        let org = fx.organization("Acme", &alice).await;
        fx.add_member(&org.id, &bob, Role::Member).await;
        fx.add_member(&org.id, &carol, Role::Admin).await;

        let ctx = fx.active_org(&bob, &org.id).await;
        let err = invite_member(&fx.state, &ctx, "x@example.com", Role::Member)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let ctx = fx.active_org(&carol, &org.id).await;
        let err = invite_member(&fx.state, &ctx, "x@example.com", Role::Owner)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");
    }

    #[tokio::test]
    async fn test_member_limit_leaves_state_unchanged() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let org = fx.organization("Acme", &alice).await;
        fx.add_member(&org.id, &bob, Role::Member).await;
        fx.set_seats(&org.id, 2).await;
        let ctx = fx.active_org(&alice, &org.id).await;

        let before = load_full_organization(&fx.state, &org.id).await.unwrap();
        let err = invite_member(&fx.state, &ctx, "a@b.com", Role::Member)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "member_limit");
        assert_eq!(
            err.public_message(),
            "Member limit reached. Upgrade your plan to add more members."
        );

        let after = load_full_organization(&fx.state, &org.id).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(fx.delivery.calls(), 0);
    }

    #[tokio::test]
    async fn test_open_invitations_count_against_limit() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let org = fx.organization("Acme", &alice).await;
        fx.set_seats(&org.id, 2).await;
        let ctx = fx.active_org(&alice, &org.id).await;

        invite_member(&fx.state, &ctx, "one@example.com", Role::Member)
            .await
            .unwrap();
        let err = invite_member(&fx.state, &ctx, "two@example.com", Role::Member)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "member_limit");
    }

    #[tokio::test]
    async fn test_default_limit_without_subscription() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let org = fx.organization("Acme", &alice).await;
        assert_eq!(
            seat_limit(&fx.state, &org.id).await.unwrap(),
            fx.state.config.membership_limit
        );
    }

    #[tokio::test]
    async fn test_cancel_invitation() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let org = fx.organization("Acme", &alice).await;
        let ctx = fx.active_org(&alice, &org.id).await;

        let full = invite_member(&fx.state, &ctx, "dan@example.com", Role::Member)
            .await
            .unwrap();
        let invitation_id = full.invitations[0].id.clone();

        let full = cancel_invitation(&fx.state, &ctx, &invitation_id)
            .await
            .unwrap();
        assert_eq!(full.invitations[0].status, InvitationStatus::Canceled);

        let err = cancel_invitation(&fx.state, &ctx, &invitation_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_accept_invitation_joins_and_activates() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let dan = fx.user("dan").await;
        let org = fx.organization("Acme", &alice).await;
        let ctx = fx.active_org(&alice, &org.id).await;
        let full = invite_member(&fx.state, &ctx, &dan.email, Role::Admin)
            .await
            .unwrap();
        let invitation_id = full.invitations[0].id.clone();

        let session = fx.context_for(&dan, None).await;
        let full = accept_invitation(&fx.state, &session, &invitation_id)
            .await
            .unwrap();
        let joined = full.members.iter().find(|m| m.user_id == dan.id).unwrap();
        assert_eq!(joined.role, Role::Admin);
        assert_eq!(full.invitations[0].status, InvitationStatus::Accepted);

        let stored = fx.store.session(&session.session_id).await.unwrap();
        assert_eq!(stored.active_organization_id.as_deref(), Some(org.id.as_str()));

        let err = accept_invitation(&fx.state, &session, &invitation_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_invitation_only_answerable_by_invitee() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let mallory = fx.user("mallory").await;
        let org = fx.organization("Acme", &alice).await;
        let ctx = fx.active_org(&alice, &org.id).await;
        let full = invite_member(&fx.state, &ctx, "dan@example.com", Role::Member)
            .await
            .unwrap();
        let invitation_id = full.invitations[0].id.clone();

        let session = fx.context_for(&mallory, None).await;
        let err = accept_invitation(&fx.state, &session, &invitation_id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert!(fx.store.find_member(&org.id, &mallory.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reject_invitation() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let dan = fx.user("dan").await;
        let org = fx.organization("Acme", &alice).await;
        let ctx = fx.active_org(&alice, &org.id).await;
        let full = invite_member(&fx.state, &ctx, &dan.email, Role::Member)
            .await
            .unwrap();

        let session = fx.context_for(&dan, None).await;
        let invitation = reject_invitation(&fx.state, &session, &full.invitations[0].id)
            .await
            .unwrap();
        assert_eq!(invitation.status, InvitationStatus::Rejected);
        assert!(fx.store.find_member(&org.id, &dan.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_role_cannot_change() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let org = fx.organization("Acme", &alice).await;
        fx.add_member(&org.id, &bob, Role::Admin).await;
        let owner = fx.store.find_member(&org.id, &alice.id).await.unwrap().unwrap();

        for caller in [&alice, &bob] {
            let ctx = fx.active_org(caller, &org.id).await;
            for role in [Role::Admin, Role::Member] {
                let err = update_member_role(&fx.state, &ctx, &owner.id, role)
                    .await
                    .unwrap_err();
                assert_eq!(err.code(), "forbidden");
            }
        }
        let owner = fx.store.get_member(&owner.id).await.unwrap().unwrap();
        assert_eq!(owner.role, Role::Owner);
    }

    #[tokio::test]
    async fn test_update_member_role() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let org = fx.organization("Acme", &alice).await;
        let member = fx.add_member(&org.id, &bob, Role::Member).await;
        let ctx = fx.active_org(&alice, &org.id).await;

        let err = update_member_role(&fx.state, &ctx, &member.id, Role::Owner)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");

        let full = update_member_role(&fx.state, &ctx, &member.id, Role::Admin)
            .await
            .unwrap();
        let updated = full.members.iter().find(|m| m.id == member.id).unwrap();
        assert_eq!(updated.role, Role::Admin);
        assert_eq!(fx.delivery.event_types(), vec!["member.role_updated"]);

        let err = update_member_role(&fx.state, &ctx, "no such id!", Role::Admin)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_member_of_other_org_not_found() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let mallory = fx.user("mallory").await;
        let acme = fx.organization("Acme", &alice).await;
        let evil = fx.organization("Evil", &mallory).await;
        let evil_owner = fx
            .store
            .find_member(&evil.id, &mallory.id)
            .await
            .unwrap()
            .unwrap();
        let ctx = fx.active_org(&alice, &acme.id).await;

        let err = remove_member(&fx.state, &ctx, &evil_owner.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[tokio::test]
    async fn test_owner_cannot_be_removed() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let org = fx.organization("Acme", &alice).await;
        fx.add_member(&org.id, &bob, Role::Admin).await;
        let owner = fx.store.find_member(&org.id, &alice.id).await.unwrap().unwrap();

        for caller in [&alice, &bob] {
            let ctx = fx.active_org(caller, &org.id).await;
            let err = remove_member(&fx.state, &ctx, &owner.id).await.unwrap_err();
            assert_eq!(err.code(), "forbidden");
        }
        assert!(fx.store.get_member(&owner.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_member_permissions() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let carol = fx.user("carol").await;
        let org = fx.organization("Acme", &alice).await;
        let bob_member = fx.add_member(&org.id, &bob, Role::Member).await;
        let carol_member = fx.add_member(&org.id, &carol, Role::Member).await;

        let ctx = fx.active_org(&bob, &org.id).await;
        let err = remove_member(&fx.state, &ctx, &carol_member.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let ctx = fx.active_org(&alice, &org.id).await;
        let full = remove_member(&fx.state, &ctx, &carol_member.id)
            .await
            .unwrap()
            .unwrap();
        assert!(full.members.iter().all(|m| m.user_id != carol.id));

        let ctx = fx.active_org(&bob, &org.id).await;
        let left = remove_member(&fx.state, &ctx, &bob_member.id).await.unwrap();
        assert!(left.is_none());
        let stored = fx.store.session(&ctx.session.session_id).await.unwrap();
        assert!(stored.active_organization_id.is_none());
    }
}
