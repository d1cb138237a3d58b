use std::collections::HashMap;

use camp_shared::{
    org::{
        CreateOrganizationBody, DeletedOrganization, FullOrganization, OrganizationSummary,
        SessionOverview, UpdateOrganizationBody,
    },
    roles::Role,
    webhook::{OrganizationEvent, WebhookEvent},
};
use mongodb::bson::DateTime;
use tracing::{info, warn};

use crate::{
    auth::{guard::ActiveOrganization, session::SessionContext},
    models::{member::MemberDoc, organization::OrganizationDoc},
    response::{ServerError, ServerResult},
    util::{app_state::AppState, ids::new_id, slug::derive_slug},
};

pub const MAX_NAME_LEN: usize = 100;
pub const DELETE_REDIRECT: &str = "/";

/// Organization with all its members and invitations, read fresh from the
/// store. Members whose user record is gone are skipped.
pub async fn load_full_organization(
    state: &AppState,
    organization_id: &str,
) -> ServerResult<FullOrganization> {
    let organization = state
        .store
        .get_organization(organization_id)
        .await?
        .ok_or_else(|| ServerError::not_found("Organization not found"))?;

    let members = state.store.list_members(organization_id).await?;
    let user_ids: Vec<String> = members.iter().map(|m| m.user_id.clone()).collect();
    let users: HashMap<String, _> = state
        .store
        .list_users(&user_ids)
        .await?
        .into_iter()
        .map(|u| (u.id.clone(), u))
        .collect();

    let members = members
        .iter()
        .filter_map(|m| match users.get(&m.user_id) {
            Some(user) => Some(m.to_member(user)),
            None => {
                warn!(member_id = %m.id, "member without user record");
                None
            }
        })
        .collect();

    let now = DateTime::now();
    let invitations = state
        .store
        .list_invitations(organization_id)
        .await?
        .iter()
        .map(|i| i.to_invitation(now))
        .collect();

    Ok(FullOrganization {
        organization: organization.to_organization(),
        members,
        invitations,
    })
}

pub async fn list_organizations(
    state: &AppState,
    session: &SessionContext,
) -> ServerResult<Vec<OrganizationSummary>> {
    let memberships = state
        .store
        .list_memberships_for_user(session.user_id())
        .await?;
    let roles: HashMap<String, Role> = memberships
        .iter()
        .map(|m| (m.organization_id.clone(), m.role))
        .collect();
    let ids: Vec<String> = memberships
        .into_iter()
        .map(|m| m.organization_id)
        .collect();

    let active = session.active_organization_id.as_deref();
    Ok(state
        .store
        .list_organizations(&ids)
        .await?
        .into_iter()
        .filter_map(|org| {
            let role = *roles.get(&org.id)?;
            Some(OrganizationSummary {
                active: active == Some(org.id.as_str()),
                id: org.id,
                name: org.name,
                slug: org.slug,
                logo: org.logo,
                role,
            })
        })
        .collect())
}

pub async fn session_overview(
    state: &AppState,
    session: &SessionContext,
) -> ServerResult<SessionOverview> {
    let organizations = list_organizations(state, session).await?;
    let active_organization = organizations.iter().find(|o| o.active).cloned();
    Ok(SessionOverview {
        user_id: session.user.id.clone(),
        name: session.user.display_name(),
        email: session.user.email.clone(),
        locale: state.config.default_locale.clone(),
        active_organization,
        organizations,
    })
}

fn validate_name(name: &str) -> ServerResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServerError::validation("Organization name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ServerError::validation(&format!(
            "Organization name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn normalize_slug(slug: Option<&str>, name: &str) -> ServerResult<String> {
    let source = match slug.map(str::trim) {
        Some(slug) if !slug.is_empty() => slug,
        _ => name,
    };
    let slug = derive_slug(source);
    if slug.is_empty() {
        return Err(ServerError::validation(
            "Organization slug must contain letters or digits",
        ));
    }
    Ok(slug)
}

/// Creates the organization with the caller as owner and makes it the
/// session's active organization.
pub async fn create_organization(
    state: &AppState,
    session: &SessionContext,
    body: CreateOrganizationBody,
) -> ServerResult<FullOrganization> {
    let name = validate_name(&body.name)?;
    let slug = normalize_slug(body.slug.as_deref(), &name)?;

    let now = DateTime::now();
    let organization = OrganizationDoc {
        id: new_id(),
        name,
        slug,
        logo: body.logo.filter(|l| !l.trim().is_empty()),
        metadata: None,
        created_at: now,
    };
    state
        .store
        .insert_organization(organization.clone())
        .await?;

    let owner = MemberDoc {
        id: new_id(),
        organization_id: organization.id.clone(),
        user_id: session.user_id().to_string(),
        role: Role::Owner,
        created_at: now,
    };
    if let Err(e) = state.store.insert_member(owner).await {
        // Leave no ownerless organization behind.
        state.store.delete_organization(&organization.id).await?;
        return Err(e);
    }

    state
        .store
        .set_active_organization(&session.session_id, Some(&organization.id))
        .await?;

    info!(
        organization_id = %organization.id,
        slug = %organization.slug,
        user_id = session.user_id(),
        "organization created"
    );
    state
        .webhooks
        .send_to_organization(
            &organization.id,
            WebhookEvent::OrganizationCreated(organization_event(&organization)),
        )
        .await;

    load_full_organization(state, &organization.id).await
}

/// Switches the session's active organization. `None` clears it.
pub async fn set_active_organization(
    state: &AppState,
    session: &SessionContext,
    organization_id: Option<String>,
) -> ServerResult<Option<OrganizationSummary>> {
    let Some(organization_id) = organization_id else {
        state
            .store
            .set_active_organization(&session.session_id, None)
            .await?;
        return Ok(None);
    };

    let member = state
        .store
        .find_member(&organization_id, session.user_id())
        .await?
        .ok_or_else(|| ServerError::forbidden("Not a member of this organization"))?;
    let organization = state
        .store
        .get_organization(&organization_id)
        .await?
        .ok_or_else(|| ServerError::not_found("Organization not found"))?;

    state
        .store
        .set_active_organization(&session.session_id, Some(&organization.id))
        .await?;

    Ok(Some(OrganizationSummary {
        id: organization.id,
        name: organization.name,
        slug: organization.slug,
        logo: organization.logo,
        role: member.role,
        active: true,
    }))
}

pub async fn update_organization(
    state: &AppState,
    ctx: &ActiveOrganization,
    body: UpdateOrganizationBody,
) -> ServerResult<FullOrganization> {
    if !ctx.member.role.can_manage_members() {
        return Err(ServerError::forbidden(
            "Only owners and admins can update the organization",
        ));
    }

    let name = body.name.as_deref().map(validate_name).transpose()?;
    let slug = match body.slug.as_deref() {
        Some(slug) => Some(normalize_slug(Some(slug), "")?),
        None => None,
    };

    state
        .store
        .update_organization(&ctx.organization_id, name.as_deref(), slug.as_deref())
        .await?;

    let full = load_full_organization(state, &ctx.organization_id).await?;
    info!(organization_id = %ctx.organization_id, "organization updated");
    state
        .webhooks
        .send_to_organization(
            &ctx.organization_id,
            WebhookEvent::OrganizationUpdated(OrganizationEvent {
                organization_id: full.organization.id.clone(),
                name: full.organization.name.clone(),
                slug: full.organization.slug.clone(),
            }),
        )
        .await;
    Ok(full)
}

/// Deletes the active organization. Owner only, and only with an explicit
/// confirmation.
pub async fn delete_organization(
    state: &AppState,
    ctx: &ActiveOrganization,
    confirm: bool,
) -> ServerResult<DeletedOrganization> {
    if ctx.member.role != Role::Owner {
        return Err(ServerError::forbidden(
            "Only the owner can delete the organization",
        ));
    }
    if !confirm {
        return Err(ServerError::validation(
            "Deleting an organization must be confirmed",
        ));
    }

    let organization = state
        .store
        .get_organization(&ctx.organization_id)
        .await?
        .ok_or_else(|| ServerError::not_found("Organization not found"))?;

    state
        .store
        .delete_organization(&organization.id)
        .await?;
    state
        .store
        .clear_active_organization(&organization.id, None)
        .await?;

    info!(
        organization_id = %organization.id,
        user_id = ctx.session.user_id(),
        "organization deleted"
    );
    state
        .webhooks
        .send_to_organization(
            &organization.id,
            WebhookEvent::OrganizationDeleted(organization_event(&organization)),
        )
        .await;

    Ok(DeletedOrganization {
        id: organization.id,
        redirect_to: DELETE_REDIRECT.to_string(),
    })
}

fn organization_event(organization: &OrganizationDoc) -> OrganizationEvent {
    OrganizationEvent {
        organization_id: organization.id.clone(),
        name: organization.name.clone(),
        slug: organization.slug.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::AuthStore, util::test_support::Fixture};

    fn create_body(name: &str, slug: Option<&str>) -> CreateOrganizationBody {
        CreateOrganizationBody {
            name: name.into(),
            slug: slug.map(str::to_string),
            logo: None,
        }
    }

    #[tokio::test]
    async fn test_create_makes_owner_and_activates() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let session = fx.context_for(&alice, None).await;

        let full = create_organization(&fx.state, &session, create_body("My Team!", None))
            .await
            .unwrap();
        assert_eq!(full.organization.slug, "my-team");
        assert_eq!(full.members.len(), 1);
        assert_eq!(full.members[0].role, Role::Owner);
        assert_eq!(full.members[0].user_id, alice.id);

        let stored = fx.store.session(&session.session_id).await.unwrap();
        assert_eq!(
            stored.active_organization_id.as_deref(),
            Some(full.organization.id.as_str())
        );
        assert_eq!(fx.delivery.event_types(), vec!["organization.created"]);
    }

    #[tokio::test]
    async fn test_create_validates_name_and_slug() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let session = fx.context_for(&alice, None).await;

        let err = create_organization(&fx.state, &session, create_body("   ", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");

        let err = create_organization(&fx.state, &session, create_body("!!!", None))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");

        let full = create_organization(&fx.state, &session, create_body("Acme", Some("Acme HQ")))
            .await
            .unwrap();
        assert_eq!(full.organization.slug, "acme-hq");

        let err = create_organization(&fx.state, &session, create_body("Other", Some("acme-hq")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
    }

    #[tokio::test]
    async fn test_list_marks_active() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let acme = fx.organization("Acme", &alice).await;
        let _globex = fx.organization("Globex", &alice).await;
        let session = fx.context_for(&alice, Some(&acme.id)).await;

        let orgs = list_organizations(&fx.state, &session).await.unwrap();
        assert_eq!(orgs.len(), 2);
        assert_eq!(orgs.iter().filter(|o| o.active).count(), 1);
        assert!(orgs.iter().any(|o| o.active && o.id == acme.id));

        let overview = session_overview(&fx.state, &session).await.unwrap();
        assert_eq!(overview.active_organization.unwrap().id, acme.id);
    }

    #[tokio::test]
    async fn test_set_active_requires_membership() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let acme = fx.organization("Acme", &alice).await;
        let session = fx.context_for(&bob, None).await;

        let err = set_active_organization(&fx.state, &session, Some(acme.id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let session = fx.context_for(&alice, None).await;
        let summary = set_active_organization(&fx.state, &session, Some(acme.id.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.role, Role::Owner);

        assert!(set_active_organization(&fx.state, &session, None)
            .await
            .unwrap()
            .is_none());
        let stored = fx.store.session(&session.session_id).await.unwrap();
        assert!(stored.active_organization_id.is_none());
    }

    #[tokio::test]
    async fn test_update_requires_admin() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let acme = fx.organization("Acme", &alice).await;
        fx.add_member(&acme.id, &bob, Role::Member).await;

        let ctx = fx.active_org(&bob, &acme.id).await;
        let err = update_organization(
            &fx.state,
            &ctx,
            UpdateOrganizationBody {
                name: Some("Bob Corp".into()),
                slug: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let ctx = fx.active_org(&alice, &acme.id).await;
        let full = update_organization(
            &fx.state,
            &ctx,
            UpdateOrganizationBody {
                name: Some("Acme Inc".into()),
                slug: Some("Acme Inc".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(full.organization.name, "Acme Inc");
        assert_eq!(full.organization.slug, "acme-inc");
    }

    #[tokio::test]
    async fn test_delete_requires_confirmation_and_owner() {
        let fx = Fixture::new().await;
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let acme = fx.organization("Acme", &alice).await;
        fx.add_member(&acme.id, &bob, Role::Admin).await;
        let bob_ctx = fx.active_org(&bob, &acme.id).await;

        let err = delete_organization(&fx.state, &bob_ctx, true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "forbidden");

        let ctx = fx.active_org(&alice, &acme.id).await;
        let err = delete_organization(&fx.state, &ctx, false)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation");
        assert!(fx.store.get_organization(&acme.id).await.unwrap().is_some());

        let deleted = delete_organization(&fx.state, &ctx, true).await.unwrap();
        assert_eq!(deleted.redirect_to, "/");
        assert!(fx.store.get_organization(&acme.id).await.unwrap().is_none());
        assert!(fx.store.list_members(&acme.id).await.unwrap().is_empty());

        let stored = fx.store.session(&bob_ctx.session.session_id).await.unwrap();
        assert!(stored.active_organization_id.is_none());
    }
}
