use async_trait::async_trait;
use camp_shared::{org::InvitationStatus, roles::Role};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, IndexModel,
    bson::{DateTime, Document, doc},
    options::{ClientOptions, Collation, CollationStrength, FindOptions, IndexOptions},
};
use serde::de::DeserializeOwned;

use crate::{
    models::{
        invitation::InvitationDoc, member::MemberDoc, organization::OrganizationDoc,
        session::SessionDoc, subscription::SubscriptionDoc, user::UserDoc,
    },
    response::{ServerError, ServerResult},
    store::AuthStore,
};

const DUPLICATE_KEY: i32 = 11000;

/// Case-insensitive comparison for user emails. Lookups and the email index
/// share it so the index serves the query.
fn email_collation() -> Collation {
    Collation::builder()
        .locale("en")
        .strength(CollationStrength::Secondary)
        .build()
}

/// Collection names follow the auth provider's model names so both sides
/// share one database.
#[derive(Clone)]
pub struct Mongo {
    pub client: Client,
    pub db_name: String,
}

impl Mongo {
    pub async fn connect(url: &str, db_name: &str) -> ServerResult<Self> {
        let mut opts = ClientOptions::parse(url).await?;
        opts.app_name = Some("camp-server".into());
        let client = Client::with_options(opts)?;
        Ok(Self {
            client,
            db_name: db_name.into(),
        })
    }

    fn col<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.client.database(&self.db_name).collection(name)
    }

    pub fn users(&self) -> Collection<UserDoc> {
        self.col("user")
    }

    pub fn sessions(&self) -> Collection<SessionDoc> {
        self.col("session")
    }

    pub fn organizations(&self) -> Collection<OrganizationDoc> {
        self.col("organization")
    }

    pub fn members(&self) -> Collection<MemberDoc> {
        self.col("member")
    }

    pub fn invitations(&self) -> Collection<InvitationDoc> {
        self.col("invitation")
    }

    pub fn subscriptions(&self) -> Collection<SubscriptionDoc> {
        self.col("subscription")
    }

    pub async fn ensure_indexes(&self) -> ServerResult<()> {
        self.organizations()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "slug": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        self.members()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "organization_id": 1, "user_id": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        self.members()
            .create_index(IndexModel::builder().keys(doc! { "user_id": 1 }).build())
            .await?;

        self.invitations()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "organization_id": 1, "email": 1 })
                    .build(),
            )
            .await?;

        self.sessions()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "token": 1 })
                    .options(IndexOptions::builder().unique(true).build())
                    .build(),
            )
            .await?;

        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(IndexOptions::builder().collation(email_collation()).build())
                    .build(),
            )
            .await?;

        self.subscriptions()
            .create_index(IndexModel::builder().keys(doc! { "reference_id": 1 }).build())
            .await?;

        Ok(())
    }
}

async fn find_all<T>(coll: &Collection<T>, filter: Document) -> ServerResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let options = FindOptions::builder()
        .sort(doc! { "created_at": 1, "_id": 1 })
        .build();
    let cursor = coll.find(filter).with_options(options).await?;
    let items: Vec<T> = cursor
        .try_collect()
        .await
        .map_err(|e| ServerError::internal_error(&format!("Cursor decode failed: {}", e)))?;
    Ok(items)
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

#[async_trait]
impl AuthStore for Mongo {
    async fn find_session_by_token(&self, token: &str) -> ServerResult<Option<SessionDoc>> {
        Ok(self.sessions().find_one(doc! { "token": token }).await?)
    }

    async fn set_active_organization(
        &self,
        session_id: &str,
        organization_id: Option<&str>,
    ) -> ServerResult<()> {
        let res = self
            .sessions()
            .update_one(
                doc! { "_id": session_id },
                doc! { "$set": {
                    "active_organization_id": organization_id,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;
        if res.matched_count == 0 {
            return Err(ServerError::not_found("Session not found"));
        }
        Ok(())
    }

    async fn clear_active_organization(
        &self,
        organization_id: &str,
        user_id: Option<&str>,
    ) -> ServerResult<()> {
        let mut filter = doc! { "active_organization_id": organization_id };
        if let Some(user_id) = user_id {
            filter.insert("user_id", user_id);
        }
        self.sessions()
            .update_many(
                filter,
                doc! { "$set": { "active_organization_id": null, "updated_at": DateTime::now() } },
            )
            .await?;
        Ok(())
    }

    async fn get_user(&self, user_id: &str) -> ServerResult<Option<UserDoc>> {
        Ok(self.users().find_one(doc! { "_id": user_id }).await?)
    }

    async fn get_user_by_email(&self, email: &str) -> ServerResult<Option<UserDoc>> {
        Ok(self
            .users()
            .find_one(doc! { "email": email.trim() })
            .collation(email_collation())
            .await?)
    }

    async fn list_users(&self, user_ids: &[String]) -> ServerResult<Vec<UserDoc>> {
        find_all(&self.users(), doc! { "_id": { "$in": user_ids.to_vec() } }).await
    }

    async fn list_member_users(
        &self,
        organization_id: &str,
        user_ids: &[String],
    ) -> ServerResult<Vec<UserDoc>> {
        let members = find_all(
            &self.members(),
            doc! { "organization_id": organization_id, "user_id": { "$in": user_ids.to_vec() } },
        )
        .await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let member_ids: Vec<String> = members.into_iter().map(|m| m.user_id).collect();
        self.list_users(&member_ids).await
    }

    async fn insert_organization(&self, organization: OrganizationDoc) -> ServerResult<()> {
        match self.organizations().insert_one(&organization).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(ServerError::validation("Organization slug is already taken"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_organization(
        &self,
        organization_id: &str,
    ) -> ServerResult<Option<OrganizationDoc>> {
        Ok(self
            .organizations()
            .find_one(doc! { "_id": organization_id })
            .await?)
    }

    async fn get_organization_by_slug(&self, slug: &str) -> ServerResult<Option<OrganizationDoc>> {
        Ok(self.organizations().find_one(doc! { "slug": slug }).await?)
    }

    async fn list_organizations(&self, ids: &[String]) -> ServerResult<Vec<OrganizationDoc>> {
        find_all(&self.organizations(), doc! { "_id": { "$in": ids.to_vec() } }).await
    }

    async fn update_organization(
        &self,
        organization_id: &str,
        name: Option<&str>,
        slug: Option<&str>,
    ) -> ServerResult<()> {
        let mut set = Document::new();
        if let Some(name) = name {
            set.insert("name", name);
        }
        if let Some(slug) = slug {
            set.insert("slug", slug);
        }
        if set.is_empty() {
            return Ok(());
        }

        match self
            .organizations()
            .update_one(doc! { "_id": organization_id }, doc! { "$set": set })
            .await
        {
            Ok(res) if res.matched_count == 0 => {
                Err(ServerError::not_found("Organization not found"))
            }
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(ServerError::validation("Organization slug is already taken"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_organization(&self, organization_id: &str) -> ServerResult<()> {
        self.invitations()
            .delete_many(doc! { "organization_id": organization_id })
            .await?;
        self.members()
            .delete_many(doc! { "organization_id": organization_id })
            .await?;
        self.organizations()
            .delete_one(doc! { "_id": organization_id })
            .await?;
        Ok(())
    }

    async fn get_member(&self, member_id: &str) -> ServerResult<Option<MemberDoc>> {
        Ok(self.members().find_one(doc! { "_id": member_id }).await?)
    }

    async fn find_member(
        &self,
        organization_id: &str,
        user_id: &str,
    ) -> ServerResult<Option<MemberDoc>> {
        Ok(self
            .members()
            .find_one(doc! { "organization_id": organization_id, "user_id": user_id })
            .await?)
    }

    async fn list_members(&self, organization_id: &str) -> ServerResult<Vec<MemberDoc>> {
        find_all(&self.members(), doc! { "organization_id": organization_id }).await
    }

    async fn list_memberships_for_user(&self, user_id: &str) -> ServerResult<Vec<MemberDoc>> {
        find_all(&self.members(), doc! { "user_id": user_id }).await
    }

    async fn count_members(&self, organization_id: &str) -> ServerResult<u64> {
        Ok(self
            .members()
            .count_documents(doc! { "organization_id": organization_id })
            .await?)
    }

    async fn insert_member(&self, member: MemberDoc) -> ServerResult<()> {
        match self.members().insert_one(&member).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(ServerError::validation(
                "User is already a member of this organization",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_member_role(&self, member_id: &str, role: Role) -> ServerResult<()> {
        let res = self
            .members()
            .update_one(
                doc! { "_id": member_id },
                doc! { "$set": { "role": role.as_str() } },
            )
            .await?;
        if res.matched_count == 0 {
            return Err(ServerError::not_found("Member not found"));
        }
        Ok(())
    }

    async fn delete_member(&self, member_id: &str) -> ServerResult<()> {
        self.members().delete_one(doc! { "_id": member_id }).await?;
        Ok(())
    }

    async fn get_invitation(&self, invitation_id: &str) -> ServerResult<Option<InvitationDoc>> {
        Ok(self
            .invitations()
            .find_one(doc! { "_id": invitation_id })
            .await?)
    }

    async fn list_invitations(&self, organization_id: &str) -> ServerResult<Vec<InvitationDoc>> {
        find_all(
            &self.invitations(),
            doc! { "organization_id": organization_id },
        )
        .await
    }

    async fn insert_invitation(&self, invitation: InvitationDoc) -> ServerResult<()> {
        self.invitations().insert_one(&invitation).await?;
        Ok(())
    }

    async fn set_invitation_status(
        &self,
        invitation_id: &str,
        status: InvitationStatus,
    ) -> ServerResult<()> {
        let res = self
            .invitations()
            .update_one(
                doc! { "_id": invitation_id },
                doc! { "$set": { "status": status.as_str() } },
            )
            .await?;
        if res.matched_count == 0 {
            return Err(ServerError::not_found("Invitation not found"));
        }
        Ok(())
    }

    async fn find_active_subscription(
        &self,
        reference_id: &str,
    ) -> ServerResult<Option<SubscriptionDoc>> {
        Ok(self
            .subscriptions()
            .find_one(doc! {
                "reference_id": reference_id,
                "status": { "$in": ["active", "trialing"] },
            })
            .await?)
    }
}
