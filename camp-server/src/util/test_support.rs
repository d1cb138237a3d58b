//! Fixtures shared by the unit tests: a memory-backed [`AppState`] plus a
//! delivery fake that records every provider call.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, header};
use camp_shared::roles::Role;
use mongodb::bson::DateTime;

use crate::{
    auth::{
        guard::{ActiveOrganization, require_active_organization},
        session::{SESSION_COOKIE, SessionContext, sign_token},
    },
    config::AppConfig,
    models::{
        member::MemberDoc, organization::OrganizationDoc, session::SessionDoc,
        subscription::SubscriptionDoc, user::UserDoc,
    },
    response::{ServerError, ServerResult},
    store::{AuthStore, memory::MemoryStore},
    util::{app_state::AppState, ids::new_id, slug::derive_slug},
    webhooks::{ApplicationScope, MessageReceipt, PortalAccess, WebhookDelivery, WebhookRelay},
};

pub const SECRET: &str = "test-secret-0123456789abcdef-0123456789";

const HOUR_MS: i64 = 60 * 60 * 1000;

pub fn config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "AUTH_SECRET" => Some(SECRET.to_string()),
        "LOCALES" => Some("en,de".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Session context that was never persisted, for code that only reads it.
pub fn session_context(user_id: &str, organization_id: Option<&str>) -> SessionContext {
    SessionContext {
        session_id: new_id(),
        user: UserDoc {
            id: user_id.to_string(),
            name: None,
            email: format!("{}@example.com", user_id),
            email_verified: true,
            image: None,
            created_at: None,
            updated_at: None,
        },
        active_organization_id: organization_id.map(str::to_string),
    }
}

#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub app: ApplicationScope,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingDelivery {
    fail: bool,
    messages: Mutex<Vec<RecordedMessage>>,
    portal_calls: AtomicUsize,
}

impl RecordingDelivery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records calls, then fails them like an unreachable provider.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn messages(&self) -> Vec<RecordedMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|m| m.event_type)
            .collect()
    }

    /// Every provider call, messages and portal requests alike.
    pub fn calls(&self) -> usize {
        self.messages.lock().unwrap().len() + self.portal_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookDelivery for RecordingDelivery {
    async fn create_message(
        &self,
        app: &ApplicationScope,
        event_type: &str,
        payload: serde_json::Value,
    ) -> ServerResult<MessageReceipt> {
        self.messages.lock().unwrap().push(RecordedMessage {
            app: app.clone(),
            event_type: event_type.to_string(),
            payload,
        });
        if self.fail {
            return Err(ServerError::provider("connection refused"));
        }
        Ok(MessageReceipt { id: new_id() })
    }

    async fn portal_access(&self, app: &ApplicationScope) -> ServerResult<PortalAccess> {
        self.portal_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServerError::provider("connection refused"));
        }
        Ok(PortalAccess {
            url: format!("https://portal.example.com/app/{}", app.uid),
            token: "portal-token".to_string(),
        })
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub delivery: Arc<RecordingDelivery>,
    pub state: AppState,
}

impl Fixture {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let delivery = RecordingDelivery::new();
        let state = AppState::new(
            store.clone(),
            Arc::new(config()),
            WebhookRelay::new(Some(delivery.clone())),
        );
        Self {
            store,
            delivery,
            state,
        }
    }

    /// User named `name` with address `<name>@example.com`.
    pub async fn user(&self, name: &str) -> UserDoc {
        let now = DateTime::now();
        let user = UserDoc {
            id: new_id(),
            name: Some(name.to_string()),
            email: format!("{}@example.com", name),
            email_verified: true,
            image: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        self.store.seed_user(user.clone()).await;
        user
    }

    /// Organization owned by `owner`, written straight to the store so no
    /// webhook events are emitted.
    pub async fn organization(&self, name: &str, owner: &UserDoc) -> OrganizationDoc {
        let organization = OrganizationDoc {
            id: new_id(),
            name: name.to_string(),
            slug: derive_slug(name),
            logo: None,
            metadata: None,
            created_at: DateTime::now(),
        };
        self.store
            .insert_organization(organization.clone())
            .await
            .unwrap();
        self.add_member(&organization.id, owner, Role::Owner).await;
        organization
    }

    pub async fn add_member(&self, organization_id: &str, user: &UserDoc, role: Role) -> MemberDoc {
        let member = MemberDoc {
            id: new_id(),
            organization_id: organization_id.to_string(),
            user_id: user.id.clone(),
            role,
            created_at: DateTime::now(),
        };
        self.store.insert_member(member.clone()).await.unwrap();
        member
    }

    pub async fn set_seats(&self, organization_id: &str, seats: u64) {
        self.store
            .seed_subscription(SubscriptionDoc {
                id: new_id(),
                plan: "team".to_string(),
                reference_id: organization_id.to_string(),
                status: "active".to_string(),
                seats: Some(seats),
                stripe_customer_id: None,
                stripe_subscription_id: None,
                period_start: None,
                period_end: None,
            })
            .await;
    }

    async fn seed_session(
        &self,
        user: &UserDoc,
        organization_id: Option<&str>,
        expires_at: DateTime,
    ) -> SessionDoc {
        let session = SessionDoc {
            id: new_id(),
            token: new_id(),
            user_id: user.id.clone(),
            active_organization_id: organization_id.map(str::to_string),
            expires_at,
            ip_address: None,
            user_agent: None,
            created_at: Some(DateTime::now()),
            updated_at: None,
        };
        self.store.seed_session(session.clone()).await;
        session
    }

    fn cookie_headers(session: &SessionDoc) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let cookie = format!("{}={}", SESSION_COOKIE, sign_token(SECRET, &session.token));
        headers.insert(header::COOKIE, HeaderValue::from_str(&cookie).unwrap());
        headers
    }

    /// Request headers carrying a fresh signed session cookie for `user`.
    pub async fn session_for(&self, user: &UserDoc, organization_id: Option<&str>) -> HeaderMap {
        let expires_at = DateTime::from_millis(DateTime::now().timestamp_millis() + HOUR_MS);
        let session = self.seed_session(user, organization_id, expires_at).await;
        Self::cookie_headers(&session)
    }

    pub async fn expired_session_for(&self, user: &UserDoc) -> HeaderMap {
        let expires_at = DateTime::from_millis(DateTime::now().timestamp_millis() - HOUR_MS);
        let session = self.seed_session(user, None, expires_at).await;
        Self::cookie_headers(&session)
    }

    pub async fn context_for(
        &self,
        user: &UserDoc,
        organization_id: Option<&str>,
    ) -> SessionContext {
        let headers = self.session_for(user, organization_id).await;
        self.state.sessions.resolve(&headers).await.unwrap().unwrap()
    }

    pub async fn active_org(&self, user: &UserDoc, organization_id: &str) -> ActiveOrganization {
        let session = self.context_for(user, Some(organization_id)).await;
        require_active_organization(&self.state, session)
            .await
            .unwrap()
    }
}
