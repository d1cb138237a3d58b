//! Relays organization events to the webhook delivery provider.
//!
//! Every organization is one provider application, keyed by the organization
//! id. The relay resolves the caller's active organization from its session
//! and never addresses an organization the caller did not select.

pub mod svix;

use std::sync::Arc;

use async_trait::async_trait;
use camp_shared::webhook::WebhookEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    auth::session::SessionContext,
    config::WebhookConfig,
    response::{ServerError, ServerResult},
};

/// Provider application an event is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationScope {
    pub uid: String,
    pub name: String,
}

impl ApplicationScope {
    pub fn for_organization(organization_id: &str) -> Self {
        Self {
            uid: organization_id.to_string(),
            name: organization_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReceipt {
    pub id: String,
}

/// Short-lived link into the provider's management portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalAccess {
    pub url: String,
    pub token: String,
}

#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    async fn create_message(
        &self,
        app: &ApplicationScope,
        event_type: &str,
        payload: serde_json::Value,
    ) -> ServerResult<MessageReceipt>;

    async fn portal_access(&self, app: &ApplicationScope) -> ServerResult<PortalAccess>;
}

pub struct WebhookRelay {
    delivery: Option<Arc<dyn WebhookDelivery>>,
}

impl WebhookRelay {
    pub fn new(delivery: Option<Arc<dyn WebhookDelivery>>) -> Self {
        Self { delivery }
    }

    /// Uses the Svix adapter when a token is configured.
    pub fn from_config(config: &WebhookConfig) -> ServerResult<Self> {
        let delivery = match &config.svix_token {
            Some(token) => {
                let client = svix::SvixClient::new(token, config.server_url.as_deref())?;
                Some(Arc::new(client) as Arc<dyn WebhookDelivery>)
            }
            None => {
                warn!("SVIX_TOKEN not set, webhook relay is disabled");
                None
            }
        };
        Ok(Self { delivery })
    }

    fn delivery(&self) -> ServerResult<&Arc<dyn WebhookDelivery>> {
        self.delivery
            .as_ref()
            .ok_or_else(|| ServerError::provider("webhook token is not configured"))
    }

    /// Delivers `event` to the caller's active organization. Returns
    /// `Ok(None)` without contacting the provider when there is no session
    /// or no active organization.
    pub async fn send(
        &self,
        session: Option<&SessionContext>,
        event: &WebhookEvent,
    ) -> ServerResult<Option<MessageReceipt>> {
        let delivery = self.delivery()?;
        let Some(organization_id) = active_organization(session) else {
            debug!(event_type = event.event_type(), "no active organization, event dropped");
            return Ok(None);
        };

        let app = ApplicationScope::for_organization(organization_id);
        let receipt = delivery
            .create_message(&app, event.event_type(), event.payload()?)
            .await?;
        info!(
            organization_id,
            event_type = event.event_type(),
            message_id = %receipt.id,
            "webhook event relayed"
        );
        Ok(Some(receipt))
    }

    /// Portal link for the caller's active organization, resolved like
    /// [`WebhookRelay::send`].
    pub async fn portal(
        &self,
        session: Option<&SessionContext>,
    ) -> ServerResult<Option<PortalAccess>> {
        let delivery = self.delivery()?;
        let Some(organization_id) = active_organization(session) else {
            return Ok(None);
        };
        let access = delivery
            .portal_access(&ApplicationScope::for_organization(organization_id))
            .await?;
        Ok(Some(access))
    }

    /// Emits an event raised by this service itself. Failures are logged and
    /// swallowed so the mutation that raised the event still succeeds.
    pub async fn send_to_organization(&self, organization_id: &str, event: WebhookEvent) {
        let Some(delivery) = &self.delivery else {
            return;
        };
        let payload = match event.payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode webhook event: {}", e);
                return;
            }
        };
        let app = ApplicationScope::for_organization(organization_id);
        if let Err(e) = delivery
            .create_message(&app, event.event_type(), payload)
            .await
        {
            warn!(
                organization_id,
                event_type = event.event_type(),
                "Failed to relay webhook event: {}",
                e
            );
        }
    }
}

fn active_organization(session: Option<&SessionContext>) -> Option<&str> {
    session.and_then(|s| s.active_organization_id.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::test_support::{RecordingDelivery, session_context};
    use camp_shared::webhook::{OrganizationEvent, PingEvent};

    fn ping() -> WebhookEvent {
        WebhookEvent::Ping(PingEvent {
            message: Some("hello".into()),
        })
    }

    #[tokio::test]
    async fn test_missing_provider_is_an_error() {
        let relay = WebhookRelay::new(None);
        let session = session_context("u1", Some("org1"));
        let err = relay.send(Some(&session), &ping()).await.unwrap_err();
        assert_eq!(err.code(), "provider");
        assert!(err.to_string().contains("webhook token is not configured"));
    }

    #[tokio::test]
    async fn test_no_session_makes_no_calls() {
        let delivery = RecordingDelivery::new();
        let relay = WebhookRelay::new(Some(delivery.clone()));

        assert_eq!(relay.send(None, &ping()).await.unwrap(), None);
        assert_eq!(relay.portal(None).await.unwrap(), None);
        assert_eq!(delivery.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_active_organization_makes_no_calls() {
        let delivery = RecordingDelivery::new();
        let relay = WebhookRelay::new(Some(delivery.clone()));
        let session = session_context("u1", None);

        assert_eq!(relay.send(Some(&session), &ping()).await.unwrap(), None);
        assert_eq!(relay.portal(Some(&session)).await.unwrap(), None);
        assert_eq!(delivery.calls(), 0);
    }

    #[tokio::test]
    async fn test_event_scoped_to_active_organization() {
        let delivery = RecordingDelivery::new();
        let relay = WebhookRelay::new(Some(delivery.clone()));
        let session = session_context("u1", Some("org1"));

        let receipt = relay.send(Some(&session), &ping()).await.unwrap();
        assert!(receipt.is_some());

        let messages = delivery.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].app, ApplicationScope::for_organization("org1"));
        assert_eq!(messages[0].event_type, "test.ping");
        assert_eq!(messages[0].payload["eventType"], "test.ping");
        assert_eq!(messages[0].payload["message"], "hello");
    }

    #[tokio::test]
    async fn test_portal_scoped_to_active_organization() {
        let delivery = RecordingDelivery::new();
        let relay = WebhookRelay::new(Some(delivery.clone()));
        let session = session_context("u1", Some("org1"));

        let access = relay.portal(Some(&session)).await.unwrap().unwrap();
        assert!(access.url.contains("org1"));
        assert_eq!(delivery.calls(), 1);
    }

    #[tokio::test]
    async fn test_internal_event_failure_is_swallowed() {
        let delivery = RecordingDelivery::failing();
        let relay = WebhookRelay::new(Some(delivery.clone()));
        relay
            .send_to_organization(
                "org1",
                WebhookEvent::OrganizationUpdated(OrganizationEvent {
                    organization_id: "org1".into(),
                    name: "Acme".into(),
                    slug: "acme".into(),
                }),
            )
            .await;
        assert_eq!(delivery.calls(), 1);
    }
}
