use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::{
    response::ServerResult,
    webhooks::{ApplicationScope, MessageReceipt, PortalAccess, WebhookDelivery},
};

const DEFAULT_SERVER_URL: &str = "https://api.svix.com";
const REGIONS: [&str; 5] = ["us", "eu", "in", "ca", "au"];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageIn<'a> {
    event_type: &'a str,
    payload: Value,
    application: &'a ApplicationScope,
}

#[derive(Serialize)]
struct AppPortalAccessIn<'a> {
    application: &'a ApplicationScope,
}

/// Svix REST adapter.
pub struct SvixClient {
    http: Client,
    base_url: String,
    token: String,
}

impl SvixClient {
    pub fn new(token: &str, server_url: Option<&str>) -> ServerResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("camp-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: server_url_for(token, server_url),
            token: token.to_string(),
        })
    }
}

/// Explicit server url, else the regional endpoint named by the token's
/// suffix (`<key>.eu`), else the default endpoint.
pub fn server_url_for(token: &str, server_url: Option<&str>) -> String {
    if let Some(url) = server_url {
        return url.trim_end_matches('/').to_string();
    }
    match token.rsplit_once('.') {
        Some((_, region)) if REGIONS.contains(&region) => {
            format!("https://api.{}.svix.com", region)
        }
        _ => DEFAULT_SERVER_URL.to_string(),
    }
}

#[async_trait]
impl WebhookDelivery for SvixClient {
    async fn create_message(
        &self,
        app: &ApplicationScope,
        event_type: &str,
        payload: Value,
    ) -> ServerResult<MessageReceipt> {
        let url = format!("{}/api/v1/app/{}/msg/", self.base_url, app.uid);
        let receipt = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&MessageIn {
                event_type,
                payload,
                application: app,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(receipt)
    }

    async fn portal_access(&self, app: &ApplicationScope) -> ServerResult<PortalAccess> {
        let url = format!(
            "{}/api/v1/auth/app-portal-access/{}/",
            self.base_url, app.uid
        );
        let access = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&AppPortalAccessIn { application: app })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(access)
    }
}
