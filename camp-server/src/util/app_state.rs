use std::sync::Arc;

use crate::{
    auth::session::SessionResolver, config::AppConfig, store::AuthStore,
    webhooks::WebhookRelay,
};

/// Everything a handler needs, built once at startup and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AuthStore>,
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionResolver>,
    pub webhooks: Arc<WebhookRelay>,
}

impl AppState {
    pub fn new(store: Arc<dyn AuthStore>, config: Arc<AppConfig>, webhooks: WebhookRelay) -> Self {
        let sessions = Arc::new(SessionResolver::new(
            store.clone(),
            config.auth_secret.clone(),
        ));
        Self {
            store,
            config,
            sessions,
            webhooks: Arc::new(webhooks),
        }
    }
}
