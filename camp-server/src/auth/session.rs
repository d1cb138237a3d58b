use std::sync::Arc;

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use hmac::{Hmac, Mac};
use mongodb::bson::DateTime;
use sha2::Sha256;
use tracing::debug;

use crate::{models::user::UserDoc, response::ServerResult, store::AuthStore};

pub const SESSION_COOKIE: &str = "camp.session_token";
pub const SECURE_SESSION_COOKIE: &str = "__Secure-camp.session_token";

type HmacSha256 = Hmac<Sha256>;

/// The caller's session as seen by this service.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub user: UserDoc,
    pub active_organization_id: Option<String>,
}

impl SessionContext {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

/// Signs a raw session token as `<token>.<signature>`.
pub fn sign_token(secret: &str, token: &str) -> String {
    format!("{}.{}", token, URL_SAFE_NO_PAD.encode(signature(secret, token)))
}

fn signature(secret: &str, token: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, new_from_slice cannot fail here.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(token.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Returns the raw token when the signature matches.
pub fn verify_signed_token<'a>(secret: &str, value: &'a str) -> Option<&'a str> {
    let (token, sig) = value.rsplit_once('.')?;
    if token.is_empty() {
        return None;
    }
    let sig = URL_SAFE_NO_PAD.decode(sig).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(token.as_bytes());
    mac.verify_slice(&sig).ok()?;
    Some(token)
}

/// Reads the signed session token from the secure cookie, the plain cookie
/// or a bearer header, in that order.
pub fn signed_token_from_headers(headers: &HeaderMap) -> Option<String> {
    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar
        .get(SECURE_SESSION_COOKIE)
        .or_else(|| jar.get(SESSION_COOKIE))
    {
        return Some(cookie.value().to_string());
    }
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|Authorization(bearer)| bearer.token().to_string())
}

/// Looks up the session behind a request's headers.
pub struct SessionResolver {
    store: Arc<dyn AuthStore>,
    secret: String,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn AuthStore>, secret: String) -> Self {
        Self { store, secret }
    }

    /// `Ok(None)` when the request carries no valid, unexpired session.
    pub async fn resolve(&self, headers: &HeaderMap) -> ServerResult<Option<SessionContext>> {
        let Some(signed) = signed_token_from_headers(headers) else {
            return Ok(None);
        };
        let Some(token) = verify_signed_token(&self.secret, &signed) else {
            debug!("rejected session token with invalid signature");
            return Ok(None);
        };

        let Some(session) = self.store.find_session_by_token(token).await? else {
            return Ok(None);
        };
        if session.is_expired_at(DateTime::now()) {
            debug!(session_id = %session.id, "session expired");
            return Ok(None);
        }

        let Some(user) = self.store.get_user(&session.user_id).await? else {
            return Ok(None);
        };

        Ok(Some(SessionContext {
            session_id: session.id,
            user,
            active_organization_id: session.active_organization_id,
        }))
    }
}
