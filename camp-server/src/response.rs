use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::header::CONTENT_TYPE,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub const MEMBER_LIMIT_MESSAGE: &str =
    "Member limit reached. Upgrade your plan to add more members.";
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

#[derive(Debug)]
pub struct ServerResponse<T: Serialize> {
    pub body: Option<T>,
    pub headers: HeaderMap,
    pub status_code: StatusCode,
}

#[derive(Debug)]
pub struct ServerResponseBuilder<T: Serialize> {
    pub body: Option<T>,
    pub headers: Option<HeaderMap>,
    pub status_code: Option<StatusCode>,
}

impl<T> ServerResponseBuilder<T>
where
    T: Serialize,
{
    pub fn body(mut self, body: T) -> Self {
        self.body = Some(body);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn ok(mut self) -> Self {
        self.status_code = Some(StatusCode::OK);
        self
    }

    pub fn created(mut self) -> Self {
        self.status_code = Some(StatusCode::CREATED);
        self
    }

    pub fn build(self) -> ServerResponse<T> {
        ServerResponse {
            body: self.body,
            headers: self.headers.unwrap_or_default(),
            status_code: self.status_code.unwrap_or(StatusCode::OK),
        }
    }

    pub fn new() -> Self {
        Self {
            body: None,
            headers: None,
            status_code: None,
        }
    }
}

impl<T: Serialize> ServerResponse<T> {
    pub fn builder() -> ServerResponseBuilder<T> {
        ServerResponseBuilder::new()
    }
}

fn json_response(status: StatusCode, mut headers: HeaderMap, body: &impl Serialize) -> Response {
    let bytes = match serde_json::to_vec(body) {
        Ok(b) => b,
        Err(err) => {
            error!("Error serializing response body: {:?}", err);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    (status, headers, bytes).into_response()
}

impl<T: Serialize> IntoResponse for ServerResponse<T> {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => json_response(
                self.status_code,
                self.headers,
                &ActionResult::Data(body),
            ),
            None => (self.status_code, self.headers).into_response(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Authentication Error: {0}")]
    Unauthenticated(String),
    #[error("Authorization Error: {0}")]
    Forbidden(String),
    #[error("Authorization Error: no active organization")]
    NoActiveOrganization,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Validation Error: {0}")]
    Validation(String),
    #[error("Member limit of {limit} reached")]
    MemberLimit { limit: u64 },
    #[error("Provider Error: {detail}")]
    Provider {
        detail: String,
        fallback: Option<String>,
    },
    #[error("Internal Error: {detail}")]
    InternalError {
        detail: String,
        fallback: Option<String>,
    },
}

impl From<mongodb::error::Error> for ServerError {
    fn from(error: mongodb::error::Error) -> Self {
        ServerError::internal_error(&error.to_string())
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(error: reqwest::Error) -> Self {
        ServerError::provider(&error.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(error: serde_json::Error) -> Self {
        ServerError::internal_error(&error.to_string())
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::validation(&rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::validation(&rejection.body_text())
    }
}

impl ServerError {
    pub fn internal_error(message: &str) -> Self {
        ServerError::InternalError {
            detail: message.to_string(),
            fallback: None,
        }
    }

    pub fn provider(message: &str) -> Self {
        ServerError::Provider {
            detail: message.to_string(),
            fallback: None,
        }
    }

    pub fn unauthenticated(message: &str) -> Self {
        ServerError::Unauthenticated(message.to_string())
    }

    pub fn forbidden(message: &str) -> Self {
        ServerError::Forbidden(message.to_string())
    }

    pub fn not_found(message: &str) -> Self {
        ServerError::NotFound(message.to_string())
    }

    pub fn validation(message: &str) -> Self {
        ServerError::Validation(message.to_string())
    }

    /// Sets the user-readable message shown instead of the technical detail of
    /// provider and internal failures. Other errors already carry a readable
    /// message and are returned unchanged.
    pub fn with_fallback(self, message: &str) -> Self {
        match self {
            ServerError::Provider {
                detail,
                fallback: None,
            } => ServerError::Provider {
                detail,
                fallback: Some(message.to_string()),
            },
            ServerError::InternalError {
                detail,
                fallback: None,
            } => ServerError::InternalError {
                detail,
                fallback: Some(message.to_string()),
            },
            other => other,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Unauthenticated(_) => "unauthenticated",
            ServerError::Forbidden(_) => "forbidden",
            ServerError::NoActiveOrganization => "no_active_organization",
            ServerError::NotFound(_) => "not_found",
            ServerError::Validation(_) => "validation",
            ServerError::MemberLimit { .. } => "member_limit",
            ServerError::Provider { .. } => "provider",
            ServerError::InternalError { .. } => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) | ServerError::NoActiveOrganization => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Validation(_) | ServerError::MemberLimit { .. } => StatusCode::BAD_REQUEST,
            ServerError::Provider { .. } => StatusCode::BAD_GATEWAY,
            ServerError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the end user.
    pub fn public_message(&self) -> String {
        match self {
            ServerError::Unauthenticated(message)
            | ServerError::Forbidden(message)
            | ServerError::NotFound(message)
            | ServerError::Validation(message) => message.clone(),
            ServerError::NoActiveOrganization => "No active organization".to_string(),
            ServerError::MemberLimit { .. } => MEMBER_LIMIT_MESSAGE.to_string(),
            ServerError::Provider { fallback, .. } | ServerError::InternalError { fallback, .. } => {
                fallback
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FALLBACK_MESSAGE.to_string())
            }
        }
    }

    pub fn to_action_error(&self) -> ActionError {
        ActionError {
            code: self.code().to_string(),
            message: self.public_message(),
        }
    }

    fn log(&self) {
        if self.status().is_server_error() {
            error!(code = self.code(), "Returning error response: {}", self);
        } else {
            warn!(code = self.code(), "Returning error response: {}", self);
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        self.log();
        json_response(
            self.status(),
            HeaderMap::new(),
            &ActionResult::<()>::Error(self.to_action_error()),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ActionError {
    pub code: String,
    pub message: String,
}

/// Tagged outcome of a server action: `{"data": ...}` or `{"error": {...}}`.
///
/// Actions answer with `200 OK` either way; failures never escape as a
/// transport error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult<T> {
    Data(T),
    Error(ActionError),
}

impl<T> ActionResult<T> {
    pub fn from_result(result: ServerResult<T>) -> Self {
        match result {
            Ok(data) => ActionResult::Data(data),
            Err(err) => {
                err.log();
                ActionResult::Error(err.to_action_error())
            }
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ActionResult::Error(_))
    }
}

impl<T: Serialize> IntoResponse for ActionResult<T> {
    fn into_response(self) -> Response {
        json_response(StatusCode::OK, HeaderMap::new(), &self)
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
pub type ServerAppResult<T> = Result<ServerResponse<T>, ServerError>;
