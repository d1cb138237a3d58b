use reqwest::Url;
use thiserror::Error;

const MIN_SECRET_LEN: usize = 32;

const DEFAULT_TRUSTED_ORIGINS: [&str; 3] = [
    "http://localhost:3000",
    "http://localhost:3001",
    "http://localhost:3002",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    /// Non-persistent, for local development.
    Memory,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub svix_token: Option<String>,
    pub server_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store_backend: StoreBackend,
    pub mongo_uri: String,
    pub mongo_db: String,
    pub auth_secret: String,
    pub auth_url: Option<String>,
    pub bind_address: String,
    pub rest_port: u16,
    pub sign_in_path: String,
    pub trusted_origins: Vec<String>,
    pub webhooks: WebhookConfig,
    /// Seat limit used when an organization has no active subscription.
    pub membership_limit: u64,
    pub invitation_expires_in_secs: u64,
    pub locales: Vec<String>,
    pub default_locale: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds and validates the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_backend = match var("STORE_BACKEND").as_deref() {
            None | Some("mongo") => StoreBackend::Mongo,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORE_BACKEND",
                    reason: format!("{} is not one of mongo, memory", other),
                });
            }
        };
        let mongo_uri = var("MONGO_URI").unwrap_or_else(|| "mongodb://localhost:27017".into());
        let mongo_db = var("MONGO_DB").unwrap_or_else(|| "camp".into());

        let auth_secret = var("AUTH_SECRET").ok_or(ConfigError::Missing("AUTH_SECRET"))?;
        if auth_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: "AUTH_SECRET",
                reason: format!("must be at least {} characters", MIN_SECRET_LEN),
            });
        }

        let auth_url = var("AUTH_URL").map(|v| parse_url("AUTH_URL", &v)).transpose()?;

        let bind_address = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".into());
        let rest_port = parse_number("REST_PORT", var("REST_PORT"), 3002u16)?;

        let sign_in_path = var("SIGN_IN_PATH").unwrap_or_else(|| "/sign-in".into());
        if !sign_in_path.starts_with('/') {
            return Err(ConfigError::Invalid {
                var: "SIGN_IN_PATH",
                reason: "must start with '/'".into(),
            });
        }

        let mut trusted_origins: Vec<String> =
            DEFAULT_TRUSTED_ORIGINS.iter().map(|o| o.to_string()).collect();
        if let Some(extra) = var("ADDITIONAL_TRUSTED_ORIGINS") {
            for origin in extra.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                trusted_origins.push(parse_url("ADDITIONAL_TRUSTED_ORIGINS", origin)?);
            }
        }

        if let Some(url) = auth_url.as_ref().filter(|u| !trusted_origins.contains(u)) {
            trusted_origins.push(url.clone());
        }

        let webhooks = WebhookConfig {
            svix_token: var("SVIX_TOKEN"),
            server_url: var("SVIX_SERVER_URL")
                .map(|v| parse_url("SVIX_SERVER_URL", &v))
                .transpose()?,
        };

        let membership_limit = parse_number("MEMBERSHIP_LIMIT", var("MEMBERSHIP_LIMIT"), 100u64)?;
        if membership_limit == 0 {
            return Err(ConfigError::Invalid {
                var: "MEMBERSHIP_LIMIT",
                reason: "must be greater than zero".into(),
            });
        }
        let invitation_expires_in_secs = parse_number(
            "INVITATION_EXPIRES_IN_SECS",
            var("INVITATION_EXPIRES_IN_SECS"),
            60 * 60 * 48u64,
        )?;

        let locales: Vec<String> = var("LOCALES")
            .unwrap_or_else(|| "en".into())
            .split(',')
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        let default_locale = var("DEFAULT_LOCALE")
            .map(|l| l.trim().to_lowercase())
            .unwrap_or_else(|| "en".into());
        if !locales.contains(&default_locale) {
            return Err(ConfigError::Invalid {
                var: "DEFAULT_LOCALE",
                reason: format!("{} is not listed in LOCALES", default_locale),
            });
        }

        let log_level = var("LOG_LEVEL").unwrap_or_else(|| "info".into());

        Ok(Self {
            store_backend,
            mongo_uri,
            mongo_db,
            auth_secret,
            auth_url,
            bind_address,
            rest_port,
            sign_in_path,
            trusted_origins,
            webhooks,
            membership_limit,
            invitation_expires_in_secs,
            locales,
            default_locale,
            log_level,
        })
    }
}

fn parse_url(var: &'static str, value: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::Invalid {
        var,
        reason: format!("{} is not a valid URL: {}", value, e),
    })?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_number<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
