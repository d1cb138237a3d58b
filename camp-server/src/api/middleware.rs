use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Uri, header},
    middleware::Next,
    response::Response,
};

use crate::util::app_state::AppState;

/// Paths served without security headers or locale negotiation.
const SKIPPED_PREFIXES: [&str; 5] = [
    "/static/",
    "/_next/static",
    "/_next/image",
    "/ingest",
    "/favicon.ico",
];

const SECURITY_HEADERS: [(&str, &str); 10] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
    ("origin-agent-cluster", "?1"),
];

/// Locale negotiated for the request, available as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(pub String);

pub fn is_skipped(path: &str) -> bool {
    SKIPPED_PREFIXES.iter().any(|p| path.starts_with(p))
}

pub async fn security_headers(request: Request, next: Next) -> Response {
    if is_skipped(request.uri().path()) {
        return next.run(request).await;
    }
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Supported locale named by the first path segment, as in `/de/dashboard`.
fn path_locale<'a>(path: &str, locales: &'a [String]) -> Option<&'a String> {
    let segment = path.strip_prefix('/')?.split('/').next()?;
    locales.iter().find(|l| l.as_str() == segment)
}

/// Path prefix first, then `Accept-Language`, then the default locale.
pub fn negotiate_locale(
    path: &str,
    headers: &HeaderMap,
    locales: &[String],
    default_locale: &str,
) -> String {
    if let Some(locale) = path_locale(path, locales) {
        return locale.clone();
    }

    let supported = |tag: &str| locales.iter().find(|l| l.as_str() == tag).cloned();
    headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|accept| {
            accept_language_tags(accept)
                .into_iter()
                .find_map(|tag| supported(&tag))
        })
        .unwrap_or_else(|| default_locale.to_string())
}

/// `uri` with its leading locale segment removed; the query is kept.
/// `None` when the path does not start with that segment.
pub fn strip_locale_prefix(uri: &Uri, locale: &str) -> Option<Uri> {
    let rest = uri.path().strip_prefix('/')?.strip_prefix(locale)?;
    let path = match rest {
        "" => "/",
        rest if rest.starts_with('/') => rest,
        _ => return None,
    };
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_string(),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

/// Primary subtags ordered by quality, highest first.
fn accept_language_tags(value: &str) -> Vec<String> {
    let mut tags: Vec<(String, f32)> = value
        .split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() || tag == "*" {
                return None;
            }
            let quality = pieces
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            let primary = tag.split('-').next().unwrap_or(tag).to_lowercase();
            Some((primary, quality))
        })
        .filter(|(_, q)| *q > 0.0)
        .collect();
    // stable: equal weights keep header order
    tags.sort_by(|a, b| b.1.total_cmp(&a.1));
    tags.into_iter().map(|(tag, _)| tag).collect()
}

/// Negotiates the locale and drops a locale path prefix, so it must run
/// before routing.
pub async fn locale(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if is_skipped(request.uri().path()) {
        return next.run(request).await;
    }
    let locale = negotiate_locale(
        request.uri().path(),
        request.headers(),
        &state.config.locales,
        &state.config.default_locale,
    );
    let stripped = path_locale(request.uri().path(), &state.config.locales)
        .and_then(|prefix| strip_locale_prefix(request.uri(), prefix));
    if let Some(uri) = stripped {
        *request.uri_mut() = uri;
    }
    request.extensions_mut().insert(Locale(locale.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&locale) {
        response.headers_mut().insert(header::CONTENT_LANGUAGE, value);
    }
    response
}
