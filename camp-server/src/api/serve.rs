use std::time::Duration;

use axum::{
    Extension, Router,
    extract::State,
    http::{HeaderValue, Method, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use camp_shared::org::SessionOverview;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    sensitive_headers::SetSensitiveHeadersLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    actions::organization::session_overview,
    api::{
        members,
        middleware::{Locale, locale, security_headers},
        org, users, webhooks,
    },
    auth::guard::PageSession,
    response::{ServerAppResult, ServerError, ServerResponse, ServerResult},
    util::app_state::AppState,
};

async fn get_status() -> impl IntoResponse {
    "ok".to_string()
}

/// Landing page data. Visitors without a session are sent to sign in.
async fn dashboard(
    PageSession(session): PageSession,
    State(state): State<AppState>,
    Extension(Locale(locale)): Extension<Locale>,
) -> ServerAppResult<SessionOverview> {
    let mut overview = session_overview(&state, &session)
        .await
        .map_err(|e| e.with_fallback("Failed to load the dashboard."))?;
    overview.locale = locale;
    Ok(ServerResponse::builder().body(overview).ok().build())
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .trusted_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::COOKIE])
}

pub fn create_app(state: AppState) -> Router {
    let routes = Router::new()
        .nest("/organizations", org::create_route())
        .nest(
            "/organization",
            org::active_route().merge(members::create_route()),
        )
        .nest("/invitations", members::invitation_route())
        .nest("/actions", users::create_route())
        .nest("/webhooks", webhooks::create_route())
        .route("/dashboard", get(dashboard))
        .route("/status", get(get_status))
        .with_state(state.clone());

    // locale prefixes are stripped here, ahead of route matching
    Router::new()
        .fallback_service(routes)
        .layer(middleware::from_fn_with_state(state.clone(), locale))
        .layer(middleware::from_fn(security_headers))
        .layer(cors_layer(&state))
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            header::SET_COOKIE,
        ]))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
}

pub async fn serve(state: AppState) -> ServerResult<()> {
    let bind = (state.config.bind_address.clone(), state.config.rest_port);
    let app = create_app(state);

    let listener = TcpListener::bind((bind.0.as_str(), bind.1))
        .await
        .map_err(|e| ServerError::internal_error(&format!("Failed to bind {}:{}: {}", bind.0, bind.1, e)))?;
    info!("REST listening on {}:{}", bind.0, bind.1);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        warn!("Axum server failed: {e:?}");
        return Err(ServerError::internal_error(&e.to_string()));
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e:?}");
    }
    info!("Shutting down");
}
