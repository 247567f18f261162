//! Router configuration module
//!
//! Configures all routes, middleware layers, and creates the application router.

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    routing::{get, put},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::{AUTH_KEY_HEADER, AUTH_USER_HEADER};
use crate::config::Config;
use crate::handlers::{authorize, get_progress, healthcheck, update_progress};
use crate::openapi::ApiDoc;
use crate::state::AppState;

/// Sync protocol routes, relative to `/sync`
fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/users/auth", get(authorize))
        .route("/syncs/progress", put(update_progress))
        .route("/syncs/progress/{document}", get(get_progress))
        .route("/healthcheck", get(healthcheck))
}

/// Create the application router with default config (for testing)
pub fn create_router(state: AppState) -> Router {
    create_router_with_config(state, &Config::default())
}

/// Create the application router with custom configuration
pub fn create_router_with_config(state: AppState, config: &Config) -> Router {
    // Configure CORS based on allowed_origins
    let cors = match &config.allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS: Restricting to {} origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    HeaderName::from_static(AUTH_USER_HEADER),
                    HeaderName::from_static(AUTH_KEY_HEADER),
                ])
        }
        _ => {
            tracing::warn!("CORS: Allowing all origins (dev mode)");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    // Request body limit
    let body_limit = RequestBodyLimitLayer::new(config.body_limit_kb * 1024);

    // Request timeout
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.timeout_secs),
    );

    let mut router = Router::new().nest("/sync", sync_routes());

    if config.enable_docs {
        tracing::info!("API docs served at /docs");
        router = router
            .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    let router = router
        .with_state(state)
        .layer(cors)
        .layer(body_limit)
        .layer(timeout);

    // Conditionally apply rate limiting (disabled in tests, enabled in production)
    if !config.rate_limit_enabled {
        tracing::warn!("Rate limiting: DISABLED");
        return router.layer(TraceLayer::new_for_http());
    }

    let governor_conf = GovernorConfigBuilder::default()
        .per_second(config.rate_limit_per_sec)
        .burst_size(config.rate_limit_burst)
        .finish();

    match governor_conf {
        Some(conf) => {
            tracing::info!(
                "Rate limiting: {} req/s (burst: {})",
                config.rate_limit_per_sec,
                config.rate_limit_burst
            );
            router
                .layer(GovernorLayer::new(Arc::new(conf)))
                .layer(TraceLayer::new_for_http())
        }
        None => {
            tracing::warn!(
                per_sec = config.rate_limit_per_sec,
                burst = config.rate_limit_burst,
                "Invalid rate limit settings, rate limiting DISABLED"
            );
            router.layer(TraceLayer::new_for_http())
        }
    }
}
