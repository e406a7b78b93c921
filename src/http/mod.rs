//! HTTP relay server for AuthRelay
//!
//! Holds the provider API key so clients never do. Each route is a thin
//! passthrough to the [`IdentityProvider`] with claims normalized on the way
//! out.

pub mod auth;
pub mod response;
pub mod user;

use self::response::AppError;
use crate::config::{Config, HttpConfig};
use crate::constants::CORS_MAX_AGE_SECS;
use crate::provider::{IdentityProvider, ProviderRefresher, WorkOsProvider};
use crate::session::{RefreshCoordinator, TokenRefresher};
use crate::{RelayError, Result, telemetry};
use axum::{
    Router,
    extract::{Json, MatchedPath, Request},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    LatencyUnit,
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn IdentityProvider>,
    refresher: Arc<dyn TokenRefresher>,
    coordinator: RefreshCoordinator,
    default_redirect_uri: Arc<str>,
}

impl AppState {
    pub fn new(provider: Arc<dyn IdentityProvider>, config: &Config) -> Self {
        let refresher: Arc<dyn TokenRefresher> = Arc::new(ProviderRefresher::new(provider.clone()));
        Self {
            provider,
            refresher,
            coordinator: RefreshCoordinator::new(config.session.refresh_timeout()),
            default_redirect_uri: Arc::from(config.http.default_redirect_uri.as_str()),
        }
    }
}

/// Start the relay server with the WorkOS provider
pub async fn start_server(config: Config) -> Result<()> {
    config.require_provider_credentials()?;
    let provider = Arc::new(WorkOsProvider::new(&config.provider)?);

    let app = build_router(AppState::new(provider, &config), &config.http);

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| RelayError::config(format!("Invalid address {}: {}", addr, e)))?;

    tracing::info!("Starting relay server on {}", socket_addr);

    let listener = tokio::net::TcpListener::bind(socket_addr).await?;
    serve(listener, app).await
}

/// Serve `app` on an already bound listener until Ctrl-C
pub async fn serve(listener: tokio::net::TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutting down relay server");
            }
        })
        .await
        .map_err(|e| RelayError::config(format!("Server error: {}", e)))
}

/// Build the router with all endpoints
pub fn build_router(state: AppState, http_config: &HttpConfig) -> Router {
    let api_routes = Router::new()
        .route("/api/auth/url", post(auth::authorization_url))
        .route("/api/auth/callback", post(auth::callback))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/signout", post(auth::sign_out))
        .route("/api/user/profile", get(user::profile))
        .route("/api/user/organizations", get(user::organizations))
        .route("/api/user/switch-org", post(user::switch_organization))
        .with_state(state);

    Router::new()
        .route("/healthz", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new())
                        .on_response(
                            DefaultOnResponse::new()
                                .level(tracing::Level::INFO)
                                .latency_unit(LatencyUnit::Micros),
                        ),
                )
                .layer(cors_layer(http_config))
                .layer(axum::middleware::from_fn(track_metrics)),
        )
}

/// CORS restricted to the configured origins
fn cors_layer(http_config: &HttpConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = http_config
        .origins()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(CORS_MAX_AGE_SECS))
}

/// Count and time every request by its route pattern
async fn track_metrics(request: Request, next: Next) -> Response {
    let handler = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let metrics = telemetry::MetricsMiddleware::new(handler);
    let start = metrics.start();
    let response = next.run(request).await;
    metrics.finish(start, &method, response.status().as_u16());
    response
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> std::result::Result<(StatusCode, String), AppError> {
    let metrics = telemetry::get_metrics().map_err(AppError::titled("Metrics unavailable"))?;
    Ok((StatusCode::OK, metrics))
}

#[cfg(test)]
mod http_test;
