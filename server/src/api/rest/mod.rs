//! REST API module.
//!
//! Organized into domain-specific submodules, one per resource family, and
//! composed here into a single router plus the middleware stack every
//! request passes through.

pub mod auth;
pub mod content;
pub mod error;
pub mod events;
pub mod range;
pub mod tree;
pub mod types;
pub mod uploads;
pub mod versions;

use crate::api::AppState;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Body size ceiling for a single request. Chunked uploads stay well under
/// this by construction (`chunk_size_bytes` defaults to 8 MiB); single-shot
/// uploads of larger files are expected to use the chunked path instead.
const BODY_LIMIT_BYTES: usize = 1024 * 1024 * 1024;

fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/v1/auth/token", post(auth::login).delete(auth::revoke))
        .route("/api/v1/auth/refresh", post(auth::refresh));

    let tree_routes = Router::new().route("/api/v1/tree", get(tree::get_tree)).route(
        "/api/v1/tree/*path",
        get(tree::get_subtree).put(tree::create_dir).delete(tree::delete_path),
    );

    let content_routes = Router::new().route(
        "/api/v1/content/*path",
        get(content::download).post(content::upload),
    );

    let upload_routes = Router::new()
        .route("/api/v1/uploads", post(uploads::begin))
        .route("/api/v1/uploads/:upload_id/complete", post(uploads::complete))
        .route("/api/v1/uploads/:upload_id/:index", put(uploads::put_chunk))
        .route("/api/v1/uploads/:upload_id", delete(uploads::abort));

    let version_routes = Router::new().route(
        "/api/v1/versions/*path",
        get(versions::get_versions).post(versions::rollback),
    );

    let event_routes = Router::new().route("/api/v1/events", get(events::stream));

    Router::new()
        .route("/health", get(health))
        .merge(auth_routes)
        .merge(tree_routes)
        .merge(content_routes)
        .merge(upload_routes)
        .merge(version_routes)
        .merge(event_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let cors_origins: Vec<HeaderValue> = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    tracing::info!("CORS allowed origins: {:?}", cors_origins);

    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::IF_MATCH,
            header::HeaderName::from_static("x-expected-version"),
        ])
        .allow_credentials(true)
        .expose_headers(vec![header::HeaderName::from_static("x-request-id")]);

    let x_request_id = header::HeaderName::from_static("x-request-id");

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().include_headers(true).level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // 1 request/sec sustained per client, bursts up to 40; a client that
    // blows through this gets a 429 from tower_governor before the handler
    // ever runs.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(1)
            .burst_size(40)
            .finish()
            .expect("rate limiter config is valid"),
    );

    // tower_governor periodically forgets idle client buckets so the limiter
    // state doesn't grow unbounded under a long-lived server.
    let governor_limiter = governor_conf.limiter().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            governor_limiter.retain_recent();
        }
    });

    let app = router(state)
        .layer(
            ServiceBuilder::new()
                .layer(cors)
                .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
                .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
                .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
                .layer(trace_layer)
                .layer(GovernorLayer { config: governor_conf }),
        );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "driftboxd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Serve over TLS 1.3 using `axum-server` + `rustls`, when cert/key paths are configured.
pub async fn serve_tls(addr: SocketAddr, state: AppState, cert_path: &str, key_path: &str) -> anyhow::Result<()> {
    let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
    let app = router(state).layer(TraceLayer::new_for_http());

    tracing::info!(%addr, "driftboxd listening (tls)");
    axum_server::bind_rustls(addr, config).serve(app.into_make_service()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        },
    }
}

