mod error;
mod handlers;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::Router;
use crucible_common::config::Config;
use crucible_common::languages::LanguageRegistry;
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub redis: ConnectionManager,
    pub registry: Arc<LanguageRegistry>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Crucible API booting...");

    let config = Arc::new(Config::from_env());
    let registry = Arc::new(LanguageRegistry::builtin());

    info!("Supported languages: {:?}", registry.ids());

    // Connect to Redis
    let redis_url = config.redis_url();
    let client = redis::Client::open(redis_url.as_str()).expect("Failed to create Redis client");
    let redis_conn = ConnectionManager::new(client)
        .await
        .expect("Failed to connect to Redis");

    info!("Connected to Redis: {}:{}", config.redis_host, config.redis_port);

    let state = Arc::new(AppState {
        redis: redis_conn,
        registry,
        config: config.clone(),
    });

    // Every response is client-facing: permissive CORS, JSON only
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .merge(routes::routes())
        .layer(cors)
        .with_state(state);

    let listener = TcpListener::bind(&config.api_addr)
        .await
        .expect("Failed to bind to address");

    info!("HTTP server listening on {}", config.api_addr);
    info!("Ready to accept submissions");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");
}

async fn shutdown_signal() {
    signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    warn!("Received SIGTERM/CTRL+C - shutting down API");
}
