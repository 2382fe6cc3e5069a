//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use redis::aio::ConnectionManager;
use tokio::net::TcpListener;

use crate::application::services::{SessionManager, StreamOptions};
use crate::config::Settings;
use crate::infrastructure::coordinator::HttpCoordinatorClient;
use crate::infrastructure::pubsub::{self, RedisBusConnector, RedisIngestionProvider};
use crate::presentation::http::{handlers, routes};
use crate::presentation::middleware::{cors, logging};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    /// Used by the readiness probe; absent when running against fakes
    pub redis: Option<ConnectionManager>,
    pub settings: Arc<Settings>,
}

/// Build the router with its middleware stack
pub fn build_router(state: AppState) -> Router {
    let cors = cors::create_cors_layer(&state.settings.cors);
    routes::create_router(state)
        .layer(logging::create_trace_layer())
        .layer(cors)
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    manager: Arc<SessionManager>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        handlers::health::init_server_start();

        // Redis connection for the readiness probe
        let redis = pubsub::create_redis_client(&settings.redis).await?;

        // Collaborators
        let ingestion = Arc::new(RedisIngestionProvider::open(&settings.redis.url)?);
        let coordinator = Arc::new(HttpCoordinatorClient::new(&settings.coordinator)?);
        let connector = Arc::new(RedisBusConnector::new());
        tracing::info!(coordinator = %settings.coordinator.base_url, "Collaborators initialized");

        let manager = Arc::new(SessionManager::new(
            ingestion,
            coordinator,
            connector,
            StreamOptions::from_settings(&settings),
        ));

        let state = AppState {
            manager: manager.clone(),
            redis: Some(redis),
            settings: Arc::new(settings.clone()),
        };
        let router = build_router(state);

        // Bind to address
        let addr: SocketAddr = settings.server_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Listening on {}", addr);

        Ok(Self {
            listener,
            router,
            manager,
        })
    }

    /// Run the server until ctrl-c, then stop any running session
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Shutting down; stopping sessions");
        self.manager.stop(Some("SERVER_SHUTDOWN")).await;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
