//! Server assembly: router, CORS, the call-expiry sweep task, startup and
//! graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use crate::api::{self, AppState};
use crate::config::Settings;
use crate::store::{DbHandle, TrackerDb};

/// Configuration for the tracker server.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: std::path::PathBuf,
    pub frontend_url: Option<String>,
    pub sweep_interval: Duration,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            port: settings.port,
            db_path: settings.db_path,
            frontend_url: settings.frontend_url,
            sweep_interval: Duration::from_secs(settings.sweep_interval_secs),
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            port: settings.port,
            db_path: settings.db_path,
            frontend_url: settings.frontend_url,
            sweep_interval: Duration::from_secs(settings.sweep_interval_secs),
            dev_mode: false,
        }
    }
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router().with_state(state)
}

/// Periodically flip timed-out Pendiente calls to Expirada. Each run is
/// idempotent, so overlap with user-driven completions is harmless.
fn spawn_expiry_sweep(db: DbHandle, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match db.call(|db| db.expire_stale_calls()).await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "expired stale calls"),
                Err(e) => tracing::error!(error = %e, "call expiry sweep failed"),
            }
        }
    });
}

/// Start the tracker server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
    }

    let db = TrackerDb::new(&config.db_path)
        .map_err(|e| anyhow::anyhow!("Failed to initialize database: {}", e))?;
    let db = DbHandle::new(db);
    spawn_expiry_sweep(db.clone(), config.sweep_interval);

    let state = Arc::new(AppState { db });
    let mut app = build_router(state);

    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    } else if let Some(origin) = &config.frontend_url {
        let origin = origin
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid FRONTEND_URL: {}", origin))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let host = if config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!("prodtrack listening on http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let db = TrackerDb::new_in_memory().unwrap();
        let state = Arc::new(AppState {
            db: DbHandle::new(db),
        });
        build_router(state)
    }

    #[tokio::test]
    async fn health_via_full_router() {
        let app = test_router();
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_routes_mounted() {
        let app = test_router();
        let req = Request::builder()
            .uri("/api/materials")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn sweep_task_expires_backdated_calls() {
        let db = TrackerDb::new_in_memory().unwrap();
        let call = db.create_call("stale", "ana", 1.0).unwrap();
        db.conn
            .execute(
                "UPDATE calls SET created_at = datetime('now', '-2 hours') WHERE id = ?1",
                rusqlite::params![call.id],
            )
            .unwrap();
        let handle = DbHandle::new(db);

        spawn_expiry_sweep(handle.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let call = handle
            .call(move |db| db.get_call(call.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(call.status, prodtrack_common::CallStatus::Expirada);
    }

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4110);
        assert_eq!(config.db_path, std::path::PathBuf::from("prodtrack.db"));
        assert!(!config.dev_mode);
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
    }
}
