//! HTTP surface for growthlog.
//!
//! Routes:
//! - `GET /`: entry form, growth chart and entry list
//! - `POST /add`: record a new entry (multipart form)
//! - `GET /uploads/:name`: stored photos
//! - `GET /health`: liveness check

mod handlers;
pub mod notice;
pub mod render;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::Key;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::Storage;
use crate::uploads::UploadStore;

pub use handlers::AppError;

/// Room for the text fields and multipart framing on top of the photo.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Everything a request handler needs, built once from the configuration.
#[derive(Clone)]
pub struct AppState {
    database_path: PathBuf,
    uploads: UploadStore,
    key: Key,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("database_path", &self.database_path)
            .field("uploads", &self.uploads)
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    /// Build the application context and bring the database schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn new(config: &Config) -> Result<Self> {
        let database_path = config.database_path();
        Storage::open(&database_path)?;

        if config.uses_default_secret() {
            warn!("server.secret_key is not set; notice cookies use the built-in secret");
        }

        Ok(Self {
            database_path,
            uploads: UploadStore::new(config.upload_dir(), config.uploads.max_upload_bytes),
            key: notice::signing_key(&config.server.secret_key),
        })
    }

    /// Path to the database file.
    #[must_use]
    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    /// The photo upload store.
    #[must_use]
    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Run `f` against a fresh store connection on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, a storage error if the connection cannot
    /// be opened, or an internal error if the blocking task panics.
    pub async fn with_storage<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.database_path.clone();
        tokio::task::spawn_blocking(move || {
            let storage = Storage::open(&path)?;
            f(&storage)
        })
        .await
        .map_err(|e| Error::internal(format!("storage task failed: {e}")))?
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let max_bytes = state.uploads.max_bytes();
    let body_limit = max_bytes.saturating_add(FORM_OVERHEAD_BYTES);

    Router::new()
        .route("/", get(handlers::index))
        .route("/add", post(handlers::add_entry))
        .route("/uploads/:name", get(handlers::serve_upload))
        .route("/health", get(|| async { "OK" }))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the application until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
