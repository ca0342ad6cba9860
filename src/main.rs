use anyhow::Result;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod store;

use config::StorageBackend;
use services::portal_service::FilePortalService;
use store::{BlobStore, azure::AzureStore, fs::FsStore};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!(
        "Starting file-portal ({} backend, container `{}`)",
        cfg.backend,
        cfg.container
    );

    // --- Build the storage backend ---
    let blob_store: Arc<dyn BlobStore> = match cfg.backend {
        StorageBackend::Azure => {
            if cfg.azure_account.is_empty() || cfg.azure_sas_token.is_empty() {
                tracing::warn!(
                    "Azure account name or SAS token not configured; the portal will start disconnected"
                );
            }
            Arc::new(AzureStore::new(
                &cfg.azure_account,
                &cfg.container,
                &cfg.azure_sas_token,
            ))
        }
        StorageBackend::Local => {
            // --- Ensure storage directory exists ---
            if !Path::new(&cfg.storage_dir).exists() {
                fs::create_dir_all(&cfg.storage_dir)?;
                tracing::info!("Created storage directory at {}", cfg.storage_dir);
            }

            // Extract the local file path SQLx will use
            let db_path = cfg
                .database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("file:");
            tracing::debug!("Interpreted SQLite path => {}", db_path);

            // Create parent directory if needed
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.exists() {
                    fs::create_dir_all(parent)?;
                    tracing::info!("Created missing directory {:?}", parent);
                }
            }

            // SQLx will not create the database file on its own
            match fs::OpenOptions::new().create(true).write(true).open(db_path) {
                Ok(_) => tracing::debug!("Database file can be created/opened successfully."),
                Err(e) => tracing::warn!("Failed to open database file: {}", e),
            }

            let db = Arc::new(
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .connect(&cfg.database_url)
                    .await?,
            );
            Arc::new(FsStore::new(db, cfg.storage_dir.clone()))
        }
    };

    // --- Initialize core service ---
    let portal = Arc::new(FilePortalService::new(blob_store));

    // Opportunistic warm-up; the portal serves a degraded UI if this fails
    // and re-attempts on the next connection test.
    if portal.test_connection().await {
        tracing::info!("Storage connection verified.");
    } else {
        tracing::warn!("Storage backend unreachable at startup; continuing disconnected.");
    }

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(portal);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
