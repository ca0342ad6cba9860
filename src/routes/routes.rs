//! Defines routes for the portal API.
//!
//! ## Structure
//! - **File endpoints**
//!   - `GET    /api/files?dir=` — list files in a directory (root when omitted)
//!   - `POST   /api/files?dir=` — multipart upload, fields processed sequentially
//!   - `GET    /api/files/{*id}` — download an object by its full key
//!   - `DELETE /api/files/{*id}` — delete an object by its full key
//!
//! - **Directory endpoints**
//!   - `GET    /api/directories?dir=` — list child directories with descendant counts
//!   - `POST   /api/directories` — create a directory placeholder
//!   - `DELETE /api/directories/{*path}` — delete a directory recursively
//!
//! The wildcard `*id` allows nested keys like `tax-documents/2025/report.pdf`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        portal_handlers::{
            connection_status, create_directory, delete_directory, delete_file, download_file,
            list_directories, list_files, upload_files,
        },
    },
    services::portal_service::FilePortalService,
};
use axum::{
    Router,
    routing::{delete, get},
};
use std::sync::Arc;

/// Build and return the router for the portal API.
///
/// The router carries shared state (`Arc<FilePortalService>`) to all
/// handlers.
pub fn routes() -> Router<Arc<FilePortalService>> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/connection", get(connection_status))
        // File-level routes
        .route("/api/files", get(list_files).post(upload_files))
        .route(
            "/api/files/{*id}",
            get(download_file).delete(delete_file),
        )
        // Directory-level routes
        .route(
            "/api/directories",
            get(list_directories).post(create_directory),
        )
        .route("/api/directories/{*path}", delete(delete_directory))
}
