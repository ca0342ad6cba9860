//! HTTP handlers for the portal's file and directory operations.
//! Thin mappings onto `FilePortalService`; multipart uploads are drained
//! field by field so a batch uploads strictly sequentially.

use crate::{
    errors::AppError,
    models::{directory_item::DirectoryItem, file_item::FileItem},
    services::portal_service::{FilePortalService, PortalError, UploadRequest},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};

/// Query parameter selecting the directory scope; absent means root.
#[derive(Debug, Deserialize)]
pub struct DirQuery {
    #[serde(default)]
    pub dir: String,
}

/// Request body for `POST /api/directories`.
#[derive(Debug, Deserialize)]
pub struct CreateDirectoryReq {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
}

/// GET `/api/files?dir=` — list the files of one directory.
///
/// Read enumeration is permissive: an unavailable backend degrades to an
/// empty list so the UI renders empty rather than failing.
pub async fn list_files(
    State(service): State<Arc<FilePortalService>>,
    Query(query): Query<DirQuery>,
) -> Json<Vec<FileItem>> {
    match service.list_files(&query.dir).await {
        Ok(files) => Json(files),
        Err(err @ PortalError::StorageUnavailable(_)) => {
            warn!("file listing degraded to empty: {}", err);
            Json(Vec::new())
        }
        Err(err) => {
            warn!("file listing failed: {}", err);
            Json(Vec::new())
        }
    }
}

/// GET `/api/directories?dir=` — list child directories.
///
/// The service imposes no directory ordering; sort by name here so the
/// response is deterministic for the UI.
pub async fn list_directories(
    State(service): State<Arc<FilePortalService>>,
    Query(query): Query<DirQuery>,
) -> Json<Vec<DirectoryItem>> {
    match service.list_directories(&query.dir).await {
        Ok(mut directories) => {
            directories.sort_by(|a, b| a.name.cmp(&b.name));
            Json(directories)
        }
        Err(err) => {
            warn!("directory listing degraded to empty: {}", err);
            Json(Vec::new())
        }
    }
}

/// POST `/api/files?dir=` — multipart upload.
///
/// Fields are processed in order, one file fully completing before the next
/// begins; the first failure aborts the remainder of the batch.
pub async fn upload_files(
    State(service): State<Arc<FilePortalService>>,
    Query(query): Query<DirQuery>,
    mut multipart: Multipart,
) -> Result<Json<Vec<FileItem>>, AppError> {
    let mut uploaded = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?
    {
        let name = field
            .file_name()
            .or(field.name())
            .map(str::to_string)
            .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "multipart field without a name"))?;
        let content_type = field.content_type().map(str::to_string);
        let body = field
            .bytes()
            .await
            .map_err(|err| AppError::new(StatusCode::BAD_REQUEST, err.to_string()))?;

        debug!(%name, size = body.len(), dir = %query.dir, "received upload field");
        let item = service
            .upload_file(
                &query.dir,
                UploadRequest {
                    name,
                    content_type,
                    metadata: HashMap::new(),
                    body,
                },
                None,
            )
            .await?;
        uploaded.push(item);
    }
    Ok(Json(uploaded))
}

/// GET `/api/files/{*id}` — download the full object body.
pub async fn download_file(
    State(service): State<Arc<FilePortalService>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let (item, body) = service.download_file(&id).await?;

    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&item.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&item.size.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&item.upload_date.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
    Ok(response)
}

/// DELETE `/api/files/{*id}` — delete one object.
pub async fn delete_file(
    State(service): State<Arc<FilePortalService>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_file(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST `/api/directories` — create a directory placeholder.
pub async fn create_directory(
    State(service): State<Arc<FilePortalService>>,
    Json(payload): Json<CreateDirectoryReq>,
) -> Result<impl IntoResponse, AppError> {
    service.create_directory(&payload.path).await?;
    Ok(StatusCode::CREATED)
}

/// DELETE `/api/directories/{*path}` — delete a directory recursively.
///
/// Deletion is per-object and non-atomic: on failure the directory may be
/// left partially deleted, and the response carries the first error only.
pub async fn delete_directory(
    State(service): State<Arc<FilePortalService>>,
    Path(path): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    service.delete_directory(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/api/connection` — connectivity probe for the UI banner.
pub async fn connection_status(
    State(service): State<Arc<FilePortalService>>,
) -> Json<ConnectionStatus> {
    let connected = service.test_connection().await;
    Json(ConnectionStatus { connected })
}
