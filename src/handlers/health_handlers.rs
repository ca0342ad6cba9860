//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the storage connection

use crate::services::portal_service::{ConnectionState, FilePortalService};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that runs a storage connection test (re-attempting
/// initialization if needed, like any `test_connection` call).
///
/// Returns JSON describing the check. HTTP 200 when the backend is
/// reachable, HTTP 503 otherwise.
pub async fn readyz(State(service): State<Arc<FilePortalService>>) -> impl IntoResponse {
    let connected = service.test_connection().await;
    let state = service.state();

    let storage_check = CheckStatus {
        ok: connected,
        error: if connected {
            None
        } else {
            Some(match state {
                ConnectionState::Failed => "storage initialization failed".to_string(),
                ConnectionState::Ready => "container missing or unreachable".to_string(),
                _ => "storage connection not established".to_string(),
            })
        },
    };

    let mut checks = HashMap::new();
    checks.insert("storage", storage_check);

    let body = ReadyResponse {
        status: if connected { "ok".into() } else { "error".into() },
        checks,
    };

    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
