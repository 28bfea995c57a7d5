//! HTTP handlers.
//!
//! Thin adapters: decode the JSON body, call one core service, encode the
//! result. All policy (atomicity, reuse detection, authorization) lives in
//! `alcove-core`; all error collapsing lives in [`crate::error::ApiError`].

pub mod auth;
pub mod messages;

use axum::Json;
use serde::Serialize;

/// Liveness response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "ok" when the process is serving.
    pub status: &'static str,
    /// Crate version for deploy verification.
    pub version: &'static str,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}
