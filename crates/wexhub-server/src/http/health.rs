//! `/healthz`
//!
//! Runs the registered checks (currently the blob store probe) and
//! reports per-check status plus the total probe duration.

use std::time::Instant;

use hyper::{Response, StatusCode};
use serde_json::json;

use super::body::HttpBody;
use super::error::json_response;
use super::AppState;

pub async fn healthz(state: &AppState) -> Response<HttpBody> {
    let started = Instant::now();

    let storage_started = Instant::now();
    let storage = state.blobs.health().await;
    let storage_duration = storage_started.elapsed();

    let (storage_status, storage_data) = match storage {
        Ok(health) => (
            "healthy",
            json!({"provider": health.provider_id, "data": health.data}),
        ),
        Err(e) => ("unhealthy", json!({"error": e.to_string()})),
    };

    let healthy = storage_status == "healthy";
    let body = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "totalDuration": format!("{:?}", started.elapsed()),
        "checks": [
            {
                "name": "storage",
                "status": storage_status,
                "duration": format!("{storage_duration:?}"),
                "data": storage_data,
            },
        ],
    });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, body)
}
