use axum::response::Json as ResponseJson;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utils::response::ApiResponse;

const SERVICE_NAME: &str = "Pulse API";

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub message: &'static str,
}

pub async fn health_check() -> ResponseJson<ApiResponse<HealthStatus>> {
    ResponseJson(ApiResponse::success(HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    }))
}

pub async fn api_info() -> ResponseJson<ApiResponse<ApiInfo>> {
    ResponseJson(ApiResponse::success(ApiInfo {
        name: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        message: "Welcome to Pulse API with Authentication",
    }))
}
