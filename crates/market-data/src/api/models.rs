//! API request/response models.

use serde::{Deserialize, Serialize};

use crate::feed::RateLimits;

/// Success envelope: `{"status": "success", "data": ...}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            data,
        }
    }
}

/// Error envelope: `{"status": "error", "message": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(rename = "uptime_seconds")]
    pub uptime_seconds: u64,
    pub clients: usize,
    pub rate_limits: RateLimits,
    pub symbols: Vec<String>,
}

/// Query parameters for `/api/extra-options`.
///
/// `currentPrice` is taken as a string so a bad value gets the API's own
/// 400 body instead of the extractor's rejection.
#[derive(Debug, Deserialize)]
pub struct ExtraOptionsParams {
    pub symbol: Option<String>,
    #[serde(rename = "currentPrice")]
    pub current_price: Option<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub symbol: String,
    pub reloaded: bool,
}
