//! Common DTOs used across the API

use dnai_core::AppError;
use serde::Serialize;
use tracing::warn;
use validator::Validate;

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a success response with data
    pub fn success(data: T) -> Self {
        Self {
            data,
            message: None,
        }
    }

    /// Create a success response with data and message
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

/// Run the derived validators of a request body, logging failures
pub fn validate_request<T: Validate>(request: &T, what: &str) -> Result<(), AppError> {
    request.validate().map_err(|e| {
        warn!("{} validation failed: {}", what, e);
        AppError::Validation(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_omits_empty_message() {
        let json = serde_json::to_string(&ApiResponse::success(1)).unwrap();
        assert_eq!(json, r#"{"data":1}"#);

        let json = serde_json::to_string(&ApiResponse::with_message("ok", "Done")).unwrap();
        assert!(json.contains(r#""message":"Done""#));
    }
}
