use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }
}

/// Server-side failure as surfaced to the page. The backend's error schema is
/// not fixed, so the message is pulled from whichever common field is present.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_response(status: u16, payload: &Value) -> Self {
        let message = payload_message(payload).unwrap_or_else(|| format!("HTTP {status}"));
        Self::new(ErrorCode::from_status(status), message)
    }
}

fn payload_message(payload: &Value) -> Option<String> {
    match payload {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Object(fields) => ["message", "error", "detail"]
            .iter()
            .find_map(|key| match fields.get(*key) {
                Some(Value::String(text)) => Some(text.clone()),
                Some(nested @ Value::Object(_)) => payload_message(nested),
                _ => None,
            }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn maps_unauthorized_status_and_message_field() {
        let err = ApiError::from_response(401, &json!({ "error": "unknown device email" }));
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.message, "unknown device email");
    }

    #[test]
    fn reads_nested_error_object() {
        let err = ApiError::from_response(
            500,
            &json!({ "error": { "message": "scanner cloud unavailable" } }),
        );
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "scanner cloud unavailable");
    }

    #[test]
    fn falls_back_to_status_text() {
        let err = ApiError::from_response(429, &Value::Null);
        assert_eq!(err.code, ErrorCode::RateLimited);
        assert_eq!(err.message, "HTTP 429");
    }
}
