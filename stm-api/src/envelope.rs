//! Uniform response envelope wrapping every API payload.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Envelope carrying either a payload or an error description.
///
/// Every API method returns one of these so callers can branch on `success`
/// without inspecting the payload shape first.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Seconds since the Unix epoch at the time the envelope was built.
    pub timestamp: f64,
    /// Payload, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error description, present on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Wraps a successful payload.
    #[must_use]
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            timestamp: unix_now(),
            data: Some(data),
            error: None,
        }
    }

    /// Wraps a failure description.
    #[must_use]
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: unix_now(),
            data: None,
            error: Some(error.into()),
        }
    }
}

pub(crate) fn unix_now() -> f64 {
    unix_seconds(SystemTime::now())
}

pub(crate) fn unix_seconds(at: SystemTime) -> f64 {
    at.duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_envelope_omits_the_error_field() {
        let envelope = ApiResponse::ok(42u32);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
        assert!(json["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[test]
    fn err_envelope_omits_the_data_field() {
        let envelope: ApiResponse<u32> = ApiResponse::err("it broke");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "it broke");
        assert!(json.get("data").is_none());
    }
}
