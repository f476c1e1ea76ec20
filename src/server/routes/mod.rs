//! Route handlers, one module per endpoint family.
//!
//! Handlers stay thin: they parse input, take the store lock, call into the
//! domain modules and wrap the result. Every handler returns
//! `ApiResult<...>` so failures render as `{ "detail": ... }`.

pub mod admin;
pub mod anomaly;
pub mod extensions;
pub mod plugins;
pub mod sources;
pub mod streaming;
pub mod tiering;
pub mod versions;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// 201 with the created entity.
pub(crate) fn created<T: Serialize>(value: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(value))
}

/// A required, non-blank string field of a JSON payload.
pub(crate) fn required_str<'a>(body: &'a Value, field: &str) -> ApiResult<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{} is required", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let body = json!({ "name": " x ", "blank": "", "n": 3 });
        assert_eq!(required_str(&body, "name").unwrap(), "x");
        assert!(required_str(&body, "blank").is_err());
        assert!(required_str(&body, "n").is_err());
        assert!(required_str(&body, "missing").is_err());
    }
}
