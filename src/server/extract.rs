//! Request extractors.
//!
//! Every rejection is an [`ApiError`], so malformed input always produces a
//! `{ "detail": ... }` body instead of axum's plain-text rejections.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{ApiError, ApiResult};

/// Largest page any list endpoint returns.
pub const MAX_LIMIT: usize = 500;

/// Required JSON body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

/// JSON body where an empty payload means `T::default()`.
#[derive(Debug, Clone)]
pub struct OptionalJsonBody<T>(pub T);

async fn body_bytes<S: Send + Sync>(req: Request, state: &S) -> ApiResult<Bytes> {
    Bytes::from_request(req, state)
        .await
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = body_bytes(req, state).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(ApiError::bad_request("Request body is required"));
        }
        Ok(JsonBody(serde_json::from_slice(&bytes)?))
    }
}

#[async_trait]
impl<S, T> FromRequest<S> for OptionalJsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = body_bytes(req, state).await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJsonBody(T::default()));
        }
        Ok(OptionalJsonBody(serde_json::from_slice(&bytes)?))
    }
}

/// Query string parameters with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct Params(HashMap<String, String>);

#[async_trait]
impl<S> FromRequestParts<S> for Params
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(map) = Query::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
        Ok(Params(map))
    }
}

impl Params {
    /// Build from already-parsed pairs.
    pub fn new(map: HashMap<String, String>) -> Self {
        Params(map)
    }

    /// A non-empty string parameter.
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// A parameter parsed with [`FromStr`]; 400 when it does not parse.
    pub fn parse<T: FromStr>(&self, key: &str) -> ApiResult<Option<T>> {
        self.str(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|_| {
                    ApiError::bad_request(format!("Invalid value for '{}': {}", key, raw))
                })
            })
            .transpose()
    }

    /// A boolean flag (`true/false/1/0`).
    pub fn flag(&self, key: &str) -> ApiResult<Option<bool>> {
        self.str(key)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(true),
                "false" | "0" | "no" => Ok(false),
                _ => Err(ApiError::bad_request(format!(
                    "Invalid boolean for '{}': {}",
                    key, raw
                ))),
            })
            .transpose()
    }

    /// An enum parameter spelled as its serialised name.
    pub fn enum_value<T: DeserializeOwned>(&self, key: &str) -> ApiResult<Option<T>> {
        self.str(key)
            .map(|raw| {
                serde_json::from_value(serde_json::Value::String(raw.to_string())).map_err(|_| {
                    ApiError::bad_request(format!("Invalid value for '{}': {}", key, raw))
                })
            })
            .transpose()
    }

    /// `(offset, limit)` with `limit` clamped to `1..=MAX_LIMIT`.
    pub fn page(&self, default_limit: usize) -> ApiResult<(usize, usize)> {
        let offset = self.parse::<usize>("offset")?.unwrap_or(0);
        let limit = self
            .parse::<usize>("limit")?
            .unwrap_or(default_limit)
            .clamp(1, MAX_LIMIT);
        Ok((offset, limit))
    }
}
