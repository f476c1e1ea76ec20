//! Entity factories.
//!
//! Each factory takes the store's random source and returns one complete,
//! internally consistent entity. Factories never touch the store; the
//! fixture store decides what to keep. Leaf values (ids, metrics) come from
//! the random source so a seeded store is reproducible.

mod anomaly;
mod plugins;
mod sources;
mod tiering;
mod versioning;

pub use anomaly::*;
pub use plugins::*;
pub use sources::*;
pub use tiering::*;
pub use versioning::*;

use chrono::{DateTime, Duration, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

/// Fields a caller can never override through a payload.
const SERVER_OWNED_FIELDS: [&str; 2] = ["id", "created_at"];

/// Random opaque identifier.
pub fn new_id(rng: &mut impl Rng) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    uuid::Builder::from_random_bytes(bytes)
        .into_uuid()
        .to_string()
}

/// A timestamp up to `max_days` in the past.
pub fn recent(rng: &mut impl Rng, max_days: i64) -> DateTime<Utc> {
    let minutes = rng.random_range(0..=(max_days.max(1) * 24 * 60));
    Utc::now() - Duration::minutes(minutes)
}

/// Pick one element of a non-empty static list.
pub(crate) fn pick<T: Copy>(rng: &mut impl Rng, items: &[T]) -> T {
    // Lists passed here are compile-time constants and never empty.
    *items.choose(rng).unwrap_or(&items[0])
}

/// Round to `places` decimals so fixtures read naturally.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Merge a partial JSON payload over an existing entity.
///
/// Object keys in `patch` replace the corresponding fields of `base`;
/// `id` and `created_at` are always kept from `base`. The merged document
/// is deserialised back so type errors surface as a 400.
pub fn merge_json<T>(base: &T, patch: &Value) -> ApiResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let patch = match patch {
        Value::Null => return Ok(serde_json::from_value(serde_json::to_value(base)?)?),
        Value::Object(map) => map,
        _ => return Err(ApiError::bad_request("Request body must be a JSON object")),
    };

    let mut merged = serde_json::to_value(base).map_err(|e| ApiError::Internal {
        message: e.to_string(),
    })?;
    if let Value::Object(target) = &mut merged {
        for (key, value) in patch {
            if SERVER_OWNED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            // Unknown keys would be silently dropped by serde; keep only
            // fields the entity actually has.
            if target.contains_key(key) {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    serde_json::from_value(merged).map_err(ApiError::from)
}
