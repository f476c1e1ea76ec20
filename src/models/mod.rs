//! Entity types served by the mock API.
//!
//! Every entity serialises with `snake_case` fields exactly as the dashboard
//! binds them. Types are grouped per endpoint family.

mod anomaly;
mod plugins;
mod sources;
mod streaming;
mod tiering;
mod versioning;


pub use anomaly::*;
pub use plugins::*;
pub use sources::*;
pub use streaming::*;
pub use tiering::*;
pub use versioning::*;

use serde::{Deserialize, Serialize};

/// Pagination envelope returned by every list endpoint.
///
/// `total` is the number of matching records before `offset`/`limit`
/// slicing is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// The requested page of records.
    pub data: Vec<T>,
    /// Filtered count before pagination.
    pub total: usize,
    /// Offset the page starts at.
    pub offset: usize,
    /// Maximum page size requested.
    pub limit: usize,
}

impl<T> ListResponse<T> {
    /// Slice an already-filtered list into a page.
    pub fn paginate(items: Vec<T>, offset: usize, limit: usize) -> Self {
        let total = items.len();
        let data = items.into_iter().skip(offset).take(limit).collect();
        Self {
            data,
            total,
            offset,
            limit,
        }
    }
}

/// Case-insensitive substring match used by free-text `search` filters.
pub fn matches_search(needle: &str, haystacks: &[&str]) -> bool {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    haystacks
        .iter()
        .any(|h| h.to_lowercase().contains(&needle))
}
