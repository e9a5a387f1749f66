//! Client library for browsing anime/manga metadata from the Jikan API v4.
//!
//! Two collaborating pieces form the core:
//! - a rate-limited fetch gateway that serializes and retries upstream calls,
//! - a typed query cache that de-duplicates and caches logical queries.
//!
//! Per-resource fetch wrappers sit between the two: they translate domain
//! requests into URLs, unwrap the response envelope, and degrade to a safe
//! fallback shape instead of surfacing failures.

pub mod api;
pub mod query;

#[cfg(test)]
pub(crate) mod testutil;

pub use api::{FallbackReason, FetchGateway, FetchOutcome, GatewayError, JikanApi};
pub use query::{Query, QueryCache, QueryKey, QueryOptions, QuerySnapshot, QueryStatus};
