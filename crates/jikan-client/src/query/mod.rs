//! Typed query cache.
//!
//! Sits between consumers and the fetch wrappers: identical logical queries
//! (same [`QueryKey`]) share one cache entry and one in-flight upstream
//! call, repeat reads within the freshness window never touch the network,
//! and consumers observe loading/success/error state plus explicit refetch.

pub mod cache;
pub mod key;
pub mod observer;

pub use cache::{CacheStats, QueryCache, QueryError, QueryOptions, QuerySnapshot, QueryStatus};
pub use key::{Param, QueryKey};
pub use observer::Query;
