//! Storage Module
//!
//! This module provides the core functionality of SweepCache: a thread-safe
//! key-value cache with per-entry TTL, and a background sweeper that
//! reclaims expired entries with a pool of deletion workers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Cache<V>                             │
//! │        RwLock<HashMap<String, (value, expires_at)>>         │
//! │     get: shared lock      set / delete: exclusive lock      │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ scan under write lock, delete per key
//!              ┌─────────────┴─────────────┐
//!              │         Sweeper           │
//!              │ scanner + N worker tasks  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use sweepcache::storage::Cache;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let cache = Cache::new();
//!
//! cache.set("session", Bytes::from("token123"), Duration::from_secs(3600));
//! assert_eq!(cache.get("session"), Some(Bytes::from("token123")));
//!
//! // A zero TTL is accepted and immediately expired
//! cache.set("ghost", Bytes::from("boo"), Duration::ZERO);
//! assert_eq!(cache.get("ghost"), None);
//! ```

pub mod cache;
pub mod sweeper;

// Re-export commonly used types
pub use cache::{Cache, CacheEntry, CacheStats};
pub use sweeper::{Sweeper, SweeperConfig, SweeperError};
