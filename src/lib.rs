//! # SweepCache - An In-Process TTL Cache
//!
//! SweepCache is a thread-safe, in-memory key-value cache where every entry
//! carries its own time-to-live. Expired entries are never returned to
//! readers, and a background worker pool reclaims them without callers
//! having to poll or clean up.
//!
//! ## Features
//!
//! - **Opaque Values**: `Cache<V>` stores any value type and never inspects it
//! - **Reader/Writer Locking**: Reads share the lock, writes take it exclusively
//! - **Lazy Expiry**: Expired keys read as absent the moment their TTL passes
//! - **Active Expiry**: A scanner task feeds a bounded queue of deletion workers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              SweepCache                             │
//! │                                                                     │
//! │   callers ──── set / get / delete ────┐                             │
//! │                                       ▼                             │
//! │                     ┌──────────────────────────────────┐            │
//! │                     │             Cache<V>             │            │
//! │                     │   RwLock<HashMap<String, Entry>> │            │
//! │                     └──────────────────────────────────┘            │
//! │                          ▲                     ▲                    │
//! │                 scan     │                     │ delete             │
//! │          ┌───────────────┴──┐   bounded   ┌────┴──────────────┐     │
//! │          │  Scanner task    │────queue───>│ Deletion workers  │     │
//! │          └──────────────────┘             └───────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use sweepcache::Cache;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sweepcache::SweeperError> {
//!     let cache = Arc::new(Cache::new());
//!
//!     // Sweep every 500ms with two deletion workers
//!     let _sweeper = cache.start_sweeper(Duration::from_millis(500), 2)?;
//!
//!     cache.set("temp", "data", Duration::from_secs(1));
//!     assert_eq!(cache.get("temp"), Some("data"));
//!
//!     tokio::time::sleep(Duration::from_secs(2)).await;
//!     assert_eq!(cache.get("temp"), None);
//!     assert!(!cache.is_resident("temp"));
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: The cache itself and its expiry sweeper
//!
//! ## Design Highlights
//!
//! ### Minimal Critical Sections
//!
//! Entries are built before the write lock is taken, and replaced values are
//! dropped after it is released. The lock only ever covers the map access.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: `get` treats an expired entry as absent but leaves it in place
//! 2. **Active**: The sweeper periodically finds expired keys and deletes them
//!
//! This keeps reads cheap while still reclaiming memory for keys that are
//! never accessed again.

pub mod storage;

// Re-export commonly used types for convenience
pub use storage::{Cache, CacheEntry, CacheStats, Sweeper, SweeperConfig, SweeperError};

/// Version of SweepCache
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
