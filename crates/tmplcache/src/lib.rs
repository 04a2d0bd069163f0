//! # tmplcache
//!
//! Read-through byte cache for template files, kept consistent with the
//! filesystem by watching it instead of re-reading on every request.
//!
//! # Architecture
//!
//! ```text
//!  init ──► BulkLoader ──► TemplateStore ◄── get_template (read-through)
//!                               ▲
//!                               │ put / delete / purge
//!                               │
//!  notify ──► events ──► EventProcessor ──► WatchTree (watch / unwatch)
//! ```
//!
//! The store is a single mutex-guarded map. The processor is one background
//! tokio task started by [`TemplateCache::start_watcher`] and stopped by
//! [`TemplateCache::stop_watcher`] (or by dropping the cache).
//!
//! # Example
//!
//! ```no_run
//! use tmplcache::{CacheConfig, TemplateCache};
//!
//! # async fn demo() -> Result<(), tmplcache::CacheError> {
//! let cache = TemplateCache::init(
//!     CacheConfig::new("templates")
//!         .with_watch(true)
//!         .with_ignore([".DS_Store"]),
//! )?;
//!
//! let bytes = cache.get_template("index.html")?;
//! println!("{} bytes", bytes.len());
//!
//! cache.stop_watcher().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod ignore;
pub mod loader;
pub mod numeric;
pub mod processor;
pub mod stats;
pub mod store;
pub mod watch_tree;

pub use cache::TemplateCache;
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use events::{ChangeKind, TemplateEvent};
pub use ignore::IgnoreSet;
pub use loader::{load_all, relative_key};
pub use numeric::Number;
pub use processor::{EventOutcome, EventProcessor};
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{TemplateBytes, TemplateStore};
pub use watch_tree::{NotifyBackend, WatchBackend, WatchTree};
