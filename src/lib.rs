// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod adapters;
pub mod aggregator;
pub mod api;
pub mod cache;
pub mod env;
pub mod fallback;
pub mod metrics;
pub mod model;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::{Aggregator, FeedOptions};
pub use crate::api::{create_router, AppState};
pub use crate::env::RuntimeEnv;
pub use crate::model::{ArchiveGroup, CurrentItem, FeedItem, Kind, Metadata, Source};
