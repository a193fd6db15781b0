//! Read-through cache and query layer over the bangumi-data dataset.
//!
//! The [`cache::SnapshotCache`] owns the only mutable state: the currently
//! installed [`cache::Snapshot`]. Everything else is a pure function of a
//! snapshot.

pub mod cache;
pub mod fetcher;
pub mod index;
pub mod model;
pub mod query;

use thiserror::Error;

pub use cache::{CacheStatus, Clock, Snapshot, SnapshotCache, SystemClock};
pub use fetcher::{DEFAULT_DATA_URL, Fetcher, HttpFetcher};
pub use index::{IdentifierIndex, build_index};
pub use model::{Dataset, Item, SiteAssociation, SiteMeta};
pub use query::{Catalog, ItemsBatch, RefreshSummary, SearchQuery, SiteItems, SnapshotItems};

/// The upstream dataset could not be obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("decode error: {0}")]
    Decode(String),
}
