//! Read operations over the current snapshot.
//!
//! Queries are plain methods on [`Snapshot`]; [`Catalog`] obtains a snapshot
//! from the cache once per call, so every lookup in a batch observes the same
//! dataset and index.

use std::collections::{BTreeMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;

use bangumi_core::types::{ItemType, Language};
use serde::{Deserialize, Serialize};

use crate::FetchError;
use crate::cache::{CacheStatus, Snapshot, SnapshotCache};
use crate::model::{Item, SiteMeta};

/// Filters for a search. Omitted filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "type")]
    pub item_type: Option<ItemType>,
    #[serde(default)]
    pub lang: Option<Language>,
    #[serde(default)]
    pub year: Option<i32>,
}

impl SearchQuery {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    fn matcher(&self) -> impl Fn(&Item) -> bool + '_ {
        let needle = self
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        move |item: &Item| {
            if let Some(needle) = &needle {
                if !item.title_contains(needle) {
                    return false;
                }
            }
            if self.item_type.is_some_and(|t| t != item.item_type) {
                return false;
            }
            if self.lang.is_some_and(|l| l != item.lang) {
                return false;
            }
            if let Some(year) = self.year {
                if item.begin_year() != Some(year) {
                    return false;
                }
            }
            true
        }
    }
}

/// Result of a multi-id lookup, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemsBatch {
    pub items: Vec<Item>,
    pub not_found: Vec<String>,
}

/// Items declared on one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteItems {
    pub site: String,
    pub items: Vec<Item>,
}

/// Summary of a snapshot installed by a forced refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshSummary {
    pub generation: u64,
    pub items: usize,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

impl Snapshot {
    pub fn items(&self) -> &[Item] {
        self.dataset().items()
    }

    pub fn site_meta(&self) -> &BTreeMap<String, SiteMeta> {
        self.dataset().site_meta()
    }

    pub fn get_item(&self, id: &str) -> Option<&Item> {
        self.index().lookup(self.dataset(), id)
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<&Item> {
        let matches = query.matcher();
        self.items().iter().filter(|&item| matches(item)).collect()
    }

    pub fn items_by_site(&self, site: &str) -> Vec<&Item> {
        self.items()
            .iter()
            .filter(|item| item.site(site).is_some())
            .collect()
    }

    pub fn get_items_batch(&self, ids: &[String]) -> ItemsBatch {
        let mut seen = HashSet::new();
        let mut batch = ItemsBatch::default();
        for id in ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            match self.get_item(id) {
                Some(item) => batch.items.push(item.clone()),
                None => batch.not_found.push(id.clone()),
            }
        }
        batch
    }

    /// Run each query in turn, keeping at most `limit` hits per query and
    /// skipping items whose title an earlier query already produced.
    pub fn search_batch(&self, queries: &[SearchQuery], limit: usize) -> Vec<Item> {
        let mut seen_titles = HashSet::new();
        let mut results = Vec::new();
        for query in queries {
            for item in self.search(query).into_iter().take(limit) {
                if seen_titles.insert(item.title.as_str()) {
                    results.push(item.clone());
                }
            }
        }
        results
    }

    pub fn items_by_sites_batch(&self, sites: &[String]) -> Vec<SiteItems> {
        let mut seen = HashSet::new();
        sites
            .iter()
            .filter(|site| seen.insert(site.as_str()))
            .map(|site| SiteItems {
                site: site.clone(),
                items: self.items_by_site(site).into_iter().cloned().collect(),
            })
            .collect()
    }
}

/// All items of one snapshot, in dataset order.
///
/// Holding this keeps the snapshot alive, so repeated slicing of the same
/// value is stable even if the cache refreshes in the meantime.
#[derive(Debug, Clone)]
pub struct SnapshotItems(Arc<Snapshot>);

impl SnapshotItems {
    pub fn snapshot(&self) -> &Snapshot {
        &self.0
    }
}

impl Deref for SnapshotItems {
    type Target = [Item];

    fn deref(&self) -> &[Item] {
        self.0.items()
    }
}

/// Query entry point used by the HTTP layer.
pub struct Catalog {
    cache: SnapshotCache,
}

impl Catalog {
    pub fn new(cache: SnapshotCache) -> Self {
        Self { cache }
    }

    /// Current snapshot, fetching if none is valid.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, FetchError> {
        self.cache.get_snapshot(false).await
    }

    pub async fn list_items(&self) -> Result<SnapshotItems, FetchError> {
        Ok(SnapshotItems(self.snapshot().await?))
    }

    pub async fn get_item(&self, id: &str) -> Result<Option<Item>, FetchError> {
        Ok(self.snapshot().await?.get_item(id).cloned())
    }

    pub async fn get_items_batch(&self, ids: &[String]) -> Result<ItemsBatch, FetchError> {
        Ok(self.snapshot().await?.get_items_batch(ids))
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<Item>, FetchError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.search(query).into_iter().cloned().collect())
    }

    pub async fn search_batch(
        &self,
        queries: &[SearchQuery],
        limit: usize,
    ) -> Result<Vec<Item>, FetchError> {
        Ok(self.snapshot().await?.search_batch(queries, limit))
    }

    pub async fn get_items_by_site(&self, site: &str) -> Result<Vec<Item>, FetchError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.items_by_site(site).into_iter().cloned().collect())
    }

    pub async fn get_items_by_sites_batch(
        &self,
        sites: &[String],
    ) -> Result<Vec<SiteItems>, FetchError> {
        Ok(self.snapshot().await?.items_by_sites_batch(sites))
    }

    pub async fn get_site_metadata(&self) -> Result<BTreeMap<String, SiteMeta>, FetchError> {
        Ok(self.snapshot().await?.site_meta().clone())
    }

    /// Fetch a new snapshot regardless of age.
    pub async fn force_refresh(&self) -> Result<RefreshSummary, FetchError> {
        let snapshot = self.cache.get_snapshot(true).await?;
        Ok(RefreshSummary {
            generation: snapshot.generation(),
            items: snapshot.items().len(),
            fetched_at: snapshot.fetched_at(),
        })
    }

    pub async fn status(&self) -> CacheStatus {
        self.cache.status().await
    }
}
