pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod validation;

use std::sync::Arc;

use bangumi_catalog::{Catalog, FetchError, HttpFetcher, SnapshotCache};

use crate::config::ServerConfig;
use crate::state::{AppState, AuthConfig};

/// Wire the catalog and auth policy described by `config` into app state.
pub fn build_state(config: &ServerConfig) -> Result<AppState, FetchError> {
    let fetcher = HttpFetcher::new(config.data_url.clone(), config.fetch_timeout)?;
    let cache = SnapshotCache::new(Arc::new(fetcher), config.cache_ttl);

    Ok(AppState {
        catalog: Arc::new(Catalog::new(cache)),
        auth: Arc::new(AuthConfig {
            require_api_key: config.require_api_key,
            api_keys: config.api_keys.clone(),
        }),
        cors_origins: config.cors_origins.clone(),
    })
}
