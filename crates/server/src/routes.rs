use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use bangumi_catalog::{CacheStatus, Item, ItemsBatch, SearchQuery, SiteItems, SiteMeta};
use bangumi_core::error::ApiError;
use bangumi_core::types::{ItemType, Language};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::ApiKey;
use crate::error::AppError;
use crate::extract::JsonBody;
use crate::middleware::{cors_layer, security_headers};
use crate::state::AppState;
use crate::validation::{
    DEFAULT_LIMIT, MAX_BATCH_IDS, MAX_BATCH_QUERIES, MAX_BATCH_SITES, check_batch,
    check_limit, check_page_size, check_year,
};

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.cors_origins);
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(axum::middleware::from_fn(security_headers)),
        )
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items))
        .route("/items/bgm/batch", post(get_items_batch))
        .route("/items/bgm/{bgm_id}", get(get_item))
        .route("/items/search", get(search_items))
        .route("/items/search/batch", post(search_items_batch))
        .route("/items/site/batch", post(get_items_by_sites_batch))
        .route("/items/site/{site_name}", get(get_items_by_site))
        .route("/sites", get(get_site_meta))
        .route("/cache/status", get(cache_status))
        .route("/refresh", post(refresh_data))
}

// ---------------------------------------------------------------------------
// Service info
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    version: &'static str,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Bangumi Data API",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Liveness only; does not touch the upstream.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ListParams {
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn list_items(
    _key: ApiKey,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Item>>, AppError> {
    // No limit means the whole list, as before pagination existed.
    let limit = params
        .limit
        .map(check_page_size)
        .transpose()?
        .unwrap_or(usize::MAX);
    let items = state.catalog.list_items().await?;

    let page = items
        .iter()
        .skip(params.offset.unwrap_or(0))
        .take(limit)
        .cloned()
        .collect();
    Ok(Json(page))
}

async fn get_item(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(bgm_id): Path<String>,
) -> Result<Json<Item>, AppError> {
    let item = state
        .catalog
        .get_item(&bgm_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("item not found".into()))?;
    Ok(Json(item))
}

#[derive(Deserialize)]
struct BatchIdsRequest {
    ids: Vec<String>,
}

async fn get_items_batch(
    _key: ApiKey,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<BatchIdsRequest>,
) -> Result<Json<ItemsBatch>, AppError> {
    check_batch("ids", body.ids.len(), MAX_BATCH_IDS)?;
    Ok(Json(state.catalog.get_items_batch(&body.ids).await?))
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SearchParams {
    title: Option<String>,
    #[serde(rename = "type")]
    item_type: Option<String>,
    lang: Option<String>,
    year: Option<i32>,
    limit: Option<usize>,
}

impl SearchParams {
    fn into_query(self) -> Result<(SearchQuery, usize), ApiError> {
        let limit = check_limit(self.limit, DEFAULT_LIMIT)?;
        check_year(self.year)?;
        let item_type = self
            .item_type
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<ItemType>())
            .transpose()?;
        let lang = self
            .lang
            .filter(|l| !l.is_empty())
            .map(|l| l.parse::<Language>())
            .transpose()?;

        let query = SearchQuery {
            title: self.title,
            item_type,
            lang,
            year: self.year,
        };
        Ok((query, limit))
    }
}

async fn search_items(
    _key: ApiKey,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Item>>, AppError> {
    let (query, limit) = params.into_query()?;
    let mut items = state.catalog.search(&query).await?;
    items.truncate(limit);
    Ok(Json(items))
}

#[derive(Deserialize)]
struct BatchSearchRequest {
    queries: Vec<SearchQuery>,
    limit: Option<usize>,
}

async fn search_items_batch(
    _key: ApiKey,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<BatchSearchRequest>,
) -> Result<Json<Vec<Item>>, AppError> {
    check_batch("queries", body.queries.len(), MAX_BATCH_QUERIES)?;
    let limit = check_limit(body.limit, DEFAULT_LIMIT)?;
    for query in &body.queries {
        check_year(query.year)?;
    }
    Ok(Json(state.catalog.search_batch(&body.queries, limit).await?))
}

// ---------------------------------------------------------------------------
// Sites
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SiteParams {
    limit: Option<usize>,
}

async fn get_items_by_site(
    _key: ApiKey,
    State(state): State<AppState>,
    Path(site_name): Path<String>,
    Query(params): Query<SiteParams>,
) -> Result<Json<Vec<Item>>, AppError> {
    let limit = check_limit(params.limit, DEFAULT_LIMIT)?;
    let mut items = state.catalog.get_items_by_site(&site_name).await?;
    items.truncate(limit);
    Ok(Json(items))
}

#[derive(Deserialize)]
struct BatchSitesRequest {
    sites: Vec<String>,
}

async fn get_items_by_sites_batch(
    _key: ApiKey,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<BatchSitesRequest>,
) -> Result<Json<Vec<SiteItems>>, AppError> {
    check_batch("sites", body.sites.len(), MAX_BATCH_SITES)?;
    Ok(Json(
        state.catalog.get_items_by_sites_batch(&body.sites).await?,
    ))
}

async fn get_site_meta(
    _key: ApiKey,
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, SiteMeta>>, AppError> {
    Ok(Json(state.catalog.get_site_metadata().await?))
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

async fn cache_status(_key: ApiKey, State(state): State<AppState>) -> Json<CacheStatus> {
    Json(state.catalog.status().await)
}

#[derive(Serialize)]
struct RefreshResponse {
    message: &'static str,
    generation: u64,
    items: usize,
    fetched_at: String,
}

async fn refresh_data(
    _key: ApiKey,
    State(state): State<AppState>,
) -> Result<Json<RefreshResponse>, AppError> {
    info!("forced dataset refresh requested");
    let summary = state.catalog.force_refresh().await?;
    Ok(Json(RefreshResponse {
        message: "Data refreshed successfully",
        generation: summary.generation,
        items: summary.items,
        fetched_at: summary.fetched_at.to_rfc3339(),
    }))
}
