use std::sync::Arc;

use bangumi_catalog::Catalog;

/// API key policy applied to `/api/v1` routes.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub require_api_key: bool,
    pub api_keys: Vec<String>,
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub auth: Arc<AuthConfig>,
    pub cors_origins: Vec<String>,
}
