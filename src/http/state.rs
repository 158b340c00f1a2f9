//! Shared application state threaded through every handler (spec.md §9's
//! "Registry context value" redesign, replacing the source's package-level
//! globals).

use std::sync::Arc;

use crate::auth::token::TokenCache;
use crate::config::Config;
use crate::store::ContentStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ContentStore>,
    pub tokens: Arc<TokenCache>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let store = ContentStore::new(config.repo.dir.clone());
        AppState {
            config: Arc::new(config),
            store: Arc::new(store),
            tokens: Arc::new(TokenCache::new()),
        }
    }
}
