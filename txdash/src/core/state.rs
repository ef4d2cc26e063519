use crate::domain::prelude::*;
use crate::query::QueryEngine;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Read side used by the dashboard endpoints.
    /// Shares the store with the ingestion scheduler.
    pub queries: QueryEngine,
}

impl AppState {
    pub fn new(store: Arc<Store>, catalog: Arc<Catalog>) -> Self {
        Self {
            queries: QueryEngine::new(store, catalog),
        }
    }
}
