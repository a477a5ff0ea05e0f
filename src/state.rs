// src/state.rs
use sqlx::PgPool;

use crate::services::invalidation::{Entity, ViewCache};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub views: ViewCache,
}

impl AppState {
    pub fn new(db_pool: PgPool) -> Self {
        Self {
            db_pool,
            views: ViewCache::new(),
        }
    }

    /// Call after a write has been committed.
    pub async fn committed(&self, entities: &[Entity]) {
        self.views.invalidate(entities).await;
    }
}
