// src/services/invalidation.rs
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

// Entities a handler can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Sale,
    Product,
    BundleComponent,
    StockAdjustment,
    StockCheck,
    PlatformFee,
    ShippingService,
    ShippingRate,
    PickingFee,
    ProductCost,
}

// Derived views read back by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Sales,
    Products,
    LowStock,
    StockAdjustments,
    StockChecks,
    FeeHistory,
    Reports,
}

/// Views that must be re-read after a committed write to `entity`.
pub fn dependents(entity: Entity) -> &'static [View] {
    use View::*;
    match entity {
        Entity::Sale => &[Sales, Products, LowStock, Reports],
        Entity::Product => &[Products, LowStock, Sales, Reports],
        Entity::BundleComponent => &[Products, LowStock, Sales, Reports],
        Entity::StockAdjustment => &[StockAdjustments, Products, LowStock, StockChecks],
        Entity::StockCheck => &[StockChecks, StockAdjustments, Products, LowStock],
        // A new service has no rates yet, so no sale is repriced.
        Entity::ShippingService => &[FeeHistory],
        Entity::PlatformFee | Entity::ShippingRate | Entity::PickingFee | Entity::ProductCost => {
            &[FeeHistory, Sales, Reports]
        }
    }
}

#[derive(Default)]
struct CacheState {
    generations: HashMap<View, u64>,
    entries: HashMap<(View, String), (u64, Value)>,
}

/// Cached view responses, dropped whenever a dependent entity is written.
#[derive(Clone, Default)]
pub struct ViewCache {
    inner: Arc<RwLock<CacheState>>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn generation(&self, view: View) -> u64 {
        self.inner.read().await.generations.get(&view).copied().unwrap_or(0)
    }

    pub async fn get(&self, view: View, key: &str) -> Option<Value> {
        let state = self.inner.read().await;
        let current = state.generations.get(&view).copied().unwrap_or(0);
        match state.entries.get(&(view, key.to_string())) {
            Some((generation, value)) if *generation == current => Some(value.clone()),
            _ => None,
        }
    }

    /// Stores `value` only if no invalidation happened since `generation` was read.
    pub async fn put(&self, view: View, key: &str, generation: u64, value: Value) {
        let mut state = self.inner.write().await;
        let current = state.generations.get(&view).copied().unwrap_or(0);
        if generation == current {
            state.entries.insert((view, key.to_string()), (generation, value));
        }
    }

    pub async fn invalidate(&self, entities: &[Entity]) {
        let mut state = self.inner.write().await;
        for entity in entities {
            for view in dependents(*entity) {
                *state.generations.entry(*view).or_insert(0) += 1;
            }
        }
        let generations = state.generations.clone();
        state
            .entries
            .retain(|(view, _), (generation, _)| generations.get(view).copied().unwrap_or(0) == *generation);
        tracing::debug!(?entities, "invalidated dependent views");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sale_writes_invalidate_reports_and_stock() {
        let views = dependents(Entity::Sale);
        assert!(views.contains(&View::Reports));
        assert!(views.contains(&View::Products));
        assert!(!views.contains(&View::FeeHistory));
    }

    #[test]
    fn fee_changes_reprice_sales() {
        for entity in [Entity::PlatformFee, Entity::ShippingRate, Entity::PickingFee, Entity::ProductCost] {
            assert!(dependents(entity).contains(&View::Sales));
            assert!(dependents(entity).contains(&View::Reports));
        }
    }

    #[tokio::test]
    async fn new_shipping_service_keeps_reports_cached() {
        assert_eq!(dependents(Entity::ShippingService), &[View::FeeHistory]);

        let cache = ViewCache::new();
        let reports = cache.generation(View::Reports).await;
        let fees = cache.generation(View::FeeHistory).await;
        cache.put(View::Reports, "summary", reports, json!({"revenue": 10})).await;

        cache.invalidate(&[Entity::ShippingService]).await;
        assert_eq!(cache.generation(View::FeeHistory).await, fees + 1);
        assert!(cache.get(View::Reports, "summary").await.is_some());
    }

    #[tokio::test]
    async fn cached_entry_dropped_after_dependent_write() {
        let cache = ViewCache::new();
        let generation = cache.generation(View::Reports).await;
        cache.put(View::Reports, "summary", generation, json!({"revenue": 10})).await;
        assert_eq!(cache.get(View::Reports, "summary").await, Some(json!({"revenue": 10})));

        cache.invalidate(&[Entity::StockAdjustment]).await;
        assert!(cache.get(View::Reports, "summary").await.is_some());

        cache.invalidate(&[Entity::Sale]).await;
        assert!(cache.get(View::Reports, "summary").await.is_none());
    }

    #[tokio::test]
    async fn stale_put_is_discarded() {
        let cache = ViewCache::new();
        let generation = cache.generation(View::Reports).await;
        cache.invalidate(&[Entity::PlatformFee]).await;
        cache.put(View::Reports, "daily", generation, json!([])).await;
        assert!(cache.get(View::Reports, "daily").await.is_none());
    }
}
