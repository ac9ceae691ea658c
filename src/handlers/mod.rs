pub mod inventory;
pub mod requests;
pub mod shipments;

use crate::config::AppConfig;
use crate::db::Stores;
use crate::errors::ServiceError;
use crate::services::{
    InventoryService, ReconciliationScheduler, RequestOutbox, RequestService, ShipmentService,
    TombstoneCache, TombstoneStore,
};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub shipments: Arc<ShipmentService>,
    pub requests: Arc<RequestService>,
    pub inventory: Arc<InventoryService>,
}

impl AppServices {
    pub fn new(stores: &Stores, config: &AppConfig) -> Self {
        let outbox = RequestOutbox::new(stores.clone(), config.outbox_max_attempts);
        Self {
            shipments: Arc::new(ShipmentService::new(stores.clone(), outbox)),
            requests: Arc::new(RequestService::new(stores.clone())),
            inventory: Arc::new(InventoryService::new(stores.clone())),
        }
    }

    /// Scheduler sharing these services, with a fresh tombstone cache sized
    /// from `config`.
    pub fn reconciliation_scheduler(&self, config: &AppConfig) -> ReconciliationScheduler {
        let tombstones: Arc<dyn TombstoneStore> = Arc::new(TombstoneCache::new(
            config.tombstone_ttl(),
            config.tombstone_capacity,
        ));
        ReconciliationScheduler::new(
            (*self.shipments).clone(),
            (*self.requests).clone(),
            tombstones,
            config.reconcile_interval(),
            config.outbox_batch_size,
        )
    }
}

/// JSON body extractor that rejects with [`ServiceError`] instead of axum's
/// plain-text 422.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}
