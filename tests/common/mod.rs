#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    middleware, Router,
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbBackend, EntityTrait, QueryFilter, Set, Statement,
};
use serde_json::Value;
use stock_transfer_api::{
    config::AppConfig,
    db::{Store, Stores},
    entities::{inventory, shipment, ShipmentStatus},
    services::{
        shipments::{NewShipment, NewShipmentItem},
        ReconciliationScheduler, TombstoneCache, TombstoneStore,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

/// One warehouse line and its POS counterpart for the same product.
#[derive(Debug, Clone, Copy)]
pub struct TransferLine {
    pub warehouse_inventory_id: Uuid,
    pub pos_inventory_id: Uuid,
    pub product_id: Uuid,
}

/// Helper harness backed by two in-memory SQLite databases, one per store.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub scheduler: ReconciliationScheduler,
    pub tombstones: Arc<TombstoneCache>,
    pub warehouse_branch: Uuid,
    pub pos_branch: Uuid,
}

/// Single-connection pool so every query sees the same in-memory database.
async fn memory_pool() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .sqlx_logging(false);
    Database::connect(opt)
        .await
        .expect("failed to open in-memory database")
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_tombstone_ttl(Duration::from_secs(3600)).await
    }

    pub async fn with_tombstone_ttl(ttl: Duration) -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "sqlite://pos-test?mode=memory".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let stores = Stores::new(memory_pool().await, memory_pool().await);
        stores
            .run_migrations()
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(stores, cfg.clone());

        let tombstones = Arc::new(TombstoneCache::new(ttl, cfg.tombstone_capacity));
        let store: Arc<dyn TombstoneStore> = tombstones.clone();
        let scheduler = ReconciliationScheduler::new(
            (*state.services.shipments).clone(),
            (*state.services.requests).clone(),
            store,
            Duration::from_millis(50),
            cfg.outbox_batch_size,
        );

        let router = stock_transfer_api::app_router(state.clone()).layer(middleware::from_fn(
            stock_transfer_api::middleware_helpers::request_id_middleware,
        ));

        Self {
            router,
            state,
            scheduler,
            tombstones,
            warehouse_branch: Uuid::new_v4(),
            pos_branch: Uuid::new_v4(),
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.state.stores
    }

    pub async fn seed_inventory(
        &self,
        store: Store,
        branch_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        inventory::ActiveModel {
            id: Set(id),
            product_id: Set(product_id),
            product_unit_id: Set(None),
            branch_id: Set(branch_id),
            quantity: Set(quantity),
            updated_at: Set(Utc::now()),
        }
        .insert(self.stores().get(store))
        .await
        .expect("seed inventory");
        id
    }

    /// Seeds a warehouse row with `warehouse_qty` and an empty POS row for a
    /// fresh product.
    pub async fn seed_line(&self, warehouse_qty: i32) -> TransferLine {
        self.seed_line_with(warehouse_qty, 0).await
    }

    pub async fn seed_line_with(&self, warehouse_qty: i32, pos_qty: i32) -> TransferLine {
        let product_id = Uuid::new_v4();
        let warehouse_inventory_id = self
            .seed_inventory(Store::Warehouse, self.warehouse_branch, product_id, warehouse_qty)
            .await;
        let pos_inventory_id = self
            .seed_inventory(Store::Pos, self.pos_branch, product_id, pos_qty)
            .await;
        TransferLine {
            warehouse_inventory_id,
            pos_inventory_id,
            product_id,
        }
    }

    pub fn new_shipment(&self, lines: &[(TransferLine, i32)]) -> NewShipment {
        NewShipment {
            from_branch_id: self.warehouse_branch,
            to_branch_id: self.pos_branch,
            items: lines
                .iter()
                .map(|(line, quantity)| NewShipmentItem {
                    warehouse_inventory_id: line.warehouse_inventory_id,
                    pos_inventory_id: line.pos_inventory_id,
                    product_unit_id: None,
                    quantity: *quantity,
                })
                .collect(),
        }
    }

    /// Creates a shipment through the service and returns its id.
    pub async fn create_shipment(&self, lines: &[(TransferLine, i32)]) -> Uuid {
        self.state
            .services
            .shipments
            .create_shipment(self.new_shipment(lines))
            .await
            .expect("create shipment")
            .shipment_id
    }

    pub async fn quantity(&self, store: Store, inventory_id: Uuid) -> i32 {
        inventory::Entity::find_by_id(inventory_id)
            .one(self.stores().get(store))
            .await
            .expect("query inventory")
            .expect("inventory row exists")
            .quantity
    }

    pub async fn set_quantity(&self, store: Store, inventory_id: Uuid, quantity: i32) {
        inventory::Entity::update_many()
            .col_expr(inventory::Column::Quantity, Expr::value(quantity))
            .filter(inventory::Column::Id.eq(inventory_id))
            .exec(self.stores().get(store))
            .await
            .expect("set inventory quantity");
    }

    /// Overwrites a shipment status without any guard, to simulate a lost write.
    pub async fn force_shipment_status(&self, id: Uuid, status: ShipmentStatus) {
        shipment::Entity::update_many()
            .col_expr(shipment::Column::Status, Expr::value(status))
            .filter(shipment::Column::Id.eq(id))
            .exec(&self.stores().warehouse)
            .await
            .expect("force shipment status");
    }

    pub async fn execute(&self, store: Store, sql: &str) {
        self.stores()
            .get(store)
            .execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await
            .expect("raw statement");
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}
