use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    db::{Store, Stores},
    entities::inventory::{self, Entity as InventoryEntity},
    errors::ServiceError,
};

/// Adjusts one inventory row by a signed `delta` in a single statement.
///
/// Negative deltas carry the guard `quantity + delta >= 0` in the `WHERE`
/// clause, so concurrent callers cannot both pass a read-then-write check.
/// Returns `Ok(false)` when no row matched: the row is missing or the
/// guard failed. Callers decide whether that means insufficient stock.
pub async fn adjust_quantity<C>(
    conn: &C,
    inventory_id: Uuid,
    delta: i32,
) -> Result<bool, ServiceError>
where
    C: ConnectionTrait,
{
    if delta == 0 {
        let exists = InventoryEntity::find_by_id(inventory_id).one(conn).await?;
        return Ok(exists.is_some());
    }

    let mut update = InventoryEntity::update_many()
        .col_expr(
            inventory::Column::Quantity,
            Expr::col(inventory::Column::Quantity).add(delta),
        )
        .col_expr(inventory::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(inventory::Column::Id.eq(inventory_id));

    if delta < 0 {
        update = update.filter(inventory::Column::Quantity.gte(-delta));
    }

    let result = update.exec(conn).await?;
    let applied = result.rows_affected == 1;

    if applied {
        debug!(%inventory_id, delta, "inventory adjusted");
    } else {
        counter!("stock_transfer.inventory.guard_rejected", 1);
        debug!(%inventory_id, delta, "inventory guard rejected adjustment");
    }
    Ok(applied)
}

/// Like [`adjust_quantity`], but turns an unmatched guard into
/// [`ServiceError::InsufficientInventory`] for decrements and
/// [`ServiceError::NotFound`] for increments.
pub async fn apply_delta<C>(conn: &C, inventory_id: Uuid, delta: i32) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    if adjust_quantity(conn, inventory_id, delta).await? {
        return Ok(());
    }
    if delta < 0 {
        Err(ServiceError::insufficient(inventory_id, -delta))
    } else {
        Err(ServiceError::NotFound(format!(
            "inventory {} not found",
            inventory_id
        )))
    }
}

/// Read side over the inventory tables of both stores.
#[derive(Clone)]
pub struct InventoryService {
    stores: Stores,
}

impl InventoryService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    #[instrument(skip(self))]
    pub async fn get(&self, store: Store, id: Uuid) -> Result<inventory::Model, ServiceError> {
        InventoryEntity::find_by_id(id)
            .one(self.stores.get(store))
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("{} inventory {} not found", store, id)))
    }

    pub async fn list(&self, store: Store) -> Result<Vec<inventory::Model>, ServiceError> {
        Ok(InventoryEntity::find()
            .order_by_asc(inventory::Column::BranchId)
            .order_by_asc(inventory::Column::ProductId)
            .all(self.stores.get(store))
            .await?)
    }

    pub async fn list_by_branch(
        &self,
        store: Store,
        branch_id: Uuid,
    ) -> Result<Vec<inventory::Model>, ServiceError> {
        Ok(InventoryEntity::find()
            .filter(inventory::Column::BranchId.eq(branch_id))
            .order_by_asc(inventory::Column::ProductId)
            .all(self.stores.get(store))
            .await?)
    }
}
