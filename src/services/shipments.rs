use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait,
    ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::Stores,
    entities::{
        inventory::Entity as InventoryEntity,
        request_outbox::{self, Entity as OutboxEntity},
        shipment::{self, Entity as ShipmentEntity, ShipmentStatus},
        shipment_item::{self, Entity as ShipmentItemEntity},
        transfer_receipt::{self, Entity as ReceiptEntity},
    },
    errors::ServiceError,
    services::{
        inventory::apply_delta,
        outbox::{RequestEnvelope, RequestLineEnvelope, RequestOutbox},
    },
};

/// A validated shipment line.
#[derive(Debug, Clone, PartialEq)]
pub struct NewShipmentItem {
    pub warehouse_inventory_id: Uuid,
    pub pos_inventory_id: Uuid,
    pub product_unit_id: Option<Uuid>,
    pub quantity: i32,
}

/// Input of [`ShipmentService::create_shipment`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewShipment {
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    pub items: Vec<NewShipmentItem>,
}

impl NewShipment {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "a shipment needs at least one item".to_string(),
            ));
        }
        if self.from_branch_id == self.to_branch_id {
            return Err(ServiceError::ValidationError(
                "from_branch_id and to_branch_id must differ".to_string(),
            ));
        }
        if let Some((idx, item)) = self
            .items
            .iter()
            .enumerate()
            .find(|(_, item)| item.quantity <= 0)
        {
            return Err(ServiceError::ValidationError(format!(
                "items[{}].quantity must be greater than 0, got {}",
                idx, item.quantity
            )));
        }
        let total: i64 = self.items.iter().map(|item| i64::from(item.quantity)).sum();
        if total > i64::from(i32::MAX) {
            return Err(ServiceError::ValidationError(format!(
                "total quantity {} exceeds {}",
                total,
                i32::MAX
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedShipment {
    pub shipment_id: Uuid,
    pub shipment_number: String,
    /// Whether the POS request was written before returning. When `false`
    /// the outbox row is picked up by the reconciliation loop.
    pub request_mirrored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShipmentDetail {
    pub shipment: shipment::Model,
    pub items: Vec<shipment_item::Model>,
}

/// Who asked for a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransitionTrigger {
    /// `PUT /Shipments/:id`
    Operator,
    /// Sweep A acting on a POS decision.
    Reconciliation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed { items_received: usize },
    /// Another worker completed it first, or it is no longer Approved.
    Skipped,
}

pub fn shipment_number(id: Uuid, at: DateTime<Utc>) -> String {
    let suffix: String = id.simple().to_string().chars().take(8).collect();
    format!("SH-{}-{}", at.format("%Y%m%d"), suffix.to_uppercase())
}

/// Warehouse-side shipment operations.
///
/// Approval through the API and approval through reconciliation both go
/// through [`ShipmentService::apply_transition`].
#[derive(Clone)]
pub struct ShipmentService {
    stores: Stores,
    outbox: RequestOutbox,
}

impl ShipmentService {
    pub fn new(stores: Stores, outbox: RequestOutbox) -> Self {
        Self { stores, outbox }
    }

    pub fn outbox(&self) -> &RequestOutbox {
        &self.outbox
    }

    /// Writes a Pending shipment, its items and the outbox row in one
    /// warehouse transaction, then tries to mirror the request right away.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_shipment(
        &self,
        input: NewShipment,
    ) -> Result<CreatedShipment, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let shipment_id = Uuid::new_v4();
        let number = shipment_number(shipment_id, now);

        let txn = self.stores.warehouse.begin().await.map_err(ServiceError::transaction)?;

        shipment::ActiveModel {
            id: Set(shipment_id),
            shipment_number: Set(number.clone()),
            from_branch_id: Set(input.from_branch_id),
            to_branch_id: Set(input.to_branch_id),
            status: Set(ShipmentStatus::Pending),
            shipment_date: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut lines = Vec::with_capacity(input.items.len());
        for item in &input.items {
            if InventoryEntity::find_by_id(item.warehouse_inventory_id)
                .one(&txn)
                .await?
                .is_none()
            {
                return Err(ServiceError::InvalidReference(format!(
                    "warehouse inventory {} does not exist",
                    item.warehouse_inventory_id
                )));
            }

            let pos_line = InventoryEntity::find_by_id(item.pos_inventory_id)
                .one(&self.stores.pos)
                .await?
                .ok_or_else(|| {
                    ServiceError::InvalidReference(format!(
                        "POS inventory {} does not exist",
                        item.pos_inventory_id
                    ))
                })?;

            let item_id = Uuid::new_v4();
            shipment_item::ActiveModel {
                id: Set(item_id),
                shipment_id: Set(shipment_id),
                warehouse_inventory_id: Set(item.warehouse_inventory_id),
                pos_inventory_id: Set(item.pos_inventory_id),
                product_unit_id: Set(item.product_unit_id),
                quantity: Set(item.quantity),
                status: Set(ShipmentStatus::Pending),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await?;

            lines.push(RequestLineEnvelope {
                line_id: item_id,
                pos_inventory_id: item.pos_inventory_id,
                product_id: pos_line.product_id,
                quantity: item.quantity,
            });
        }

        let envelope = RequestEnvelope {
            request_id: shipment_id,
            from_branch_id: input.from_branch_id,
            to_branch_id: input.to_branch_id,
            lines,
            created_at: now,
        };
        RequestOutbox::enqueue(&txn, &envelope).await?;

        txn.commit().await.map_err(ServiceError::transaction)?;
        counter!("stock_transfer.shipments.created", 1);
        info!(%shipment_id, shipment_number = %number, "shipment created");

        let request_mirrored = match self.outbox.deliver_for_shipment(shipment_id).await {
            Ok(mirrored) => mirrored,
            Err(e) => {
                warn!(
                    %shipment_id,
                    error = %e,
                    "request not mirrored yet; left for reconciliation"
                );
                false
            }
        };

        Ok(CreatedShipment {
            shipment_id,
            shipment_number: number,
            request_mirrored,
        })
    }

    /// Parses an API status value and applies it as an operator transition.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: &str,
    ) -> Result<ShipmentDetail, ServiceError> {
        let target = ShipmentStatus::from_str(status.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "invalid status '{}'; expected Pending, Approved or Rejected",
                status
            ))
        })?;
        self.apply_transition(id, target, TransitionTrigger::Operator)
            .await?;
        self.get_shipment(id).await
    }

    /// Moves a Pending shipment to `Approved` or `Rejected`.
    ///
    /// Approval decrements every item's warehouse inventory under the
    /// sufficiency guard in the same transaction as the status write; any
    /// failed guard rolls the whole approval back. The status write is
    /// itself guarded on `Pending`, so two racing approvals apply stock once.
    #[instrument(skip(self), fields(shipment_id = %id))]
    pub async fn apply_transition(
        &self,
        id: Uuid,
        target: ShipmentStatus,
        trigger: TransitionTrigger,
    ) -> Result<shipment::Model, ServiceError> {
        if !matches!(target, ShipmentStatus::Approved | ShipmentStatus::Rejected) {
            return Err(ServiceError::InvalidTransition(format!(
                "shipment {} cannot be moved to {}",
                id, target
            )));
        }

        let start = Instant::now();
        let txn = self.stores.warehouse.begin().await.map_err(ServiceError::transaction)?;

        let current = ShipmentEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("shipment {} not found", id)))?;

        if !current.status.can_transition_to(target) {
            return Err(ServiceError::InvalidTransition(format!(
                "shipment {} is {} and cannot become {}",
                id, current.status, target
            )));
        }

        let items = if target == ShipmentStatus::Approved {
            let items = current
                .find_related(ShipmentItemEntity)
                .all(&txn)
                .await?;
            for item in &items {
                apply_delta(&txn, item.warehouse_inventory_id, -item.quantity).await?;
            }
            items.len()
        } else {
            0
        };

        let updated = set_status(&txn, id, ShipmentStatus::Pending, target).await?;
        txn.commit().await.map_err(ServiceError::transaction)?;

        counter!(
            "stock_transfer.shipments.transitioned",
            1,
            "to" => target.to_string(),
            "trigger" => trigger.to_string()
        );
        histogram!("stock_transfer.shipments.transition_duration", start.elapsed());
        info!(%trigger, status = %target, items, "shipment transitioned");
        Ok(updated)
    }

    /// Applies the destination half of an Approved shipment and marks it
    /// Completed.
    ///
    /// POS increments are recorded with one receipt per item in the same POS
    /// transaction, so a crash between the POS and warehouse commits is
    /// repaired by the next call without double counting.
    #[instrument(skip(self), fields(shipment_id = %id))]
    pub async fn complete_shipment(&self, id: Uuid) -> Result<CompletionOutcome, ServiceError> {
        let Some(current) = ShipmentEntity::find_by_id(id)
            .one(&self.stores.warehouse)
            .await?
        else {
            return Err(ServiceError::NotFound(format!("shipment {} not found", id)));
        };
        if current.status != ShipmentStatus::Approved {
            return Ok(CompletionOutcome::Skipped);
        }

        let items = current
            .find_related(ShipmentItemEntity)
            .all(&self.stores.warehouse)
            .await?;

        let pos_txn = self.stores.pos.begin().await.map_err(ServiceError::transaction)?;
        let mut received = 0;
        for item in &items {
            if ReceiptEntity::find_by_id(item.id).one(&pos_txn).await?.is_some() {
                continue;
            }
            apply_delta(&pos_txn, item.pos_inventory_id, item.quantity).await?;
            transfer_receipt::ActiveModel {
                id: Set(item.id),
                shipment_id: Set(id),
                pos_inventory_id: Set(item.pos_inventory_id),
                quantity: Set(item.quantity),
                received_at: Set(Utc::now()),
            }
            .insert(&pos_txn)
            .await?;
            received += 1;
        }
        pos_txn.commit().await.map_err(ServiceError::transaction)?;

        let txn = self.stores.warehouse.begin().await.map_err(ServiceError::transaction)?;
        match set_status(&txn, id, ShipmentStatus::Approved, ShipmentStatus::Completed).await {
            Ok(_) => {
                txn.commit().await.map_err(ServiceError::transaction)?;
                counter!("stock_transfer.shipments.completed", 1);
                info!(items_received = received, "shipment completed");
                Ok(CompletionOutcome::Completed {
                    items_received: received,
                })
            }
            Err(ServiceError::InvalidTransition(_)) => Ok(CompletionOutcome::Skipped),
            Err(e) => Err(e),
        }
    }

    pub async fn approved_shipment_ids(&self) -> Result<Vec<Uuid>, ServiceError> {
        let rows = ShipmentEntity::find()
            .filter(shipment::Column::Status.eq(ShipmentStatus::Approved))
            .order_by_asc(shipment::Column::UpdatedAt)
            .all(&self.stores.warehouse)
            .await?;
        Ok(rows.into_iter().map(|s| s.id).collect())
    }

    pub async fn find_shipment(&self, id: Uuid) -> Result<Option<shipment::Model>, ServiceError> {
        Ok(ShipmentEntity::find_by_id(id)
            .one(&self.stores.warehouse)
            .await?)
    }

    pub async fn get_shipment(&self, id: Uuid) -> Result<ShipmentDetail, ServiceError> {
        let shipment = self
            .find_shipment(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("shipment {} not found", id)))?;
        let items = shipment
            .find_related(ShipmentItemEntity)
            .order_by_asc(shipment_item::Column::CreatedAt)
            .all(&self.stores.warehouse)
            .await?;
        Ok(ShipmentDetail { shipment, items })
    }

    pub async fn get_item(&self, id: Uuid) -> Result<shipment_item::Model, ServiceError> {
        ShipmentItemEntity::find_by_id(id)
            .one(&self.stores.warehouse)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("shipment item {} not found", id)))
    }

    /// Newest first. Returns the page and the total row count.
    pub async fn list_shipments(
        &self,
        page: u64,
        limit: u64,
        status: Option<ShipmentStatus>,
    ) -> Result<(Vec<shipment::Model>, u64), ServiceError> {
        let mut query = ShipmentEntity::find().order_by_desc(shipment::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(shipment::Column::Status.eq(status));
        }
        let paginator = query.paginate(&self.stores.warehouse, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// Administrative delete of a shipment, its items and its outbox row.
    /// The POS request is left alone; reconciliation tombstones it.
    #[instrument(skip(self))]
    pub async fn delete_shipment(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.stores.warehouse.begin().await.map_err(ServiceError::transaction)?;
        if ShipmentEntity::find_by_id(id).one(&txn).await?.is_none() {
            return Err(ServiceError::NotFound(format!("shipment {} not found", id)));
        }

        ShipmentItemEntity::delete_many()
            .filter(shipment_item::Column::ShipmentId.eq(id))
            .exec(&txn)
            .await?;
        OutboxEntity::delete_many()
            .filter(request_outbox::Column::ShipmentId.eq(id))
            .exec(&txn)
            .await?;
        ShipmentEntity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await.map_err(ServiceError::transaction)?;

        warn!(shipment_id = %id, "shipment deleted by administrator");
        Ok(())
    }
}

/// Compare-and-set of the shipment status and its items' statuses.
async fn set_status(
    txn: &DatabaseTransaction,
    id: Uuid,
    expected: ShipmentStatus,
    target: ShipmentStatus,
) -> Result<shipment::Model, ServiceError> {
    let now = Utc::now();
    let result = ShipmentEntity::update_many()
        .col_expr(shipment::Column::Status, Expr::value(target))
        .col_expr(shipment::Column::UpdatedAt, Expr::value(now))
        .filter(shipment::Column::Id.eq(id))
        .filter(shipment::Column::Status.eq(expected))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InvalidTransition(format!(
            "shipment {} is no longer {}",
            id, expected
        )));
    }

    ShipmentItemEntity::update_many()
        .col_expr(shipment_item::Column::Status, Expr::value(target))
        .col_expr(shipment_item::Column::UpdatedAt, Expr::value(now))
        .filter(shipment_item::Column::ShipmentId.eq(id))
        .exec(txn)
        .await?;

    ShipmentEntity::find_by_id(id)
        .one(txn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("shipment {} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i32) -> NewShipmentItem {
        NewShipmentItem {
            warehouse_inventory_id: Uuid::new_v4(),
            pos_inventory_id: Uuid::new_v4(),
            product_unit_id: None,
            quantity,
        }
    }

    #[test]
    fn validation_rejects_empty_and_non_positive() {
        let mut input = NewShipment {
            from_branch_id: Uuid::new_v4(),
            to_branch_id: Uuid::new_v4(),
            items: vec![],
        };
        assert!(matches!(input.validate(), Err(ServiceError::ValidationError(_))));

        input.items = vec![item(2), item(0)];
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("items[1]"));

        input.items = vec![item(2)];
        assert!(input.validate().is_ok());

        input.to_branch_id = input.from_branch_id;
        assert!(input.validate().is_err());
    }

    #[test]
    fn validation_rejects_total_beyond_i32() {
        let mut input = NewShipment {
            from_branch_id: Uuid::new_v4(),
            to_branch_id: Uuid::new_v4(),
            items: vec![item(i32::MAX), item(i32::MAX)],
        };
        let err = input.validate().unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
        assert!(err.to_string().contains("total quantity"));

        input.items = vec![item(i32::MAX - 1), item(1)];
        assert!(input.validate().is_ok());
    }

    #[test]
    fn shipment_number_format() {
        let id = Uuid::parse_str("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap();
        let at = DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(shipment_number(id, at), "SH-20240305-6F9619FF");
    }
}
