use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    db::Stores,
    entities::{
        request::{self, Entity as RequestEntity, RequestStatus},
        request_line,
        request_outbox::{self, Entity as OutboxEntity, OutboxStatus},
    },
    errors::ServiceError,
};

/// The POS request a shipment should produce, as stored in the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: Uuid,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    pub lines: Vec<RequestLineEnvelope>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLineEnvelope {
    pub line_id: Uuid,
    pub pos_inventory_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

impl RequestEnvelope {
    pub fn total_quantity(&self) -> Result<i32, ServiceError> {
        self.lines
            .iter()
            .try_fold(0i32, |acc, l| acc.checked_add(l.quantity))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "request {} total quantity overflows",
                    self.request_id
                ))
            })
    }

    fn head_product(&self) -> Result<Uuid, ServiceError> {
        self.lines
            .first()
            .map(|l| l.product_id)
            .ok_or_else(|| {
                ServiceError::InternalError(format!("request {} has no lines", self.request_id))
            })
    }
}

/// Counts from one outbox drain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutboxReport {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Writes outbox rows on the warehouse side and delivers them to the POS
/// store. Delivery is at-least-once; the POS side deduplicates by request id.
#[derive(Clone)]
pub struct RequestOutbox {
    stores: Stores,
    max_attempts: i32,
}

impl RequestOutbox {
    pub fn new(stores: Stores, max_attempts: i32) -> Self {
        Self {
            stores,
            max_attempts,
        }
    }

    /// Records the envelope inside the caller's warehouse transaction.
    pub async fn enqueue<C>(conn: &C, envelope: &RequestEnvelope) -> Result<Uuid, ServiceError>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();
        let id = Uuid::new_v4();
        request_outbox::ActiveModel {
            id: Set(id),
            shipment_id: Set(envelope.request_id),
            payload: Set(serde_json::to_string(envelope)?),
            status: Set(OutboxStatus::Pending),
            attempts: Set(0),
            last_error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        debug!(outbox_id = %id, shipment_id = %envelope.request_id, "request enqueued");
        Ok(id)
    }

    /// Writes the request and its lines to the POS store unless a request
    /// with the same id is already there. Returns `true` if it inserted.
    pub async fn write_request(&self, envelope: &RequestEnvelope) -> Result<bool, ServiceError> {
        let product_id = envelope.head_product()?;
        let quantity = envelope.total_quantity()?;
        let txn = self.stores.pos.begin().await.map_err(ServiceError::transaction)?;

        if RequestEntity::find_by_id(envelope.request_id)
            .one(&txn)
            .await?
            .is_some()
        {
            debug!(request_id = %envelope.request_id, "request already mirrored");
            return Ok(false);
        }

        let now = Utc::now();
        request::ActiveModel {
            id: Set(envelope.request_id),
            from_branch_id: Set(envelope.from_branch_id),
            to_branch_id: Set(envelope.to_branch_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            status: Set(RequestStatus::Pending),
            created_at: Set(envelope.created_at),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in &envelope.lines {
            request_line::ActiveModel {
                id: Set(line.line_id),
                request_id: Set(envelope.request_id),
                pos_inventory_id: Set(line.pos_inventory_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await.map_err(ServiceError::transaction)?;
        Ok(true)
    }

    /// Delivers one outbox row and records the outcome on it.
    #[instrument(skip(self, row), fields(shipment_id = %row.shipment_id, attempts = row.attempts))]
    pub async fn deliver(&self, row: &request_outbox::Model) -> Result<OutboxStatus, ServiceError> {
        let outcome = match serde_json::from_str::<RequestEnvelope>(&row.payload) {
            Ok(envelope) => self.write_request(&envelope).await.map(|_| ()),
            Err(e) => Err(ServiceError::from(e)),
        };

        let attempts = row.attempts + 1;
        let (status, last_error) = match &outcome {
            Ok(()) => (OutboxStatus::Delivered, None),
            Err(e) if attempts >= self.max_attempts => (OutboxStatus::Failed, Some(e.to_string())),
            Err(e) => (OutboxStatus::Pending, Some(e.to_string())),
        };

        OutboxEntity::update_many()
            .col_expr(request_outbox::Column::Status, Expr::value(status))
            .col_expr(request_outbox::Column::Attempts, Expr::value(attempts))
            .col_expr(request_outbox::Column::LastError, Expr::value(last_error))
            .col_expr(request_outbox::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(request_outbox::Column::Id.eq(row.id))
            .exec(&self.stores.warehouse)
            .await?;

        match (&outcome, status) {
            (Ok(()), _) => {
                counter!("stock_transfer.outbox.delivered", 1);
                info!("request mirrored to POS store");
            }
            (Err(e), OutboxStatus::Failed) => {
                counter!("stock_transfer.outbox.failed", 1);
                warn!(error = %e, "giving up on request delivery");
            }
            (Err(e), _) => {
                counter!("stock_transfer.outbox.retried", 1);
                warn!(error = %e, "request delivery failed; will retry");
            }
        }
        Ok(status)
    }

    /// Delivers the outbox row of one shipment if it is still pending.
    pub async fn deliver_for_shipment(&self, shipment_id: Uuid) -> Result<bool, ServiceError> {
        let row = OutboxEntity::find()
            .filter(request_outbox::Column::ShipmentId.eq(shipment_id))
            .filter(request_outbox::Column::Status.eq(OutboxStatus::Pending))
            .one(&self.stores.warehouse)
            .await?;
        match row {
            Some(row) => Ok(self.deliver(&row).await? == OutboxStatus::Delivered),
            None => Ok(false),
        }
    }

    /// Drains up to `batch_size` pending rows, oldest first.
    pub async fn deliver_pending(&self, batch_size: u64) -> Result<OutboxReport, ServiceError> {
        let rows = OutboxEntity::find()
            .filter(request_outbox::Column::Status.eq(OutboxStatus::Pending))
            .order_by_asc(request_outbox::Column::CreatedAt)
            .limit(batch_size)
            .all(&self.stores.warehouse)
            .await?;

        let mut report = OutboxReport::default();
        for row in rows {
            match self.deliver(&row).await {
                Ok(OutboxStatus::Delivered) => report.delivered += 1,
                Ok(OutboxStatus::Pending) => report.retried += 1,
                Ok(OutboxStatus::Failed) => report.failed += 1,
                Err(e) => {
                    report.retried += 1;
                    warn!(outbox_id = %row.id, error = %e, "could not record delivery outcome");
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_totals_lines() {
        let envelope = RequestEnvelope {
            request_id: Uuid::new_v4(),
            from_branch_id: Uuid::new_v4(),
            to_branch_id: Uuid::new_v4(),
            lines: vec![
                RequestLineEnvelope {
                    line_id: Uuid::new_v4(),
                    pos_inventory_id: Uuid::new_v4(),
                    product_id: Uuid::new_v4(),
                    quantity: 3,
                },
                RequestLineEnvelope {
                    line_id: Uuid::new_v4(),
                    pos_inventory_id: Uuid::new_v4(),
                    product_id: Uuid::new_v4(),
                    quantity: 4,
                },
            ],
            created_at: Utc::now(),
        };
        assert_eq!(envelope.total_quantity().unwrap(), 7);
        assert_eq!(envelope.head_product().unwrap(), envelope.lines[0].product_id);

        let json = serde_json::to_string(&envelope).unwrap();
        let back: RequestEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn overflowing_total_is_an_error() {
        let line = |quantity| RequestLineEnvelope {
            line_id: Uuid::new_v4(),
            pos_inventory_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity,
        };
        let envelope = RequestEnvelope {
            request_id: Uuid::new_v4(),
            from_branch_id: Uuid::new_v4(),
            to_branch_id: Uuid::new_v4(),
            lines: vec![line(i32::MAX), line(i32::MAX)],
            created_at: Utc::now(),
        };
        assert!(matches!(
            envelope.total_quantity(),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn empty_envelope_has_no_head_product() {
        let envelope = RequestEnvelope {
            request_id: Uuid::nil(),
            from_branch_id: Uuid::nil(),
            to_branch_id: Uuid::nil(),
            lines: vec![],
            created_at: Utc::now(),
        };
        assert!(matches!(
            envelope.head_product(),
            Err(ServiceError::InternalError(_))
        ));
    }
}
