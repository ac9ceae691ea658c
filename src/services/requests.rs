use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::str::FromStr;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    db::Stores,
    entities::{
        request::{self, Entity as RequestEntity, RequestStatus},
        request_line::{self, Entity as RequestLineEntity},
    },
    errors::ServiceError,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestDetail {
    pub request: request::Model,
    pub lines: Vec<request_line::Model>,
}

/// POS side of a transfer. Request status is owned here; the warehouse
/// learns about decisions only through reconciliation.
#[derive(Clone)]
pub struct RequestService {
    stores: Stores,
}

impl RequestService {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn find_request(&self, id: Uuid) -> Result<Option<request::Model>, ServiceError> {
        Ok(RequestEntity::find_by_id(id).one(&self.stores.pos).await?)
    }

    pub async fn get_request(&self, id: Uuid) -> Result<RequestDetail, ServiceError> {
        let request = self
            .find_request(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("request {} not found", id)))?;
        let lines = request
            .find_related(RequestLineEntity)
            .all(&self.stores.pos)
            .await?;
        Ok(RequestDetail { request, lines })
    }

    pub async fn list_requests(
        &self,
        page: u64,
        limit: u64,
        status: Option<RequestStatus>,
    ) -> Result<(Vec<request::Model>, u64), ServiceError> {
        let mut query = RequestEntity::find().order_by_desc(request::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(request::Column::Status.eq(status));
        }
        let paginator = query.paginate(&self.stores.pos, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// Requests the POS operator has decided on, oldest decision first.
    pub async fn decided_requests(&self) -> Result<Vec<request::Model>, ServiceError> {
        Ok(RequestEntity::find()
            .filter(
                request::Column::Status.is_in([RequestStatus::Complete, RequestStatus::Reject]),
            )
            .order_by_asc(request::Column::UpdatedAt)
            .all(&self.stores.pos)
            .await?)
    }

    /// Operator decision on the POS side. `complete` and `reject` are final;
    /// repeating the current status is accepted as a no-op.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: Uuid,
        status: &str,
    ) -> Result<RequestDetail, ServiceError> {
        let target = RequestStatus::from_str(&status.trim().to_lowercase()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "invalid status '{}'; expected pending, complete or reject",
                status
            ))
        })?;

        let current = self
            .find_request(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("request {} not found", id)))?;

        if current.status == target {
            return self.get_request(id).await;
        }
        if current.status.is_terminal() {
            return Err(ServiceError::InvalidTransition(format!(
                "request {} is already {}",
                id, current.status
            )));
        }

        let result = RequestEntity::update_many()
            .col_expr(request::Column::Status, Expr::value(target))
            .col_expr(request::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(request::Column::Id.eq(id))
            .filter(request::Column::Status.eq(current.status))
            .exec(&self.stores.pos)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidTransition(format!(
                "request {} changed concurrently",
                id
            )));
        }

        counter!("stock_transfer.requests.decided", 1, "status" => target.to_string());
        info!(request_id = %id, status = %target, "request status updated");
        self.get_request(id).await
    }
}
