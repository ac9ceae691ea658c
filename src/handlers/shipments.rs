use crate::{
    entities::{shipment, shipment_item, ShipmentStatus},
    errors::ServiceError,
    handlers::JsonBody,
    services::shipments::{CreatedShipment, NewShipment, NewShipmentItem, ShipmentDetail},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Default, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ShipmentListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Pending, Approved, Rejected or Completed
    pub status: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[schema(example = json!({
    "id": "990e8400-e29b-41d4-a716-446655440000",
    "shipment_number": "SH-20240305-990E8400",
    "from_branch_id": "11111111-1111-4111-8111-111111111111",
    "to_branch_id": "22222222-2222-4222-8222-222222222222",
    "status": "Pending",
    "shipment_date": "2024-03-05T10:30:00Z",
    "created_at": "2024-03-05T10:30:00Z",
    "updated_at": "2024-03-05T10:30:00Z"
}))]
pub struct ShipmentSummary {
    pub id: Uuid,
    pub shipment_number: String,
    /// Warehouse branch the stock leaves
    pub from_branch_id: Uuid,
    /// POS branch the stock arrives at
    pub to_branch_id: Uuid,
    pub status: ShipmentStatus,
    pub shipment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<shipment::Model> for ShipmentSummary {
    fn from(model: shipment::Model) -> Self {
        Self {
            id: model.id,
            shipment_number: model.shipment_number,
            from_branch_id: model.from_branch_id,
            to_branch_id: model.to_branch_id,
            status: model.status,
            shipment_date: model.shipment_date,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShipmentItemSummary {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub warehouse_inventory_id: Uuid,
    pub pos_inventory_id: Uuid,
    pub product_unit_id: Option<Uuid>,
    pub quantity: i32,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<shipment_item::Model> for ShipmentItemSummary {
    fn from(model: shipment_item::Model) -> Self {
        Self {
            id: model.id,
            shipment_id: model.shipment_id,
            warehouse_inventory_id: model.warehouse_inventory_id,
            pos_inventory_id: model.pos_inventory_id,
            product_unit_id: model.product_unit_id,
            quantity: model.quantity,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ShipmentWithItems {
    #[serde(flatten)]
    pub shipment: ShipmentSummary,
    pub items: Vec<ShipmentItemSummary>,
}

impl From<ShipmentDetail> for ShipmentWithItems {
    fn from(detail: ShipmentDetail) -> Self {
        Self {
            shipment: detail.shipment.into(),
            items: detail.items.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateShipmentItemRequest {
    pub warehouse_inventory_id: Uuid,
    pub pos_inventory_id: Uuid,
    pub product_unit_id: Option<Uuid>,
    #[validate(range(min = 1))]
    #[schema(example = 5)]
    pub quantity: i32,
}

/// Fields are optional so that a missing one is reported by name.
/// An empty `items` list is rejected by [`NewShipment::validate`].
#[derive(Debug, Deserialize, ToSchema)]
#[schema(example = json!({
    "from_branch_id": "11111111-1111-4111-8111-111111111111",
    "to_branch_id": "22222222-2222-4222-8222-222222222222",
    "items": [{
        "warehouse_inventory_id": "33333333-3333-4333-8333-333333333333",
        "pos_inventory_id": "44444444-4444-4444-8444-444444444444",
        "quantity": 5
    }]
}))]
pub struct CreateShipmentRequest {
    pub from_branch_id: Option<Uuid>,
    pub to_branch_id: Option<Uuid>,
    pub items: Option<Vec<CreateShipmentItemRequest>>,
}

impl TryFrom<CreateShipmentRequest> for NewShipment {
    type Error = ServiceError;

    fn try_from(payload: CreateShipmentRequest) -> Result<Self, Self::Error> {
        let missing = |field: &str| ServiceError::ValidationError(format!("{} is required", field));
        let from_branch_id = payload.from_branch_id.ok_or_else(|| missing("from_branch_id"))?;
        let to_branch_id = payload.to_branch_id.ok_or_else(|| missing("to_branch_id"))?;
        let items = payload.items.ok_or_else(|| missing("items"))?;

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            item.validate()?;
            lines.push(NewShipmentItem {
                warehouse_inventory_id: item.warehouse_inventory_id,
                pos_inventory_id: item.pos_inventory_id,
                product_unit_id: item.product_unit_id,
                quantity: item.quantity,
            });
        }

        Ok(NewShipment {
            from_branch_id,
            to_branch_id,
            items: lines,
        })
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateShipmentStatusRequest {
    /// Approved or Rejected
    #[validate(length(min = 1))]
    #[schema(example = "Approved")]
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/Shipments",
    params(ShipmentListQuery),
    responses(
        (status = 200, description = "Shipments listed", body = ApiResponse<PaginatedResponse<ShipmentSummary>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn list_shipments(
    State(state): State<AppState>,
    Query(query): Query<ShipmentListQuery>,
) -> ApiResult<PaginatedResponse<ShipmentSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let status = query
        .status
        .as_deref()
        .map(|s| {
            ShipmentStatus::from_str(s)
                .map_err(|_| ServiceError::ValidationError(format!("unknown status '{}'", s)))
        })
        .transpose()?;

    let (rows, total) = state
        .services
        .shipments
        .list_shipments(page, limit, status)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        rows.into_iter().map(ShipmentSummary::from).collect(),
        total,
        page,
        limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/Shipments/{id}",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Shipment with items", body = ApiResponse<ShipmentWithItems>),
        (status = 404, description = "Shipment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn get_shipment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ShipmentWithItems> {
    let detail = state.services.shipments.get_shipment(id).await?;
    Ok(Json(ApiResponse::success(detail.into())))
}

#[utoipa::path(
    post,
    path = "/Shipments",
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created", body = ApiResponse<CreatedShipmentResponse>),
        (status = 400, description = "Invalid input or unknown inventory line", body = crate::errors::ErrorResponse),
        (status = 500, description = "Transaction failed", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedShipmentResponse>>), ServiceError> {
    let input = NewShipment::try_from(payload)?;
    let created = state.services.shipments.create_shipment(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(created.into())),
    ))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedShipmentResponse {
    pub shipment_id: Uuid,
    pub shipment_number: String,
    /// False when the POS request is still waiting in the outbox
    pub request_mirrored: bool,
}

impl From<CreatedShipment> for CreatedShipmentResponse {
    fn from(created: CreatedShipment) -> Self {
        Self {
            shipment_id: created.shipment_id,
            shipment_number: created.shipment_number,
            request_mirrored: created.request_mirrored,
        }
    }
}

#[utoipa::path(
    put,
    path = "/Shipments/{id}",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    request_body = UpdateShipmentStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<ShipmentWithItems>),
        (status = 400, description = "Invalid status or transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Shipment not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient warehouse inventory", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn update_shipment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateShipmentStatusRequest>,
) -> ApiResult<ShipmentWithItems> {
    payload.validate()?;
    let detail = state
        .services
        .shipments
        .update_status(id, &payload.status)
        .await?;
    Ok(Json(ApiResponse::success(detail.into())))
}

#[utoipa::path(
    delete,
    path = "/Shipments/{id}",
    params(("id" = Uuid, Path, description = "Shipment ID")),
    responses(
        (status = 200, description = "Shipment deleted"),
        (status = 404, description = "Shipment not found", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn delete_shipment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<serde_json::Value> {
    state.services.shipments.delete_shipment(id).await?;
    Ok(Json(ApiResponse::success(json!({ "deleted": id }))))
}

#[utoipa::path(
    get,
    path = "/ShipmentItems/{id}",
    params(("id" = Uuid, Path, description = "Shipment item ID")),
    responses(
        (status = 200, description = "Shipment item", body = ApiResponse<ShipmentItemSummary>),
        (status = 404, description = "Shipment item not found", body = crate::errors::ErrorResponse)
    ),
    tag = "shipments"
)]
pub async fn get_shipment_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ShipmentItemSummary> {
    let item = state.services.shipments.get_item(id).await?;
    Ok(Json(ApiResponse::success(item.into())))
}
