use crate::db::Store;
use crate::entities::inventory;
use crate::services::inventory::InventoryService;
use crate::{ApiResponse, ApiResult};
use axum::extract::{Json, Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

// Trait for inventory handler state that provides access to inventory service
pub trait InventoryHandlerState: Clone + Send + Sync + 'static {
    fn inventory_service(&self) -> &InventoryService;
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InventoryItem {
    pub id: Uuid,
    pub store: Store,
    pub product_id: Uuid,
    pub product_unit_id: Option<Uuid>,
    pub branch_id: Uuid,
    pub quantity: i32,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    fn from_model(store: Store, model: inventory::Model) -> Self {
        Self {
            id: model.id,
            store,
            product_id: model.product_id,
            product_unit_id: model.product_unit_id,
            branch_id: model.branch_id,
            quantity: model.quantity,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BranchInventoryQuery {
    pub branch_id: Uuid,
    /// warehouse or pos; defaults to warehouse
    pub store: Option<Store>,
}

#[utoipa::path(
    get,
    path = "/Inventory/{store}",
    params(("store" = Store, Path, description = "warehouse or pos")),
    responses(
        (status = 200, description = "Inventory rows of one store", body = ApiResponse<Vec<InventoryItem>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Unknown store", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_inventory<S>(
    State(state): State<S>,
    Path(store): Path<Store>,
) -> ApiResult<Vec<InventoryItem>>
where
    S: InventoryHandlerState,
{
    let rows = state.inventory_service().list(store).await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter()
            .map(|m| InventoryItem::from_model(store, m))
            .collect(),
    )))
}

#[utoipa::path(
    get,
    path = "/Inventory/{store}/{id}",
    params(
        ("store" = Store, Path, description = "warehouse or pos"),
        ("id" = Uuid, Path, description = "Inventory row ID")
    ),
    responses(
        (status = 200, description = "Inventory row", body = ApiResponse<InventoryItem>),
        (status = 404, description = "Inventory row not found", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn get_inventory<S>(
    State(state): State<S>,
    Path((store, id)): Path<(Store, Uuid)>,
) -> ApiResult<InventoryItem>
where
    S: InventoryHandlerState,
{
    let row = state.inventory_service().get(store, id).await?;
    Ok(Json(ApiResponse::success(InventoryItem::from_model(store, row))))
}

#[utoipa::path(
    get,
    path = "/InventoriesByBranch",
    params(BranchInventoryQuery),
    responses(
        (status = 200, description = "Inventory rows of one branch", body = ApiResponse<Vec<InventoryItem>>),
        (status = 400, description = "Missing or malformed branch_id", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn list_inventory_by_branch<S>(
    State(state): State<S>,
    Query(query): Query<BranchInventoryQuery>,
) -> ApiResult<Vec<InventoryItem>>
where
    S: InventoryHandlerState,
{
    let store = query.store.unwrap_or(Store::Warehouse);
    let rows = state
        .inventory_service()
        .list_by_branch(store, query.branch_id)
        .await?;
    Ok(Json(ApiResponse::success(
        rows.into_iter()
            .map(|m| InventoryItem::from_model(store, m))
            .collect(),
    )))
}
