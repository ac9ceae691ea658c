use crate::{
    entities::{request, request_line, RequestStatus},
    errors::ServiceError,
    handlers::JsonBody,
    services::requests::RequestDetail,
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Default, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RequestListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// pending, complete or reject
    pub status: Option<String>,
}

/// POS view of a transfer. `id` equals the shipment id.
#[derive(Debug, Serialize, ToSchema)]
pub struct RequestSummary {
    pub id: Uuid,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<request::Model> for RequestSummary {
    fn from(model: request::Model) -> Self {
        Self {
            id: model.id,
            from_branch_id: model.from_branch_id,
            to_branch_id: model.to_branch_id,
            product_id: model.product_id,
            quantity: model.quantity,
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestLineSummary {
    pub id: Uuid,
    pub pos_inventory_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}

impl From<request_line::Model> for RequestLineSummary {
    fn from(model: request_line::Model) -> Self {
        Self {
            id: model.id,
            pos_inventory_id: model.pos_inventory_id,
            product_id: model.product_id,
            quantity: model.quantity,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RequestWithLines {
    #[serde(flatten)]
    pub request: RequestSummary,
    pub lines: Vec<RequestLineSummary>,
}

impl From<RequestDetail> for RequestWithLines {
    fn from(detail: RequestDetail) -> Self {
        Self {
            request: detail.request.into(),
            lines: detail.lines.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRequestStatusRequest {
    #[validate(length(min = 1))]
    #[schema(example = "complete")]
    pub status: String,
}

#[utoipa::path(
    get,
    path = "/Requests",
    params(RequestListQuery),
    responses(
        (status = 200, description = "POS requests listed", body = ApiResponse<PaginatedResponse<RequestSummary>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse)
    ),
    tag = "requests"
)]
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<PaginatedResponse<RequestSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let status = query
        .status
        .as_deref()
        .map(|s| {
            RequestStatus::from_str(&s.to_lowercase())
                .map_err(|_| ServiceError::ValidationError(format!("unknown status '{}'", s)))
        })
        .transpose()?;

    let (rows, total) = state
        .services
        .requests
        .list_requests(page, limit, status)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        rows.into_iter().map(RequestSummary::from).collect(),
        total,
        page,
        limit,
    ))))
}

#[utoipa::path(
    get,
    path = "/Requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID (same as the shipment ID)")),
    responses(
        (status = 200, description = "Request with lines", body = ApiResponse<RequestWithLines>),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse)
    ),
    tag = "requests"
)]
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestWithLines> {
    let detail = state.services.requests.get_request(id).await?;
    Ok(Json(ApiResponse::success(detail.into())))
}

/// POS operator decision. The warehouse shipment follows on the next
/// reconciliation tick.
#[utoipa::path(
    put,
    path = "/Requests/{id}",
    params(("id" = Uuid, Path, description = "Request ID")),
    request_body = UpdateRequestStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<RequestWithLines>),
        (status = 400, description = "Invalid status or request already decided", body = crate::errors::ErrorResponse),
        (status = 404, description = "Request not found", body = crate::errors::ErrorResponse)
    ),
    tag = "requests"
)]
pub async fn update_request_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    JsonBody(payload): JsonBody<UpdateRequestStatusRequest>,
) -> ApiResult<RequestWithLines> {
    payload.validate()?;
    let detail = state
        .services
        .requests
        .update_status(id, &payload.status)
        .await?;
    Ok(Json(ApiResponse::success(detail.into())))
}
