//! Stock Transfer API Library
//!
//! Warehouse to point-of-sale stock transfers across two independently
//! owned databases, kept consistent by a background reconciliation loop.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use handlers::inventory::InventoryHandlerState;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub stores: db::Stores,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(stores: db::Stores, config: config::AppConfig) -> Self {
        let services = handlers::AppServices::new(&stores, &config);
        Self {
            stores,
            config,
            services,
        }
    }
}

impl InventoryHandlerState for AppState {
    fn inventory_service(&self) -> &services::InventoryService {
        &self.services.inventory
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let limit = limit.max(1);
        Self {
            items,
            total,
            page,
            limit,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Transfer routes. Paths keep the capitalised resource names existing
/// clients call.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/Shipments",
            get(handlers::shipments::list_shipments).post(handlers::shipments::create_shipment),
        )
        .route(
            "/Shipments/:id",
            get(handlers::shipments::get_shipment)
                .put(handlers::shipments::update_shipment_status)
                .delete(handlers::shipments::delete_shipment),
        )
        .route(
            "/ShipmentItems/:id",
            get(handlers::shipments::get_shipment_item),
        )
        .route("/Requests", get(handlers::requests::list_requests))
        .route(
            "/Requests/:id",
            get(handlers::requests::get_request).put(handlers::requests::update_request_status),
        )
        .route(
            "/Inventory/:store",
            get(handlers::inventory::list_inventory::<AppState>),
        )
        .route(
            "/Inventory/:store/:id",
            get(handlers::inventory::get_inventory::<AppState>),
        )
        .route(
            "/InventoriesByBranch",
            get(handlers::inventory::list_inventory_by_branch::<AppState>),
        )
}

/// Full application router: transfer routes, health checks and Swagger UI.
/// Middleware layers are added by the binary.
pub fn app_router(state: AppState) -> Router {
    let stores = state.stores.clone();
    Router::new()
        .merge(api_routes().with_state(state))
        .nest("/health", health::health_routes(stores))
        .merge(openapi::swagger_ui())
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn pagination_rounds_pages_up() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 0, 1, 20).total_pages, 0);
    }
}
