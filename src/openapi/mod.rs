use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stock Transfer API",
        version = "0.1.0",
        description = r#"
# Warehouse to POS stock transfers

Shipments are created on the warehouse side and mirrored to the POS store
as requests with the same id. A POS operator completes or rejects the
request; a background reconciliation loop approves or rejects the shipment
to match, then completes approved shipments by crediting POS inventory.

## Statuses

- Shipment: `Pending`, `Approved`, `Rejected`, `Completed`
- Request: `pending`, `complete`, `reject`

## Error Handling

Errors share one body:

```json
{
  "error": "Conflict",
  "message": "Insufficient inventory for 33333333-...: requested 20",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `limit` (default 20, max 100).
        "#
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "shipments", description = "Warehouse shipments and their items"),
        (name = "requests", description = "POS mirrors of shipments"),
        (name = "inventory", description = "Inventory rows of either store")
    ),
    paths(
        crate::handlers::shipments::list_shipments,
        crate::handlers::shipments::get_shipment,
        crate::handlers::shipments::create_shipment,
        crate::handlers::shipments::update_shipment_status,
        crate::handlers::shipments::delete_shipment,
        crate::handlers::shipments::get_shipment_item,
        crate::handlers::requests::list_requests,
        crate::handlers::requests::get_request,
        crate::handlers::requests::update_request_status,
        crate::handlers::inventory::list_inventory,
        crate::handlers::inventory::get_inventory,
        crate::handlers::inventory::list_inventory_by_branch,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::db::Store,
            crate::entities::ShipmentStatus,
            crate::entities::RequestStatus,

            crate::handlers::shipments::ShipmentSummary,
            crate::handlers::shipments::ShipmentItemSummary,
            crate::handlers::shipments::ShipmentWithItems,
            crate::handlers::shipments::CreateShipmentRequest,
            crate::handlers::shipments::CreateShipmentItemRequest,
            crate::handlers::shipments::CreatedShipmentResponse,
            crate::handlers::shipments::UpdateShipmentStatusRequest,

            crate::handlers::requests::RequestSummary,
            crate::handlers::requests::RequestLineSummary,
            crate::handlers::requests::RequestWithLines,
            crate::handlers::requests::UpdateRequestStatusRequest,

            crate::handlers::inventory::InventoryItem,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_transfer_paths() {
        let json = serde_json::to_string(&ApiDoc::openapi()).unwrap();
        assert!(json.contains("Stock Transfer API"));
        assert!(json.contains("/Shipments/{id}"));
        assert!(json.contains("/Requests/{id}"));
        assert!(json.contains("/InventoriesByBranch"));
    }
}
