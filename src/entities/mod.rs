// Warehouse store
pub mod request_outbox;
pub mod shipment;
pub mod shipment_item;

// POS store
pub mod request;
pub mod request_line;
pub mod transfer_receipt;

// Both stores
pub mod inventory;

pub use request::RequestStatus;
pub use request_outbox::OutboxStatus;
pub use shipment::ShipmentStatus;
