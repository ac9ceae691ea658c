// Core services
pub mod inventory;
pub mod requests;
pub mod shipments;

// Cross-store delivery and convergence
pub mod outbox;
pub mod reconciliation;
pub mod tombstones;

pub use inventory::InventoryService;
pub use outbox::RequestOutbox;
pub use reconciliation::{ReconciliationScheduler, TickReport};
pub use requests::RequestService;
pub use shipments::ShipmentService;
pub use tombstones::{TombstoneCache, TombstoneStore};
