use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::shipment::ShipmentStatus;

/// POS-side vocabulary for a mirrored transfer.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "complete")]
    Complete,
    #[sea_orm(string_value = "reject")]
    Reject,
}

impl RequestStatus {
    /// Warehouse status a terminal POS decision maps onto.
    pub fn target_shipment_status(self) -> Option<ShipmentStatus> {
        match self {
            RequestStatus::Pending => None,
            RequestStatus::Complete => Some(ShipmentStatus::Approved),
            RequestStatus::Reject => Some(ShipmentStatus::Rejected),
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }

    /// True when the warehouse shipment already reflects this decision.
    pub fn is_converged_with(self, shipment: ShipmentStatus) -> bool {
        match self {
            RequestStatus::Pending => shipment == ShipmentStatus::Pending,
            RequestStatus::Complete => matches!(
                shipment,
                ShipmentStatus::Approved | ShipmentStatus::Completed
            ),
            RequestStatus::Reject => shipment == ShipmentStatus::Rejected,
        }
    }
}

/// POS mirror of a shipment; `id` is the shipment id.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    /// Product of the first line.
    pub product_id: Uuid,
    /// Sum of all line quantities.
    pub quantity: i32,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::request_line::Entity")]
    Lines,
}

impl Related<super::request_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
