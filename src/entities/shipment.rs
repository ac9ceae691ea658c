use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Warehouse-side lifecycle of a transfer.
///
/// Status only moves forward: `Pending -> Approved | Rejected`, then
/// `Approved -> Completed`. `Rejected` and `Completed` are terminal.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[strum(ascii_case_insensitive)]
pub enum ShipmentStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "Approved")]
    Approved,
    #[sea_orm(string_value = "Rejected")]
    Rejected,
    #[sea_orm(string_value = "Completed")]
    Completed,
}

impl ShipmentStatus {
    pub fn can_transition_to(self, next: ShipmentStatus) -> bool {
        matches!(
            (self, next),
            (ShipmentStatus::Pending, ShipmentStatus::Approved)
                | (ShipmentStatus::Pending, ShipmentStatus::Rejected)
                | (ShipmentStatus::Approved, ShipmentStatus::Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ShipmentStatus::Rejected | ShipmentStatus::Completed)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shipments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub shipment_number: String,
    pub from_branch_id: Uuid,
    pub to_branch_id: Uuid,
    pub status: ShipmentStatus,
    pub shipment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::shipment_item::Entity")]
    ShipmentItems,
}

impl Related<super::shipment_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ShipmentItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::ShipmentStatus::*;
    use super::*;
    use std::str::FromStr;

    #[test]
    fn forward_transitions_only() {
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Completed));

        for from in [Approved, Rejected, Completed] {
            assert!(!from.can_transition_to(Pending), "{from} -> Pending");
        }
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!(ShipmentStatus::from_str("Approved").unwrap(), Approved);
        assert_eq!(ShipmentStatus::from_str("approved").unwrap(), Approved);
        assert!(ShipmentStatus::from_str("shipped").is_err());
        assert_eq!(Completed.to_string(), "Completed");
        assert!(Completed.is_terminal());
        assert!(!Approved.is_terminal());
    }
}
