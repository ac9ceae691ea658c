use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;
use tracing::{error, info};

/// Schema of the warehouse store: shipments, their items, warehouse
/// inventory and the request outbox.
pub struct WarehouseMigrator;

#[async_trait::async_trait]
impl MigratorTrait for WarehouseMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_inventory_table::Migration),
            Box::new(m20240301_000002_create_shipments_tables::Migration),
            Box::new(m20240301_000003_create_request_outbox_table::Migration),
        ]
    }
}

/// Schema of the POS store: mirrored requests, POS inventory and transfer
/// receipts.
pub struct PosMigrator;

#[async_trait::async_trait]
impl MigratorTrait for PosMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_inventory_table::Migration),
            Box::new(m20240301_000004_create_requests_tables::Migration),
            Box::new(m20240301_000005_create_transfer_receipts_table::Migration),
        ]
    }
}

/// Applies pending migrations to both stores.
pub async fn run_all(
    warehouse: &DatabaseConnection,
    pos: &DatabaseConnection,
) -> Result<(), DbErr> {
    info!("Running warehouse store migrations");
    WarehouseMigrator::up(warehouse, None).await.map_err(|e| {
        error!("Warehouse migration failed: {}", e);
        e
    })?;

    info!("Running POS store migrations");
    PosMigrator::up(pos, None).await.map_err(|e| {
        error!("POS migration failed: {}", e);
        e
    })?;

    info!("Migrations completed successfully");
    Ok(())
}

mod m20240301_000001_create_inventory_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_inventory_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Inventory::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Inventory::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Inventory::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Inventory::ProductUnitId).uuid().null())
                        .col(ColumnDef::new(Inventory::BranchId).uuid().not_null())
                        .col(
                            ColumnDef::new(Inventory::Quantity)
                                .integer()
                                .not_null()
                                .default(0)
                                .check(Expr::col(Inventory::Quantity).gte(0)),
                        )
                        .col(
                            ColumnDef::new(Inventory::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_branch_product")
                        .table(Inventory::Table)
                        .col(Inventory::BranchId)
                        .col(Inventory::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Inventory::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Inventory {
        Table,
        Id,
        ProductId,
        ProductUnitId,
        BranchId,
        Quantity,
        UpdatedAt,
    }
}

mod m20240301_000002_create_shipments_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_shipments_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Shipments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Shipments::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Shipments::ShipmentNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Shipments::FromBranchId).uuid().not_null())
                        .col(ColumnDef::new(Shipments::ToBranchId).uuid().not_null())
                        .col(ColumnDef::new(Shipments::Status).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Shipments::ShipmentDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Shipments::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_shipments_status")
                        .table(Shipments::Table)
                        .col(Shipments::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ShipmentItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ShipmentItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ShipmentItems::ShipmentId).uuid().not_null())
                        .col(
                            ColumnDef::new(ShipmentItems::WarehouseInventoryId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentItems::PosInventoryId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ShipmentItems::ProductUnitId).uuid().null())
                        .col(
                            ColumnDef::new(ShipmentItems::Quantity)
                                .integer()
                                .not_null()
                                .check(Expr::col(ShipmentItems::Quantity).gt(0)),
                        )
                        .col(
                            ColumnDef::new(ShipmentItems::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ShipmentItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_shipment_items_shipment_id")
                        .table(ShipmentItems::Table)
                        .col(ShipmentItems::ShipmentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ShipmentItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Shipments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Shipments {
        Table,
        Id,
        ShipmentNumber,
        FromBranchId,
        ToBranchId,
        Status,
        ShipmentDate,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum ShipmentItems {
        Table,
        Id,
        ShipmentId,
        WarehouseInventoryId,
        PosInventoryId,
        ProductUnitId,
        Quantity,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_request_outbox_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_request_outbox_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RequestOutbox::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RequestOutbox::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestOutbox::ShipmentId)
                                .uuid()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(RequestOutbox::Payload).text().not_null())
                        .col(
                            ColumnDef::new(RequestOutbox::Status)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestOutbox::Attempts)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(RequestOutbox::LastError).text().null())
                        .col(
                            ColumnDef::new(RequestOutbox::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RequestOutbox::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_request_outbox_status")
                        .table(RequestOutbox::Table)
                        .col(RequestOutbox::Status)
                        .col(RequestOutbox::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RequestOutbox::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum RequestOutbox {
        Table,
        Id,
        ShipmentId,
        Payload,
        Status,
        Attempts,
        LastError,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_requests_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_requests_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Requests::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Requests::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Requests::FromBranchId).uuid().not_null())
                        .col(ColumnDef::new(Requests::ToBranchId).uuid().not_null())
                        .col(ColumnDef::new(Requests::ProductId).uuid().not_null())
                        .col(ColumnDef::new(Requests::Quantity).integer().not_null())
                        .col(ColumnDef::new(Requests::Status).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Requests::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Requests::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_requests_status")
                        .table(Requests::Table)
                        .col(Requests::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RequestLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RequestLines::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RequestLines::RequestId).uuid().not_null())
                        .col(
                            ColumnDef::new(RequestLines::PosInventoryId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RequestLines::ProductId).uuid().not_null())
                        .col(ColumnDef::new(RequestLines::Quantity).integer().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_request_lines_request_id")
                        .table(RequestLines::Table)
                        .col(RequestLines::RequestId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RequestLines::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Requests::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Requests {
        Table,
        Id,
        FromBranchId,
        ToBranchId,
        ProductId,
        Quantity,
        Status,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum RequestLines {
        Table,
        Id,
        RequestId,
        PosInventoryId,
        ProductId,
        Quantity,
    }
}

mod m20240301_000005_create_transfer_receipts_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_transfer_receipts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TransferReceipts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TransferReceipts::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferReceipts::ShipmentId).uuid().not_null())
                        .col(
                            ColumnDef::new(TransferReceipts::PosInventoryId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TransferReceipts::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(TransferReceipts::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_transfer_receipts_shipment_id")
                        .table(TransferReceipts::Table)
                        .col(TransferReceipts::ShipmentId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TransferReceipts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TransferReceipts {
        Table,
        Id,
        ShipmentId,
        PosInventoryId,
        Quantity,
        ReceivedAt,
    }
}
