mod common;

use chrono::Utc;
use common::TestApp;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use std::time::Duration;
use stock_transfer_api::{
    db::Store,
    entities::{request, request_outbox, OutboxStatus, RequestStatus, ShipmentStatus},
    services::{
        outbox::{RequestEnvelope, RequestLineEnvelope, RequestOutbox},
        shipments::{CompletionOutcome, TransitionTrigger},
        TombstoneStore,
    },
};
use tokio::sync::watch;
use uuid::Uuid;

async fn shipment_status(app: &TestApp, id: Uuid) -> ShipmentStatus {
    app.state
        .services
        .shipments
        .get_shipment(id)
        .await
        .unwrap()
        .shipment
        .status
}

#[tokio::test]
async fn completed_request_approves_and_completes_in_one_tick() {
    let app = TestApp::new().await;
    let line = app.seed_line_with(10, 2).await;
    let id = app.create_shipment(&[(line, 5)]).await;

    app.state
        .services
        .requests
        .update_status(id, "complete")
        .await
        .unwrap();

    let report = app.scheduler.run_once().await;
    assert_eq!(report.approved, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(shipment_status(&app, id).await, ShipmentStatus::Completed);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 5);
    assert_eq!(app.quantity(Store::Pos, line.pos_inventory_id).await, 7);

    // later ticks see a converged pair and change nothing
    let again = app.scheduler.run_once().await;
    assert_eq!(again.converged, 1);
    assert_eq!(again.approved + again.completed, 0);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 5);
    assert_eq!(app.quantity(Store::Pos, line.pos_inventory_id).await, 7);
}

#[tokio::test]
async fn rejected_request_rejects_shipment_without_moving_stock() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 5)]).await;

    app.state
        .services
        .requests
        .update_status(id, "reject")
        .await
        .unwrap();
    let report = app.scheduler.run_once().await;

    assert_eq!(report.rejected, 1);
    assert_eq!(shipment_status(&app, id).await, ShipmentStatus::Rejected);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 10);
    assert_eq!(app.quantity(Store::Pos, line.pos_inventory_id).await, 0);
}

#[tokio::test]
async fn operator_approval_is_completed_by_the_next_tick() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 5)]).await;

    app.state
        .services
        .shipments
        .update_status(id, "Approved")
        .await
        .unwrap();
    let report = app.scheduler.run_once().await;

    assert_eq!(report.completed, 1);
    assert_eq!(shipment_status(&app, id).await, ShipmentStatus::Completed);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 5);
    assert_eq!(app.quantity(Store::Pos, line.pos_inventory_id).await, 5);
}

#[tokio::test]
async fn insufficient_stock_is_retried_on_later_ticks() {
    let app = TestApp::new().await;
    let line = app.seed_line(3).await;
    let id = app.create_shipment(&[(line, 5)]).await;
    app.state
        .services
        .requests
        .update_status(id, "complete")
        .await
        .unwrap();

    let report = app.scheduler.run_once().await;
    assert_eq!(report.failed, 1);
    assert_eq!(shipment_status(&app, id).await, ShipmentStatus::Pending);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 3);

    app.set_quantity(Store::Warehouse, line.warehouse_inventory_id, 8)
        .await;

    let report = app.scheduler.run_once().await;
    assert_eq!(report.approved, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 3);
    assert_eq!(app.quantity(Store::Pos, line.pos_inventory_id).await, 5);
}

async fn orphan_request(app: &TestApp, status: RequestStatus) -> Uuid {
    let id = Uuid::new_v4();
    let now = Utc::now();
    request::ActiveModel {
        id: Set(id),
        from_branch_id: Set(app.warehouse_branch),
        to_branch_id: Set(app.pos_branch),
        product_id: Set(Uuid::new_v4()),
        quantity: Set(1),
        status: Set(status),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&app.stores().pos)
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn request_without_shipment_is_tombstoned_then_suppressed() {
    let app = TestApp::new().await;
    let orphan = orphan_request(&app, RequestStatus::Complete).await;

    let first = app.scheduler.run_once().await;
    assert_eq!(first.tombstoned, 1);
    assert_eq!(first.failed, 0);
    assert!(app.tombstones.is_suppressed(orphan));

    let second = app.scheduler.run_once().await;
    assert_eq!(second.suppressed, 1);
    assert_eq!(second.tombstoned, 0);
    assert_eq!(app.tombstones.get(orphan).unwrap().hits, 1);
}

#[tokio::test]
async fn expired_tombstone_is_looked_up_again() {
    let app = TestApp::with_tombstone_ttl(Duration::from_millis(20)).await;
    let orphan = orphan_request(&app, RequestStatus::Reject).await;

    assert_eq!(app.scheduler.run_once().await.tombstoned, 1);
    tokio::time::sleep(Duration::from_millis(40)).await;

    let report = app.scheduler.run_once().await;
    assert_eq!(report.suppressed, 0);
    assert_eq!(report.tombstoned, 1);
    assert!(app.tombstones.get(orphan).is_some());
}

#[tokio::test]
async fn deleted_shipment_leaves_request_tombstoned() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 1)]).await;
    app.state
        .services
        .requests
        .update_status(id, "complete")
        .await
        .unwrap();
    app.state.services.shipments.delete_shipment(id).await.unwrap();

    let report = app.scheduler.run_once().await;
    assert_eq!(report.tombstoned, 1);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 10);
}

#[tokio::test]
async fn diverged_terminal_states_are_reported_not_written() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 4)]).await;

    app.state
        .services
        .shipments
        .update_status(id, "Rejected")
        .await
        .unwrap();
    app.state
        .services
        .requests
        .update_status(id, "complete")
        .await
        .unwrap();

    let report = app.scheduler.run_once().await;
    assert_eq!(report.conflicts, 1);
    assert_eq!(report.approved, 0);
    assert_eq!(shipment_status(&app, id).await, ShipmentStatus::Rejected);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 10);
}

#[tokio::test]
async fn failed_immediate_delivery_is_redelivered_once() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;

    app.execute(Store::Pos, "ALTER TABLE requests RENAME TO requests_offline")
        .await;
    let created = app
        .state
        .services
        .shipments
        .create_shipment(app.new_shipment(&[(line, 2)]))
        .await
        .unwrap();
    assert!(!created.request_mirrored);

    let row = request_outbox::Entity::find()
        .one(&app.stores().warehouse)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, OutboxStatus::Pending);
    assert_eq!(row.attempts, 1);
    assert!(row.last_error.is_some());

    app.execute(Store::Pos, "ALTER TABLE requests_offline RENAME TO requests")
        .await;

    let report = app.scheduler.run_once().await;
    assert_eq!(report.outbox.delivered, 1);
    let mirrored = app
        .state
        .services
        .requests
        .get_request(created.shipment_id)
        .await
        .unwrap();
    assert_eq!(mirrored.request.status, RequestStatus::Pending);

    let report = app.scheduler.run_once().await;
    assert_eq!(report.outbox.delivered, 0);
    assert_eq!(
        request::Entity::find().count(&app.stores().pos).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn rewriting_a_mirrored_request_is_skipped() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 2)]).await;

    let row = request_outbox::Entity::find()
        .one(&app.stores().warehouse)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, OutboxStatus::Delivered);

    let envelope = serde_json::from_str(&row.payload).unwrap();
    let outbox = app.state.services.shipments.outbox();
    assert!(!outbox.write_request(&envelope).await.unwrap());
    assert_eq!(
        app.state
            .services
            .requests
            .get_request(id)
            .await
            .unwrap()
            .lines
            .len(),
        1
    );
}

#[tokio::test]
async fn interrupted_completion_does_not_double_count() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 5)]).await;
    let shipments = &app.state.services.shipments;

    shipments
        .apply_transition(id, ShipmentStatus::Approved, TransitionTrigger::Reconciliation)
        .await
        .unwrap();
    assert_eq!(
        shipments.complete_shipment(id).await.unwrap(),
        CompletionOutcome::Completed { items_received: 1 }
    );

    // POS half committed, warehouse half lost
    app.force_shipment_status(id, ShipmentStatus::Approved).await;

    let report = app.scheduler.run_once().await;
    assert_eq!(report.completed, 1);
    assert_eq!(shipment_status(&app, id).await, ShipmentStatus::Completed);
    assert_eq!(app.quantity(Store::Pos, line.pos_inventory_id).await, 5);
    assert_eq!(app.quantity(Store::Warehouse, line.warehouse_inventory_id).await, 5);
}

#[tokio::test]
async fn decided_requests_are_final_on_the_pos_side() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 1)]).await;
    let requests = &app.state.services.requests;

    requests.update_status(id, "reject").await.unwrap();
    requests.update_status(id, "reject").await.unwrap();
    assert!(requests.update_status(id, "complete").await.is_err());
    assert!(requests.update_status(id, "pending").await.is_err());
    assert!(requests.update_status(id, "maybe").await.is_err());
}

#[tokio::test]
async fn spawned_scheduler_converges_and_stops_on_shutdown() {
    let app = TestApp::new().await;
    let line = app.seed_line(10).await;
    let id = app.create_shipment(&[(line, 5)]).await;
    app.state
        .services
        .requests
        .update_status(id, "complete")
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = app.scheduler.clone().spawn(rx);

    let mut status = ShipmentStatus::Pending;
    for _ in 0..100 {
        status = shipment_status(&app, id).await;
        if status == ShipmentStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, ShipmentStatus::Completed);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler stops")
        .unwrap();
}

#[tokio::test]
async fn undeliverable_outbox_row_does_not_stop_the_scheduler() {
    let app = TestApp::new().await;
    let line = |quantity| RequestLineEnvelope {
        line_id: Uuid::new_v4(),
        pos_inventory_id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        quantity,
    };
    let bad = RequestEnvelope {
        request_id: Uuid::new_v4(),
        from_branch_id: app.warehouse_branch,
        to_branch_id: app.pos_branch,
        lines: vec![line(i32::MAX), line(i32::MAX)],
        created_at: Utc::now(),
    };
    RequestOutbox::enqueue(&app.stores().warehouse, &bad)
        .await
        .unwrap();

    let report = app.scheduler.run_once().await;
    assert_eq!(report.outbox.delivered, 0);
    assert_eq!(report.outbox.retried + report.outbox.failed, 1);

    let stock = app.seed_line(10).await;
    let id = app.create_shipment(&[(stock, 4)]).await;
    app.state
        .services
        .requests
        .update_status(id, "complete")
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let handle = app.scheduler.clone().spawn(rx);

    let mut status = ShipmentStatus::Pending;
    for _ in 0..100 {
        status = shipment_status(&app, id).await;
        if status == ShipmentStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, ShipmentStatus::Completed);
    assert!(!handle.is_finished());

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler stops")
        .unwrap();

    let row = request_outbox::Entity::find()
        .all(&app.stores().warehouse)
        .await
        .unwrap()
        .into_iter()
        .find(|row| row.shipment_id == bad.request_id)
        .unwrap();
    assert_ne!(row.status, OutboxStatus::Delivered);
    assert!(row.last_error.unwrap().contains("overflows"));
}
