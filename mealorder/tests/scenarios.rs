//! End-to-end scenarios through the wired service.

#![allow(clippy::unwrap_used)]

mod common;

use common::{
    USER, VENDOR, active_order, app_with, date, dish, menu_id, order_id, purchase_order_id, seed_order, seed_vendor,
    user, vendor_id,
};
use mealorder::order::OrderState;
use mealorder::purchase_order::CancelReason;
use mealorder::sender::RecordingSender;
use mealorder::types::{OrderStatus, PurchaseOrderStatus};
use mealorder::{OrderCommand, OrderRejection, PurchaseOrderCommand, PurchaseOrderRejection};
use mealorder_core::event::Event;
use mealorder_runtime::RepositoryError;
use mealorder_testing::InMemoryEventStore;
use std::sync::Arc;

fn event_types<E: Event>(events: &[E]) -> Vec<&'static str> {
    events.iter().map(Event::event_type).collect()
}

#[tokio::test]
async fn order_inside_menu_range_becomes_active() {
    let app = app_with(Arc::new(RecordingSender::new()), Arc::new(InMemoryEventStore::new()));
    seed_vendor(&app).await;

    let events = app
        .send_order(OrderCommand::CreateOrder {
            order_id: order_id(USER, 15),
            menu_id: menu_id(VENDOR, 0),
        })
        .await
        .unwrap();

    assert_eq!(event_types(&events), vec!["OrderCreated.v1"]);
    assert!(matches!(
        app.orders().find(&order_id(USER, 15)),
        Some(OrderState { status: OrderStatus::Active, .. })
    ));
}

#[tokio::test]
async fn order_before_menu_range_is_not_available() {
    let app = app_with(Arc::new(RecordingSender::new()), Arc::new(InMemoryEventStore::new()));
    seed_vendor(&app).await;

    let result = app
        .send_order(OrderCommand::CreateOrder {
            order_id: order_id(USER, 12),
            menu_id: menu_id(VENDOR, 0),
        })
        .await;

    assert!(matches!(
        result,
        Err(RepositoryError::Rejected(OrderRejection::MenuNotAvailable { .. }))
    ));
}

#[tokio::test]
async fn dish_of_another_vendor_is_rejected() {
    let app = app_with(Arc::new(RecordingSender::new()), Arc::new(InMemoryEventStore::new()));
    seed_vendor(&app).await;
    let id = seed_order(&app, USER, &[]).await;

    let result = app
        .send_order(OrderCommand::AddDishToOrder {
            order_id: id,
            dish: dish("vendor:VendorName2", 1),
        })
        .await;

    let rejection = result.err().and_then(RepositoryError::into_rejection);
    assert!(matches!(
        rejection,
        Some(OrderRejection::DishVendorMismatch { target, actual, .. })
            if target == vendor_id(VENDOR) && actual == vendor_id("vendor:VendorName2")
    ));
}

#[tokio::test]
async fn one_order_is_consolidated_and_sent() {
    let sender = Arc::new(RecordingSender::new());
    let app = app_with(Arc::clone(&sender) as _, Arc::new(InMemoryEventStore::new()));
    seed_vendor(&app).await;
    let id = seed_order(&app, USER, &[dish(VENDOR, 1)]).await;
    let snapshot = app.orders().find(&id).and_then(|state| state.snapshot()).unwrap();

    let events = app
        .send_purchase_order(PurchaseOrderCommand::CreatePurchaseOrder {
            id: purchase_order_id(),
            who_creates: user(USER),
            vendor_email: "vendor@example.com".parse().unwrap(),
            orders: vec![snapshot],
        })
        .await
        .unwrap();

    assert_eq!(
        event_types(&events),
        vec![
            "PurchaseOrderCreated.v1",
            "PurchaseOrderValidationPassed.v1",
            "PurchaseOrderSent.v1"
        ]
    );
    assert_eq!(
        app.purchase_orders().find(&purchase_order_id()).map(|state| state.status),
        Some(PurchaseOrderStatus::Sent)
    );
    assert_eq!(sender.dispatches().len(), 1);
}

#[tokio::test]
async fn delivered_purchase_order_cannot_be_canceled() {
    let app = app_with(Arc::new(RecordingSender::new()), Arc::new(InMemoryEventStore::new()));
    app.send_purchase_order(PurchaseOrderCommand::CreatePurchaseOrder {
        id: purchase_order_id(),
        who_creates: user(USER),
        vendor_email: "vendor@example.com".parse().unwrap(),
        orders: vec![active_order(USER, vec![dish(VENDOR, 1)])],
    })
    .await
    .unwrap();

    let delivered = app
        .send_purchase_order(PurchaseOrderCommand::MarkPurchaseOrderAsDelivered {
            id: purchase_order_id(),
            who_marks: user(USER),
        })
        .await
        .unwrap();
    assert_eq!(event_types(&delivered), vec!["PurchaseOrderDelivered.v1"]);

    let canceled = app
        .send_purchase_order(PurchaseOrderCommand::CancelPurchaseOrder {
            id: purchase_order_id(),
            who_cancels: user(USER),
            reason: Some(CancelReason::Custom("too late".to_string())),
        })
        .await;
    assert!(matches!(
        canceled,
        Err(RepositoryError::Rejected(PurchaseOrderRejection::CannotCancelDeliveredPurchaseOrder { .. }))
    ));
}

#[tokio::test]
async fn removing_a_missing_dish_is_rejected() {
    let app = app_with(Arc::new(RecordingSender::new()), Arc::new(InMemoryEventStore::new()));
    seed_vendor(&app).await;
    let id = seed_order(&app, USER, &[dish(VENDOR, 1)]).await;

    let result = app
        .send_order(OrderCommand::RemoveDishFromOrder {
            order_id: id.clone(),
            dish_id: dish(VENDOR, 2).id,
        })
        .await;

    assert!(matches!(
        result,
        Err(RepositoryError::Rejected(OrderRejection::CannotRemoveMissingDish { .. }))
    ));
    assert_eq!(app.orders().find(&id).map(|state| state.dishes.len()), Some(1));
}

#[tokio::test]
async fn menu_range_bounds_accept_orders() {
    let app = app_with(Arc::new(RecordingSender::new()), Arc::new(InMemoryEventStore::new()));
    seed_vendor(&app).await;

    for day in [13, 21] {
        let result = app
            .send_order(OrderCommand::CreateOrder {
                order_id: order_id(USER, day),
                menu_id: menu_id(VENDOR, 0),
            })
            .await;
        assert!(result.is_ok(), "order for {} was refused", date(day));
    }
}
