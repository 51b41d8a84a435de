//! Shared fixtures for the meal order integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mealorder::types::{
    Dish, DishId, MenuDateRange, MenuId, Money, Order, OrderId, OrderStatus, PurchaseOrderId, UserId, VendorId,
};
use mealorder::config::ReactorConfig;
use mealorder::{MealOrderApp, OrderCommand, PurchaseOrderSender, VendorCommand};
use mealorder_core::checkpoint::DeliveryCheckpoint;
use mealorder_core::event_store::EventStore;
use mealorder_testing::{InMemoryCheckpoint, InMemoryEventStore, test_clock};
use std::sync::Arc;
use std::time::Duration;

pub const VENDOR: &str = "vendor:VendorName1";
pub const USER: &str = "user@example.com";

pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2019, 2, day).unwrap()
}

pub fn vendor_id(name: &str) -> VendorId {
    name.parse().unwrap()
}

pub fn user(email: &str) -> UserId {
    email.parse().unwrap()
}

pub fn menu_id(vendor: &str, seconds: i64) -> MenuId {
    MenuId {
        vendor_id: vendor_id(vendor),
        when_imported: DateTime::<Utc>::from_timestamp(1_548_979_200 + seconds, 0).unwrap(),
    }
}

pub fn dish(vendor: &str, number: u32) -> Dish {
    Dish {
        id: DishId {
            menu_id: menu_id(vendor, 0),
            sequential_number: number,
        },
        name: format!("dish {number}"),
        category: "mains".to_string(),
        price: Money::from_minor(500 + i64::from(number)),
    }
}

pub fn order_id(email: &str, day: u32) -> OrderId {
    OrderId {
        user_id: user(email),
        vendor_id: vendor_id(VENDOR),
        order_date: date(day),
    }
}

pub fn active_order(email: &str, dishes: Vec<Dish>) -> Order {
    Order {
        id: order_id(email, 15),
        status: OrderStatus::Active,
        dishes,
    }
}

pub fn purchase_order_id() -> PurchaseOrderId {
    PurchaseOrderId {
        vendor_id: vendor_id(VENDOR),
        po_date: date(15),
    }
}

/// Millisecond backoff and a 10ms sweep
pub fn fast_reactor() -> ReactorConfig {
    ReactorConfig {
        max_retries: 5,
        initial_delay_ms: 1,
        max_delay_ms: 10,
        sweep_interval_ms: 10,
    }
}

pub fn app_with(sender: Arc<dyn PurchaseOrderSender>, store: Arc<InMemoryEventStore>) -> MealOrderApp {
    app_over(sender, store, Arc::new(InMemoryCheckpoint::new()))
}

/// Service over an existing journal and checkpoint, as after a restart
pub fn app_over(
    sender: Arc<dyn PurchaseOrderSender>,
    store: Arc<InMemoryEventStore>,
    checkpoint: Arc<InMemoryCheckpoint>,
) -> MealOrderApp {
    MealOrderApp::new(
        Arc::new(test_clock()),
        sender,
        store as Arc<dyn EventStore>,
        checkpoint as Arc<dyn DeliveryCheckpoint>,
        &fast_reactor(),
    )
}

/// Registers `VENDOR` with one menu served 2019-02-13..=2019-02-21
pub async fn seed_vendor(app: &MealOrderApp) {
    let vendor = vendor_id(VENDOR);
    app.send_vendor(VendorCommand::AddVendor {
        vendor_id: vendor.clone(),
        who_adds: user(USER),
        vendor_name: "VendorName1".parse().unwrap(),
        email: "vendor@example.com".parse().unwrap(),
        phone_numbers: vec!["0634596796".parse().unwrap()],
        po_daily_deadline: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
    })
    .await
    .unwrap();
    app.send_vendor(VendorCommand::ImportMenu {
        vendor_id: vendor.clone(),
        who_imports: user(USER),
        menu_id: menu_id(VENDOR, 0),
        dishes: (1..=3).map(|n| dish(VENDOR, n)).collect(),
    })
    .await
    .unwrap();
    app.send_vendor(VendorCommand::SetDateRangeForMenu {
        vendor_id: vendor,
        who_sets: user(USER),
        menu_id: menu_id(VENDOR, 0),
        range: MenuDateRange::new(date(13), date(21)),
    })
    .await
    .unwrap();
}

/// Opens an order for day 15 holding the given dishes
pub async fn seed_order(app: &MealOrderApp, email: &str, dishes: &[Dish]) -> OrderId {
    let id = order_id(email, 15);
    app.send_order(OrderCommand::CreateOrder {
        order_id: id.clone(),
        menu_id: menu_id(VENDOR, 0),
    })
    .await
    .unwrap();
    for dish in dishes {
        app.send_order(OrderCommand::AddDishToOrder {
            order_id: id.clone(),
            dish: dish.clone(),
        })
        .await
        .unwrap();
    }
    id
}

/// Polls the committed view until `order_id` reaches `status`
pub async fn wait_for_status(app: &MealOrderApp, order_id: &OrderId, status: OrderStatus) -> bool {
    for _ in 0..200 {
        if app.orders().find(order_id).is_some_and(|state| state.status == status) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
