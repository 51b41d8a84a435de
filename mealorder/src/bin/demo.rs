//! Meal order walkthrough.
//!
//! Registers a vendor, publishes a menu for the coming week, collects two
//! orders for tomorrow, consolidates them into a purchase order and marks it
//! delivered. Runs against the in-memory journal.
//!
//! # Usage
//!
//! ```bash
//! MEALORDER_LOG=mealorder=debug cargo run --bin mealorder-demo
//! ```

use anyhow::{Context, bail};
use chrono::{Days, NaiveDate, NaiveTime};
use mealorder::types::{Dish, DishId, MenuDateRange, MenuId, Money, OrderId, OrderStatus, PurchaseOrderId, UserId, VendorId};
use mealorder::{
    Config, LoggingSender, MealOrderApp, OrderCommand, PurchaseOrderCommand, VendorCommand,
};
use mealorder_core::environment::{Clock, SystemClock};
use mealorder_testing::{InMemoryCheckpoint, InMemoryEventStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(&config.log.filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(?config, "Configuration loaded");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app = MealOrderApp::new(
        Arc::clone(&clock),
        Arc::new(LoggingSender),
        Arc::new(InMemoryEventStore::new()),
        Arc::new(InMemoryCheckpoint::new()),
        &config.reactor,
    );

    let office: UserId = config
        .dispatch
        .sender_email
        .parse()
        .context("MEALORDER_SENDER_EMAIL is not an email address")?;
    let vendor_id: VendorId = "vendor:Borscht & Co".parse()?;
    let today = clock.today();
    let tomorrow = days_after(today, 1)?;

    // Vendor and menu
    app.send_vendor(VendorCommand::AddVendor {
        vendor_id: vendor_id.clone(),
        who_adds: office.clone(),
        vendor_name: "Borscht & Co".parse()?,
        email: "orders@borscht.example.com".parse()?,
        phone_numbers: vec!["+380441234567".parse()?],
        po_daily_deadline: NaiveTime::from_hms_opt(10, 0, 0).context("invalid deadline")?,
    })
    .await?;

    let menu_id = MenuId {
        vendor_id: vendor_id.clone(),
        when_imported: clock.now(),
    };
    let dishes = vec![
        dish(&menu_id, 1, "Borscht", "soups", 450),
        dish(&menu_id, 2, "Varenyky", "mains", 720),
        dish(&menu_id, 3, "Syrnyky", "desserts", 380),
    ];
    app.send_vendor(VendorCommand::ImportMenu {
        vendor_id: vendor_id.clone(),
        who_imports: office.clone(),
        menu_id: menu_id.clone(),
        dishes: dishes.clone(),
    })
    .await?;
    app.send_vendor(VendorCommand::SetDateRangeForMenu {
        vendor_id: vendor_id.clone(),
        who_sets: office.clone(),
        menu_id: menu_id.clone(),
        range: MenuDateRange::new(tomorrow, days_after(today, 7)?),
    })
    .await?;

    // Two employees order for tomorrow
    let mut order_ids = Vec::new();
    for (user, picks) in [("anna@example.com", vec![0, 0, 2]), ("petro@example.com", vec![1])] {
        let order_id = OrderId {
            user_id: user.parse()?,
            vendor_id: vendor_id.clone(),
            order_date: tomorrow,
        };
        app.send_order(OrderCommand::CreateOrder {
            order_id: order_id.clone(),
            menu_id: menu_id.clone(),
        })
        .await?;
        for pick in picks {
            app.send_order(OrderCommand::AddDishToOrder {
                order_id: order_id.clone(),
                dish: dishes[pick].clone(),
            })
            .await?;
        }
        order_ids.push(order_id);
    }

    // Consolidate
    let snapshots = order_ids
        .iter()
        .filter_map(|order_id| app.orders().find(order_id))
        .filter_map(|state| state.snapshot())
        .collect::<Vec<_>>();
    let purchase_order_id = PurchaseOrderId {
        vendor_id: vendor_id.clone(),
        po_date: tomorrow,
    };
    let events = app
        .send_purchase_order(PurchaseOrderCommand::CreatePurchaseOrder {
            id: purchase_order_id.clone(),
            who_creates: office.clone(),
            vendor_email: "orders@borscht.example.com".parse()?,
            orders: snapshots,
        })
        .await?;
    info!(events = events.len(), "Purchase order created");

    wait_until_processed(&app, &order_ids).await?;

    app.send_purchase_order(PurchaseOrderCommand::MarkPurchaseOrderAsDelivered {
        id: purchase_order_id.clone(),
        who_marks: office,
    })
    .await?;

    if let Some(state) = app.purchase_orders().find(&purchase_order_id) {
        info!(%purchase_order_id, status = %state.status, orders = state.orders.len(), "Done");
    }

    app.shutdown().await;
    Ok(())
}

fn days_after(date: NaiveDate, days: u64) -> anyhow::Result<NaiveDate> {
    date.checked_add_days(Days::new(days))
        .context("date out of range")
}

fn dish(menu_id: &MenuId, number: u32, name: &str, category: &str, price: i64) -> Dish {
    Dish {
        id: DishId {
            menu_id: menu_id.clone(),
            sequential_number: number,
        },
        name: name.to_string(),
        category: category.to_string(),
        price: Money::from_minor(price),
    }
}

async fn wait_until_processed(app: &MealOrderApp, order_ids: &[OrderId]) -> anyhow::Result<()> {
    for _ in 0..50 {
        let processed = order_ids.iter().all(|order_id| {
            app.orders()
                .find(order_id)
                .is_some_and(|state| state.status == OrderStatus::Processed)
        });
        if processed {
            info!(orders = order_ids.len(), "Orders processed by the reactor");
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("orders were not processed in time")
}
