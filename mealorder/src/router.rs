//! Routes purchase order events to the orders they concern.
//!
//! Only two purchase order events reach orders: creation marks every
//! consolidated order as processed, and cancellation cancels every order the
//! purchase order held. Everything else stays inside the purchase order.

use crate::order::OrderCommand;
use crate::purchase_order::PurchaseOrderEvent;
use crate::types::{Order, OrderId};
use std::collections::HashSet;

/// Derived order commands for one purchase order event.
///
/// Each referenced order gets at most one command, in the order the
/// purchase order lists them.
#[must_use]
pub fn route(event: &PurchaseOrderEvent) -> Vec<OrderCommand> {
    match event {
        PurchaseOrderEvent::PurchaseOrderCreated { id, orders, .. } => distinct_order_ids(orders)
            .map(|order_id| OrderCommand::MarkOrderProcessed {
                order_id,
                purchase_order_id: id.clone(),
            })
            .collect(),

        PurchaseOrderEvent::PurchaseOrderCanceled {
            id,
            who_canceled,
            orders,
            ..
        } => distinct_order_ids(orders)
            .map(|order_id| OrderCommand::CancelOrderForPurchaseOrder {
                order_id,
                purchase_order_id: id.clone(),
                who_canceled: who_canceled.clone(),
            })
            .collect(),

        PurchaseOrderEvent::PurchaseOrderValidationPassed { .. }
        | PurchaseOrderEvent::PurchaseOrderValidationFailed { .. }
        | PurchaseOrderEvent::PurchaseOrderValidationOverruled { .. }
        | PurchaseOrderEvent::PurchaseOrderSent { .. }
        | PurchaseOrderEvent::PurchaseOrderDelivered { .. } => Vec::new(),
    }
}

fn distinct_order_ids(orders: &[Order]) -> impl Iterator<Item = OrderId> + '_ {
    let mut seen = HashSet::new();
    orders
        .iter()
        .filter(move |order| seen.insert(&order.id))
        .map(|order| order.id.clone())
}
