//! Dispatching purchase orders to vendors.
//!
//! The purchase order aggregate calls the injected [`PurchaseOrderSender`]
//! before it commits `PurchaseOrderSent`. A failed dispatch rejects the
//! command and leaves the purchase order unchanged.

use crate::types::{EmailAddress, PurchaseOrder, PurchaseOrderId};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Why a purchase order could not be dispatched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The vendor could not be reached
    #[error("Vendor at {vendor_email} is unreachable: {reason}")]
    Unreachable {
        /// Where the purchase order was going
        vendor_email: EmailAddress,
        /// Transport detail
        reason: String,
    },

    /// The purchase order could not be rendered for the vendor
    #[error("Cannot render purchase order {0}")]
    Rendering(PurchaseOrderId),
}

/// Delivers a purchase order to its vendor.
///
/// Called while the purchase order's identity is locked, so an
/// implementation blocks that purchase order (and only that one) until it
/// returns.
pub trait PurchaseOrderSender: Send + Sync {
    /// Dispatch `purchase_order` from `sender_email` to `vendor_email`
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the vendor did not receive it.
    fn send(
        &self,
        purchase_order: &PurchaseOrder,
        sender_email: &EmailAddress,
        vendor_email: &EmailAddress,
    ) -> Result<(), DispatchError>;
}

/// Records each dispatch in the structured log and reports success
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSender;

impl PurchaseOrderSender for LoggingSender {
    fn send(
        &self,
        purchase_order: &PurchaseOrder,
        sender_email: &EmailAddress,
        vendor_email: &EmailAddress,
    ) -> Result<(), DispatchError> {
        let dishes: usize = purchase_order.orders.iter().map(|order| order.dishes.len()).sum();
        tracing::info!(
            purchase_order_id = %purchase_order.id,
            from = %sender_email,
            to = %vendor_email,
            orders = purchase_order.orders.len(),
            dishes,
            total = %purchase_order.total(),
            "Purchase order dispatched"
        );
        Ok(())
    }
}

/// One call received by a [`RecordingSender`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// The purchase order as handed to the sender
    pub purchase_order: PurchaseOrder,
    /// From
    pub sender_email: EmailAddress,
    /// To
    pub vendor_email: EmailAddress,
}

/// Sender that keeps every dispatch for later inspection
#[derive(Debug, Default)]
pub struct RecordingSender {
    dispatches: Mutex<Vec<Dispatch>>,
}

impl RecordingSender {
    /// Creates an empty `RecordingSender`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dispatch so far, oldest first
    pub fn dispatches(&self) -> Vec<Dispatch> {
        self.dispatches.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PurchaseOrderSender for RecordingSender {
    fn send(
        &self,
        purchase_order: &PurchaseOrder,
        sender_email: &EmailAddress,
        vendor_email: &EmailAddress,
    ) -> Result<(), DispatchError> {
        self.dispatches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Dispatch {
                purchase_order: purchase_order.clone(),
                sender_email: sender_email.clone(),
                vendor_email: vendor_email.clone(),
            });
        Ok(())
    }
}

/// Sender whose vendor is never reachable
#[derive(Debug, Clone, Default)]
pub struct FailingSender {
    reason: String,
}

impl FailingSender {
    /// Fails every dispatch with `reason`
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl PurchaseOrderSender for FailingSender {
    fn send(
        &self,
        _purchase_order: &PurchaseOrder,
        _sender_email: &EmailAddress,
        vendor_email: &EmailAddress,
    ) -> Result<(), DispatchError> {
        Err(DispatchError::Unreachable {
            vendor_email: vendor_email.clone(),
            reason: self.reason.clone(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::PurchaseOrderStatus;
    use chrono::NaiveDate;

    fn purchase_order() -> PurchaseOrder {
        PurchaseOrder {
            id: PurchaseOrderId {
                vendor_id: "vendor:VendorName1".parse().unwrap(),
                po_date: NaiveDate::from_ymd_opt(2019, 2, 15).unwrap(),
            },
            status: PurchaseOrderStatus::Valid,
            orders: Vec::new(),
        }
    }

    fn email(text: &str) -> EmailAddress {
        text.parse().unwrap()
    }

    #[test]
    fn recording_sender_keeps_dispatches_in_order() {
        let sender = RecordingSender::new();
        sender
            .send(&purchase_order(), &email("user@example.com"), &email("a@vendor.com"))
            .unwrap();
        sender
            .send(&purchase_order(), &email("user@example.com"), &email("b@vendor.com"))
            .unwrap();

        let to: Vec<String> = sender
            .dispatches()
            .iter()
            .map(|dispatch| dispatch.vendor_email.to_string())
            .collect();
        assert_eq!(to, vec!["a@vendor.com", "b@vendor.com"]);
    }

    #[test]
    fn failing_sender_names_the_vendor() {
        let result = FailingSender::new("smtp down").send(
            &purchase_order(),
            &email("user@example.com"),
            &email("a@vendor.com"),
        );
        assert_eq!(
            result,
            Err(DispatchError::Unreachable {
                vendor_email: email("a@vendor.com"),
                reason: "smtp down".to_string(),
            })
        );
    }

    #[test]
    fn logging_sender_always_succeeds() {
        assert!(
            LoggingSender
                .send(&purchase_order(), &email("user@example.com"), &email("a@vendor.com"))
                .is_ok()
        );
    }
}
