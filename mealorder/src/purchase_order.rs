//! Purchase order aggregate.
//!
//! Consolidates the active orders of one vendor and day, validates them,
//! dispatches the result to the vendor and tracks delivery.
//!
//! # Lifecycle
//!
//! ```text
//! CREATED ─► VALID ─► SENT ─► DELIVERED
//!    │         ▲        │
//!    ▼         │        ▼
//! INVALID ─────┘     CANCELED   (also reachable from every state but DELIVERED)
//! ```
//!
//! Creation and overrule dispatch the purchase order before anything is
//! committed; a failed dispatch rejects the command.

use crate::sender::{DispatchError, PurchaseOrderSender};
use crate::types::{EmailAddress, Order, PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus, UserId};
use crate::validation::{find_invalid_orders, first_unfit_order};
use chrono::{DateTime, Utc};
use mealorder_core::environment::Clock;
use mealorder_core::reducer::{Events, Reducer};
use mealorder_core::smallvec;
use mealorder_macros::{Command, Event};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Reason recorded when a purchase order is canceled without one
pub const REASON_NOT_SET: &str = "Reason not set.";

// ============================================================================
// Commands
// ============================================================================

/// Why a purchase order was canceled
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// The purchase order failed validation
    Invalid,
    /// Free text
    Custom(String),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("purchase order is invalid"),
            Self::Custom(text) => f.write_str(text),
        }
    }
}

/// Commands accepted by the purchase order aggregate
#[derive(Command, Clone, Debug, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    /// Consolidate order snapshots into a new purchase order
    CreatePurchaseOrder {
        /// Purchase order to create
        id: PurchaseOrderId,
        /// Who creates it; dispatch is sent from this user's email
        who_creates: UserId,
        /// Where to dispatch it
        vendor_email: EmailAddress,
        /// Order snapshots to consolidate
        orders: Vec<Order>,
    },

    /// Accept an invalid purchase order anyway and dispatch it
    MarkPurchaseOrderAsValid {
        /// Target purchase order
        id: PurchaseOrderId,
        /// Who overrules the validation
        who_marks: UserId,
        /// Where to dispatch it
        vendor_email: EmailAddress,
        /// Why the validation is overruled
        reason: String,
    },

    /// Record that the vendor delivered
    MarkPurchaseOrderAsDelivered {
        /// Target purchase order
        id: PurchaseOrderId,
        /// Who confirms the delivery
        who_marks: UserId,
    },

    /// Cancel the purchase order and every order it holds
    CancelPurchaseOrder {
        /// Target purchase order
        id: PurchaseOrderId,
        /// Who cancels
        who_cancels: UserId,
        /// Why; [`REASON_NOT_SET`] is recorded when absent
        reason: Option<CancelReason>,
    },
}

impl PurchaseOrderCommand {
    /// The purchase order this command is addressed to
    #[must_use]
    pub const fn purchase_order_id(&self) -> &PurchaseOrderId {
        match self {
            Self::CreatePurchaseOrder { id, .. }
            | Self::MarkPurchaseOrderAsValid { id, .. }
            | Self::MarkPurchaseOrderAsDelivered { id, .. }
            | Self::CancelPurchaseOrder { id, .. } => id,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Facts recorded by the purchase order aggregate
#[derive(Event, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    /// Orders were consolidated into a purchase order
    PurchaseOrderCreated {
        /// New purchase order
        id: PurchaseOrderId,
        /// Who created it
        who_created: UserId,
        /// When
        when_created: DateTime<Utc>,
        /// Order snapshots, as consolidated
        orders: Vec<Order>,
    },

    /// No order exceeded the per-dish limit
    PurchaseOrderValidationPassed {
        /// Validated purchase order
        id: PurchaseOrderId,
        /// When
        when_passed: DateTime<Utc>,
    },

    /// Some orders exceeded the per-dish limit
    PurchaseOrderValidationFailed {
        /// Validated purchase order
        id: PurchaseOrderId,
        /// The flagged orders only
        failure_orders: Vec<Order>,
        /// When
        when_failed: DateTime<Utc>,
    },

    /// A failed validation was overruled by hand
    PurchaseOrderValidationOverruled {
        /// Overruled purchase order
        id: PurchaseOrderId,
        /// Who overruled it
        who_overruled: UserId,
        /// When
        when_overruled: DateTime<Utc>,
        /// Why
        reason: String,
    },

    /// The purchase order reached the vendor
    PurchaseOrderSent {
        /// The purchase order as dispatched
        purchase_order: PurchaseOrder,
        /// From
        sender_email: EmailAddress,
        /// To
        vendor_email: EmailAddress,
        /// When
        when_sent: DateTime<Utc>,
    },

    /// The vendor delivered
    PurchaseOrderDelivered {
        /// Delivered purchase order
        id: PurchaseOrderId,
        /// Who confirmed it
        who_marked_as_delivered: UserId,
        /// When
        when_delivered: DateTime<Utc>,
    },

    /// The purchase order was canceled
    PurchaseOrderCanceled {
        /// Canceled purchase order
        id: PurchaseOrderId,
        /// Who canceled it
        who_canceled: UserId,
        /// When
        when_canceled: DateTime<Utc>,
        /// Why
        reason: CancelReason,
        /// Every order it held
        orders: Vec<Order>,
    },
}

// ============================================================================
// Rejections
// ============================================================================

/// What blocks a purchase order from being created
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreationBlocker {
    /// The purchase order already exists
    AlreadyExists,
    /// No orders were given
    NoOrders,
    /// This order is not active, not for this vendor and day, or empty
    OrderNotEligible(crate::types::OrderId),
}

impl fmt::Display for CreationBlocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyExists => f.write_str("it already exists"),
            Self::NoOrders => f.write_str("there are no orders"),
            Self::OrderNotEligible(order_id) => write!(f, "order {order_id} cannot be consolidated"),
        }
    }
}

/// Commands the purchase order aggregate refuses
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum PurchaseOrderRejection {
    /// Nothing was consolidated
    #[error("Cannot create purchase order {id}: {blocker}")]
    CannotCreatePurchaseOrder {
        /// Purchase order identity
        id: PurchaseOrderId,
        /// What blocked it
        blocker: CreationBlocker,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// Only invalid purchase orders can be overruled
    #[error("Cannot overrule validation of purchase order {id} in status {status}")]
    CannotOverruleValidationOfNotInvalidPO {
        /// Purchase order identity
        id: PurchaseOrderId,
        /// Status at the time
        status: PurchaseOrderStatus,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// Only sent purchase orders can be delivered
    #[error("Cannot mark purchase order {id} in status {status} as delivered")]
    CannotMarkPurchaseOrderAsDelivered {
        /// Purchase order identity
        id: PurchaseOrderId,
        /// Status at the time
        status: PurchaseOrderStatus,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// Delivered purchase orders stay delivered
    #[error("Purchase order {id} is delivered and cannot be canceled")]
    CannotCancelDeliveredPurchaseOrder {
        /// Purchase order identity
        id: PurchaseOrderId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// There is no purchase order to cancel
    #[error("Purchase order {id} does not exist and cannot be canceled")]
    CannotCancelMissingPurchaseOrder {
        /// Purchase order identity
        id: PurchaseOrderId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// The vendor did not receive the purchase order; nothing was recorded
    #[error("Purchase order {id} could not be dispatched: {error}")]
    PurchaseOrderDispatchFailed {
        /// Purchase order identity
        id: PurchaseOrderId,
        /// Sender failure
        error: DispatchError,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },
}

// ============================================================================
// State
// ============================================================================

/// Folded state of one purchase order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderState {
    /// Purchase order identity, set once created
    pub id: Option<PurchaseOrderId>,
    /// Lifecycle status
    pub status: PurchaseOrderStatus,
    /// Order snapshots taken at creation
    pub orders: Vec<Order>,
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the purchase order aggregate
#[derive(Clone)]
pub struct PurchaseOrderEnvironment {
    /// Clock for event and rejection timestamps
    pub clock: Arc<dyn Clock>,
    /// Delivers purchase orders to vendors
    pub sender: Arc<dyn PurchaseOrderSender>,
}

impl PurchaseOrderEnvironment {
    /// Creates a new `PurchaseOrderEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, sender: Arc<dyn PurchaseOrderSender>) -> Self {
        Self { clock, sender }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the purchase order aggregate
#[derive(Clone, Debug, Default)]
pub struct PurchaseOrderReducer;

impl PurchaseOrderReducer {
    /// Hand a valid purchase order to the sender and describe the dispatch
    fn dispatch(
        env: &PurchaseOrderEnvironment,
        purchase_order: PurchaseOrder,
        sender_email: EmailAddress,
        vendor_email: EmailAddress,
    ) -> Result<PurchaseOrderEvent, PurchaseOrderRejection> {
        if let Err(error) = env.sender.send(&purchase_order, &sender_email, &vendor_email) {
            return Err(PurchaseOrderRejection::PurchaseOrderDispatchFailed {
                id: purchase_order.id,
                error,
                timestamp: env.clock.now(),
            });
        }

        Ok(PurchaseOrderEvent::PurchaseOrderSent {
            purchase_order,
            sender_email,
            vendor_email,
            when_sent: env.clock.now(),
        })
    }

    fn creation_blocker(
        state: &PurchaseOrderState,
        id: &PurchaseOrderId,
        orders: &[Order],
    ) -> Option<CreationBlocker> {
        if state.status != PurchaseOrderStatus::Undefined {
            return Some(CreationBlocker::AlreadyExists);
        }
        if orders.is_empty() {
            return Some(CreationBlocker::NoOrders);
        }
        first_unfit_order(orders, id).map(|order| CreationBlocker::OrderNotEligible(order.id.clone()))
    }
}

impl Reducer for PurchaseOrderReducer {
    type Id = PurchaseOrderId;
    type State = PurchaseOrderState;
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Rejection = PurchaseOrderRejection;
    type Environment = PurchaseOrderEnvironment;

    const AGGREGATE_TYPE: &'static str = "purchase-order";

    fn target(command: &PurchaseOrderCommand) -> PurchaseOrderId {
        command.purchase_order_id().clone()
    }

    #[allow(clippy::too_many_lines)] // One arm per command
    fn reduce(
        &self,
        state: &PurchaseOrderState,
        command: PurchaseOrderCommand,
        env: &PurchaseOrderEnvironment,
    ) -> Result<Events<PurchaseOrderEvent>, PurchaseOrderRejection> {
        let now = env.clock.now();

        match command {
            PurchaseOrderCommand::CreatePurchaseOrder {
                id,
                who_creates,
                vendor_email,
                orders,
            } => {
                if let Some(blocker) = Self::creation_blocker(state, &id, &orders) {
                    return Err(PurchaseOrderRejection::CannotCreatePurchaseOrder {
                        id,
                        blocker,
                        timestamp: now,
                    });
                }

                let invalid_orders = find_invalid_orders(&orders);
                if !invalid_orders.is_empty() {
                    return Ok(smallvec![
                        PurchaseOrderEvent::PurchaseOrderCreated {
                            id: id.clone(),
                            who_created: who_creates,
                            when_created: now,
                            orders,
                        },
                        PurchaseOrderEvent::PurchaseOrderValidationFailed {
                            id,
                            failure_orders: invalid_orders,
                            when_failed: now,
                        },
                    ]);
                }

                let purchase_order = PurchaseOrder {
                    id: id.clone(),
                    status: PurchaseOrderStatus::Valid,
                    orders: orders.clone(),
                };
                let sent = Self::dispatch(env, purchase_order, who_creates.email.clone(), vendor_email)?;

                Ok(smallvec![
                    PurchaseOrderEvent::PurchaseOrderCreated {
                        id: id.clone(),
                        who_created: who_creates,
                        when_created: now,
                        orders,
                    },
                    PurchaseOrderEvent::PurchaseOrderValidationPassed { id, when_passed: now },
                    sent,
                ])
            }

            PurchaseOrderCommand::MarkPurchaseOrderAsValid {
                id,
                who_marks,
                vendor_email,
                reason,
            } => {
                if state.status != PurchaseOrderStatus::Invalid {
                    return Err(PurchaseOrderRejection::CannotOverruleValidationOfNotInvalidPO {
                        id,
                        status: state.status,
                        timestamp: now,
                    });
                }

                let purchase_order = PurchaseOrder {
                    id: id.clone(),
                    status: PurchaseOrderStatus::Valid,
                    orders: state.orders.clone(),
                };
                let sent = Self::dispatch(env, purchase_order, who_marks.email.clone(), vendor_email)?;

                Ok(smallvec![
                    PurchaseOrderEvent::PurchaseOrderValidationOverruled {
                        id,
                        who_overruled: who_marks,
                        when_overruled: now,
                        reason,
                    },
                    sent,
                ])
            }

            PurchaseOrderCommand::MarkPurchaseOrderAsDelivered { id, who_marks } => {
                if state.status != PurchaseOrderStatus::Sent {
                    return Err(PurchaseOrderRejection::CannotMarkPurchaseOrderAsDelivered {
                        id,
                        status: state.status,
                        timestamp: now,
                    });
                }

                Ok(smallvec![PurchaseOrderEvent::PurchaseOrderDelivered {
                    id,
                    who_marked_as_delivered: who_marks,
                    when_delivered: now,
                }])
            }

            PurchaseOrderCommand::CancelPurchaseOrder {
                id,
                who_cancels,
                reason,
            } => {
                match state.status {
                    PurchaseOrderStatus::Undefined => {
                        return Err(PurchaseOrderRejection::CannotCancelMissingPurchaseOrder { id, timestamp: now });
                    }
                    PurchaseOrderStatus::Delivered => {
                        return Err(PurchaseOrderRejection::CannotCancelDeliveredPurchaseOrder { id, timestamp: now });
                    }
                    _ => {}
                }

                Ok(smallvec![PurchaseOrderEvent::PurchaseOrderCanceled {
                    id,
                    who_canceled: who_cancels,
                    when_canceled: now,
                    reason: reason.unwrap_or_else(|| CancelReason::Custom(REASON_NOT_SET.to_string())),
                    orders: state.orders.clone(),
                }])
            }
        }
    }

    fn apply_event(state: &mut PurchaseOrderState, event: &PurchaseOrderEvent) {
        if state.status.is_terminal() {
            return;
        }

        match event {
            PurchaseOrderEvent::PurchaseOrderCreated { id, orders, .. } => {
                if state.status == PurchaseOrderStatus::Undefined {
                    state.id = Some(id.clone());
                    state.orders.clone_from(orders);
                    state.status = PurchaseOrderStatus::Created;
                }
            }
            PurchaseOrderEvent::PurchaseOrderValidationPassed { .. }
            | PurchaseOrderEvent::PurchaseOrderValidationOverruled { .. } => {
                state.status = PurchaseOrderStatus::Valid;
            }
            PurchaseOrderEvent::PurchaseOrderValidationFailed { .. } => {
                state.status = PurchaseOrderStatus::Invalid;
            }
            PurchaseOrderEvent::PurchaseOrderSent { .. } => state.status = PurchaseOrderStatus::Sent,
            PurchaseOrderEvent::PurchaseOrderDelivered { .. } => state.status = PurchaseOrderStatus::Delivered,
            PurchaseOrderEvent::PurchaseOrderCanceled { .. } => state.status = PurchaseOrderStatus::Canceled,
        }
    }
}
