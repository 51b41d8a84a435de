//! Order aggregate.
//!
//! One user's order with one vendor for one day. Users build the dish list
//! while the order is active; purchase order events later process or cancel
//! it through the derived commands [`OrderCommand::MarkOrderProcessed`] and
//! [`OrderCommand::CancelOrderForPurchaseOrder`].

use crate::types::{Dish, DishId, MenuId, Order, OrderId, OrderStatus, PurchaseOrderId, UserId, VendorId};
use crate::validation::{dish_vendor_mismatch, menu_covers_date, position_of_dish, position_of_equal_dish};
use crate::vendor::{VendorReducer, VendorState};
use chrono::{DateTime, Utc};
use mealorder_core::environment::Clock;
use mealorder_core::reducer::{Events, Reducer};
use mealorder_core::smallvec;
use mealorder_macros::{Command, Event};
use mealorder_runtime::Repository;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Menu lookup
// ============================================================================

/// Read access to vendor state, used to check menu availability
pub trait MenuLookup: Send + Sync {
    /// Current state of the vendor, if it is known
    fn find_vendor_menus(&self, vendor_id: &VendorId) -> Option<VendorState>;
}

impl MenuLookup for Repository<VendorReducer> {
    fn find_vendor_menus(&self, vendor_id: &VendorId) -> Option<VendorState> {
        self.find(vendor_id)
    }
}

impl MenuLookup for HashMap<VendorId, VendorState> {
    fn find_vendor_menus(&self, vendor_id: &VendorId) -> Option<VendorState> {
        self.get(vendor_id).cloned()
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Commands accepted by the order aggregate
#[derive(Command, Clone, Debug, Serialize, Deserialize)]
pub enum OrderCommand {
    /// Open an order against one of the vendor's menus
    CreateOrder {
        /// Order to open
        order_id: OrderId,
        /// Menu the order is placed from
        menu_id: MenuId,
    },

    /// Add one portion of a dish
    AddDishToOrder {
        /// Target order
        order_id: OrderId,
        /// Dish to add
        dish: Dish,
    },

    /// Remove one portion of a dish
    RemoveDishFromOrder {
        /// Target order
        order_id: OrderId,
        /// Dish to remove
        dish_id: DishId,
    },

    /// Cancel the order on the user's request
    CancelOrder {
        /// Target order
        order_id: OrderId,
        /// Who cancels
        who_cancels: UserId,
    },

    /// The order was consolidated into a purchase order
    MarkOrderProcessed {
        /// Target order
        order_id: OrderId,
        /// Purchase order that consolidated it
        purchase_order_id: PurchaseOrderId,
    },

    /// The purchase order holding this order was canceled
    CancelOrderForPurchaseOrder {
        /// Target order
        order_id: OrderId,
        /// Canceled purchase order
        purchase_order_id: PurchaseOrderId,
        /// Who canceled the purchase order
        who_canceled: UserId,
    },
}

impl OrderCommand {
    /// The order this command is addressed to
    #[must_use]
    pub const fn order_id(&self) -> &OrderId {
        match self {
            Self::CreateOrder { order_id, .. }
            | Self::AddDishToOrder { order_id, .. }
            | Self::RemoveDishFromOrder { order_id, .. }
            | Self::CancelOrder { order_id, .. }
            | Self::MarkOrderProcessed { order_id, .. }
            | Self::CancelOrderForPurchaseOrder { order_id, .. } => order_id,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Facts recorded by the order aggregate
#[derive(Event, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// The order was opened (or reopened after a cancel)
    OrderCreated {
        /// Opened order
        order_id: OrderId,
        /// Menu it is placed from
        menu_id: MenuId,
    },

    /// One portion of a dish was added
    DishAddedToOrder {
        /// Target order
        order_id: OrderId,
        /// Added dish
        dish: Dish,
    },

    /// One portion of a dish was removed
    DishRemovedFromOrder {
        /// Target order
        order_id: OrderId,
        /// Removed dish, as it was stored in the order
        dish: Dish,
    },

    /// The order was canceled
    OrderCanceled {
        /// Canceled order
        order_id: OrderId,
        /// Who canceled it
        who_canceled: UserId,
        /// When
        when_canceled: DateTime<Utc>,
    },

    /// The order was consolidated into a purchase order
    OrderProcessed {
        /// The order as it was consolidated
        order: Order,
        /// When
        when_processed: DateTime<Utc>,
    },
}

// ============================================================================
// Rejections
// ============================================================================

/// Commands the order aggregate refuses
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum OrderRejection {
    /// The order exists and is not canceled
    #[error("Order {order_id} already exists")]
    OrderAlreadyExists {
        /// Order identity
        order_id: OrderId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// No menu of the vendor covers the order date
    #[error("Menu {menu_id} is not available for order {order_id}")]
    MenuNotAvailable {
        /// Order identity
        order_id: OrderId,
        /// Requested menu
        menu_id: MenuId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// Dishes can only be added to active orders
    #[error("Cannot add dish to order {order_id} in status {status}")]
    CannotAddDishToNotActiveOrder {
        /// Order identity
        order_id: OrderId,
        /// Status at the time
        status: OrderStatus,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// The dish is served by another vendor
    #[error("Dish {dish_id} belongs to vendor {actual}, order {order_id} is for vendor {target}")]
    DishVendorMismatch {
        /// Order identity
        order_id: OrderId,
        /// Offending dish
        dish_id: DishId,
        /// Vendor of the order
        target: VendorId,
        /// Vendor of the dish
        actual: VendorId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// Dishes can only be removed from active orders
    #[error("Cannot remove dish from order {order_id} in status {status}")]
    CannotRemoveDishFromNotActiveOrder {
        /// Order identity
        order_id: OrderId,
        /// Status at the time
        status: OrderStatus,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// The order holds no dish with this id
    #[error("Order {order_id} has no dish {dish_id}")]
    CannotRemoveMissingDish {
        /// Order identity
        order_id: OrderId,
        /// Requested dish
        dish_id: DishId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// Processed orders can only be canceled with their purchase order
    #[error("Order {order_id} is already processed")]
    CannotCancelProcessedOrder {
        /// Order identity
        order_id: OrderId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },
}

// ============================================================================
// State
// ============================================================================

/// Folded state of one order
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderState {
    /// Order identity, set once created
    pub id: Option<OrderId>,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Dishes, duplicates allowed
    pub dishes: Vec<Dish>,
}

impl OrderState {
    /// The order as a value, for purchase orders and events
    #[must_use]
    pub fn snapshot(&self) -> Option<Order> {
        self.id.as_ref().map(|id| Order {
            id: id.clone(),
            status: self.status,
            dishes: self.dishes.clone(),
        })
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the order aggregate
#[derive(Clone)]
pub struct OrderEnvironment {
    /// Clock for event and rejection timestamps
    pub clock: Arc<dyn Clock>,
    /// Vendor menus, for availability checks on creation
    pub menus: Arc<dyn MenuLookup>,
}

impl OrderEnvironment {
    /// Creates a new `OrderEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, menus: Arc<dyn MenuLookup>) -> Self {
        Self { clock, menus }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the order aggregate
#[derive(Clone, Debug, Default)]
pub struct OrderReducer;

impl OrderReducer {
    fn menu_available(order_id: &OrderId, menu_id: &MenuId, env: &OrderEnvironment) -> bool {
        env.menus
            .find_vendor_menus(&order_id.vendor_id)
            .is_some_and(|vendor| menu_covers_date(&vendor.menus, menu_id, order_id.order_date))
    }
}

impl Reducer for OrderReducer {
    type Id = OrderId;
    type State = OrderState;
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Rejection = OrderRejection;
    type Environment = OrderEnvironment;

    const AGGREGATE_TYPE: &'static str = "order";

    fn target(command: &OrderCommand) -> OrderId {
        command.order_id().clone()
    }

    #[allow(clippy::too_many_lines)] // One arm per command
    fn reduce(
        &self,
        state: &OrderState,
        command: OrderCommand,
        env: &OrderEnvironment,
    ) -> Result<Events<OrderEvent>, OrderRejection> {
        let now = env.clock.now();

        match command {
            OrderCommand::CreateOrder { order_id, menu_id } => {
                if !Self::menu_available(&order_id, &menu_id, env) {
                    return Err(OrderRejection::MenuNotAvailable {
                        order_id,
                        menu_id,
                        timestamp: now,
                    });
                }
                if !matches!(state.status, OrderStatus::Undefined | OrderStatus::Canceled) {
                    return Err(OrderRejection::OrderAlreadyExists {
                        order_id,
                        timestamp: now,
                    });
                }

                Ok(smallvec![OrderEvent::OrderCreated { order_id, menu_id }])
            }

            OrderCommand::AddDishToOrder { order_id, dish } => {
                if state.status != OrderStatus::Active {
                    return Err(OrderRejection::CannotAddDishToNotActiveOrder {
                        order_id,
                        status: state.status,
                        timestamp: now,
                    });
                }
                if let Some(actual) = dish_vendor_mismatch(&dish, &order_id.vendor_id) {
                    return Err(OrderRejection::DishVendorMismatch {
                        target: order_id.vendor_id.clone(),
                        actual: actual.clone(),
                        dish_id: dish.id.clone(),
                        order_id,
                        timestamp: now,
                    });
                }

                Ok(smallvec![OrderEvent::DishAddedToOrder { order_id, dish }])
            }

            OrderCommand::RemoveDishFromOrder { order_id, dish_id } => {
                if state.status != OrderStatus::Active {
                    return Err(OrderRejection::CannotRemoveDishFromNotActiveOrder {
                        order_id,
                        status: state.status,
                        timestamp: now,
                    });
                }
                let Some(index) = position_of_dish(&state.dishes, &dish_id) else {
                    return Err(OrderRejection::CannotRemoveMissingDish {
                        order_id,
                        dish_id,
                        timestamp: now,
                    });
                };

                Ok(smallvec![OrderEvent::DishRemovedFromOrder {
                    order_id,
                    dish: state.dishes[index].clone(),
                }])
            }

            OrderCommand::CancelOrder { order_id, who_cancels } => {
                if state.status == OrderStatus::Processed {
                    return Err(OrderRejection::CannotCancelProcessedOrder {
                        order_id,
                        timestamp: now,
                    });
                }

                Ok(smallvec![OrderEvent::OrderCanceled {
                    order_id,
                    who_canceled: who_cancels,
                    when_canceled: now,
                }])
            }

            OrderCommand::MarkOrderProcessed { .. } => match (state.status, state.snapshot()) {
                (OrderStatus::Active, Some(order)) => Ok(smallvec![OrderEvent::OrderProcessed {
                    order,
                    when_processed: now,
                }]),
                _ => Ok(Events::new()),
            },

            OrderCommand::CancelOrderForPurchaseOrder {
                order_id,
                who_canceled,
                ..
            } => match state.status {
                OrderStatus::Active | OrderStatus::Processed => Ok(smallvec![OrderEvent::OrderCanceled {
                    order_id,
                    who_canceled,
                    when_canceled: now,
                }]),
                OrderStatus::Undefined | OrderStatus::Canceled => Ok(Events::new()),
            },
        }
    }

    fn apply_event(state: &mut OrderState, event: &OrderEvent) {
        match event {
            OrderEvent::OrderCreated { order_id, .. } => {
                match state.status {
                    OrderStatus::Canceled => state.dishes.clear(),
                    OrderStatus::Undefined => {}
                    // Already open or processed: a replayed creation changes nothing
                    OrderStatus::Active | OrderStatus::Processed => return,
                }
                state.id = Some(order_id.clone());
                state.status = OrderStatus::Active;
            }

            OrderEvent::DishAddedToOrder { dish, .. } => {
                if state.status == OrderStatus::Active {
                    state.dishes.push(dish.clone());
                }
            }

            OrderEvent::DishRemovedFromOrder { dish, .. } => {
                if let Some(index) = position_of_equal_dish(&state.dishes, dish) {
                    state.dishes.remove(index);
                }
            }

            OrderEvent::OrderCanceled { order_id, .. } => {
                state.id.get_or_insert_with(|| order_id.clone());
                state.status = OrderStatus::Canceled;
            }

            OrderEvent::OrderProcessed { .. } => {
                if state.status == OrderStatus::Active {
                    state.status = OrderStatus::Processed;
                }
            }
        }
    }
}
