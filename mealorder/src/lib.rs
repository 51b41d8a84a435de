//! Meal Order - event-sourced ordering of lunches from vendors
//!
//! Employees build per-day orders against a vendor's published menu. Orders
//! of the same vendor and day are consolidated into a purchase order, which
//! is validated, dispatched to the vendor and tracked until delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   menu lookup   ┌──────────────┐
//! │    Vendor    │ ◄────────────── │    Order     │
//! │  Aggregate   │                 │  Aggregate   │
//! └──────────────┘                 └──────────────┘
//!                                         ▲
//!                            derived commands (router + reactor)
//!                                         │
//!                                  ┌──────────────┐     ┌────────────┐
//!                                  │ PurchaseOrder│ ──► │   Sender   │
//!                                  │  Aggregate   │     │ (injected) │
//!                                  └──────────────┘     └────────────┘
//! ```
//!
//! Each aggregate is a [`Reducer`](mealorder_core::reducer::Reducer) hosted
//! by a [`Repository`](mealorder_runtime::Repository), which processes
//! commands for one identity strictly one at a time and journals the events
//! they produce.
//!
//! # Modules
//!
//! - [`types`]: identifiers and value types
//! - [`validation`]: pure rules shared by the aggregates
//! - [`vendor`], [`order`], [`purchase_order`]: the aggregates
//! - [`sender`]: dispatching purchase orders to vendors
//! - [`router`]: purchase order events to order commands
//! - [`app`]: the wired service and its checkpointed reactor
//! - [`config`]: environment configuration

#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod order;
pub mod purchase_order;
pub mod router;
pub mod sender;
pub mod types;
pub mod validation;
pub mod vendor;

pub use app::{MealOrderApp, Reactor, ReactorError};
pub use config::Config;
pub use order::{MenuLookup, OrderCommand, OrderEnvironment, OrderEvent, OrderReducer, OrderRejection, OrderState};
pub use purchase_order::{
    CancelReason, PurchaseOrderCommand, PurchaseOrderEnvironment, PurchaseOrderEvent, PurchaseOrderReducer,
    PurchaseOrderRejection, PurchaseOrderState,
};
pub use sender::{DispatchError, LoggingSender, PurchaseOrderSender};
pub use vendor::{VendorCommand, VendorEnvironment, VendorEvent, VendorReducer, VendorRejection, VendorState};
