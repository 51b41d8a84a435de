//! Value types shared by the vendor, order and purchase order aggregates.
//!
//! Identifiers are immutable values. Those built from text reject empty
//! input, so an aggregate never sees an absent required identifier.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Parsing
// ============================================================================

/// Error for identifiers and addresses that fail to parse
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseIdError {
    /// The input was empty or only whitespace
    #[error("{kind} must not be empty")]
    Empty {
        /// What was being parsed
        kind: &'static str,
    },

    /// The input is not an email address
    #[error("'{0}' is not an email address")]
    InvalidEmail(String),
}

fn non_empty(kind: &'static str, value: &str) -> Result<String, ParseIdError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ParseIdError::Empty { kind });
    }
    Ok(trimmed.to_string())
}

/// Declares a text newtype with `FromStr`, `Display` and `as_str`.
macro_rules! text_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Borrow the underlying text
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                non_empty($kind, s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

text_id!(
    /// Vendor identity, e.g. `vendor:VendorName1`
    VendorId,
    "vendor id"
);

text_id!(
    /// Display name of a vendor
    VendorName,
    "vendor name"
);

text_id!(
    /// A vendor contact number
    PhoneNumber,
    "phone number"
);

/// An email address (`local@domain`)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Borrow the address text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EmailAddress {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = non_empty("email address", s)?;
        match value.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
                Ok(Self(value))
            }
            _ => Err(ParseIdError::InvalidEmail(value)),
        }
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user, identified by their email address.
///
/// Purchase orders are sent from the email of the user who creates them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId {
    /// The user's email
    pub email: EmailAddress,
}

impl UserId {
    /// Create a user id from an email
    #[must_use]
    pub const fn new(email: EmailAddress) -> Self {
        Self { email }
    }
}

impl FromStr for UserId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self::new)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.email.fmt(f)
    }
}

// ============================================================================
// Menus and dishes
// ============================================================================

/// A menu, identified by its vendor and the moment it was imported
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuId {
    /// Vendor that published the menu
    pub vendor_id: VendorId,
    /// When the menu was imported
    pub when_imported: DateTime<Utc>,
}

impl fmt::Display for MenuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.vendor_id, self.when_imported.to_rfc3339())
    }
}

/// A dish's position within one menu
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DishId {
    /// Menu the dish was published in
    pub menu_id: MenuId,
    /// Position in the menu, starting at 1
    pub sequential_number: u32,
}

impl DishId {
    /// Vendor that serves this dish
    #[must_use]
    pub const fn vendor_id(&self) -> &VendorId {
        &self.menu_id.vendor_id
    }
}

impl fmt::Display for DishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.menu_id, self.sequential_number)
    }
}

/// An amount in minor currency units (cents)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a `Money` value from minor units
    #[must_use]
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Amount in minor units
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Sum, saturating at the numeric bounds
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A menu item.
///
/// Two dishes are the same line item only when every field matches; the
/// order multiset and the per-dish limit count by structural equality.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dish {
    /// Dish identity within its menu
    pub id: DishId,
    /// Dish name
    pub name: String,
    /// Menu category (soups, salads, ...)
    pub category: String,
    /// Price per portion
    pub price: Money,
}

/// Inclusive range of calendar dates a menu is served on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MenuDateRange {
    /// First day
    pub start: NaiveDate,
    /// Last day
    pub end: NaiveDate,
}

impl MenuDateRange {
    /// Create a range; validity is checked when it is assigned to a menu
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for MenuDateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// A vendor's published menu
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Menu {
    /// Menu identity
    pub id: MenuId,
    /// Dishes in publication order
    pub dishes: Vec<Dish>,
    /// Days the menu is served; unset until assigned
    pub date_range: Option<MenuDateRange>,
}

// ============================================================================
// Orders
// ============================================================================

/// One user's order with one vendor for one day
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId {
    /// Who orders
    pub user_id: UserId,
    /// Who cooks
    pub vendor_id: VendorId,
    /// Which day
    pub order_date: NaiveDate,
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.vendor_id, self.order_date)
    }
}

/// Order lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// No order yet
    #[default]
    Undefined,
    /// Open for changes
    Active,
    /// Canceled by the user or with its purchase order
    Canceled,
    /// Included in a purchase order
    Processed,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "UNDEFINED",
            Self::Active => "ACTIVE",
            Self::Canceled => "CANCELED",
            Self::Processed => "PROCESSED",
        };
        f.write_str(name)
    }
}

/// Snapshot of an order as carried by purchase orders and events
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identity
    pub id: OrderId,
    /// Status at snapshot time
    pub status: OrderStatus,
    /// Dishes, duplicates allowed
    pub dishes: Vec<Dish>,
}

// ============================================================================
// Purchase orders
// ============================================================================

/// The consolidated order sent to one vendor for one day
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PurchaseOrderId {
    /// Vendor the purchase order goes to
    pub vendor_id: VendorId,
    /// Delivery day
    pub po_date: NaiveDate,
}

impl fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.vendor_id, self.po_date)
    }
}

/// Purchase order lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseOrderStatus {
    /// No purchase order yet
    #[default]
    Undefined,
    /// Created, not yet validated
    Created,
    /// Passed validation or was overruled
    Valid,
    /// Failed validation
    Invalid,
    /// Dispatched to the vendor
    Sent,
    /// Received from the vendor
    Delivered,
    /// Canceled
    Canceled,
}

impl PurchaseOrderStatus {
    /// True once no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }
}

impl fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Undefined => "UNDEFINED",
            Self::Created => "CREATED",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Sent => "SENT",
            Self::Delivered => "DELIVERED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(name)
    }
}

/// Snapshot of a purchase order, as dispatched to the vendor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    /// Purchase order identity
    pub id: PurchaseOrderId,
    /// Status at snapshot time
    pub status: PurchaseOrderStatus,
    /// Order snapshots taken at creation
    pub orders: Vec<Order>,
}

impl PurchaseOrder {
    /// Sum of all dish prices across the orders
    #[must_use]
    pub fn total(&self) -> Money {
        self.orders
            .iter()
            .flat_map(|order| &order.dishes)
            .fold(Money::default(), |sum, dish| sum.saturating_add(dish.price))
    }
}
