//! Vendor aggregate.
//!
//! Owns a vendor's profile and its published menus. Menus are only ever
//! appended; assigning a date range replaces that menu's range in place.
//! At most one menu of a vendor covers any given day.

use crate::types::{Dish, EmailAddress, Menu, MenuDateRange, MenuId, PhoneNumber, UserId, VendorId, VendorName};
use crate::validation::{find_overlapping_menu, is_valid_date_range};
use chrono::{DateTime, NaiveTime, Utc};
use mealorder_core::environment::Clock;
use mealorder_core::reducer::{Events, Reducer};
use mealorder_core::smallvec;
use mealorder_macros::{Command, Event};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Commands
// ============================================================================

/// New values for a vendor's profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorChange {
    /// Name before the change, for auditing
    pub previous_vendor_name: VendorName,
    /// New name
    pub new_vendor_name: VendorName,
    /// New contact email
    pub new_email: EmailAddress,
    /// New contact numbers (replace the old ones)
    pub new_phone_numbers: Vec<PhoneNumber>,
    /// New daily purchase order deadline
    pub new_po_daily_deadline: NaiveTime,
}

/// Commands accepted by the vendor aggregate
#[derive(Command, Clone, Debug, Serialize, Deserialize)]
pub enum VendorCommand {
    /// Register a vendor
    AddVendor {
        /// Vendor to register
        vendor_id: VendorId,
        /// Who registers it
        who_adds: UserId,
        /// Display name
        vendor_name: VendorName,
        /// Where purchase orders go
        email: EmailAddress,
        /// Contact numbers
        phone_numbers: Vec<PhoneNumber>,
        /// Purchase orders must be sent before this time of day
        po_daily_deadline: NaiveTime,
    },

    /// Overwrite the vendor's profile
    UpdateVendor {
        /// Vendor to update
        vendor_id: VendorId,
        /// Who updates it
        who_updates: UserId,
        /// New profile values
        change: VendorChange,
    },

    /// Publish a new menu with no date range
    ImportMenu {
        /// Vendor publishing the menu
        vendor_id: VendorId,
        /// Who imports it
        who_imports: UserId,
        /// Identity of the new menu
        menu_id: MenuId,
        /// Dishes in publication order
        dishes: Vec<Dish>,
    },

    /// Assign the days a menu is served on
    SetDateRangeForMenu {
        /// Vendor owning the menu
        vendor_id: VendorId,
        /// Who sets the range
        who_sets: UserId,
        /// Menu to range
        menu_id: MenuId,
        /// Days to serve it
        range: MenuDateRange,
    },
}

impl VendorCommand {
    /// The vendor this command is addressed to
    #[must_use]
    pub const fn vendor_id(&self) -> &VendorId {
        match self {
            Self::AddVendor { vendor_id, .. }
            | Self::UpdateVendor { vendor_id, .. }
            | Self::ImportMenu { vendor_id, .. }
            | Self::SetDateRangeForMenu { vendor_id, .. } => vendor_id,
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Facts recorded by the vendor aggregate
#[derive(Event, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VendorEvent {
    /// A vendor was registered
    VendorAdded {
        /// Registered vendor
        vendor_id: VendorId,
        /// Who registered it
        who_added: UserId,
        /// Display name
        vendor_name: VendorName,
        /// Where purchase orders go
        email: EmailAddress,
        /// Contact numbers
        phone_numbers: Vec<PhoneNumber>,
        /// Daily purchase order deadline
        po_daily_deadline: NaiveTime,
        /// When it was registered
        when_added: DateTime<Utc>,
    },

    /// The vendor's profile was overwritten
    VendorUpdated {
        /// Updated vendor
        vendor_id: VendorId,
        /// Who updated it
        who_updated: UserId,
        /// When
        when_updated: DateTime<Utc>,
        /// New profile values
        change: VendorChange,
    },

    /// A menu was published
    MenuImported {
        /// Publishing vendor
        vendor_id: VendorId,
        /// New menu
        menu_id: MenuId,
        /// Who imported it
        who_imported: UserId,
        /// When
        when_imported: DateTime<Utc>,
        /// Dishes in publication order
        dishes: Vec<Dish>,
    },

    /// A menu was assigned the days it is served on
    DateRangeForMenuSet {
        /// Owning vendor
        vendor_id: VendorId,
        /// Ranged menu
        menu_id: MenuId,
        /// Who set the range
        who_set: UserId,
        /// When
        when_set: DateTime<Utc>,
        /// Assigned range
        range: MenuDateRange,
    },
}

// ============================================================================
// Rejections
// ============================================================================

/// Commands the vendor aggregate refuses
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum VendorRejection {
    /// The vendor is already registered under this name
    #[error("Vendor {vendor_id} is already registered as '{vendor_name}'")]
    VendorAlreadyExists {
        /// Vendor identity
        vendor_id: VendorId,
        /// Name that was registered again
        vendor_name: VendorName,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// The menu id names another vendor or is already imported
    #[error("Cannot import menu {menu_id} into vendor {vendor_id}")]
    CannotImportMenu {
        /// Vendor identity
        vendor_id: VendorId,
        /// Menu that was to be imported
        menu_id: MenuId,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },

    /// The range is invalid, overlaps another menu, or names an unknown menu
    #[error("Cannot set date range {range} for menu {menu_id} of vendor {vendor_id}")]
    CannotSetDateRange {
        /// Vendor identity
        vendor_id: VendorId,
        /// Menu that was to be ranged
        menu_id: MenuId,
        /// Requested range
        range: MenuDateRange,
        /// When the command was refused
        timestamp: DateTime<Utc>,
    },
}

// ============================================================================
// State
// ============================================================================

/// Folded state of one vendor
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorState {
    /// Vendor identity, set once registered
    pub id: Option<VendorId>,
    /// Display name
    pub vendor_name: Option<VendorName>,
    /// Where purchase orders go
    pub email: Option<EmailAddress>,
    /// Contact numbers
    pub phone_numbers: Vec<PhoneNumber>,
    /// Daily purchase order deadline
    pub po_daily_deadline: Option<NaiveTime>,
    /// Published menus, oldest first
    pub menus: Vec<Menu>,
}

impl VendorState {
    /// Menu with the given id
    #[must_use]
    pub fn menu(&self, menu_id: &MenuId) -> Option<&Menu> {
        self.menus.iter().find(|menu| &menu.id == menu_id)
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment dependencies for the vendor aggregate
#[derive(Clone)]
pub struct VendorEnvironment {
    /// Clock for timestamps and for "today" in date range checks
    pub clock: Arc<dyn Clock>,
}

impl VendorEnvironment {
    /// Creates a new `VendorEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the vendor aggregate
#[derive(Clone, Debug, Default)]
pub struct VendorReducer;

impl Reducer for VendorReducer {
    type Id = VendorId;
    type State = VendorState;
    type Command = VendorCommand;
    type Event = VendorEvent;
    type Rejection = VendorRejection;
    type Environment = VendorEnvironment;

    const AGGREGATE_TYPE: &'static str = "vendor";

    fn target(command: &VendorCommand) -> VendorId {
        command.vendor_id().clone()
    }

    fn reduce(
        &self,
        state: &VendorState,
        command: VendorCommand,
        env: &VendorEnvironment,
    ) -> Result<Events<VendorEvent>, VendorRejection> {
        let now = env.clock.now();

        match command {
            VendorCommand::AddVendor {
                vendor_id,
                who_adds,
                vendor_name,
                email,
                phone_numbers,
                po_daily_deadline,
            } => {
                if state.vendor_name.as_ref() == Some(&vendor_name) {
                    return Err(VendorRejection::VendorAlreadyExists {
                        vendor_id,
                        vendor_name,
                        timestamp: now,
                    });
                }

                Ok(smallvec![VendorEvent::VendorAdded {
                    vendor_id,
                    who_added: who_adds,
                    vendor_name,
                    email,
                    phone_numbers,
                    po_daily_deadline,
                    when_added: now,
                }])
            }

            VendorCommand::UpdateVendor {
                vendor_id,
                who_updates,
                change,
            } => Ok(smallvec![VendorEvent::VendorUpdated {
                vendor_id,
                who_updated: who_updates,
                when_updated: now,
                change,
            }]),

            VendorCommand::ImportMenu {
                vendor_id,
                who_imports,
                menu_id,
                dishes,
            } => {
                if menu_id.vendor_id != vendor_id || state.menu(&menu_id).is_some() {
                    return Err(VendorRejection::CannotImportMenu {
                        vendor_id,
                        menu_id,
                        timestamp: now,
                    });
                }

                Ok(smallvec![VendorEvent::MenuImported {
                    vendor_id,
                    menu_id,
                    who_imported: who_imports,
                    when_imported: now,
                    dishes,
                }])
            }

            VendorCommand::SetDateRangeForMenu {
                vendor_id,
                who_sets,
                menu_id,
                range,
            } => {
                let allowed = state.menu(&menu_id).is_some()
                    && is_valid_date_range(&range, env.clock.today())
                    && find_overlapping_menu(&state.menus, &menu_id, &range).is_none();

                if !allowed {
                    return Err(VendorRejection::CannotSetDateRange {
                        vendor_id,
                        menu_id,
                        range,
                        timestamp: now,
                    });
                }

                Ok(smallvec![VendorEvent::DateRangeForMenuSet {
                    vendor_id,
                    menu_id,
                    who_set: who_sets,
                    when_set: now,
                    range,
                }])
            }
        }
    }

    fn apply_event(state: &mut VendorState, event: &VendorEvent) {
        match event {
            VendorEvent::VendorAdded {
                vendor_id,
                vendor_name,
                email,
                phone_numbers,
                po_daily_deadline,
                ..
            } => {
                state.id = Some(vendor_id.clone());
                state.vendor_name = Some(vendor_name.clone());
                state.email = Some(email.clone());
                state.phone_numbers.clone_from(phone_numbers);
                state.po_daily_deadline = Some(*po_daily_deadline);
            }

            VendorEvent::VendorUpdated { change, .. } => {
                state.vendor_name = Some(change.new_vendor_name.clone());
                state.email = Some(change.new_email.clone());
                state.phone_numbers.clone_from(&change.new_phone_numbers);
                state.po_daily_deadline = Some(change.new_po_daily_deadline);
            }

            VendorEvent::MenuImported { menu_id, dishes, .. } => {
                state.menus.push(Menu {
                    id: menu_id.clone(),
                    dishes: dishes.clone(),
                    date_range: None,
                });
            }

            VendorEvent::DateRangeForMenuSet { menu_id, range, .. } => {
                if let Some(menu) = state.menus.iter_mut().find(|menu| &menu.id == menu_id) {
                    menu.date_range = Some(*range);
                }
            }
        }
    }
}
