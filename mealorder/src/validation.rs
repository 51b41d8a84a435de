//! Pure validation rules shared by the aggregates.
//!
//! Every function here is a predicate or a query over values; none of them
//! read the clock or any aggregate state on their own.

use crate::types::{Dish, DishId, Menu, MenuDateRange, MenuId, Order, OrderStatus, PurchaseOrderId, VendorId};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Most portions of one distinct dish a single order may hold.
///
/// An order with more copies of any one dish is flagged during purchase
/// order validation.
pub const MAX_SINGLE_DISH_COUNT: usize = 20;

// ============================================================================
// Menu date ranges
// ============================================================================

/// A range can be assigned when it starts today or later and ends after it
/// starts.
#[must_use]
pub fn is_valid_date_range(range: &MenuDateRange, today: NaiveDate) -> bool {
    range.start >= today && range.start < range.end
}

/// Two inclusive ranges overlap when they share at least one day
#[must_use]
pub fn ranges_overlap(a: &MenuDateRange, b: &MenuDateRange) -> bool {
    a.start <= b.end && b.start <= a.end
}

/// Inclusive on both ends
#[must_use]
pub fn range_includes_date(range: &MenuDateRange, date: NaiveDate) -> bool {
    range.start <= date && date <= range.end
}

/// Another menu whose committed range overlaps `range`.
///
/// The menu being re-ranged (`menu_id`) is skipped, so moving a menu's own
/// dates never conflicts with its previous range.
#[must_use]
pub fn find_overlapping_menu<'a>(menus: &'a [Menu], menu_id: &MenuId, range: &MenuDateRange) -> Option<&'a Menu> {
    menus.iter().find(|menu| {
        &menu.id != menu_id
            && menu
                .date_range
                .as_ref()
                .is_some_and(|existing| ranges_overlap(existing, range))
    })
}

/// True when `menu_id` is one of `menus` and its range covers `date`
#[must_use]
pub fn menu_covers_date(menus: &[Menu], menu_id: &MenuId, date: NaiveDate) -> bool {
    menus
        .iter()
        .find(|menu| &menu.id == menu_id)
        .and_then(|menu| menu.date_range.as_ref())
        .is_some_and(|range| range_includes_date(range, date))
}

// ============================================================================
// Orders
// ============================================================================

/// Vendor of the dish, when it differs from `vendor_id`
#[must_use]
pub fn dish_vendor_mismatch<'a>(dish: &'a Dish, vendor_id: &VendorId) -> Option<&'a VendorId> {
    let actual = dish.id.vendor_id();
    (actual != vendor_id).then_some(actual)
}

/// Index of the first dish with the given id
#[must_use]
pub fn position_of_dish(dishes: &[Dish], dish_id: &DishId) -> Option<usize> {
    dishes.iter().position(|dish| &dish.id == dish_id)
}

/// Index of the first structurally equal dish
#[must_use]
pub fn position_of_equal_dish(dishes: &[Dish], dish: &Dish) -> Option<usize> {
    dishes.iter().position(|candidate| candidate == dish)
}

// ============================================================================
// Purchase orders
// ============================================================================

/// An order can join a purchase order when it is active, for the purchase
/// order's vendor and day, and not empty.
#[must_use]
pub fn order_fits_purchase_order(order: &Order, purchase_order_id: &PurchaseOrderId) -> bool {
    order.status == OrderStatus::Active
        && order.id.vendor_id == purchase_order_id.vendor_id
        && order.id.order_date == purchase_order_id.po_date
        && !order.dishes.is_empty()
}

/// First order that cannot join the purchase order, if any
#[must_use]
pub fn first_unfit_order<'a>(orders: &'a [Order], purchase_order_id: &PurchaseOrderId) -> Option<&'a Order> {
    orders
        .iter()
        .find(|order| !order_fits_purchase_order(order, purchase_order_id))
}

/// Portions per distinct dish
#[must_use]
pub fn dish_counts(dishes: &[Dish]) -> HashMap<&Dish, usize> {
    let mut counts = HashMap::new();
    for dish in dishes {
        *counts.entry(dish).or_insert(0) += 1;
    }
    counts
}

/// No distinct dish exceeds [`MAX_SINGLE_DISH_COUNT`]
#[must_use]
pub fn is_order_valid(order: &Order) -> bool {
    dish_counts(&order.dishes)
        .values()
        .all(|&count| count <= MAX_SINGLE_DISH_COUNT)
}

/// Orders that fail [`is_order_valid`], in input order
#[must_use]
pub fn find_invalid_orders(orders: &[Order]) -> Vec<Order> {
    orders
        .iter()
        .filter(|order| !is_order_valid(order))
        .cloned()
        .collect()
}

/// True when any order fails [`is_order_valid`]
#[must_use]
pub fn has_invalid_orders(orders: &[Order]) -> bool {
    orders.iter().any(|order| !is_order_valid(order))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Money, OrderId};
    use chrono::{DateTime, Utc};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 2, day).unwrap()
    }

    fn range(start: u32, end: u32) -> MenuDateRange {
        MenuDateRange::new(date(start), date(end))
    }

    fn vendor() -> VendorId {
        "vendor:VendorName1".parse().unwrap()
    }

    fn menu_id(seconds: i64) -> MenuId {
        MenuId {
            vendor_id: vendor(),
            when_imported: DateTime::<Utc>::from_timestamp(seconds, 0).unwrap(),
        }
    }

    fn menu(seconds: i64, date_range: Option<MenuDateRange>) -> Menu {
        Menu {
            id: menu_id(seconds),
            dishes: Vec::new(),
            date_range,
        }
    }

    fn dish(number: u32) -> Dish {
        Dish {
            id: DishId {
                menu_id: menu_id(0),
                sequential_number: number,
            },
            name: format!("dish {number}"),
            category: "soups".to_string(),
            price: Money::from_minor(450),
        }
    }

    fn order(dishes: Vec<Dish>) -> Order {
        Order {
            id: OrderId {
                user_id: "user@example.com".parse().unwrap(),
                vendor_id: vendor(),
                order_date: date(15),
            },
            status: OrderStatus::Active,
            dishes,
        }
    }

    #[test]
    fn date_range_must_start_today_or_later() {
        assert!(is_valid_date_range(&range(13, 21), date(13)));
        assert!(is_valid_date_range(&range(13, 21), date(1)));
        assert!(!is_valid_date_range(&range(13, 21), date(14)));
    }

    #[test]
    fn date_range_must_end_after_start() {
        assert!(!is_valid_date_range(&range(13, 13), date(1)));
        assert!(!is_valid_date_range(&range(21, 13), date(1)));
    }

    #[test]
    fn touching_ranges_overlap() {
        assert!(ranges_overlap(&range(13, 21), &range(21, 25)));
        assert!(ranges_overlap(&range(10, 25), &range(13, 21)));
        assert!(!ranges_overlap(&range(13, 20), &range(21, 25)));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        assert!(range_includes_date(&range(13, 21), date(13)));
        assert!(range_includes_date(&range(13, 21), date(21)));
        assert!(!range_includes_date(&range(13, 21), date(22)));
    }

    #[test]
    fn overlapping_menu_ignores_the_menu_itself_and_unset_ranges() {
        let menus = vec![menu(1, Some(range(13, 21))), menu(2, None)];
        assert!(find_overlapping_menu(&menus, &menu_id(1), &range(14, 22)).is_none());
        assert!(find_overlapping_menu(&menus, &menu_id(2), &range(20, 25)).is_some());
        assert!(find_overlapping_menu(&menus, &menu_id(2), &range(22, 25)).is_none());
    }

    #[test]
    fn menu_must_be_ranged_to_cover_a_date() {
        let menus = vec![menu(1, Some(range(13, 21))), menu(2, None)];
        assert!(menu_covers_date(&menus, &menu_id(1), date(15)));
        assert!(!menu_covers_date(&menus, &menu_id(2), date(15)));
        assert!(!menu_covers_date(&menus, &menu_id(3), date(15)));
    }

    #[test]
    fn dish_vendor_mismatch_reports_actual_vendor() {
        let other: VendorId = "vendor:Other".parse().unwrap();
        assert_eq!(dish_vendor_mismatch(&dish(1), &other), Some(&vendor()));
        assert_eq!(dish_vendor_mismatch(&dish(1), &vendor()), None);
    }

    #[test]
    fn order_fit_checks_status_vendor_date_and_dishes() {
        let po = PurchaseOrderId {
            vendor_id: vendor(),
            po_date: date(15),
        };
        assert!(order_fits_purchase_order(&order(vec![dish(1)]), &po));
        assert!(!order_fits_purchase_order(&order(Vec::new()), &po));

        let mut canceled = order(vec![dish(1)]);
        canceled.status = OrderStatus::Canceled;
        assert!(!order_fits_purchase_order(&canceled, &po));

        let other_day = PurchaseOrderId {
            vendor_id: vendor(),
            po_date: date(16),
        };
        assert!(!order_fits_purchase_order(&order(vec![dish(1)]), &other_day));
    }

    #[test]
    fn dish_threshold_is_twenty() {
        let twenty = order(vec![dish(1); 20]);
        let twenty_one = order(vec![dish(1); 21]);
        assert!(is_order_valid(&twenty));
        assert!(!is_order_valid(&twenty_one));
        assert_eq!(find_invalid_orders(&[twenty.clone(), twenty_one.clone()]), vec![twenty_one]);
        assert!(!has_invalid_orders(&[twenty]));
    }

    #[test]
    fn threshold_counts_distinct_dishes_separately() {
        let mut dishes = vec![dish(1); 20];
        dishes.extend(vec![dish(2); 20]);
        assert!(is_order_valid(&order(dishes)));
    }
}
