//! Ready-made catalog entries.

use crate::mocks::test_clock;
use chrono::Duration;
use flashgate_core::{Clock, Item, ItemId, Money, SaleWindow};

/// A sale window that is open at [`test_clock`] time and for the next day.
#[must_use]
pub fn open_window() -> SaleWindow {
    let now = test_clock().now();
    SaleWindow::new(now - Duration::hours(1), now + Duration::days(1))
}

/// A sale window that opens an hour after [`test_clock`] time.
#[must_use]
pub fn upcoming_window() -> SaleWindow {
    let now = test_clock().now();
    SaleWindow::starting_at(now + Duration::hours(1), Duration::hours(1))
}

/// A sale window that closed an hour before [`test_clock`] time.
#[must_use]
pub fn ended_window() -> SaleWindow {
    let now = test_clock().now();
    SaleWindow::new(now - Duration::hours(2), now - Duration::hours(1))
}

/// An item on sale at [`test_clock`] time with `stock` units.
#[must_use]
pub fn open_item(id: ItemId, stock: i64) -> Item {
    Item {
        id,
        name: format!("Flash item {id}"),
        price: Money::from_cents(1_999),
        remaining_stock: stock,
        sale_window: open_window(),
    }
}
