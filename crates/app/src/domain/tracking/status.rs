//! Carrier status vocabulary.

use crate::domain::orders::records::OrderStatus;

/// Carrier statuses with a specific meaning, matched case-insensitively.
const STATUS_TABLE: &[(&str, OrderStatus)] = &[
    ("delivered", OrderStatus::Delivered),
    ("manifested", OrderStatus::Pending),
    ("not picked", OrderStatus::Pending),
    ("returned", OrderStatus::Returned),
];

/// Map a raw carrier status to an order status.
///
/// Anything the table does not name is treated as still moving.
#[must_use]
pub fn map_carrier_status(raw: &str) -> OrderStatus {
    let normalized = raw.trim().to_lowercase();

    STATUS_TABLE
        .iter()
        .find(|(carrier_status, _)| *carrier_status == normalized)
        .map_or(OrderStatus::InTransit, |(_, status)| *status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_are_mapped() {
        assert_eq!(map_carrier_status("Delivered"), OrderStatus::Delivered);
        assert_eq!(map_carrier_status("Manifested"), OrderStatus::Pending);
        assert_eq!(map_carrier_status("Not Picked"), OrderStatus::Pending);
        assert_eq!(map_carrier_status("RETURNED"), OrderStatus::Returned);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(map_carrier_status("  delivered\n"), OrderStatus::Delivered);
    }

    #[test]
    fn unknown_statuses_default_to_in_transit() {
        assert_eq!(map_carrier_status("Reached destination hub"), OrderStatus::InTransit);
        assert_eq!(map_carrier_status(""), OrderStatus::InTransit);
    }
}
