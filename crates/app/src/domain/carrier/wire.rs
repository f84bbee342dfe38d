//! Courier wire format.

use serde::{Deserialize, Serialize};

use crate::domain::orders::records::{Order, PaymentMode, ShipmentDetails};

#[derive(Debug, Serialize)]
pub(super) struct CreateShipmentRequest<'a> {
    pub shipments: [ShipmentPayload<'a>; 1],
    pub pickup_location: PickupLocation<'a>,
}

impl<'a> CreateShipmentRequest<'a> {
    pub fn from_order(order: &'a Order) -> Self {
        Self {
            shipments: [ShipmentPayload::from_order(order)],
            pickup_location: PickupLocation {
                name: &order.pickup_location,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PickupLocation<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct ShipmentPayload<'a> {
    pub order: &'a str,
    pub name: &'a str,
    pub add: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub country: &'a str,
    pub pin: &'a str,
    pub phone: &'a str,
    pub products_desc: &'a str,
    pub payment_mode: &'static str,
    pub total_amount: String,
    pub cod_amount: String,
    /// Grams.
    pub weight: u32,
}

impl<'a> ShipmentPayload<'a> {
    fn from_order(order: &'a Order) -> Self {
        let shipment = &order.shipment;

        Self {
            order: &order.reference,
            name: &shipment.consignee_name,
            add: &shipment.address,
            city: &shipment.city,
            state: &shipment.state,
            country: &shipment.country,
            pin: &shipment.postal_code,
            phone: &shipment.phone,
            products_desc: &shipment.product_description,
            payment_mode: payment_mode(shipment.payment_mode),
            total_amount: format_amount(shipment.declared_value),
            cod_amount: format_amount(cod_amount(shipment)),
            weight: shipment.weight_grams,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct EditShipmentRequest<'a> {
    pub waybill: &'a str,
    pub name: &'a str,
    pub add: &'a str,
    pub phone: &'a str,
    pub products_desc: &'a str,
    pub pt: &'static str,
    pub cod: String,
    pub gm: u32,
}

impl<'a> EditShipmentRequest<'a> {
    pub fn from_order(order: &'a Order, waybill: &'a str) -> Self {
        let shipment = &order.shipment;

        Self {
            waybill,
            name: &shipment.consignee_name,
            add: &shipment.address,
            phone: &shipment.phone,
            products_desc: &shipment.product_description,
            pt: payment_mode(shipment.payment_mode),
            cod: format_amount(cod_amount(shipment)),
            gm: shipment.weight_grams,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct CreateShipmentResponse {
    #[serde(default)]
    pub success: bool,

    #[serde(default)]
    pub packages: Vec<PackageResult>,

    #[serde(default)]
    pub rmk: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct PackageResult {
    #[serde(default)]
    pub waybill: Option<String>,

    #[serde(default)]
    pub remarks: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct EditShipmentResponse {
    #[serde(default)]
    pub status: bool,

    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct TrackResponse {
    #[serde(default)]
    pub shipment_data: Option<Vec<ShipmentDataEntry>>,

    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct ShipmentDataEntry {
    pub shipment: TrackedShipmentWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct TrackedShipmentWire {
    #[serde(rename = "AWB")]
    pub awb: String,

    pub status: TrackedStatusWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(super) struct TrackedStatusWire {
    pub status: String,
}

const fn payment_mode(mode: PaymentMode) -> &'static str {
    match mode {
        PaymentMode::Prepaid => "Prepaid",
        PaymentMode::CashOnDelivery => "COD",
    }
}

fn cod_amount(shipment: &ShipmentDetails) -> u64 {
    match shipment.payment_mode {
        PaymentMode::Prepaid => 0,
        PaymentMode::CashOnDelivery => shipment.cod_amount.unwrap_or(shipment.declared_value),
    }
}

/// Render minor currency units as a decimal string.
fn format_amount(minor: u64) -> String {
    format!("{}.{:02}", minor / 100, minor % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_are_rendered_in_major_units() {
        assert_eq!(format_amount(0), "0.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(129_950), "1299.50");
    }

    #[test]
    fn prepaid_shipments_collect_nothing() {
        let shipment = crate::test::fixtures::shipment();

        assert_eq!(cod_amount(&shipment), 0);
    }

    #[test]
    fn cash_on_delivery_defaults_to_declared_value() {
        let shipment = ShipmentDetails {
            payment_mode: PaymentMode::CashOnDelivery,
            cod_amount: None,
            declared_value: 4_200,
            ..crate::test::fixtures::shipment()
        };

        assert_eq!(cod_amount(&shipment), 4_200);
    }

    #[test]
    fn tracking_response_uses_carrier_field_names() -> Result<(), serde_json::Error> {
        let body = r#"{"ShipmentData":[{"Shipment":{"AWB":"WB1","Status":{"Status":"Manifested","StatusDateTime":"2026-01-01T10:00:00"}}}]}"#;

        let parsed: TrackResponse = serde_json::from_str(body)?;
        let entries = parsed.shipment_data.unwrap_or_default();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries.first().map(|e| e.shipment.awb.as_str()), Some("WB1"));

        Ok(())
    }
}
