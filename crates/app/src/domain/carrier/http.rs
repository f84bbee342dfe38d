//! HTTP carrier gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder, StatusCode,
    header::{ACCEPT, AUTHORIZATION},
};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::{
    domain::{
        carrier::{
            errors::CarrierError,
            gateway::{CarrierGateway, TrackedShipment},
            wire::{
                CreateShipmentRequest, CreateShipmentResponse, EditShipmentRequest,
                EditShipmentResponse, TrackResponse,
            },
        },
        credentials::records::CourierCredential,
        orders::records::{Order, TrackingId},
    },
    text::truncate,
};

/// Default bound on a single carrier call.
pub const DEFAULT_CARRIER_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters of a carrier error body kept in error messages.
const MAX_ERROR_DETAIL_CHARS: usize = 500;

/// Connection settings for the courier API.
#[derive(Debug, Clone)]
pub struct CarrierSettings {
    /// API root, e.g. `"https://track.delhivery.com"`.
    pub base_url: String,

    /// Bound on each call, connect to last byte.
    pub timeout: Duration,
}

impl Default for CarrierSettings {
    fn default() -> Self {
        Self {
            base_url: "https://track.delhivery.com".to_string(),
            timeout: DEFAULT_CARRIER_TIMEOUT,
        }
    }
}

/// Courier API client authenticating with the per-tenant credential.
#[derive(Debug, Clone)]
pub struct HttpCarrierGateway {
    base_url: String,
    http: Client,
}

impl HttpCarrierGateway {
    /// Create a client from the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised.
    pub fn new(settings: CarrierSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        credential: &CourierCredential,
    ) -> Result<String, CarrierError> {
        let response = request
            .header(AUTHORIZATION, format!("Token {}", credential.api_key.expose()))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if let Err(error) = classify_status(status, &body) {
            warn!(%status, retryable = error.is_retryable(), "carrier call failed");

            return Err(error);
        }

        Ok(body)
    }
}

#[async_trait]
impl CarrierGateway for HttpCarrierGateway {
    #[instrument(skip_all, fields(order = %order.uuid, credential = %credential.key))]
    async fn create_shipment(
        &self,
        credential: &CourierCredential,
        order: &Order,
    ) -> Result<TrackingId, CarrierError> {
        let request = self
            .http
            .post(self.url("/api/cmu/create.json"))
            .json(&CreateShipmentRequest::from_order(order));

        let body = self.send(request, credential).await?;
        let tracking_id = parse_created(&body)?;

        debug!(%tracking_id, "carrier issued tracking id");

        Ok(tracking_id)
    }

    #[instrument(skip_all, fields(order = %order.uuid, %tracking_id))]
    async fn edit_shipment(
        &self,
        credential: &CourierCredential,
        order: &Order,
        tracking_id: &TrackingId,
    ) -> Result<(), CarrierError> {
        let request = self
            .http
            .post(self.url("/api/p/edit"))
            .json(&EditShipmentRequest::from_order(order, tracking_id.as_str()));

        let body = self.send(request, credential).await?;

        parse_edited(&body)
    }

    #[instrument(skip_all, fields(credential = %credential.key, count = tracking_ids.len()))]
    async fn track(
        &self,
        credential: &CourierCredential,
        tracking_ids: &[TrackingId],
    ) -> Result<Vec<TrackedShipment>, CarrierError> {
        let waybills = tracking_ids
            .iter()
            .map(TrackingId::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let request = self
            .http
            .get(self.url("/api/v1/packages/json/"))
            .query(&[("waybill", waybills)]);

        let body = self.send(request, credential).await?;

        parse_tracked(&body)
    }
}

/// Map a response status to the carrier error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> Result<(), CarrierError> {
    if status.is_success() {
        return Ok(());
    }

    let detail = format!("status {status}: {}", truncate(body, MAX_ERROR_DETAIL_CHARS));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CarrierError::Auth(detail)),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(CarrierError::Transient(detail))
        }
        status if status.is_client_error() => Err(CarrierError::Validation(detail)),
        _ => Err(CarrierError::Transient(detail)),
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, CarrierError> {
    serde_json::from_str(body)
        .map_err(|error| CarrierError::Transient(format!("malformed response body: {error}")))
}

fn parse_created(body: &str) -> Result<TrackingId, CarrierError> {
    let response: CreateShipmentResponse = decode(body)?;

    if !response.success {
        let remarks: Vec<String> = response
            .packages
            .into_iter()
            .flat_map(|package| package.remarks)
            .collect();

        let reason = if remarks.is_empty() {
            response
                .rmk
                .unwrap_or_else(|| "shipment rejected".to_string())
        } else {
            remarks.join("; ")
        };

        return Err(CarrierError::Validation(reason));
    }

    response
        .packages
        .into_iter()
        .filter_map(|package| package.waybill)
        .map(|waybill| waybill.trim().to_string())
        .find(|waybill| !waybill.is_empty())
        .map(TrackingId::new)
        .ok_or_else(|| CarrierError::Transient("response carried no waybill".to_string()))
}

fn parse_edited(body: &str) -> Result<(), CarrierError> {
    let response: EditShipmentResponse = decode(body)?;

    if response.status {
        Ok(())
    } else {
        Err(CarrierError::Validation(
            response
                .error
                .unwrap_or_else(|| "edit rejected".to_string()),
        ))
    }
}

fn parse_tracked(body: &str) -> Result<Vec<TrackedShipment>, CarrierError> {
    let response: TrackResponse = decode(body)?;

    if let Some(error) = response.error {
        return Err(CarrierError::Validation(error));
    }

    let entries = response.shipment_data.ok_or_else(|| {
        CarrierError::Transient("response carried no shipment data".to_string())
    })?;

    Ok(entries
        .into_iter()
        .map(|entry| TrackedShipment {
            tracking_id: TrackingId::new(entry.shipment.awb),
            carrier_status: entry.shipment.status.status,
        })
        .collect())
}
