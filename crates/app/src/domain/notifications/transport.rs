//! Webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use reqwest::{
    Client,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT},
};
use tracing::warn;

use crate::{
    domain::notifications::records::DeliveryResult,
    text::{MAX_STORED_BODY_CHARS, truncate},
};

/// Default bound on one webhook call.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every webhook delivery.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub user_agent: String,

    /// Timeout given to subscriptions created without one.
    pub default_timeout: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("waybill/{}", env!("CARGO_PKG_VERSION")),
            default_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }
}

/// A signed webhook call, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub url: String,
    pub body: String,
    /// Applied in order; later values replace earlier ones.
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Sends webhook calls. Every failure is reported in the result.
#[automock]
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, request: WebhookRequest) -> DeliveryResult;
}

#[derive(Debug, Clone)]
pub struct HttpWebhookTransport {
    http: Client,
    user_agent: String,
}

impl HttpWebhookTransport {
    #[must_use]
    pub fn new(settings: &NotificationSettings) -> Self {
        Self {
            http: Client::new(),
            user_agent: settings.user_agent.clone(),
        }
    }

    fn headers(&self, request: &WebhookRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &request.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "skipping invalid webhook header"),
            }
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Ok(user_agent) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(USER_AGENT, user_agent);
        }

        headers
    }
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn send(&self, request: WebhookRequest) -> DeliveryResult {
        let response = self
            .http
            .post(&request.url)
            .headers(self.headers(&request))
            .timeout(request.timeout)
            .body(request.body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                let message = if error.is_timeout() {
                    format!("timed out after {}s", request.timeout.as_secs())
                } else {
                    error.to_string()
                };

                return DeliveryResult {
                    succeeded: false,
                    response_code: None,
                    response_body: None,
                    error_message: Some(message),
                };
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        DeliveryResult {
            succeeded: status.is_success(),
            response_code: Some(status.as_u16()),
            response_body: Some(truncate(&body, MAX_STORED_BODY_CHARS)),
            error_message: (!status.is_success())
                .then(|| format!("subscriber responded with status {status}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> WebhookRequest {
        WebhookRequest {
            url: "https://hooks.example.com".to_string(),
            body: "{}".to_string(),
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
                .collect(),
            timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    #[test]
    fn custom_headers_cannot_replace_content_type() {
        let transport = HttpWebhookTransport::new(&NotificationSettings::default());

        let headers = transport.headers(&request(&[
            ("Content-Type", "text/plain"),
            ("X-Tenant", "acme"),
        ]));

        assert_eq!(headers.get(CONTENT_TYPE).map(HeaderValue::as_bytes), Some(&b"application/json"[..]));
        assert_eq!(headers.get("x-tenant").map(HeaderValue::as_bytes), Some(&b"acme"[..]));
    }

    #[test]
    fn later_headers_replace_earlier_ones() {
        let transport = HttpWebhookTransport::new(&NotificationSettings::default());

        let headers = transport.headers(&request(&[
            ("X-Waybill-Event", "spoofed"),
            ("X-Waybill-Event", "order.dispatched"),
        ]));

        assert_eq!(
            headers.get("x-waybill-event").map(HeaderValue::as_bytes),
            Some(&b"order.dispatched"[..])
        );
    }

    #[test]
    fn invalid_headers_are_skipped() {
        let transport = HttpWebhookTransport::new(&NotificationSettings::default());

        let headers = transport.headers(&request(&[("bad header", "x")]));

        assert!(headers.get(USER_AGENT).is_some());
        assert_eq!(headers.len(), 2);
    }
}
