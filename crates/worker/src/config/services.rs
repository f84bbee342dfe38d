//! Courier, tracking and webhook settings.

use std::time::Duration;

use clap::Args;
use waybill_app::domain::{
    carrier::CarrierSettings, notifications::NotificationSettings, tracking::TrackingSettings,
};

/// Courier API settings.
#[derive(Debug, Args)]
pub struct CarrierConfig {
    /// Courier API root
    #[arg(long, env = "CARRIER_BASE_URL", default_value = "https://track.delhivery.com")]
    pub carrier_base_url: String,

    /// Timeout for each courier call, in seconds
    #[arg(long, env = "CARRIER_TIMEOUT_SECONDS", default_value_t = 30)]
    pub carrier_timeout_seconds: u64,
}

impl CarrierConfig {
    pub(crate) fn settings(&self) -> CarrierSettings {
        CarrierSettings {
            base_url: self.carrier_base_url.clone(),
            timeout: Duration::from_secs(self.carrier_timeout_seconds),
        }
    }
}

/// Tracking refresh pacing.
#[derive(Debug, Args)]
pub struct TrackingConfig {
    /// Tracking ids per courier call
    #[arg(long, env = "TRACKING_PAGE_SIZE", default_value_t = 50)]
    pub tracking_page_size: usize,

    /// Pause between calls made with the same credential, in milliseconds
    #[arg(long, env = "TRACKING_PAGE_DELAY_MS", default_value_t = 500)]
    pub tracking_page_delay_ms: u64,

    /// Most orders accepted by one refresh
    #[arg(long, env = "TRACKING_MAX_BATCH", default_value_t = 100)]
    pub tracking_max_batch: usize,
}

impl TrackingConfig {
    pub(crate) fn settings(&self) -> TrackingSettings {
        TrackingSettings {
            page_size: self.tracking_page_size,
            page_delay: Duration::from_millis(self.tracking_page_delay_ms),
            max_batch: self.tracking_max_batch,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Args)]
pub struct NotificationsConfig {
    /// User agent sent with webhook deliveries
    #[arg(long, env = "WEBHOOK_USER_AGENT")]
    pub webhook_user_agent: Option<String>,

    /// Timeout for subscriptions created without one, in seconds
    #[arg(long, env = "WEBHOOK_DEFAULT_TIMEOUT_SECONDS", default_value_t = 30)]
    pub webhook_default_timeout_seconds: u64,
}

impl NotificationsConfig {
    pub(crate) fn settings(&self) -> NotificationSettings {
        let defaults = NotificationSettings::default();

        NotificationSettings {
            user_agent: self
                .webhook_user_agent
                .clone()
                .unwrap_or(defaults.user_agent),
            default_timeout: Duration::from_secs(self.webhook_default_timeout_seconds),
        }
    }
}
