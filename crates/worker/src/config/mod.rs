//! Worker configuration module

use clap::Parser;
use waybill_app::context::AppSettings;

use crate::config::{
    db::DatabaseConfig,
    observability::{LoggingConfig, ObservabilityConfig},
    schedule::ScheduleConfig,
    services::{CarrierConfig, NotificationsConfig, TrackingConfig},
};

pub(crate) mod db;
pub(crate) mod observability;
pub(crate) mod schedule;
pub(crate) mod services;

/// Waybill worker configuration
#[derive(Debug, Parser)]
#[command(name = "waybill-worker", about = "Waybill dispatch and tracking worker", long_about = None)]
pub struct WorkerConfig {
    /// Logging output settings.
    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Trace export settings.
    #[command(flatten)]
    pub observability: ObservabilityConfig,

    /// Application database settings.
    #[command(flatten)]
    pub database: DatabaseConfig,

    /// Courier API settings.
    #[command(flatten)]
    pub carrier: CarrierConfig,

    /// Tracking refresh pacing.
    #[command(flatten)]
    pub tracking: TrackingConfig,

    /// Webhook delivery settings.
    #[command(flatten)]
    pub notifications: NotificationsConfig,

    /// Sweep intervals and sizes.
    #[command(flatten)]
    pub schedule: ScheduleConfig,
}

impl WorkerConfig {
    /// Load configuration from environment and CLI arguments
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be parsed
    pub fn load() -> Result<Self, clap::Error> {
        // Load .env file if present (ignore if missing)
        _ = dotenvy::dotenv();

        Self::try_parse()
    }

    /// Service settings for the application context.
    pub fn app_settings(&self) -> AppSettings {
        AppSettings {
            carrier: self.carrier.settings(),
            tracking: self.tracking.settings(),
            notifications: self.notifications.settings(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use testresult::TestResult;

    use super::*;

    #[test]
    fn defaults_match_service_defaults() -> TestResult {
        let config = WorkerConfig::try_parse_from([
            "waybill-worker",
            "--database-url",
            "postgres://localhost/waybill",
        ])?;

        let settings = config.app_settings();

        assert_eq!(settings.carrier.timeout, Duration::from_secs(30), "carrier timeout");
        assert_eq!(settings.tracking.page_size, 50, "page size");
        assert_eq!(settings.tracking.page_delay, Duration::from_millis(500), "page delay");
        assert_eq!(settings.tracking.max_batch, 100, "max batch");
        assert_eq!(
            settings.notifications.default_timeout,
            Duration::from_secs(30),
            "webhook timeout"
        );
        assert_eq!(config.schedule.refresh_interval(), Duration::from_secs(300), "refresh interval");
        assert_eq!(config.schedule.dispatch_interval(), Duration::from_secs(60), "dispatch interval");
        assert_eq!(config.schedule.dispatch_sweep_limit, 100, "sweep limit");

        Ok(())
    }

    #[test]
    fn flags_override_defaults() -> TestResult {
        let config = WorkerConfig::try_parse_from([
            "waybill-worker",
            "--database-url",
            "postgres://localhost/waybill",
            "--tracking-page-size",
            "25",
            "--tracking-page-delay-ms",
            "0",
            "--webhook-user-agent",
            "acme-hooks/1",
        ])?;

        let settings = config.app_settings();

        assert_eq!(settings.tracking.page_size, 25, "page size");
        assert_eq!(settings.tracking.page_delay, Duration::ZERO, "page delay");
        assert_eq!(settings.notifications.user_agent, "acme-hooks/1", "user agent");

        Ok(())
    }

    #[test]
    fn trace_export_is_off_by_default() -> TestResult {
        let config = WorkerConfig::try_parse_from([
            "waybill-worker",
            "--database-url",
            "postgres://localhost/waybill",
        ])?;

        assert!(!config.observability.otel_enabled, "otel enabled");
        assert_eq!(config.observability.otel_endpoint, "http://localhost:4317", "endpoint");
        assert_eq!(config.logging.log_format, observability::LogFormat::Compact, "log format");

        Ok(())
    }
}
