use std::time::Duration;

use clap::Args;
use sqlx::PgPool;
use waybill_app::{
    context::{AppContext, AppSettings},
    database::{self, DEFAULT_MAX_CONNECTIONS},
    domain::{
        carrier::{CarrierSettings, DEFAULT_CARRIER_TIMEOUT},
        notifications::NotificationSettings,
        tracking::TrackingSettings,
    },
};

#[derive(Debug, Args)]
pub(crate) struct DatabaseArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Upper bound on pooled connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    database_max_connections: u32,
}

impl DatabaseArgs {
    pub(crate) async fn connect(&self) -> Result<PgPool, String> {
        database::connect(&self.database_url, self.database_max_connections)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))
    }
}

/// Connection and service options for commands that talk to the carrier
/// or to webhook endpoints.
#[derive(Debug, Args)]
pub(crate) struct ServiceArgs {
    #[command(flatten)]
    database: DatabaseArgs,

    /// Carrier API root
    #[arg(long, env = "CARRIER_BASE_URL", default_value = "https://track.delhivery.com")]
    carrier_base_url: String,

    /// Timeout for each carrier call, in seconds
    #[arg(long, env = "CARRIER_TIMEOUT_SECONDS", default_value_t = DEFAULT_CARRIER_TIMEOUT.as_secs())]
    carrier_timeout_seconds: u64,

    /// User agent sent with webhook deliveries
    #[arg(long, env = "WEBHOOK_USER_AGENT")]
    webhook_user_agent: Option<String>,
}

impl ServiceArgs {
    pub(crate) async fn context(&self) -> Result<AppContext, String> {
        let pool = self.database.connect().await?;

        let defaults = NotificationSettings::default();

        AppContext::new(
            pool,
            AppSettings {
                carrier: CarrierSettings {
                    base_url: self.carrier_base_url.clone(),
                    timeout: Duration::from_secs(self.carrier_timeout_seconds),
                },
                tracking: TrackingSettings::default(),
                notifications: NotificationSettings {
                    user_agent: self
                        .webhook_user_agent
                        .clone()
                        .unwrap_or(defaults.user_agent),
                    ..defaults
                },
            },
        )
        .map_err(|error| format!("failed to initialise services: {error}"))
    }
}
