//! Waybill worker
//!
//! Sweeps orders awaiting dispatch and refreshes the courier status of open
//! shipments on fixed intervals until it receives Ctrl+C or SIGTERM.

use std::{process, sync::Arc};

use tokio::sync::watch;
use tracing::{error, info};
use waybill_app::{context::AppContext, database};

use crate::{config::WorkerConfig, observability::Observability};

mod config;
mod observability;
mod shutdown;
mod sweeps;

/// Waybill worker entry point
#[tokio::main]
pub async fn main() {
    let config = WorkerConfig::load().unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for config errors"
        )]
        {
            eprintln!("Configuration error: {e}");
        }

        process::exit(1);
    });

    let observability = Observability::init(&config).unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging failed to initialise, must use eprintln"
        )]
        {
            eprintln!("Observability error: {e}");
        }

        process::exit(1);
    });

    let pool = match database::connect(
        &config.database.database_url,
        config.database.database_max_connections,
    )
    .await
    {
        Ok(pool) => pool,
        Err(connect_error) => {
            error!("failed to connect to database: {connect_error}");
            observability.shutdown();

            process::exit(1);
        }
    };

    let app = match AppContext::new(pool, config.app_settings()) {
        Ok(app) => app,
        Err(init_error) => {
            error!("failed to initialize app context: {init_error}");
            observability.shutdown();

            process::exit(1);
        }
    };

    let (stop, stopped) = watch::channel(false);

    tokio::spawn(async move {
        if let Err(error) = shutdown::listen(stop).await {
            error!("failed to listen for shutdown signal: {error}");
        }
    });

    info!(
        dispatch_interval = ?config.schedule.dispatch_interval(),
        refresh_interval = ?config.schedule.refresh_interval(),
        "worker started"
    );

    tokio::join!(
        sweeps::dispatch_loop(
            Arc::clone(&app.fulfillment),
            config.schedule.dispatch_interval(),
            config.schedule.dispatch_sweep_limit,
            stopped.clone(),
        ),
        sweeps::tracking_loop(
            Arc::clone(&app.tracking),
            config.schedule.refresh_interval(),
            config.tracking.tracking_max_batch,
            stopped,
        ),
    );

    info!("waiting for webhook deliveries to finish");
    app.notifications.drain().await;

    info!("worker stopped");
    observability.shutdown();
}
