//! Scheduled dispatch and tracking sweeps.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};
use tracing::{Instrument, error, info, info_span};
use waybill_app::domain::{fulfillment::FulfillmentService, tracking::TrackingService};

/// Make one attempt for every order awaiting dispatch, each `interval`,
/// until `stop` flips.
pub(crate) async fn dispatch_loop(
    fulfillment: Arc<dyn FulfillmentService>,
    interval: Duration,
    limit: u32,
    stop: watch::Receiver<bool>,
) {
    run_every(interval, stop, || {
        let fulfillment = Arc::clone(&fulfillment);

        async move {
            match fulfillment.dispatch_due(limit).await {
                Ok(sweep) if sweep.attempted > 0 => info!(
                    attempted = sweep.attempted,
                    dispatched = sweep.dispatched,
                    failed = sweep.failed,
                    "dispatch sweep finished"
                ),
                Ok(_) => {}
                Err(error) => error!(%error, "dispatch sweep failed"),
            }
        }
        .instrument(info_span!("dispatch_sweep"))
    })
    .await;
}

/// Refresh the least recently tracked open orders each `interval` until
/// `stop` flips.
pub(crate) async fn tracking_loop(
    tracking: Arc<dyn TrackingService>,
    interval: Duration,
    limit: usize,
    stop: watch::Receiver<bool>,
) {
    run_every(interval, stop, || {
        let tracking = Arc::clone(&tracking);

        async move {
            match tracking.refresh_due(limit).await {
                Ok(report) if report.total_processed > 0 => info!(
                    processed = report.total_processed,
                    updated = report.total_updated,
                    errors = report.total_errors,
                    "tracking sweep finished"
                ),
                Ok(_) => {}
                Err(error) => error!(%error, "tracking sweep failed"),
            }
        }
        .instrument(info_span!("tracking_sweep"))
    })
    .await;
}

/// Run `sweep` immediately and then on every tick.
///
/// A sweep in progress is finished before `stop` is honoured; ticks missed
/// while it ran are not made up.
async fn run_every<F, Fut>(interval: Duration, mut stop: watch::Receiver<bool>, mut sweep: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *stop.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => sweep().await,
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
