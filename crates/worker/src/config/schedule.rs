//! Sweep Schedule Config

use std::time::Duration;

use clap::Args;

/// Sweep intervals and sizes.
#[derive(Debug, Args)]
pub struct ScheduleConfig {
    /// Seconds between tracking sweeps
    #[arg(long, env = "REFRESH_INTERVAL_SECONDS", default_value_t = 300)]
    pub refresh_interval_seconds: u64,

    /// Seconds between dispatch sweeps
    #[arg(long, env = "DISPATCH_INTERVAL_SECONDS", default_value_t = 60)]
    pub dispatch_interval_seconds: u64,

    /// Most orders attempted by one dispatch sweep
    #[arg(long, env = "DISPATCH_SWEEP_LIMIT", default_value_t = 100)]
    pub dispatch_sweep_limit: u32,
}

impl ScheduleConfig {
    /// Interval between tracking sweeps, at least one second.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds.max(1))
    }

    /// Interval between dispatch sweeps, at least one second.
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_seconds.max(1))
    }
}
