// Poll Scheduler - in-process timer driving the status poller
use crate::application::shutdown::ShutdownToken;
use crate::application::status_poller::StatusPoller;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

/// Calls `StatusPoller::run_once` on a fixed interval until shutdown
///
/// Hosts without a timer of their own (the daemon) use this. Anything else
/// that can call `poller.run.v1` works just as well.
pub struct PollScheduler {
    poller: Arc<StatusPoller>,
    interval: Duration,
}

impl PollScheduler {
    pub fn new(poller: Arc<StatusPoller>, interval: Duration) -> Self {
        Self { poller, interval }
    }

    /// Run the timer loop (spawn with tokio::spawn)
    ///
    /// The first pass runs immediately. A slow pass delays the next tick
    /// rather than stacking passes up.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Poll scheduler started"
        );

        let mut tick = interval(self.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.poller.run_once().await {
                        error!(error = %e, "Scheduled poll pass failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        info!("Poll scheduler stopped");
    }
}
