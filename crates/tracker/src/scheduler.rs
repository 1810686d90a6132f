#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::error::Error;
use crate::session::{Flush, Session};
use crate::tracker::Tracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Decides when dirty tool state is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistPolicy {
    flush_interval: Duration,
}

impl PersistPolicy {
    pub fn new(flush_interval: Duration) -> Self {
        Self { flush_interval }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Forced flushes always write. Otherwise the state must be dirty and
    /// strictly more than `flush_interval` past the last flush.
    pub fn should_flush(&self, session: &Session, now: f64, flush: Flush) -> bool {
        match flush {
            Flush::Forced => true,
            Flush::IfDue => {
                session.dirty
                    && now - session.last_persist_ts > self.flush_interval.as_secs_f64()
            }
        }
    }
}

/// Background task that wakes every `wake_period` to charge the active tool
/// and flush when due.
pub struct PersistenceScheduler;

impl PersistenceScheduler {
    pub fn spawn(
        tracker: Tracker,
        wake_period: Duration,
        join_timeout: Duration,
        save_on_shutdown: bool,
    ) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let clock = tracker.clock();
        let task = tokio::spawn(run(
            tracker,
            clock,
            wake_period,
            save_on_shutdown,
            cancel.clone(),
        ));
        SchedulerHandle {
            cancel,
            task,
            join_timeout,
        }
    }
}

async fn run(
    tracker: Tracker,
    clock: Arc<dyn Clock>,
    wake_period: Duration,
    save_on_shutdown: bool,
    cancel: CancellationToken,
) {
    info!(?wake_period, "persistence scheduler started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if save_on_shutdown && let Err(err) = tracker.flush(true) {
                    warn!(%err, "final flush failed");
                }
                info!("persistence scheduler stopped");
                break;
            }
            _ = clock.sleep(wake_period) => {
                let charged = tracker.tick();
                if charged > 0 {
                    debug!(charged, "scheduler tick");
                }
            }
        }
    }
}

/// Owner of the running scheduler task.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    join_timeout: Duration,
}

impl SchedulerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the task and wait at most `join_timeout` for it to exit. A task
    /// that does not exit in time is aborted.
    pub async fn shutdown(mut self) -> Result<(), Error> {
        self.cancel.cancel();
        match tokio::time::timeout(self.join_timeout, &mut self.task).await {
            Ok(joined) => joined.map_err(Error::from),
            Err(_) => {
                warn!(timeout = ?self.join_timeout, "scheduler did not stop in time, aborting");
                self.task.abort();
                Ok(())
            }
        }
    }
}
