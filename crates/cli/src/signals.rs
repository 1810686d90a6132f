use crate::error::Error;
use flume::Sender;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracker::Tracker;

/// Indefinitely listens to signals and sends signal events to the provided channel.
pub async fn wait_for_signal(signal_event: &Sender<SignalEvent>) -> Result<(), Error> {
    let mut sigusr1 = signal(SignalKind::user_defined1()).map_err(Error::SignalHandler)?;
    let mut sigusr2 = signal(SignalKind::user_defined2()).map_err(Error::SignalHandler)?;

    loop {
        tokio::select! {
            _ = sigusr1.recv() => {
                signal_event.send_async(SignalEvent::DumpStatus).await?;
            }
            _ = sigusr2.recv() => {
                signal_event.send_async(SignalEvent::Flush).await?;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGUSR1: log the wear summary.
    DumpStatus,
    /// SIGUSR2: write tool state out now.
    Flush,
}

pub fn handle_signal(tracker: &Tracker, event: SignalEvent) {
    match event {
        SignalEvent::DumpStatus => {
            let generated_at = tracker.clock().now().to_rfc3339();
            let payload = tracker.status_payload(generated_at.into());
            match serde_json::to_string(&payload) {
                Ok(status) => info!(%status, "wear status"),
                Err(err) => warn!(%err, "failed to render wear status"),
            }
        }
        SignalEvent::Flush => match tracker.flush(true) {
            Ok(_) => info!("tool state flushed on request"),
            Err(err) => warn!(%err, "requested flush failed"),
        },
    }
}
