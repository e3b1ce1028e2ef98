//! Async adapter that feeds host notifications from an event bus into a tracker.

use std::sync::Arc;
use std::time::Duration;

use footfall_event_bus::{EventBus, InMemoryBus};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{TrackError, TrackResult};
use crate::navigation::NavigationEvent;
use crate::tracker::{TrackOutcome, Tracker};

pub type SharedTracker = Arc<Mutex<Tracker>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Navigated(NavigationEvent),
    Hidden,
    Closed,
}

pub struct DriverHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl DriverHandle {
    /// Stops the driver without firing a pending route change.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Waits for the driver to stop on its own, after a `HostEvent::Closed` or a closed bus.
    pub async fn join(mut self) -> Result<(), tokio::task::JoinError> {
        self.wait().await
    }

    async fn wait(&mut self) -> Result<(), tokio::task::JoinError> {
        match self.task.take() {
            Some(task) => match task.await {
                Err(err) if !err.is_cancelled() => Err(err),
                _ => Ok(()),
            },
            None => Ok(()),
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct NavigationDriver;

impl NavigationDriver {
    /// Subscribes to `bus` and drives `tracker` until cancelled or closed.
    /// Route changes fire once `settle` has passed without a newer one.
    pub fn spawn(
        tracker: SharedTracker,
        bus: Arc<InMemoryBus<HostEvent>>,
        settle: Duration,
    ) -> TrackResult<DriverHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TrackError::NoRuntime)?;
        let mut rx = bus.subscribe();
        let cancel = CancellationToken::new();
        let loop_token = cancel.clone();
        let task = runtime.spawn(async move {
            let mut deadline: Option<Instant> = None;
            loop {
                let settled = async move {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = settled => {
                        deadline = None;
                        let outcome = tracker.lock().flush_navigation();
                        if let TrackOutcome::Sent(pageview) = &outcome {
                            debug!(path = %pageview.event.page_path, "route change tracked");
                        }
                    }
                    received = rx.recv() => match received {
                        Ok(HostEvent::Navigated(event)) => {
                            if let TrackOutcome::Scheduled { .. } = tracker.lock().on_navigation(event) {
                                deadline = Some(Instant::now() + settle);
                            }
                        }
                        Ok(HostEvent::Hidden) => {
                            tracker.lock().on_page_hide();
                        }
                        Ok(HostEvent::Closed) => {
                            tracker.lock().shutdown();
                            break;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "navigation driver lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("navigation driver stopped");
        });
        Ok(DriverHandle {
            cancel,
            task: Some(task),
        })
    }
}
