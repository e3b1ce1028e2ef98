use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::{Beacon, Transport, TransportError, TransportResult};

pub fn build_client(config: &TransportConfig) -> TransportResult<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
        .user_agent(config.user_agent.clone())
        .build()?)
}

async fn post(client: &Client, beacon: &Beacon) -> TransportResult<()> {
    client
        .post(&beacon.endpoint)
        .header(CONTENT_TYPE, "application/json")
        .body(beacon.body.clone())
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

/// Primary transport: beacons go onto a bounded queue drained by a background
/// task, so `send` never waits on the network. A full or closed queue is
/// reported back so the emitter can fall back.
#[derive(Clone)]
pub struct QueuedTransport {
    tx: mpsc::Sender<Beacon>,
}

/// Handle returned by [`QueuedTransport::spawn`] for lifecycle control.
pub struct WorkerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Stops accepting beacons, delivers what is already queued, then waits for the worker.
    pub async fn shutdown(mut self) -> Result<(), tokio::task::JoinError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(_) => Ok(()),
                Err(err) if err.is_cancelled() => Ok(()),
                Err(err) => Err(err),
            }
        } else {
            Ok(())
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl QueuedTransport {
    /// Spawns the delivery worker on the current tokio runtime.
    pub fn spawn(config: &TransportConfig) -> TransportResult<(Self, WorkerHandle)> {
        let client = build_client(config)?;
        Self::spawn_with_client(client, config.queue_capacity)
    }

    pub fn spawn_with_client(
        client: Client,
        capacity: usize,
    ) -> TransportResult<(Self, WorkerHandle)> {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (tx, mut rx) = mpsc::channel::<Beacon>(capacity.max(1));
        let cancel = CancellationToken::new();
        let loop_token = cancel.clone();
        let task = handle.spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => {
                        rx.close();
                        while let Some(beacon) = rx.recv().await {
                            deliver(&client, &beacon).await;
                        }
                        break;
                    }
                    next = rx.recv() => match next {
                        Some(beacon) => deliver(&client, &beacon).await,
                        None => break,
                    },
                }
            }
            debug!("beacon worker stopped");
        });
        Ok((
            Self { tx },
            WorkerHandle {
                cancel,
                task: Some(task),
            },
        ))
    }
}

async fn deliver(client: &Client, beacon: &Beacon) {
    match post(client, beacon).await {
        Ok(()) => debug!(endpoint = %beacon.endpoint, "beacon delivered"),
        Err(err) => warn!(endpoint = %beacon.endpoint, %err, "beacon delivery failed"),
    }
}

impl Transport for QueuedTransport {
    fn name(&self) -> &'static str {
        "beacon"
    }

    fn send(&self, beacon: &Beacon) -> TransportResult<()> {
        self.tx.try_send(beacon.clone()).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => TransportError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}

/// Fallback transport: one detached request per beacon on the ambient runtime.
#[derive(Clone)]
pub struct FetchTransport {
    client: Client,
}

impl FetchTransport {
    pub fn new(config: &TransportConfig) -> TransportResult<Self> {
        Ok(Self {
            client: build_client(config)?,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for FetchTransport {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn send(&self, beacon: &Beacon) -> TransportResult<()> {
        let handle = Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let client = self.client.clone();
        let beacon = beacon.clone();
        handle.spawn(async move {
            deliver(&client, &beacon).await;
        });
        Ok(())
    }
}
