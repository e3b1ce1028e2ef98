//! Outbound delivery for tracker events.
//!
//! Every send is fire-and-forget: [`Transport::send`] only reports whether the
//! beacon was accepted for delivery, never whether the collector received it.
//! The [`Emitter`] tries the primary transport and hands the beacon to a
//! fallback when the primary refuses it. Nothing is retried.

pub mod config;
pub mod emitter;
pub mod http;
pub mod recording;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use config::TransportConfig;
pub use emitter::{Delivery, Emitter};
pub use http::{FetchTransport, QueuedTransport, WorkerHandle};
pub use recording::RecordingTransport;

/// One serialized event addressed to a collector endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub endpoint: String,
    pub body: String,
}

impl Beacon {
    pub fn new(endpoint: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("delivery queue full")]
    QueueFull,
    #[error("delivery channel closed")]
    Closed,
    #[error("no async runtime available for delivery")]
    NoRuntime,
    #[error("beacon rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type TransportResult<T> = Result<T, TransportError>;

pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Accepts the beacon for delivery without waiting on the network.
    fn send(&self, beacon: &Beacon) -> TransportResult<()>;
}
