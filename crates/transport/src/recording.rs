use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::{Beacon, Transport, TransportError, TransportResult};

/// Keeps accepted beacons in memory. Used by tests and the CLI dry run.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<Beacon>>>,
    rejecting: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that refuses everything until [`set_rejecting`](Self::set_rejecting) is cleared.
    pub fn rejecting() -> Self {
        let transport = Self::default();
        transport.set_rejecting(true);
        transport
    }

    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Beacon> {
        self.sent.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain(&self) -> Vec<Beacon> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&self, beacon: &Beacon) -> TransportResult<()> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected("recording transport rejecting".into()));
        }
        self.sent.lock().push(beacon.clone());
        Ok(())
    }
}
