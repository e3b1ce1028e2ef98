use std::sync::Arc;

use tracing::{debug, warn};

use crate::{Beacon, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Primary,
    Fallback,
    Dropped,
}

impl Delivery {
    pub fn accepted(self) -> bool {
        !matches!(self, Delivery::Dropped)
    }
}

#[derive(Clone)]
pub struct Emitter {
    primary: Arc<dyn Transport>,
    fallback: Option<Arc<dyn Transport>>,
}

impl Emitter {
    pub fn new(primary: Arc<dyn Transport>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(primary: Arc<dyn Transport>, fallback: Arc<dyn Transport>) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
        }
    }

    pub fn emit(&self, beacon: &Beacon) -> Delivery {
        match self.primary.send(beacon) {
            Ok(()) => {
                debug!(transport = self.primary.name(), endpoint = %beacon.endpoint, "beacon accepted");
                return Delivery::Primary;
            }
            Err(err) => {
                debug!(transport = self.primary.name(), %err, "primary transport refused beacon");
            }
        }
        if let Some(fallback) = &self.fallback {
            match fallback.send(beacon) {
                Ok(()) => {
                    debug!(transport = fallback.name(), endpoint = %beacon.endpoint, "beacon accepted by fallback");
                    return Delivery::Fallback;
                }
                Err(err) => {
                    warn!(transport = fallback.name(), %err, "fallback transport refused beacon");
                }
            }
        }
        warn!(endpoint = %beacon.endpoint, "beacon dropped");
        Delivery::Dropped
    }
}
