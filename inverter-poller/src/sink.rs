//! Publishing sinks

use tracing::{info, warn};

use crate::poller::{PollEvent, SetRequest};
use crate::sensor::{readings, Scale};

/// Destination for poll results
///
/// Called from the poll thread only, one event at a time.
pub trait Sink: Send {
    /// Handle a fresh value
    fn publish(&mut self, event: &PollEvent);

    /// Outcome of a set request
    fn setting_applied(&mut self, request: SetRequest, accepted: bool) {
        if accepted {
            info!("Applied {:?}", request);
        } else {
            warn!("Inverter rejected {:?}", request);
        }
    }

    /// Called once after polling stops
    fn finish(&mut self) {}
}

/// Logs every reading
#[derive(Debug, Default)]
pub struct LogSink {
    scale: Scale,
}

impl LogSink {
    pub fn new(scale: Scale) -> Self {
        Self { scale }
    }
}

impl Sink for LogSink {
    fn publish(&mut self, event: &PollEvent) {
        for reading in readings(event, &self.scale) {
            match reading.kind.unit() {
                Some(unit) => info!("{}: {} {}", reading.label(), reading.value, unit),
                None => info!("{}: {}", reading.label(), reading.value),
            }
        }
    }
}
