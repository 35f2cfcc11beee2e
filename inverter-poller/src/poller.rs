//! Poll loop
//!
//! One thread owns the adapter and talks to the inverter strictly in
//! sequence: mode, rated information, status, warnings and optionally the
//! energy counter. Set requests from the sink are serviced between cycles,
//! so they never interleave with a running query.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use pi_link::{Line, LinkError, ProtocolAdapter};
use pi_protocol::{
    ChargerPriority, DeviceMode, OutputSourcePriority, RatedInformation, StatusInfo, Warnings,
};
use tracing::{debug, error, info, warn};

use crate::sink::Sink;

/// A fresh value read from the inverter
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Mode(DeviceMode),
    Rated(RatedInformation),
    Status(StatusInfo),
    Warnings(Warnings),
    /// Total generated energy in kWh
    TotalEnergy(u32),
}

/// A setting change requested through a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetRequest {
    ChargerPriority(ChargerPriority),
    OutputSourcePriority(OutputSourcePriority),
}

/// Messages to the poll thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCommand {
    Set(SetRequest),
    Shutdown,
}

/// Poll loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause between the end of one cycle and the start of the next
    pub interval: Duration,
    /// Stop after a single cycle
    pub run_once: bool,
    /// Also read the total generated energy counter
    pub query_total_energy: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            run_once: false,
            query_total_energy: false,
        }
    }
}

/// Sequential poller over one protocol adapter
pub struct Poller<'p, L: Line> {
    adapter: ProtocolAdapter<'p, L>,
    config: PollConfig,
}

impl<'p, L: Line> Poller<'p, L> {
    pub fn new(adapter: ProtocolAdapter<'p, L>, config: PollConfig) -> Self {
        Self { adapter, config }
    }

    /// Poll until shut down
    ///
    /// Returns when a [`PollCommand::Shutdown`] arrives, every command
    /// sender is gone, or after one cycle in run-once mode.
    pub fn run(&self, sink: &mut dyn Sink, commands: &Receiver<PollCommand>) {
        info!(
            "Polling {} inverter on {} every {:?}",
            self.adapter.protocol(),
            self.adapter.port().path(),
            self.config.interval
        );

        loop {
            let failures = self.cycle(sink);
            if failures > 0 {
                debug!("Poll cycle finished with {} failed queries", failures);
            }
            if self.config.run_once {
                break;
            }

            let next_cycle = Instant::now() + self.config.interval;
            loop {
                let remaining = next_cycle.saturating_duration_since(Instant::now());
                match commands.recv_timeout(remaining) {
                    Ok(PollCommand::Set(request)) => self.apply(request, sink),
                    Ok(PollCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                        info!("Poller stopping");
                        return;
                    }
                    Err(RecvTimeoutError::Timeout) => break,
                }
            }
        }
    }

    /// Run one poll cycle, returning the number of failed queries
    pub fn cycle(&self, sink: &mut dyn Sink) -> usize {
        let mut failures = 0;

        failures += self.step("mode", sink, |a| a.mode().map(PollEvent::Mode));
        failures += self.step("rated information", sink, |a| {
            a.rated_info().map(PollEvent::Rated)
        });
        failures += self.step("status", sink, |a| a.status_info().map(PollEvent::Status));
        failures += self.step("warnings", sink, |a| a.warnings().map(PollEvent::Warnings));

        if self.config.query_total_energy {
            match self.adapter.total_generated_energy() {
                Ok(Some(kwh)) => sink.publish(&PollEvent::TotalEnergy(kwh)),
                Ok(None) => debug!(
                    "{} does not report total generated energy",
                    self.adapter.protocol()
                ),
                Err(e) => {
                    warn!("Failed to read total generated energy: {}", e);
                    failures += 1;
                }
            }
        }

        failures
    }

    fn step(
        &self,
        what: &str,
        sink: &mut dyn Sink,
        query: impl FnOnce(&ProtocolAdapter<'p, L>) -> Result<PollEvent, LinkError>,
    ) -> usize {
        match query(&self.adapter) {
            Ok(event) => {
                sink.publish(&event);
                0
            }
            Err(e) => {
                warn!("Failed to read {}: {}", what, e);
                1
            }
        }
    }

    /// Send one set request and report the outcome to the sink
    pub fn apply(&self, request: SetRequest, sink: &mut dyn Sink) {
        let result = match request {
            SetRequest::ChargerPriority(p) => self.adapter.set_charger_priority(p),
            SetRequest::OutputSourcePriority(p) => self.adapter.set_output_source_priority(p),
        };

        let accepted = match result {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("Failed to apply {:?}: {}", request, e);
                false
            }
        };
        sink.setting_applied(request, accepted);

        if accepted {
            // settings show up in the rated information
            self.step("rated information", sink, |a| {
                a.rated_info().map(PollEvent::Rated)
            });
        }
    }
}
