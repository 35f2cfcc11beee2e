//! Inverter Poller
//!
//! Reads mode, ratings, live status and warnings from a PI30 or PI18 solar
//! inverter on a fixed interval and hands them to a sink: the log, or an
//! MQTT broker with Home Assistant discovery.

mod mqtt;
mod options;
mod poller;
mod sensor;
mod settings;
mod sink;

use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pi_link::{detect_protocol, Line, ProtocolAdapter, SerialPort};
use pi_sim::VirtualInverter;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::mqtt::{Device, Discovery, MqttSink};
use crate::options::Options;
use crate::poller::{PollCommand, PollConfig, Poller};
use crate::sensor::Scale;
use crate::settings::{ProtocolChoice, Settings};
use crate::sink::{LogSink, Sink};

const DEFAULT_FILTER: &str = "inverter_poller=info,pi_link=info,pi_protocol=info,pi_sim=info";
const DEBUG_FILTER: &str = "inverter_poller=debug,pi_link=debug,pi_protocol=debug,pi_sim=debug";

/// How long queued MQTT messages may take to flush on exit
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

type Port = SerialPort<Box<dyn Line>>;

fn main() -> Result<()> {
    let options = Options::parse();

    let filter = if options.debug {
        EnvFilter::new(DEBUG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load(options.config.as_deref()).context("loading settings")?;
    let port = open_port(&options, &settings)?;

    if let Some(command) = &options.raw {
        let reply = port
            .raw_query(command, options.crc)
            .with_context(|| format!("sending {command:?}"))?;
        println!("Reply: {reply}");
        port.close()?;
        return Ok(());
    }

    let result = run(&options, &settings, &port);
    if let Err(e) = port.close() {
        warn!("Failed to release {}: {}", settings.device.path, e);
    }
    result
}

fn open_port(options: &Options, settings: &Settings) -> Result<Port> {
    let port: Port = match options.simulate {
        Some(protocol) => {
            info!("Simulating a {} inverter", protocol);
            let line: Box<dyn Line> = Box::new(VirtualInverter::new(protocol));
            SerialPort::from_line("simulator", line)
        }
        None => open_device(&settings.device.path)?,
    };
    Ok(port.with_config(settings.port_config()))
}

#[cfg(unix)]
fn open_device(path: &str) -> Result<Port> {
    let tty = pi_link::tty::open_device(path).with_context(|| format!("opening {path}"))?;
    let line: Box<dyn Line> = Box::new(tty);
    Ok(SerialPort::from_line(path, line))
}

#[cfg(not(unix))]
fn open_device(path: &str) -> Result<Port> {
    anyhow::bail!("serial devices are only supported on unix ({path})")
}

fn run(options: &Options, settings: &Settings, port: &Port) -> Result<()> {
    let session = settings.adapter_config();
    let adapter = match options.protocol.unwrap_or(settings.protocol) {
        ProtocolChoice::Auto => detect_protocol(port, session)?,
        ProtocolChoice::Fixed(protocol) => ProtocolAdapter::new(protocol, port, session)?,
    };

    let serial_number = match &settings.device.serial_number {
        Some(serial) => serial.clone(),
        None => adapter
            .serial_number()
            .context("reading the inverter serial number")?,
    };
    info!(
        "Inverter {} speaks {} (serial {})",
        settings.device.name,
        adapter.protocol(),
        serial_number
    );

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    let (commands, command_rx) = mpsc::channel();

    let scale = Scale {
        amperage: settings.amperage_factor,
        watt: settings.watt_factor,
    };
    let (mut sink, mqtt_task) = if settings.mqtt.enabled {
        let device = Device::new(&settings.device, &serial_number);
        let discovery = Discovery::new(
            settings.mqtt.discovery_prefix.clone(),
            device,
            adapter.protocol(),
        );
        let (sink, task) = MqttSink::start(
            &settings.mqtt,
            discovery,
            scale,
            commands.clone(),
            runtime.handle(),
        );
        let sink: Box<dyn Sink> = Box::new(sink);
        (sink, Some(task))
    } else {
        let sink: Box<dyn Sink> = Box::new(LogSink::new(scale));
        (sink, None)
    };

    runtime.spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Shutting down");
        let _ = commands.send(PollCommand::Shutdown);
    });

    let poller = Poller::new(
        adapter,
        PollConfig {
            interval: settings.polling_interval(),
            run_once: options.run_once,
            query_total_energy: settings.query_total_energy,
        },
    );

    std::thread::scope(|scope| -> Result<()> {
        let handle = std::thread::Builder::new()
            .name("poller".into())
            .spawn_scoped(scope, move || {
                poller.run(sink.as_mut(), &command_rx);
                sink.finish();
            })
            .context("spawning poll thread")?;
        if handle.join().is_err() {
            anyhow::bail!("poll thread panicked");
        }
        Ok(())
    })?;

    if let Some(task) = mqtt_task {
        if runtime
            .block_on(async { tokio::time::timeout(FLUSH_TIMEOUT, task).await })
            .is_err()
        {
            warn!("MQTT client did not finish within {:?}", FLUSH_TIMEOUT);
        }
    }

    Ok(())
}
