//! MQTT publishing with Home Assistant discovery
//!
//! Each reading becomes a Home Assistant entity. The first time a reading
//! is seen its discovery config is published (retained) under
//! `<prefix>/<component>/<device_id>/<Name>/config`; after that its state
//! topic is only written when the value changes.
//!
//! Charger and output source priority are `select` entities. Options picked
//! in Home Assistant arrive on `<state topic>/set` and are forwarded to the
//! poll thread as [`SetRequest`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use pi_protocol::Protocol;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, Outgoing, QoS};
use serde_json::{json, Map, Value};
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::poller::{PollCommand, PollEvent, SetRequest};
use crate::sensor::{readings, Reading, Scale, Setting};
use crate::settings::{DeviceSettings, MqttSettings};
use crate::sink::Sink;

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Message {
    pub topic: String,
    pub retain: bool,
    pub payload: String,
}

/// Identity of the inverter in Home Assistant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// `<name>_<serial>`
    pub id: String,
    pub serial_number: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl Device {
    pub fn new(settings: &DeviceSettings, serial_number: &str) -> Self {
        Self {
            id: format!("{}_{}", settings.name, serial_number),
            serial_number: serial_number.to_string(),
            name: settings.name.clone(),
            manufacturer: settings.manufacturer.clone(),
            model: settings.model.clone(),
        }
    }

    fn info(&self) -> Value {
        json!({
            "ids": self.serial_number,
            "mf": self.manufacturer,
            "mdl": self.model,
            "name": self.name,
        })
    }
}

fn component(reading: &Reading) -> &'static str {
    if reading.setting.is_some() {
        "select"
    } else {
        "sensor"
    }
}

/// Topic layout and discovery state for one device
#[derive(Debug, Clone)]
pub struct Discovery {
    prefix: String,
    device: Device,
    protocol: Protocol,
    /// Last published value per entity; present once registered
    published: HashMap<&'static str, String>,
}

impl Discovery {
    pub fn new(prefix: impl Into<String>, device: Device, protocol: Protocol) -> Self {
        Self {
            prefix: prefix.into(),
            device,
            protocol,
            published: HashMap::new(),
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn state_topic(&self, component: &str, name: &str) -> String {
        format!("{}/{}/{}/{}", self.prefix, component, self.device.id, name)
    }

    pub fn command_topic(&self, setting: Setting) -> String {
        format!("{}/set", self.state_topic("select", setting.name()))
    }

    pub fn availability_topic(&self) -> String {
        format!("{}/sensor/{}/availability", self.prefix, self.device.id)
    }

    /// Command topic to setting, for the receiver
    pub fn commands(&self) -> Commands {
        Commands {
            protocol: self.protocol,
            topics: Setting::ALL
                .iter()
                .map(|&s| (self.command_topic(s), s))
                .collect(),
        }
    }

    /// Retained discovery config for `reading`
    pub fn config_message(&self, reading: &Reading) -> Message {
        let component = component(reading);
        let state_topic = self.state_topic(component, reading.name);

        let mut config = Map::new();
        config.insert("device".into(), self.device.info());
        if let Some(class) = reading.kind.device_class() {
            config.insert("device_class".into(), class.into());
        }
        if reading.kind.is_measurement() {
            config.insert("state_class".into(), "measurement".into());
        }
        if let Some(icon) = reading.icon {
            config.insert("icon".into(), format!("mdi:{icon}").into());
        }
        config.insert("name".into(), reading.label().into());
        config.insert("state_topic".into(), state_topic.clone().into());
        config.insert(
            "unique_id".into(),
            format!("{}_{}", self.device.serial_number, reading.name).into(),
        );
        if let Some(unit) = reading.kind.unit() {
            config.insert("unit_of_measurement".into(), unit.into());
        }
        config.insert("availability_topic".into(), self.availability_topic().into());
        if let Some(setting) = reading.setting {
            config.insert("command_topic".into(), self.command_topic(setting).into());
            config.insert("options".into(), json!(setting.options(self.protocol)));
        }

        Message {
            topic: format!("{state_topic}/config"),
            retain: true,
            payload: Value::Object(config).to_string(),
        }
    }

    /// Messages needed to bring Home Assistant up to date with `reading`
    pub fn update(&mut self, reading: &Reading) -> Vec<Message> {
        let mut out = Vec::new();
        match self.published.get(reading.name) {
            Some(previous) if *previous == reading.value => return out,
            Some(_) => {}
            None => out.push(self.config_message(reading)),
        }

        self.published.insert(reading.name, reading.value.clone());
        out.push(Message {
            topic: self.state_topic(component(reading), reading.name),
            retain: false,
            payload: reading.value.clone(),
        });
        out
    }

    /// The last published state of `setting`, if any
    pub fn current(&self, setting: Setting) -> Option<Message> {
        self.published.get(setting.name()).map(|value| Message {
            topic: self.state_topic("select", setting.name()),
            retain: false,
            payload: value.clone(),
        })
    }
}

/// Maps incoming command topics to set requests
#[derive(Debug, Clone)]
pub struct Commands {
    protocol: Protocol,
    topics: Vec<(String, Setting)>,
}

impl Commands {
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|(topic, _)| topic.as_str())
    }

    pub fn parse(&self, topic: &str, payload: &str) -> Option<SetRequest> {
        let setting = self
            .topics
            .iter()
            .find(|(t, _)| t == topic)
            .map(|&(_, s)| s)?;
        setting.request(self.protocol, payload)
    }
}

/// Work for the sender task
#[derive(Debug)]
pub(crate) enum Outbound {
    Message(Message),
    Shutdown,
}

/// Publishes readings to an MQTT broker
pub struct MqttSink {
    discovery: Discovery,
    scale: Scale,
    outgoing: tokio_mpsc::UnboundedSender<Outbound>,
}

impl MqttSink {
    /// Connect to the broker and start the client tasks on `runtime`
    ///
    /// The returned handle completes once the sink has been finished and
    /// queued messages were flushed.
    pub fn start(
        settings: &MqttSettings,
        discovery: Discovery,
        scale: Scale,
        commands: mpsc::Sender<PollCommand>,
        runtime: &tokio::runtime::Handle,
    ) -> (Self, JoinHandle<()>) {
        let client_id = settings
            .client_id
            .clone()
            .unwrap_or_else(|| discovery.device().id.clone());
        let mut options = MqttOptions::new(client_id, settings.server.clone(), settings.port);

        let will = LastWill {
            topic: discovery.availability_topic(),
            message: bytes::Bytes::from("offline"),
            qos: QoS::AtLeastOnce,
            retain: true,
        };
        options.set_last_will(will);
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(u), Some(p)) = (&settings.username, &settings.password) {
            options.set_credentials(u, p);
        }

        info!(
            "Connecting to MQTT broker at {}:{}",
            settings.server, settings.port
        );

        let (client, eventloop) = AsyncClient::new(options, 64);
        let (outgoing, outgoing_rx) = tokio_mpsc::unbounded_channel();
        let stopping = Arc::new(AtomicBool::new(false));

        let receiver = Receiver {
            client: client.clone(),
            availability: discovery.availability_topic(),
            commands: discovery.commands(),
            poller: commands,
            stopping: stopping.clone(),
        };

        let handle = runtime.spawn(async move {
            tokio::join!(
                receiver.run(eventloop),
                sender(client, outgoing_rx, stopping)
            );
        });

        (Self::new(discovery, scale, outgoing), handle)
    }

    pub(crate) fn new(
        discovery: Discovery,
        scale: Scale,
        outgoing: tokio_mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        Self {
            discovery,
            scale,
            outgoing,
        }
    }

    fn send(&self, message: Message) {
        if self.outgoing.send(Outbound::Message(message)).is_err() {
            warn!("MQTT sender is gone, dropping message");
        }
    }
}

impl Sink for MqttSink {
    fn publish(&mut self, event: &PollEvent) {
        for reading in readings(event, &self.scale) {
            for message in self.discovery.update(&reading) {
                self.send(message);
            }
        }
    }

    fn setting_applied(&mut self, request: SetRequest, accepted: bool) {
        if accepted {
            info!("Applied {:?}", request);
            return;
        }

        warn!("Inverter rejected {:?}", request);
        let setting = match request {
            SetRequest::ChargerPriority(_) => Setting::ChargerPriority,
            SetRequest::OutputSourcePriority(_) => Setting::OutputSourcePriority,
        };
        // put the select back to what the inverter still has
        if let Some(message) = self.discovery.current(setting) {
            self.send(message);
        }
    }

    fn finish(&mut self) {
        let _ = self.outgoing.send(Outbound::Shutdown);
    }
}

// poll thread -> broker
async fn sender(
    client: AsyncClient,
    mut outgoing: tokio_mpsc::UnboundedReceiver<Outbound>,
    stopping: Arc<AtomicBool>,
) {
    while let Some(item) = outgoing.recv().await {
        match item {
            Outbound::Message(message) => {
                debug!("publishing: {} = {}", message.topic, message.payload);
                if let Err(e) = client
                    .publish(
                        &message.topic,
                        QoS::AtLeastOnce,
                        message.retain,
                        message.payload,
                    )
                    .await
                {
                    error!("MQTT publish failed: {}", e);
                }
            }
            Outbound::Shutdown => break,
        }
    }

    stopping.store(true, Ordering::SeqCst);
    let _ = client.disconnect().await;
    info!("MQTT sender exiting");
}

// broker -> poll thread
struct Receiver {
    client: AsyncClient,
    availability: String,
    commands: Commands,
    poller: mpsc::Sender<PollCommand>,
    stopping: Arc<AtomicBool>,
}

impl Receiver {
    async fn run(self, mut eventloop: EventLoop) {
        loop {
            let event =
                match tokio::time::timeout(Duration::from_secs(1), eventloop.poll()).await {
                    Ok(event) => event,
                    Err(_) if self.stopping.load(Ordering::SeqCst) => break,
                    Err(_) => continue,
                };

            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => self.on_connect(),
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload);
                    self.on_command(&publish.topic, &payload);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {} // keepalives etc
                Err(e) => {
                    if self.stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    error!("{}", e);
                    info!("reconnecting in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
        info!("MQTT receiver exiting");
    }

    fn on_connect(&self) {
        info!("Connected to MQTT broker");
        // the event loop is this task, so queue without waiting
        if let Err(e) =
            self.client
                .try_publish(&self.availability, QoS::AtLeastOnce, true, "online")
        {
            warn!("Failed to publish availability: {}", e);
        }
        for topic in self.commands.topics() {
            if let Err(e) = self.client.try_subscribe(topic, QoS::AtMostOnce) {
                warn!("Failed to subscribe to {}: {}", topic, e);
            }
        }
    }

    fn on_command(&self, topic: &str, payload: &str) {
        match self.commands.parse(topic, payload) {
            Some(request) => {
                info!("Requested {:?} via {}", request, topic);
                if self.poller.send(PollCommand::Set(request)).is_err() {
                    warn!("Poller is gone, dropping {:?}", request);
                }
            }
            None => warn!("Ignoring {:?} on {}", payload, topic),
        }
    }
}
