use std::{
    sync::{mpsc, OnceLock},
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use ds18b20::{Ds18b20, Resolution};
use embedded_svc::{
    mqtt::client::QoS,
    wifi::{AuthMethod, ClientConfiguration, Configuration},
};
use esp_idf_hal::{
    delay::Ets,
    gpio::{AnyIOPin, AnyOutputPin, IOPin, InputOutput, Output, OutputPin, PinDriver, Pull},
};
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    hal::{modem::Modem, prelude::Peripherals},
    log::EspLogger,
    mqtt::client::{Details, EspMqttClient, EspMqttConnection, EventPayload, MqttClientConfiguration},
    nvs::EspDefaultNvsPartition,
    wifi::{BlockingWifi, EspWifi},
};
use log::{info, warn};
use one_wire_bus::{Address, OneWire};

use boilerlink_common::{
    command::parse_actuator_command, telemetry, ActuatorController, LinkSupervisor, RuntimeConfig,
    SensorConfig, TelemetryScheduler, TopicSet,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;

const ONE_WIRE_PIN: i32 = 2;
const RELAY_PIN: i32 = 5;

/// Transport events forwarded from the receiver thread into the single
/// control loop, so command handling stays serialized with telemetry.
enum LinkEvent {
    Connected,
    Disconnected,
    Command(Vec<u8>),
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let mut config = RuntimeConfig::default();
    config.sanitize();

    let topics = TopicSet::new(&config.network, &config.bridge);

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let Peripherals { modem, pins, .. } = Peripherals::take()?;

    let mut probe = ProbeGateway::new(pins.gpio2.downgrade(), &config.sensor)
        .context("failed to initialize one-wire probe")?;

    let mut actuator = ActuatorController::new(config.bridge.actuator_active_low);
    let mut relay = RelayLine::new(pins.gpio5.downgrade_output())?;
    // Park the output at its idle level before the network comes up.
    relay.drive(actuator.line_level())?;

    let _wifi = connect_wifi(modem, sys_loop, nvs_partition, &config)?;

    let (mut mqtt, conn) = create_mqtt_client(&config)?;
    let (tx, rx) = mpsc::channel::<LinkEvent>();
    spawn_mqtt_receiver(conn, tx, topics.actuator_cmd.clone());

    let mut supervisor = LinkSupervisor::new(config.bridge.reconnect_backoff_ms);
    let mut scheduler = TelemetryScheduler::new(config.bridge.telemetry_interval_ms);

    info!(
        "bridge started; broker {}:{}, probe {}, relay on GPIO{RELAY_PIN}",
        config.network.mqtt_host, config.network.mqtt_port, config.sensor.address
    );

    loop {
        ensure_connected(&mut supervisor, &mut mqtt, &rx, &topics, &actuator);
        service(
            &mut supervisor,
            &mut mqtt,
            &rx,
            &topics,
            &mut actuator,
            &mut relay,
        );
        if scheduler.due(monotonic_ms()) {
            publish_telemetry(&mut mqtt, &topics, &mut probe);
        }
        thread::sleep(Duration::from_millis(config.bridge.loop_yield_ms));
    }
}

/// Blocks until the broker session is up, then subscribes to the command
/// topic and re-syncs the dashboard with the current actuator state.
fn ensure_connected(
    supervisor: &mut LinkSupervisor,
    mqtt: &mut EspMqttClient<'static>,
    rx: &mpsc::Receiver<LinkEvent>,
    topics: &TopicSet,
    actuator: &ActuatorController,
) {
    if supervisor.is_connected() {
        return;
    }

    supervisor.begin_attempt();
    info!("waiting for broker session");

    loop {
        match rx.recv_timeout(Duration::from_millis(supervisor.backoff_ms())) {
            Ok(LinkEvent::Connected) => {
                if supervisor.connected() {
                    if let Err(err) = mqtt.subscribe(&topics.actuator_cmd, QoS::AtMostOnce) {
                        warn!("command subscription failed: {err:?}");
                    }
                    if let Err(err) = mqtt.publish(
                        &topics.actuator_data,
                        QoS::AtMostOnce,
                        false,
                        actuator.state().as_payload().as_bytes(),
                    ) {
                        warn!("actuator state publish failed: {err:?}");
                    }
                }
                info!(
                    "broker connected, subscribed to {} ({} failed attempts so far)",
                    topics.actuator_cmd,
                    supervisor.failed_attempts()
                );
                return;
            }
            Ok(_) => {}
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let waited = supervisor.attempt_failed();
                warn!("broker still unreachable after {waited}ms, waiting");
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                warn!("mqtt receiver thread gone; nothing left to wait for");
                thread::sleep(Duration::from_secs(5));
            }
        }
    }
}

/// Drains pending transport events for this iteration and applies inbound
/// commands.
fn service(
    supervisor: &mut LinkSupervisor,
    mqtt: &mut EspMqttClient<'static>,
    rx: &mpsc::Receiver<LinkEvent>,
    topics: &TopicSet,
    actuator: &mut ActuatorController,
    relay: &mut RelayLine,
) {
    if !supervisor.is_connected() {
        return;
    }

    while let Ok(event) = rx.try_recv() {
        match event {
            LinkEvent::Command(payload) => match parse_actuator_command(&payload) {
                Ok(requested) => {
                    let level = actuator.apply(requested);
                    if let Err(err) = relay.drive(level) {
                        warn!("relay line write failed: {err:?}");
                    }
                    info!("actuator switched {}", actuator.state().as_str());

                    if let Err(err) = mqtt.publish(
                        &topics.actuator_data,
                        QoS::AtMostOnce,
                        false,
                        actuator.state().as_payload().as_bytes(),
                    ) {
                        warn!("actuator echo publish failed: {err:?}");
                    }
                }
                Err(err) => warn!("ignoring command: {err}"),
            },
            LinkEvent::Disconnected => {
                warn!("broker link dropped");
                supervisor.link_lost();
                return;
            }
            LinkEvent::Connected => {}
        }
    }
}

fn publish_telemetry(mqtt: &mut EspMqttClient<'static>, topics: &TopicSet, probe: &mut ProbeGateway) {
    let Some(celsius) = probe.read_celsius() else {
        warn!("probe read failed, skipping telemetry cycle");
        return;
    };

    if !telemetry::is_plausible(celsius) {
        warn!("suppressing implausible reading {celsius:.2}C");
        return;
    }

    let payload = telemetry::format_temperature(celsius);
    if let Err(err) = mqtt.publish(
        &topics.temperature_data,
        QoS::AtMostOnce,
        false,
        payload.as_bytes(),
    ) {
        warn!("temperature publish failed: {err:?}");
    }
}

struct RelayLine {
    pin: PinDriver<'static, AnyOutputPin, Output>,
}

impl RelayLine {
    fn new(pin: AnyOutputPin) -> anyhow::Result<Self> {
        let pin = PinDriver::output(pin)?;
        Ok(Self { pin })
    }

    fn drive(&mut self, level: bool) -> anyhow::Result<()> {
        if level {
            self.pin.set_high()?;
        } else {
            self.pin.set_low()?;
        }
        Ok(())
    }
}

struct ProbeGateway {
    one_wire: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    configured: Address,
    resolution: Resolution,
    address: Option<Address>,
    delay: Ets,
}

impl ProbeGateway {
    fn new(bus_pin: AnyIOPin, config: &SensorConfig) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(bus_pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;

        let one_wire = OneWire::new(pin)
            .map_err(|err| anyhow!("failed to initialize one-wire bus: {err:?}"))?;

        let mut gateway = Self {
            one_wire,
            configured: Address(u64::from_le_bytes(*config.address.bytes())),
            resolution: resolution_from_bits(config.resolution_bits),
            address: None,
            delay: Ets,
        };

        gateway.locate_probe();
        gateway.apply_resolution();
        Ok(gateway)
    }

    /// Scans the bus for the configured probe. Falls back to the first
    /// DS18B20-family device so a re-soldered probe still reports.
    fn locate_probe(&mut self) {
        let mut first_ds18: Option<Address> = None;
        let mut exact: Option<Address> = None;
        let mut device_count = 0_u32;

        for found in self.one_wire.devices(false, &mut self.delay) {
            match found {
                Ok(address) => {
                    device_count = device_count.saturating_add(1);
                    if address.0 == self.configured.0 {
                        exact = Some(address);
                    }
                    if first_ds18.is_none() && address.family_code() == ds18b20::FAMILY_CODE {
                        first_ds18 = Some(address);
                    }
                }
                Err(err) => {
                    warn!("one-wire device scan failed: {err:?}");
                    break;
                }
            }
        }

        self.address = exact.or(first_ds18);

        match self.address {
            Some(_) if exact.is_some() => info!(
                "probe ready on GPIO{ONE_WIRE_PIN} ({device_count} one-wire device(s), configured address found)"
            ),
            Some(address) => warn!(
                "configured probe absent; using first DS18B20 {:016x} ({device_count} device(s) on GPIO{ONE_WIRE_PIN})",
                address.0
            ),
            None => warn!(
                "no DS18B20 found on GPIO{ONE_WIRE_PIN} ({device_count} one-wire device(s) detected)"
            ),
        }
    }

    fn apply_resolution(&mut self) {
        let Some(address) = self.address else {
            return;
        };
        let sensor = match Ds18b20::new::<core::convert::Infallible>(address) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("invalid probe address {:016x}: {err:?}", address.0);
                return;
            }
        };
        if let Err(err) = sensor.set_config(
            i8::MIN,
            i8::MAX,
            self.resolution,
            &mut self.one_wire,
            &mut self.delay,
        ) {
            warn!("failed to set probe resolution: {err:?}");
        }
    }

    fn read_celsius(&mut self) -> Option<f32> {
        if self.address.is_none() {
            self.locate_probe();
            self.apply_resolution();
        }

        let address = self.address?;
        let sensor = match Ds18b20::new::<core::convert::Infallible>(address) {
            Ok(sensor) => sensor,
            Err(err) => {
                warn!("invalid probe address {:016x}: {err:?}", address.0);
                self.address = None;
                return None;
            }
        };

        if let Err(err) =
            ds18b20::start_simultaneous_temp_measurement(&mut self.one_wire, &mut self.delay)
        {
            warn!("failed to start probe conversion: {err:?}");
            self.address = None;
            return None;
        }

        self.resolution.delay_for_measurement_time(&mut self.delay);

        match sensor.read_data(&mut self.one_wire, &mut self.delay) {
            Ok(data) => Some(data.temperature),
            Err(err) => {
                warn!("failed to read probe data: {err:?}");
                self.address = None;
                None
            }
        }
    }
}

fn resolution_from_bits(bits: u8) -> Resolution {
    match bits {
        9 => Resolution::Bits9,
        10 => Resolution::Bits10,
        11 => Resolution::Bits11,
        _ => Resolution::Bits12,
    }
}

fn spawn_mqtt_receiver(mut conn: EspMqttConnection, tx: mpsc::Sender<LinkEvent>, cmd_topic: String) {
    thread::Builder::new()
        .name("mqtt-rx".into())
        .stack_size(8 * 1024)
        .spawn(move || loop {
            match conn.next() {
                Ok(event) => match event.payload() {
                    EventPayload::Connected(_) => {
                        let _ = tx.send(LinkEvent::Connected);
                    }
                    EventPayload::Disconnected => {
                        let _ = tx.send(LinkEvent::Disconnected);
                    }
                    EventPayload::Received {
                        topic: Some(topic),
                        data,
                        details,
                        ..
                    } => {
                        // Only complete payloads on the command topic are forwarded.
                        if !matches!(details, Details::Complete) {
                            continue;
                        }
                        if topic != cmd_topic {
                            continue;
                        }
                        if data.len() > MAX_MQTT_PAYLOAD_BYTES {
                            warn!(
                                "dropping oversized payload on {topic} ({} bytes)",
                                data.len()
                            );
                            continue;
                        }
                        let _ = tx.send(LinkEvent::Command(data.to_vec()));
                    }
                    _ => {}
                },
                Err(err) => {
                    warn!("mqtt receive loop error: {err:?}");
                    let _ = tx.send(LinkEvent::Disconnected);
                    thread::sleep(Duration::from_secs(2));
                }
            }
        })
        .expect("failed to spawn mqtt receiver thread");
}

fn create_mqtt_client(
    config: &RuntimeConfig,
) -> anyhow::Result<(EspMqttClient<'static>, EspMqttConnection)> {
    let url = format!(
        "mqtt://{}:{}",
        config.network.mqtt_host, config.network.mqtt_port
    );

    let conf = MqttClientConfiguration {
        client_id: Some(config.network.client_id.as_str()),
        username: if config.network.mqtt_user.is_empty() {
            None
        } else {
            Some(config.network.mqtt_user.as_str())
        },
        password: if config.network.mqtt_pass.is_empty() {
            None
        } else {
            Some(config.network.mqtt_pass.as_str())
        },
        keep_alive_interval: Some(Duration::from_secs(config.network.keep_alive_secs)),
        ..Default::default()
    };

    Ok(EspMqttClient::new(&url, &conf)?)
}

fn connect_wifi(
    modem: Modem,
    sys_loop: EspSystemEventLoop,
    nvs_partition: EspDefaultNvsPartition,
    config: &RuntimeConfig,
) -> anyhow::Result<EspWifi<'static>> {
    let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs_partition))?;
    let mut wifi = BlockingWifi::wrap(&mut esp_wifi, sys_loop)?;

    let auth_method = if config.network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: config
            .network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: config
            .network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", config.network.wifi_ssid);

    // The appliance has nothing to do without the network, so keep trying.
    loop {
        match wifi.connect() {
            Ok(()) => match wifi.wait_netif_up() {
                Ok(()) => break,
                Err(err) => warn!("wifi netif up failed: {err:#}"),
            },
            Err(err) => warn!("wifi connect failed: {err:#}"),
        }
        let _ = wifi.disconnect();
        thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
    }

    info!("wifi connected");
    Ok(esp_wifi)
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
