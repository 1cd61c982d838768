use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use rumqttc::{AsyncClient, Event, EventLoop, Incoming, MqttOptions, QoS};
use tracing::{info, warn};

use boilerlink_common::{
    command::parse_actuator_command, telemetry, ActuatorController, DeviceAddress, LinkSupervisor,
    RuntimeConfig, TelemetryReading, TelemetryScheduler, TopicSet,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

/// Per-iteration budget for pumping the transport before the loop moves on
/// to the telemetry tick.
const SERVICE_POLL_MS: u64 = 50;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = load_config().await;
    apply_env_overrides(&mut config);
    config.sanitize();

    let topics = TopicSet::new(&config.network, &config.bridge);

    let mut mqtt_options = MqttOptions::new(
        config.network.client_id.clone(),
        config.network.mqtt_host.clone(),
        config.network.mqtt_port,
    );
    mqtt_options.set_keep_alive(Duration::from_secs(config.network.keep_alive_secs));
    if !config.network.mqtt_user.is_empty() {
        mqtt_options.set_credentials(
            config.network.mqtt_user.clone(),
            config.network.mqtt_pass.clone(),
        );
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    let mut supervisor = LinkSupervisor::new(config.bridge.reconnect_backoff_ms);
    let mut scheduler = TelemetryScheduler::new(config.bridge.telemetry_interval_ms);
    let mut actuator = ActuatorController::new(config.bridge.actuator_active_low);
    let mut probe = SimulatedProbe::new(config.sensor.address);

    // Park the output at its idle level before anything else happens.
    drive_relay_line(actuator.line_level());

    info!(
        "bridge started; broker {}:{}, probe {}",
        config.network.mqtt_host, config.network.mqtt_port, config.sensor.address
    );

    loop {
        ensure_connected(&mut supervisor, &client, &mut eventloop, &topics, &actuator).await;
        service(
            &mut supervisor,
            &mut eventloop,
            &client,
            &topics,
            &mut actuator,
        )
        .await;
        if scheduler.due(monotonic_ms()) {
            publish_telemetry(&client, &topics, &mut probe).await;
        }
        tokio::time::sleep(Duration::from_millis(config.bridge.loop_yield_ms)).await;
    }
}

/// Blocks until the broker link is up and the command topic subscribed.
///
/// Retries forever with the supervisor's fixed backoff; nothing else runs
/// while the link is down, which is acceptable for a controller with no
/// other duties.
async fn ensure_connected(
    supervisor: &mut LinkSupervisor,
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    topics: &TopicSet,
    actuator: &ActuatorController,
) {
    if supervisor.is_connected() {
        return;
    }

    supervisor.begin_attempt();
    info!("connecting to broker");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                if supervisor.connected() {
                    if let Err(err) = client.subscribe(topics.actuator_cmd.as_str(), QoS::AtMostOnce).await
                    {
                        warn!("command subscription failed: {err}");
                    }
                    // Re-sync the dashboard after a reboot or outage.
                    if let Err(err) = client
                        .publish(
                            topics.actuator_data.as_str(),
                            QoS::AtMostOnce,
                            false,
                            actuator.state().as_payload(),
                        )
                        .await
                    {
                        warn!("actuator state publish failed: {err}");
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
            Err(err) => {
                let backoff = supervisor.attempt_failed();
                warn!("broker connection failed: {err}; retrying in {backoff}ms");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
        }
    }
}

/// Pumps transport housekeeping for one loop iteration: keepalive and
/// inbound dispatch. Commands are handled inline, so they are serialized
/// with the telemetry cycle by construction.
async fn service(
    supervisor: &mut LinkSupervisor,
    eventloop: &mut EventLoop,
    client: &AsyncClient,
    topics: &TopicSet,
    actuator: &mut ActuatorController,
) {
    if !supervisor.is_connected() {
        return;
    }

    loop {
        match tokio::time::timeout(Duration::from_millis(SERVICE_POLL_MS), eventloop.poll()).await {
            Ok(Ok(Event::Incoming(Incoming::Publish(message)))) => {
                on_message(client, topics, actuator, &message.topic, &message.payload).await;
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                warn!("broker link dropped: {err}");
                supervisor.link_lost();
                return;
            }
            // Nothing pending this tick.
            Err(_) => return,
        }
    }
}

async fn on_message(
    client: &AsyncClient,
    topics: &TopicSet,
    actuator: &mut ActuatorController,
    topic: &str,
    payload: &[u8],
) {
    if topic != topics.actuator_cmd {
        return;
    }

    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized payload on {topic} ({} bytes)",
            payload.len()
        );
        return;
    }

    match parse_actuator_command(payload) {
        Ok(requested) => {
            let level = actuator.apply(requested);
            drive_relay_line(level);
            info!("actuator switched {}", actuator.state().as_str());

            if let Err(err) = client
                .publish(
                    topics.actuator_data.as_str(),
                    QoS::AtMostOnce,
                    false,
                    actuator.state().as_payload(),
                )
                .await
            {
                warn!("actuator echo publish failed: {err}");
            }
        }
        Err(err) => warn!("ignoring command on {topic}: {err}"),
    }
}

async fn publish_telemetry(client: &AsyncClient, topics: &TopicSet, probe: &mut SimulatedProbe) {
    let reading = probe.read();

    if !telemetry::is_plausible(reading.value_celsius) {
        warn!(
            "suppressing implausible reading {:.2}C from probe {}",
            reading.value_celsius, reading.address
        );
        return;
    }

    let payload = telemetry::format_temperature(reading.value_celsius);
    if let Err(err) = client
        .publish(topics.temperature_data.as_str(), QoS::AtMostOnce, false, payload)
        .await
    {
        warn!("temperature publish failed: {err}");
    }
}

/// Hardware integration point: ESP builds drive the relay GPIO here; host
/// builds only log the level.
fn drive_relay_line(level: bool) {
    info!("relay line driven {}", if level { "high" } else { "low" });
}

/// Stand-in for the DS18B20 on development machines: a slow triangle wave
/// around room temperature.
struct SimulatedProbe {
    address: DeviceAddress,
    tick: u64,
}

impl SimulatedProbe {
    fn new(address: DeviceAddress) -> Self {
        Self { address, tick: 0 }
    }

    fn read(&mut self) -> TelemetryReading {
        self.tick = self.tick.wrapping_add(1);
        let step = (self.tick % 16).min(16 - self.tick % 16) as f32;
        TelemetryReading {
            address: self.address,
            value_celsius: 20.0 + step * 0.25,
            timestamp_ms: monotonic_ms(),
        }
    }
}

async fn load_config() -> RuntimeConfig {
    let Some(path) = std::env::var_os("BRIDGE_CONFIG") else {
        return RuntimeConfig::default();
    };

    match tokio::fs::read(&path).await {
        Ok(raw) => match serde_json::from_slice::<RuntimeConfig>(&raw) {
            Ok(config) => config,
            Err(err) => {
                warn!("invalid config file {}: {err}", path.to_string_lossy());
                RuntimeConfig::default()
            }
        },
        Err(err) => {
            warn!("failed to read {}: {err}", path.to_string_lossy());
            RuntimeConfig::default()
        }
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig) {
    if let Ok(host) = std::env::var("MQTT_HOST") {
        config.network.mqtt_host = host;
    }
    if let Some(port) = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
    {
        config.network.mqtt_port = port;
    }
    if let Ok(user) = std::env::var("MQTT_USER") {
        config.network.mqtt_user = user;
    }
    if let Ok(pass) = std::env::var("MQTT_PASS") {
        config.network.mqtt_pass = pass;
    }
    if let Ok(client_id) = std::env::var("MQTT_CLIENT_ID") {
        config.network.client_id = client_id;
    }
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
