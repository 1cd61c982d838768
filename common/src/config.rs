use serde::{Deserialize, Serialize};

use crate::types::DeviceAddress;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    /// Cayenne account username; first path segment of every topic.
    pub mqtt_user: String,
    pub mqtt_pass: String,
    /// Cayenne device client id; also sent as the MQTT client identifier.
    pub client_id: String,
    pub keep_alive_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "mqtt.mydevices.com".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            client_id: "boilerlink-bridge".to_string(),
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    /// GPIO carrying the one-wire bus.
    pub bus_pin: i32,
    pub address: DeviceAddress,
    pub resolution_bits: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bus_pin: 2,
            address: DeviceAddress::new([0x28, 0xff, 0x64, 0x1e, 0x15, 0x3c, 0x00, 0x7b]),
            resolution_bits: 10,
        }
    }
}

impl SensorConfig {
    pub fn sanitize(&mut self) {
        self.resolution_bits = self.resolution_bits.clamp(9, 12);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub telemetry_interval_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub loop_yield_ms: u64,
    /// Dashboard channel carrying the on/off command and its state echo.
    pub actuator_channel: u8,
    /// Dashboard channel carrying the temperature gauge.
    pub temperature_channel: u8,
    /// The relay board pulls the line low to energize the coil.
    pub actuator_active_low: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: 2_000,
            reconnect_backoff_ms: 5_000,
            loop_yield_ms: 10,
            actuator_channel: 5,
            temperature_channel: 10,
            actuator_active_low: true,
        }
    }
}

impl BridgeConfig {
    pub fn sanitize(&mut self) {
        self.telemetry_interval_ms = self.telemetry_interval_ms.max(250);
        self.reconnect_backoff_ms = self.reconnect_backoff_ms.max(500);
        self.loop_yield_ms = self.loop_yield_ms.clamp(1, 1_000);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub network: NetworkConfig,
    pub sensor: SensorConfig,
    pub bridge: BridgeConfig,
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.sensor.sanitize();
        self.bridge.sanitize();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_carry_the_appliance_constants() {
        let config = RuntimeConfig::default();
        assert_eq!(config.bridge.telemetry_interval_ms, 2_000);
        assert_eq!(config.bridge.reconnect_backoff_ms, 5_000);
        assert_eq!(config.bridge.actuator_channel, 5);
        assert_eq!(config.bridge.temperature_channel, 10);
        assert_eq!(config.network.mqtt_port, 1883);
        assert_eq!(config.sensor.resolution_bits, 10);
    }

    #[test]
    fn sanitize_clamps_resolution_into_part_range() {
        let mut sensor = SensorConfig {
            resolution_bits: 15,
            ..SensorConfig::default()
        };
        sensor.sanitize();
        assert_eq!(sensor.resolution_bits, 12);

        sensor.resolution_bits = 3;
        sensor.sanitize();
        assert_eq!(sensor.resolution_bits, 9);
    }

    #[test]
    fn sanitize_keeps_timing_out_of_degenerate_ranges() {
        let mut bridge = BridgeConfig {
            telemetry_interval_ms: 0,
            reconnect_backoff_ms: 0,
            loop_yield_ms: 0,
            ..BridgeConfig::default()
        };
        bridge.sanitize();
        assert_eq!(bridge.telemetry_interval_ms, 250);
        assert_eq!(bridge.reconnect_backoff_ms, 500);
        assert_eq!(bridge.loop_yield_ms, 1);
    }
}
