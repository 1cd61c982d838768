use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActuatorState {
    Off,
    On,
}

impl ActuatorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Dashboard wire value for the actuator channel.
    pub fn as_payload(self) -> &'static str {
        match self {
            Self::Off => "0",
            Self::On => "1",
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
        }
    }
}

/// 8-byte one-wire ROM identifier. Byte 0 is the family code (0x28 for a
/// DS18B20), byte 7 the bus CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress(pub [u8; 8]);

impl DeviceAddress {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    pub fn family_code(&self) -> u8 {
        self.0[0]
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One probe sample, stamped with the monotonic tick it was taken at.
/// Produced per scheduler firing and consumed immediately by the publish
/// step; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub address: DeviceAddress,
    pub value_celsius: f32,
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn actuator_payloads_match_dashboard_values() {
        assert_eq!(ActuatorState::Off.as_payload(), "0");
        assert_eq!(ActuatorState::On.as_payload(), "1");
        assert!(ActuatorState::On.is_on());
        assert!(!ActuatorState::Off.is_on());
    }

    #[test]
    fn device_address_displays_as_hex() {
        let address = DeviceAddress::new([0x28, 0xff, 0x64, 0x1e, 0x15, 0x3c, 0x00, 0x7b]);
        assert_eq!(address.to_string(), "28ff641e153c007b");
        assert_eq!(address.family_code(), 0x28);
    }

    #[test]
    fn device_addresses_compare_byte_for_byte() {
        let a = DeviceAddress::new([0x28, 0, 0, 0, 0, 0, 0, 1]);
        let b = DeviceAddress::new([0x28, 0, 0, 0, 0, 0, 0, 2]);
        assert_ne!(a, b);
        assert_eq!(a, DeviceAddress::new([0x28, 0, 0, 0, 0, 0, 0, 1]));
    }
}
