pub mod actuator;
pub mod command;
pub mod config;
pub mod link;
pub mod telemetry;
pub mod topics;
pub mod types;

pub use actuator::ActuatorController;
pub use command::{parse_actuator_command, CommandError};
pub use config::{BridgeConfig, NetworkConfig, RuntimeConfig, SensorConfig};
pub use link::LinkSupervisor;
pub use telemetry::{format_temperature, is_plausible, TelemetryScheduler, DISCONNECTED_C};
pub use topics::TopicSet;
pub use types::{ActuatorState, ConnectionState, DeviceAddress, TelemetryReading};
