//! Cayenne MQTT topic scheme: `v1/<username>/things/<client_id>/<direction>/<channel>`.

use crate::config::{BridgeConfig, NetworkConfig};

pub fn cmd_topic(username: &str, client_id: &str, channel: u8) -> String {
    format!("v1/{username}/things/{client_id}/cmd/{channel}")
}

pub fn data_topic(username: &str, client_id: &str, channel: u8) -> String {
    format!("v1/{username}/things/{client_id}/data/{channel}")
}

/// Topic strings rendered once at startup from the active configuration.
#[derive(Debug, Clone)]
pub struct TopicSet {
    /// Inbound actuator command channel (subscribed).
    pub actuator_cmd: String,
    /// Actuator state echo channel (published).
    pub actuator_data: String,
    /// Temperature gauge channel (published).
    pub temperature_data: String,
}

impl TopicSet {
    pub fn new(network: &NetworkConfig, bridge: &BridgeConfig) -> Self {
        Self {
            actuator_cmd: cmd_topic(&network.mqtt_user, &network.client_id, bridge.actuator_channel),
            actuator_data: data_topic(
                &network.mqtt_user,
                &network.client_id,
                bridge.actuator_channel,
            ),
            temperature_data: data_topic(
                &network.mqtt_user,
                &network.client_id,
                bridge.temperature_channel,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample_network() -> NetworkConfig {
        NetworkConfig {
            mqtt_user: "f0000000-user".to_string(),
            client_id: "70000000-dev".to_string(),
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn command_topic_follows_cayenne_scheme() {
        assert_eq!(
            cmd_topic("f0000000-user", "70000000-dev", 5),
            "v1/f0000000-user/things/70000000-dev/cmd/5"
        );
    }

    #[test]
    fn topic_set_renders_all_three_channels() {
        let topics = TopicSet::new(&sample_network(), &BridgeConfig::default());
        assert_eq!(
            topics.actuator_cmd,
            "v1/f0000000-user/things/70000000-dev/cmd/5"
        );
        assert_eq!(
            topics.actuator_data,
            "v1/f0000000-user/things/70000000-dev/data/5"
        );
        assert_eq!(
            topics.temperature_data,
            "v1/f0000000-user/things/70000000-dev/data/10"
        );
    }
}
