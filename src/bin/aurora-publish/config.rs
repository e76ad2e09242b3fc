use std::path::PathBuf;
use std::{env, fs};

use anyhow::Context;
use aurora_bridge::bridge::BridgeConfig;
use aurora_bridge::mqtt_config::MqttConfig;
use aurora_bridge::pvoutput::PvOutputConfig;
use log::{info, warn};
use serde_derive::Deserialize;

fn default_inverter_address() -> u8 {
    2
}

fn default_network_probe() -> String {
    "1.1.1.1:53".into()
}

fn default_http_listen() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    /// `host:port` of the serial-to-TCP gateway in front of the inverter.
    #[serde(default)]
    pub inverter_host: String,
    #[serde(default = "default_inverter_address")]
    pub inverter_address: u8,
    #[serde(default = "default_network_probe")]
    pub network_probe: String,
    #[serde(default = "default_http_listen")]
    pub http_listen: String,
    #[serde(flatten)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub pvoutput: PvOutputConfig,
}

impl Config {
    pub fn is_valid(&self) -> bool {
        !self.inverter_host.is_empty()
            && self.mqtt.is_valid()
            && self.pvoutput.is_valid()
            && self.bridge.is_valid()
    }

    /// Read `config.toml` from the working directory, or next to the
    /// executable, and apply environment overrides on top.
    pub fn load() -> anyhow::Result<Config> {
        let path = config_path()?;
        info!("loading configuration from {}", path.display());
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Could not read config.toml: {e}");
                "".into()
            }
        };
        let mut config = Self::parse(&contents)?;
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    fn parse(contents: &str) -> anyhow::Result<Config> {
        toml::from_str(contents).context("toml config unparsable")
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // $INVERTER_HOST
        if let Some(inverter_host) = lookup("INVERTER_HOST") {
            self.inverter_host = inverter_host;
        }
        // $MQTT_BROKER_HOST
        if let Some(host) = lookup("MQTT_BROKER_HOST") {
            self.mqtt.host = host;
        }
        // $MQTT_PORT (optional)
        if let Some(port) = lookup("MQTT_PORT") {
            self.mqtt.port = Some(port.parse().unwrap_or(1883));
        }
        // $MQTT_USERNAME (optional)
        if let Some(username) = lookup("MQTT_USERNAME") {
            self.mqtt.username = Some(username);
        }
        // $MQTT_PASSWORD (optional)
        if let Some(password) = lookup("MQTT_PASSWORD") {
            self.mqtt.password = Some(password);
        }
        // $MQTT_TOPIC (optional)
        if let Some(topic) = lookup("MQTT_TOPIC") {
            self.mqtt.topic = Some(topic);
        }
        // $PVOUTPUT_API_KEY
        if let Some(api_key) = lookup("PVOUTPUT_API_KEY") {
            self.pvoutput.api_key = api_key;
        }
        // $PVOUTPUT_SYSTEM_ID
        if let Some(system_id) = lookup("PVOUTPUT_SYSTEM_ID") {
            self.pvoutput.system_id = system_id;
        }
    }
}

fn config_path() -> anyhow::Result<PathBuf> {
    let mut path = env::current_dir().context("can't retrieve current dir")?;
    path.push("config.toml");
    if !path.exists() {
        info!("{} does not exist. Trying relative path", path.display());
        path = env::current_exe().context("Unable to get current executable path")?;
        path.pop();
        path.push("config.toml");
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aurora_bridge::aggregator::SnapshotPolicy;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.inverter_address, 2);
        assert_eq!(config.network_probe, "1.1.1.1:53");
        assert_eq!(config.http_listen, "0.0.0.0:8080");
        assert_eq!(config.bridge.report_period, 300);
        assert_eq!(config.bridge.stats_period, 30);
        assert_eq!(config.bridge.snapshot_policy, SnapshotPolicy::Replace);
        assert!(!config.is_valid());
    }

    #[test]
    fn full_file() {
        let config = Config::parse(
            r#"
            inverter_host = "10.0.0.5:8899"
            local_time_offset = 3600
            stats_period = 60
            snapshot_policy = "merge"

            [mqtt]
            host = "broker.local"
            topic = "roof"

            [pvoutput]
            api_key = "secret"
            system_id = "4711"
            "#,
        )
        .unwrap();
        assert!(config.is_valid());
        assert_eq!(config.bridge.local_time_offset, 3600);
        assert_eq!(config.bridge.stats_period, 60);
        assert_eq!(config.bridge.report_period, 300);
        assert_eq!(config.bridge.snapshot_policy, SnapshotPolicy::Merge);
        assert_eq!(config.mqtt.topic_name(), "roof");
        assert_eq!(config.pvoutput.url, None);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(Config::parse(r#"snapshot_policy = "sometimes""#).is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::parse(
            r#"
            inverter_host = "10.0.0.5:8899"
            [mqtt]
            host = "broker.local"
            "#,
        )
        .unwrap();
        let env: HashMap<&str, &str> = [
            ("MQTT_BROKER_HOST", "other.local"),
            ("MQTT_PORT", "not a port"),
            ("PVOUTPUT_API_KEY", "k"),
            ("PVOUTPUT_SYSTEM_ID", "1"),
        ]
        .into();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.inverter_host, "10.0.0.5:8899");
        assert_eq!(config.mqtt.host, "other.local");
        assert_eq!(config.mqtt.port, Some(1883));
        assert!(config.is_valid());
    }
}
