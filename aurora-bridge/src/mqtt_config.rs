use serde_derive::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub tls: Option<bool>,
    /// `<name>` in the `tele/<name>/...` topic tree.
    pub topic: Option<String>,
}

impl MqttConfig {
    pub fn is_valid(&self) -> bool {
        !self.host.is_empty()
    }

    pub fn topic_name(&self) -> &str {
        self.topic.as_deref().unwrap_or("aurora")
    }
}
