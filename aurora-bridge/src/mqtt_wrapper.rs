use crate::connectivity::Link;
use crate::mqtt_config::MqttConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Message the broker publishes on our behalf when the connection drops.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

pub trait MqttWrapper: Link {
    // This trait provides an interface that the decouples library code from an
    // implementation of the MQTT client. On library calling code, one needs to
    // wrap the MQTT implementation, i.e. the client, in a new type that in
    // turn implements this trait. Connection handling goes through `Link`.

    fn publish<S, V>(&mut self, topic: S, qos: QoS, retain: bool, payload: V) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>;

    /// Registered with the broker on the next connect.
    fn set_last_will(&mut self, will: LastWill);

    /// Process pending protocol traffic (acks, keep-alive) without blocking.
    fn pump(&mut self);

    fn new(config: &MqttConfig, suffix: &str) -> Self;
}
