use std::time::Duration;

use heapless::String;
use log::{debug, info, warn};

use crate::clock::Clock;
use crate::connectivity::{drive_until_connected, ConnectionState, Supervisor};
use crate::error::FormatError;
use crate::format::{bounded, TOPIC_CAPACITY};
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{LastWill, MqttWrapper, QoS};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(60);

const ONLINE: &str = "Online";
const OFFLINE: &str = "Offline";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// Full snapshot JSON.
    Status,
    /// Total input power as a single number.
    Power,
    /// Free-form diagnostic text.
    Log,
}

/// What to do when the broker link is down at publish time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishPolicy {
    /// Drop the message silently.
    BestEffort,
    /// Reconnect first, however long that takes.
    BlockUntilConnected,
}

struct Topics {
    lwt: String<TOPIC_CAPACITY>,
    stat: String<TOPIC_CAPACITY>,
    power: String<TOPIC_CAPACITY>,
    log: String<TOPIC_CAPACITY>,
}

impl Topics {
    fn new(name: &str) -> Result<Self, FormatError> {
        Ok(Self {
            lwt: bounded("topic", format_args!("tele/{name}/LWT"))?,
            stat: bounded("topic", format_args!("tele/{name}/STAT"))?,
            power: bounded("topic", format_args!("tele/{name}/POWER"))?,
            log: bounded("topic", format_args!("tele/{name}/LOG"))?,
        })
    }

    fn for_kind(&self, kind: MessageKind) -> &str {
        match kind {
            MessageKind::Status => &self.stat,
            MessageKind::Power => &self.power,
            MessageKind::Log => &self.log,
        }
    }
}

/// The `tele/<name>/...` topic tree on the message broker.
pub struct BrokerSink<MQTT: MqttWrapper> {
    client: MQTT,
    topics: Topics,
    supervisor: Supervisor,
}

impl<MQTT: MqttWrapper> BrokerSink<MQTT> {
    pub fn new(config: &MqttConfig) -> Result<Self, FormatError> {
        Self::with_client(MQTT::new(config, "-bridge"), config.topic_name())
    }

    pub fn with_client(mut client: MQTT, name: &str) -> Result<Self, FormatError> {
        let topics = Topics::new(name)?;
        client.set_last_will(LastWill {
            topic: topics.lwt.as_str().into(),
            payload: OFFLINE.into(),
            qos: QoS::AtLeastOnce,
            retain: true,
        });
        Ok(Self {
            client,
            topics,
            supervisor: Supervisor::new("broker", RECONNECT_DELAY),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn is_connected(&mut self) -> bool {
        self.supervisor.check(&mut self.client)
    }

    /// Keep-alive and ack processing. Never reconnects.
    pub fn pump(&mut self) {
        self.client.pump();
    }

    /// Connect and announce ourselves, retrying until the broker accepts.
    /// `pump` runs every other handler while waiting.
    pub fn connect_blocking(&mut self, clock: &dyn Clock, pump: &mut dyn FnMut()) {
        if self.supervisor.check(&mut self.client) {
            return;
        }
        info!("Connecting for MQTT, LWT {}", self.topics.lwt);
        drive_until_connected(
            &mut self.supervisor,
            &mut self.client,
            clock,
            &mut |client: &mut MQTT| {
                client.pump();
                pump();
            },
        );
        info!("MQTT connected");
        if let Err(e) = self
            .client
            .publish(self.topics.lwt.as_str(), QoS::AtMostOnce, true, ONLINE)
        {
            warn!("mqtt error: {e:?}");
            self.supervisor.mark_lost();
        }
    }

    /// Publish one message under `policy`. Returns whether it was handed to
    /// the client; nothing is queued or retried.
    pub fn publish(
        &mut self,
        kind: MessageKind,
        payload: &str,
        policy: PublishPolicy,
        clock: &dyn Clock,
        pump: &mut dyn FnMut(),
    ) -> bool {
        if !self.supervisor.check(&mut self.client) {
            match policy {
                PublishPolicy::BestEffort => {
                    debug!("MQTT offline, skipping {kind:?} message");
                    return false;
                }
                PublishPolicy::BlockUntilConnected => self.connect_blocking(clock, pump),
            }
        }

        let topic = self.topics.for_kind(kind);
        debug!("MQTT: Publishing '{topic}': '{payload}'");
        match self.client.publish(topic, QoS::AtMostOnce, false, payload) {
            Ok(()) => true,
            Err(e) => {
                warn!("mqtt error: {e:?}");
                self.supervisor.mark_lost();
                false
            }
        }
    }
}
