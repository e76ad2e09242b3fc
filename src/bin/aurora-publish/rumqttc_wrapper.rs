use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::{thread, time::Duration};

use anyhow::anyhow;
use aurora_bridge::{
    connectivity::{ConnectionState, Link},
    error::ConnectError,
    mqtt_config::MqttConfig,
    mqtt_wrapper::{self, LastWill},
};
use log::{debug, warn};
use rumqttc::{
    tokio_rustls::{self, rustls::ClientConfig},
    Client, Event, MqttOptions, Packet, Transport,
};

enum LinkEvent {
    Up,
    Down(String),
}

pub struct RumqttcWrapper {
    options: MqttOptions,
    client: Option<Client>,
    events: Option<Receiver<LinkEvent>>,
    state: ConnectionState,
}

fn match_qos(qos: mqtt_wrapper::QoS) -> rumqttc::QoS {
    match qos {
        mqtt_wrapper::QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        mqtt_wrapper::QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        mqtt_wrapper::QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn tls_transport() -> Transport {
    // Use rustls-native-certs to load root certificates from the operating system.
    let mut roots = tokio_rustls::rustls::RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in native.errors {
        warn!("could not load platform cert: {e}");
    }
    for cert in native.certs {
        if let Err(e) = roots.add(cert) {
            warn!("platform cert rejected: {e}");
        }
    }

    let client_config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Transport::tls_with_config(client_config.into())
}

impl RumqttcWrapper {
    fn shutdown(&mut self) {
        if let Some(client) = self.client.take() {
            // the event thread may already be gone
            let _ = client.try_disconnect();
        }
        self.events = None;
    }
}

impl Drop for RumqttcWrapper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Link for RumqttcWrapper {
    fn connect(&mut self) -> Result<(), ConnectError> {
        self.shutdown();

        let (client, mut connection) = Client::new(self.options.clone(), 512);
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("mqtt-events".into())
            .spawn(move || {
                // iterate until the first error; reconnecting is the
                // supervisor's call, not the event loop's
                for notification in connection.iter() {
                    let event = match notification {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => LinkEvent::Up,
                        Ok(_) => continue,
                        Err(e) => LinkEvent::Down(e.to_string()),
                    };
                    let down = matches!(event, LinkEvent::Down(_));
                    if sender.send(event).is_err() || down {
                        break;
                    }
                }
            })
            .map_err(|e| ConnectError {
                link: "broker",
                reason: e.to_string(),
            })?;

        self.client = Some(client);
        self.events = Some(receiver);
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    fn state(&mut self) -> ConnectionState {
        mqtt_wrapper::MqttWrapper::pump(self);
        self.state
    }
}

impl mqtt_wrapper::MqttWrapper for RumqttcWrapper {
    fn publish<S, V>(
        &mut self,
        topic: S,
        qos: mqtt_wrapper::QoS,
        retain: bool,
        payload: V,
    ) -> anyhow::Result<()>
    where
        S: Clone + Into<String>,
        V: Clone + Into<Vec<u8>>,
    {
        let client = self.client.as_ref().ok_or_else(|| anyhow!("not connected"))?;
        Ok(client.try_publish(topic, match_qos(qos), retain, payload)?)
    }

    fn set_last_will(&mut self, will: LastWill) {
        self.options.set_last_will(rumqttc::LastWill::new(
            will.topic,
            will.payload,
            match_qos(will.qos),
            will.retain,
        ));
    }

    fn pump(&mut self) {
        let Some(events) = &self.events else {
            return;
        };
        loop {
            match events.try_recv() {
                Ok(LinkEvent::Up) => self.state = ConnectionState::Connected,
                Ok(LinkEvent::Down(reason)) => {
                    warn!("mqtt connection lost: {reason}");
                    self.state = ConnectionState::Disconnected;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.state != ConnectionState::Disconnected {
                        debug!("mqtt event thread stopped");
                    }
                    self.state = ConnectionState::Disconnected;
                    break;
                }
            }
        }
    }

    fn new(config: &MqttConfig, suffix: &str) -> Self {
        let use_tls = config.tls.is_some_and(|tls| tls);

        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| config.topic_name().to_string());
        let mut mqttoptions = MqttOptions::new(
            client_id + suffix,
            &config.host,
            config.port.unwrap_or_else(|| {
                if use_tls {
                    return 8883;
                }
                1883
            }),
        );
        mqttoptions.set_keep_alive(Duration::from_secs(5));
        if use_tls {
            mqttoptions.set_transport(tls_transport());
        }

        //parse the mqtt authentication options
        if let Some((username, password)) = match (&config.username, &config.password) {
            (None, None) => None,
            (None, Some(_)) => None,
            (Some(username), None) => Some((username.clone(), "".into())),
            (Some(username), Some(password)) => Some((username.clone(), password.clone())),
        } {
            mqttoptions.set_credentials(username, password);
        }

        Self {
            options: mqttoptions,
            client: None,
            events: None,
            state: ConnectionState::Disconnected,
        }
    }
}
