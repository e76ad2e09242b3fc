use std::io;
use std::net::UdpSocket;

use aurora_bridge::connectivity::{ConnectionState, Link};
use aurora_bridge::error::ConnectError;

/// The host's network, considered up while a route to `target` exists.
/// Probing sends no packets.
pub struct RouteProbe {
    target: String,
}

impl RouteProbe {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.into(),
        }
    }

    fn probe(&self) -> io::Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(&self.target)
    }
}

impl Link for RouteProbe {
    fn connect(&mut self) -> Result<(), ConnectError> {
        // the OS owns the interface, a connect is just a first probe
        self.probe().map_err(|e| ConnectError {
            link: "network",
            reason: format!("no route to {}: {e}", self.target),
        })
    }

    fn state(&mut self) -> ConnectionState {
        match self.probe() {
            Ok(()) => ConnectionState::Connected,
            Err(_) => ConnectionState::Disconnected,
        }
    }
}
