use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use aurora_bridge::inverter::Transport;
use aurora_bridge::protocol::{REPLY_LEN, REQUEST_LEN};
use log::debug;

const TIMEOUT: Duration = Duration::from_millis(500);

/// Inverter bus reached through a serial-to-TCP gateway. Every transaction
/// opens its own connection.
pub struct TcpGateway {
    address: String,
}

impl TcpGateway {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Transport for TcpGateway {
    fn transact(
        &mut self,
        request: &[u8; REQUEST_LEN],
        reply: &mut [u8; REPLY_LEN],
    ) -> io::Result<()> {
        let address = self.address.to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "inverter host did not resolve")
        })?;
        let mut stream = TcpStream::connect_timeout(&address, TIMEOUT)?;
        stream.set_read_timeout(Some(TIMEOUT))?;
        stream.set_write_timeout(Some(TIMEOUT))?;
        stream.write_all(request)?;
        stream.read_exact(reply)?;
        debug!("{request:02x?} -> {reply:02x?}");
        Ok(())
    }
}
