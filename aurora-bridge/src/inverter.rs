use std::io;

use log::{debug, info, warn};

use crate::error::DeviceError;
use crate::protocol::{
    encode_request, Command, DspChannel, EnergyKind, Reply, INVERTER_EPOCH_OFFSET, REPLY_LEN,
    REQUEST_LEN,
};

/// One request/reply exchange with the inverter bus.
///
/// Implementations own the physical link (serial port, serial-to-TCP gateway,
/// a test script) and block until the reply arrived or the link gave up.
pub trait Transport {
    fn transact(
        &mut self,
        request: &[u8; REQUEST_LEN],
        reply: &mut [u8; REPLY_LEN],
    ) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum NetworkState {
    Unknown,
    Online,
    Offline,
}

/// Typed transactions against an Aurora inverter.
///
/// No operation aborts its caller: reads return either a value or a
/// [`DeviceError`] (or `None` for analog channels), and every failure is
/// logged with the name of the operation that caused it.
pub struct Inverter<T: Transport> {
    transport: T,
    address: u8,
    state: NetworkState,
}

impl<T: Transport> Inverter<T> {
    pub fn new(transport: T, address: u8) -> Self {
        info!("Inverter bus address: {address}");
        Self {
            transport,
            address,
            state: NetworkState::Unknown,
        }
    }

    pub fn state(&self) -> NetworkState {
        self.state
    }

    fn set_state(&mut self, new_state: NetworkState) {
        if self.state != new_state {
            self.state = new_state;
            info!("Inverter is {new_state:?}");
        }
    }

    fn transaction(&mut self, command: Command, args: [u8; 6]) -> Result<Reply, DeviceError> {
        let request = encode_request(self.address, command, args);
        let mut frame = [0u8; REPLY_LEN];
        self.transport.transact(&request, &mut frame)?;
        Reply::decode(&frame)
    }

    /// Cheap state probe used to decide whether a full read batch is worth it.
    pub fn is_online(&mut self) -> bool {
        match self.transaction(Command::State, [0; 6]) {
            Ok(reply) => {
                debug!("inverter global state {}", reply.global_state);
                self.set_state(NetworkState::Online);
                true
            }
            Err(e) => {
                log_failure("is_online", &e);
                self.set_state(NetworkState::Offline);
                false
            }
        }
    }

    /// Cumulated energy in Wh for the given period.
    pub fn read_cumulative_energy(&mut self, kind: EnergyKind) -> Result<u32, DeviceError> {
        self.transaction(Command::CumulatedEnergy, [kind as u8, 0, 0, 0, 0, 0])
            .map(|reply| reply.as_u32())
            .inspect_err(|e| log_failure(&format!("read_cumulative_energy {kind:?}"), e))
    }

    /// Read one DSP measurement. `None` marks a failed read or a value the
    /// inverter reported as not-a-number.
    pub fn read_analog(&mut self, channel: DspChannel) -> Option<f32> {
        // 1 selects the global measurement rather than a single module
        match self.transaction(Command::Dsp, [channel as u8, 1, 0, 0, 0, 0]) {
            Ok(reply) => Some(reply.as_f32()).filter(|v| v.is_finite()),
            Err(e) => {
                log_failure(&format!("read_analog {channel:?}"), &e);
                None
            }
        }
    }

    /// The inverter's clock, as Unix epoch seconds in inverter-local time.
    pub fn read_clock(&mut self) -> Result<u64, DeviceError> {
        self.transaction(Command::ReadTime, [0; 6])
            .map(|reply| u64::from(reply.as_u32()) + INVERTER_EPOCH_OFFSET)
            .inspect_err(|e| log_failure("read_clock", e))
    }

    /// Set the inverter's clock. `epoch` is Unix epoch seconds in local time.
    pub fn write_clock(&mut self, epoch: u64) -> Result<(), DeviceError> {
        let seconds = epoch
            .checked_sub(INVERTER_EPOCH_OFFSET)
            .and_then(|s| u32::try_from(s).ok())
            .ok_or(DeviceError::ClockRange(epoch))
            .inspect_err(|e| log_failure("write_clock", e))?;
        let [a, b, c, d] = seconds.to_be_bytes();
        self.transaction(Command::WriteTime, [a, b, c, d, 0, 0])
            .map(|_| ())
            .inspect_err(|e| log_failure("write_clock", e))
    }
}

fn log_failure(operation: &str, error: &DeviceError) {
    warn!("Inverter Error: {operation}: {error}");
}
