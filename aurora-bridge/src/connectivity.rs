//! Connection supervision for the network link and the broker link.
//!
//! A [`Supervisor`] is a small state machine stepped from the control loop.
//! Waiting for a retry is a state of its own, so blocking bootstrap waits and
//! steady-state operation are driven by the same tick.

use std::time::Duration;

use log::{info, warn};

use crate::clock::Clock;
use crate::error::ConnectError;

/// Interval at which handlers are pumped while something waits.
pub const TICK: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// A connection the supervisor can (re)establish.
pub trait Link {
    /// Start a connection attempt. The outcome shows up in [`Link::state`].
    fn connect(&mut self) -> Result<(), ConnectError>;

    /// State as last observed by the transport.
    fn state(&mut self) -> ConnectionState;
}

pub struct Supervisor {
    name: &'static str,
    state: ConnectionState,
    retry_delay: Duration,
    next_attempt_ms: u64,
}

impl Supervisor {
    pub fn new(name: &'static str, retry_delay: Duration) -> Self {
        Self {
            name,
            state: ConnectionState::Disconnected,
            retry_delay,
            next_attempt_ms: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    fn set_state(&mut self, new_state: ConnectionState) {
        if self.state != new_state {
            info!("{} link {:?} -> {:?}", self.name, self.state, new_state);
            self.state = new_state;
        }
    }

    fn schedule_retry(&mut self, now_ms: u64) {
        self.next_attempt_ms = now_ms + self.retry_delay.as_millis() as u64;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Advance the reconnect state machine by one tick.
    pub fn step<L: Link + ?Sized>(&mut self, link: &mut L, now_ms: u64) {
        match self.state {
            ConnectionState::Disconnected => {
                if now_ms < self.next_attempt_ms {
                    return;
                }
                match link.connect() {
                    Ok(()) => self.set_state(ConnectionState::Connecting),
                    Err(e) => {
                        warn!("{e}");
                        self.schedule_retry(now_ms);
                    }
                }
            }
            ConnectionState::Connecting => match link.state() {
                ConnectionState::Connected => self.set_state(ConnectionState::Connected),
                ConnectionState::Connecting => {}
                ConnectionState::Disconnected => {
                    warn!(
                        "{} connection failed, retrying in {:.1}s",
                        self.name,
                        self.retry_delay.as_secs_f32()
                    );
                    self.schedule_retry(now_ms);
                }
            },
            // loss is only noticed through check() or mark_lost()
            ConnectionState::Connected => {}
        }
    }

    /// Liveness check without reconnecting. Adopts whatever the link reports
    /// as long as no attempt of ours is in flight.
    pub fn check<L: Link + ?Sized>(&mut self, link: &mut L) -> bool {
        if self.state != ConnectionState::Connecting {
            match link.state() {
                ConnectionState::Connected => self.set_state(ConnectionState::Connected),
                _ => self.set_state(ConnectionState::Disconnected),
            }
        }
        self.is_connected()
    }

    /// Record that an operation on the link failed.
    pub fn mark_lost(&mut self) {
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Step `supervisor` until the link is up, pumping handlers every tick.
pub fn drive_until_connected<L: Link + ?Sized>(
    supervisor: &mut Supervisor,
    link: &mut L,
    clock: &dyn Clock,
    pump: &mut dyn FnMut(&mut L),
) {
    loop {
        pump(link);
        supervisor.step(link, clock.millis());
        if supervisor.is_connected() {
            return;
        }
        clock.sleep(TICK);
    }
}
