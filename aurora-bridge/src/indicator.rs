use log::debug;

/// Local on/off/blink status output. Nothing is ever read back from it.
pub trait Indicator {
    fn on(&mut self);
    fn off(&mut self);
    /// Blink `count` times quickly; `0` blinks until told otherwise.
    fn flash(&mut self, count: u8);
    /// Advance blink patterns. Called with the other handlers.
    fn tick(&mut self) {}
}

/// Blink patterns used by the bridge.
pub mod pattern {
    pub const READ_OK: u8 = 1;
    pub const REPORT_SENT: u8 = 2;
    pub const ENERGY_READ_FAILED: u8 = 4;
    pub const REPORT_FAILED: u8 = 5;
    pub const CONTINUOUS: u8 = 0;
}

/// Indicator for hosts without a LED: patterns end up in the debug log.
#[derive(Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn on(&mut self) {
        debug!("led on");
    }

    fn off(&mut self) {
        debug!("led off");
    }

    fn flash(&mut self, count: u8) {
        debug!("led flash x{count}");
    }
}
