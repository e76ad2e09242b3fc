/// A periodic deadline aligned to absolute epoch time.
///
/// Deadlines always sit on a multiple of the period. A window fires at most
/// once per [`ScheduleWindow::advance`], and each advance moves the deadline by
/// exactly one period, so a loop that was blocked for several periods catches
/// up one period per iteration instead of skipping ahead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduleWindow {
    period: u64,
    next_deadline: u64,
}

impl ScheduleWindow {
    /// Create a window whose first deadline is the first period boundary
    /// strictly after `now`.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub fn new(period: u64, now: u64) -> Self {
        assert!(period > 0, "schedule period must be positive");
        let mut window = Self {
            period,
            next_deadline: 0,
        };
        window.initialize(now);
        window
    }

    /// Re-align the window to `now`, e.g. once the clock has been synced.
    pub fn initialize(&mut self, now: u64) {
        self.next_deadline = (now / self.period) * self.period + self.period;
    }

    pub fn is_due(&self, now: u64) -> bool {
        now >= self.next_deadline
    }

    pub fn advance(&mut self) {
        self.next_deadline += self.period;
    }

    pub fn next_deadline(&self) -> u64 {
        self.next_deadline
    }
}
