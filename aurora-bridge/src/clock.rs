use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDateTime};

use crate::error::FormatError;

/// Time source for scheduling, timestamps and cooperative waits.
pub trait Clock {
    /// Seconds since the Unix epoch, UTC.
    fn epoch(&self) -> u64;

    /// Monotonic milliseconds, only meaningful as differences.
    fn millis(&self) -> u64;

    fn sleep(&self, duration: Duration);

    /// Force a time synchronization. Returns `false` while the time is not
    /// trustworthy yet.
    fn sync(&self) -> bool {
        true
    }
}

/// Host clock. The operating system keeps it synchronized.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn epoch(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    fn millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn sync(&self) -> bool {
        // before 2020 the clock was evidently never set
        self.epoch() > 1_577_836_800
    }
}

/// Shift an epoch timestamp into local wall-clock time.
pub fn to_local(epoch: u64, offset: i64) -> u64 {
    epoch.saturating_add_signed(offset)
}

/// Calendar view of a local-time epoch timestamp.
pub fn local_datetime(local_epoch: u64) -> Result<NaiveDateTime, FormatError> {
    i64::try_from(local_epoch)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.naive_utc())
        .ok_or(FormatError::Timestamp(local_epoch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_shifts_both_ways() {
        assert_eq!(to_local(50_000, 3600), 53_600);
        assert_eq!(to_local(50_000, -3600), 46_400);
        assert_eq!(to_local(10, -3600), 0);
    }

    #[test]
    fn calendar_conversion() {
        let dt = local_datetime(50_000).unwrap();
        assert_eq!(dt.format("%Y%m%d %H:%M").to_string(), "19700101 13:53");
    }

    #[test]
    fn out_of_range_timestamp() {
        assert!(local_datetime(u64::MAX).is_err());
        assert!(local_datetime(i64::MAX as u64).is_err());
    }
}
