use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Source of "now" for every time-dependent decision (next trigger, pause
/// remaining, daily stats rollover, history retention).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Epoch milliseconds, the unit stored in `nextTriggerTime` and record timestamps.
    fn now_ms(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Calendar date (`YYYY-MM-DD`, UTC) used as the daily stats bucket.
    fn today(&self) -> String {
        self.now().format("%Y-%m-%d").to_string()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().expect("clock poisoned") = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 23, 59, 0).unwrap());
        assert_eq!(clock.today(), "2026-03-01");
        clock.advance(Duration::minutes(2));
        assert_eq!(clock.today(), "2026-03-02");
        assert_eq!(
            clock.now_ms(),
            Utc.with_ymd_and_hms(2026, 3, 2, 0, 1, 0).unwrap().timestamp_millis()
        );
    }
}
