use std::sync::Arc;
use std::time::Duration;

use autorefresh_core::{Clock, TabId, Timer};
use tracing::{debug, info, warn};

use crate::alarm::{alarm_name, AlarmPlatform, AlarmSpec};

/// Keeps the alarm platform in step with the timer list.
///
/// Holds a mirror of the last timer list it was told about; removals are
/// detected by diffing the mirror against the new list by tab id.
pub struct AlarmScheduler {
    alarms: Arc<dyn AlarmPlatform>,
    clock: Arc<dyn Clock>,
    mirror: Vec<Timer>,
}

impl AlarmScheduler {
    pub fn new(alarms: Arc<dyn AlarmPlatform>, clock: Arc<dyn Clock>) -> Self {
        Self {
            alarms,
            clock,
            mirror: Vec::new(),
        }
    }

    pub fn alarms(&self) -> &Arc<dyn AlarmPlatform> {
        &self.alarms
    }

    /// Last timer list seen.
    pub fn timers(&self) -> &[Timer] {
        &self.mirror
    }

    /// Startup: adopt the stored timers and, when `register` is set, give
    /// every active one an alarm.
    pub fn restore(&mut self, timers: &[Timer], register: bool) {
        self.mirror = timers.to_vec();
        if !register {
            info!(timers = timers.len(), "alarm restore disabled by settings");
            return;
        }
        let mut armed = 0usize;
        for timer in timers.iter().filter(|t| !t.paused) {
            self.schedule(timer);
            armed += 1;
        }
        info!(timers = timers.len(), armed, "alarms restored");
    }

    /// (Re-)create alarms for every active timer in `timers`.
    ///
    /// A pending `nextTriggerTime` is honoured as the first delay; otherwise
    /// the alarm is purely periodic. Paused timers never get an alarm here.
    pub fn handle_add_timer(&mut self, timers: &[Timer]) {
        for timer in timers {
            if timer.paused {
                self.clear(timer.tab_id);
                continue;
            }
            self.schedule(timer);
        }
        self.mirror = timers.to_vec();
    }

    /// Clear the alarm of every timer that disappeared since the last list.
    pub fn handle_remove_timer(&mut self, timers: &[Timer]) {
        let removed: Vec<TabId> = self
            .mirror
            .iter()
            .map(|t| t.tab_id)
            .filter(|id| !timers.iter().any(|t| t.tab_id == *id))
            .collect();
        for tab_id in removed {
            self.clear(tab_id);
        }
        self.mirror = timers.to_vec();
    }

    /// Adopt `timers` as the mirror when tab membership did not change.
    pub fn sync(&mut self, timers: &[Timer]) {
        self.mirror = timers.to_vec();
    }

    /// Refresh the mirrored copy of one timer without touching its alarm.
    pub fn update(&mut self, timer: &Timer) {
        match self.mirror.iter_mut().find(|t| t.tab_id == timer.tab_id) {
            Some(slot) => *slot = timer.clone(),
            None => self.mirror.push(timer.clone()),
        }
    }

    /// Register the alarm for an active timer.
    pub fn schedule(&self, timer: &Timer) {
        let period = period_of(timer);
        let now = self.clock.now_ms();
        let spec = if timer.next_trigger_time > now {
            AlarmSpec::delayed(millis(timer.next_trigger_time - now), period)
        } else {
            AlarmSpec::periodic(period)
        };
        self.create(timer.tab_id, spec);
    }

    /// Re-register a periodic alarm after a firing.
    pub fn rearm(&self, timer: &Timer) {
        self.create(timer.tab_id, AlarmSpec::periodic(period_of(timer)));
    }

    /// Alarm for a resumed timer: `delay_ms` first, then the normal period.
    pub fn resume(&self, timer: &Timer, delay_ms: i64) {
        self.create(
            timer.tab_id,
            AlarmSpec::delayed(millis(delay_ms), period_of(timer)),
        );
    }

    /// Cancel a tab's alarm. Returns whether one existed.
    pub fn clear(&self, tab_id: TabId) -> bool {
        let cleared = self.alarms.clear(&alarm_name(tab_id));
        if cleared {
            debug!(tab_id, "alarm cleared");
        }
        cleared
    }

    fn create(&self, tab_id: TabId, spec: AlarmSpec) {
        if let Err(e) = self.alarms.create(&alarm_name(tab_id), spec) {
            warn!(tab_id, error = %e, "failed to register alarm");
        }
    }
}

fn period_of(timer: &Timer) -> Duration {
    Duration::from_secs(timer.interval)
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use autorefresh_core::ManualClock;
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::Result;

    #[derive(Default)]
    struct RecordingAlarms {
        live: Mutex<HashMap<String, AlarmSpec>>,
    }

    impl AlarmPlatform for RecordingAlarms {
        fn create(&self, name: &str, spec: AlarmSpec) -> Result<()> {
            self.live.lock().unwrap().insert(name.to_string(), spec);
            Ok(())
        }
        fn clear(&self, name: &str) -> bool {
            self.live.lock().unwrap().remove(name).is_some()
        }
        fn get(&self, name: &str) -> Option<AlarmSpec> {
            self.live.lock().unwrap().get(name).copied()
        }
        fn names(&self) -> Vec<String> {
            self.live.lock().unwrap().keys().cloned().collect()
        }
    }

    const T0: i64 = 1_700_000_000_000;

    fn setup() -> (Arc<RecordingAlarms>, AlarmScheduler) {
        let alarms = Arc::new(RecordingAlarms::default());
        let clock = Arc::new(ManualClock::new(Utc.timestamp_millis_opt(T0).unwrap()));
        let scheduler = AlarmScheduler::new(alarms.clone(), clock);
        (alarms, scheduler)
    }

    fn timer(tab_id: TabId, interval: u64) -> Timer {
        Timer::new(tab_id, interval)
    }

    #[test]
    fn add_uses_pending_trigger_as_delay() {
        let (alarms, mut scheduler) = setup();
        let mut pending = timer(1, 60);
        pending.next_trigger_time = T0 + 15_000;
        let stale = timer(2, 30);

        scheduler.handle_add_timer(&[pending, stale]);

        assert_eq!(
            alarms.get("timer-1"),
            Some(AlarmSpec::delayed(
                Duration::from_secs(15),
                Duration::from_secs(60)
            ))
        );
        assert_eq!(
            alarms.get("timer-2"),
            Some(AlarmSpec::periodic(Duration::from_secs(30)))
        );
        assert_eq!(scheduler.timers().len(), 2);
    }

    #[test]
    fn add_skips_paused_timers() {
        let (alarms, mut scheduler) = setup();
        let mut paused = timer(3, 60);
        paused.paused = true;
        scheduler.handle_add_timer(&[paused]);
        assert!(alarms.names().is_empty());
    }

    #[test]
    fn remove_clears_only_missing_tabs() {
        let (alarms, mut scheduler) = setup();
        scheduler.handle_add_timer(&[timer(1, 10), timer(2, 10), timer(3, 10)]);

        scheduler.handle_remove_timer(&[timer(2, 10)]);

        assert_eq!(alarms.names(), vec!["timer-2".to_string()]);
        assert_eq!(scheduler.timers().len(), 1);
    }

    #[test]
    fn restore_respects_setting() {
        let (alarms, mut scheduler) = setup();
        let mut paused = timer(2, 10);
        paused.paused = true;

        scheduler.restore(&[timer(1, 10), paused.clone()], false);
        assert!(alarms.names().is_empty());
        assert_eq!(scheduler.timers().len(), 2);

        scheduler.restore(&[timer(1, 10), paused], true);
        assert_eq!(alarms.names(), vec!["timer-1".to_string()]);
    }

    #[test]
    fn resume_carries_delay_and_period() {
        let (alarms, scheduler) = setup();
        scheduler.resume(&timer(5, 120), 4_500);
        assert_eq!(
            alarms.get("timer-5"),
            Some(AlarmSpec::delayed(
                Duration::from_millis(4_500),
                Duration::from_secs(120)
            ))
        );
    }
}
