use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use autorefresh_core::TabId;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{Result, SchedulerError};

const ALARM_PREFIX: &str = "timer-";

/// Deterministic alarm name for a tab: `timer-<tabId>`.
pub fn alarm_name(tab_id: TabId) -> String {
    format!("{ALARM_PREFIX}{tab_id}")
}

/// Inverse of [`alarm_name`]. `None` for alarms this scheduler does not own.
pub fn parse_alarm_name(name: &str) -> Option<TabId> {
    let digits = name.strip_prefix(ALARM_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// When an alarm fires.
///
/// - delay only: one shot after `delay`
/// - period only: first firing after one `period`, then every `period`
/// - both: first firing after `delay`, then every `period`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmSpec {
    pub delay: Option<Duration>,
    pub period: Option<Duration>,
}

impl AlarmSpec {
    pub fn periodic(period: Duration) -> Self {
        Self {
            delay: None,
            period: Some(period),
        }
    }

    pub fn delayed(delay: Duration, period: Duration) -> Self {
        Self {
            delay: Some(delay),
            period: Some(period),
        }
    }

    pub fn once(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            period: None,
        }
    }

    pub fn delay_in_minutes(&self) -> Option<f64> {
        self.delay.map(|d| d.as_secs_f64() / 60.0)
    }

    pub fn period_in_minutes(&self) -> Option<f64> {
        self.period.map(|d| d.as_secs_f64() / 60.0)
    }

    /// Wait before the first firing.
    fn first_wait(&self) -> Duration {
        self.delay.or(self.period).unwrap_or(Duration::ZERO)
    }
}

/// Wake-up event delivered when an alarm fires. Carries only the name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub name: String,
}

/// Platform facility for named, optionally periodic wake-ups.
pub trait AlarmPlatform: Send + Sync {
    /// Register `name`, replacing any existing alarm of the same name.
    fn create(&self, name: &str, spec: AlarmSpec) -> Result<()>;

    /// Cancel `name`. Returns whether a live alarm was removed.
    fn clear(&self, name: &str) -> bool;

    fn get(&self, name: &str) -> Option<AlarmSpec>;

    /// Names of all live alarms.
    fn names(&self) -> Vec<String>;
}

struct LiveAlarm {
    spec: AlarmSpec,
    task: JoinHandle<()>,
}

/// [`AlarmPlatform`] backed by one tokio task per alarm.
///
/// Firings are sent as [`AlarmEvent`]s on an mpsc channel so a single
/// consumer can process them one at a time.
pub struct TokioAlarms {
    tx: mpsc::Sender<AlarmEvent>,
    live: Mutex<HashMap<String, LiveAlarm>>,
}

impl TokioAlarms {
    pub fn new(tx: mpsc::Sender<AlarmEvent>) -> Self {
        Self {
            tx,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Convenience constructor returning the receiving end as well.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AlarmEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl AlarmPlatform for TokioAlarms {
    fn create(&self, name: &str, spec: AlarmSpec) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::Alarm(format!("no runtime for alarm {name}: {e}")))?;
        let task = handle.spawn(run_alarm(name.to_string(), spec, self.tx.clone()));

        let mut live = self.live.lock().unwrap();
        if let Some(previous) = live.insert(name.to_string(), LiveAlarm { spec, task }) {
            previous.task.abort();
        }
        debug!(alarm = %name, ?spec, "alarm registered");
        Ok(())
    }

    fn clear(&self, name: &str) -> bool {
        let mut live = self.live.lock().unwrap();
        match live.remove(name) {
            Some(alarm) => {
                let was_live = !alarm.task.is_finished();
                alarm.task.abort();
                was_live
            }
            None => false,
        }
    }

    fn get(&self, name: &str) -> Option<AlarmSpec> {
        let live = self.live.lock().unwrap();
        live.get(name)
            .filter(|alarm| !alarm.task.is_finished())
            .map(|alarm| alarm.spec)
    }

    fn names(&self) -> Vec<String> {
        let mut live = self.live.lock().unwrap();
        // Fired one-shot alarms are gone.
        live.retain(|_, alarm| !alarm.task.is_finished());
        live.keys().cloned().collect()
    }
}

impl Drop for TokioAlarms {
    fn drop(&mut self) {
        if let Ok(live) = self.live.get_mut() {
            for (_, alarm) in live.drain() {
                alarm.task.abort();
            }
        }
    }
}

async fn run_alarm(name: String, spec: AlarmSpec, tx: mpsc::Sender<AlarmEvent>) {
    tokio::time::sleep(spec.first_wait()).await;
    if tx.send(AlarmEvent { name: name.clone() }).await.is_err() {
        warn!(alarm = %name, "alarm receiver closed");
        return;
    }

    let Some(period) = spec.period.filter(|p| !p.is_zero()) else {
        return;
    };
    let Some(start) = Instant::now().checked_add(period) else {
        debug!(alarm = %name, ?period, "period beyond timer range, not repeating");
        return;
    };
    let mut ticker = tokio::time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if tx.send(AlarmEvent { name: name.clone() }).await.is_err() {
            warn!(alarm = %name, "alarm receiver closed");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        assert_eq!(alarm_name(42), "timer-42");
        assert_eq!(parse_alarm_name("timer-42"), Some(42));
        assert_eq!(parse_alarm_name("timer-"), None);
        assert_eq!(parse_alarm_name("timer--1"), None);
        assert_eq!(parse_alarm_name("timer-4x"), None);
        assert_eq!(parse_alarm_name("cleanup"), None);
    }

    #[test]
    fn spec_minutes() {
        let spec = AlarmSpec::delayed(Duration::from_secs(30), Duration::from_secs(120));
        assert_eq!(spec.delay_in_minutes(), Some(0.5));
        assert_eq!(spec.period_in_minutes(), Some(2.0));
        assert_eq!(AlarmSpec::periodic(Duration::from_secs(60)).delay_in_minutes(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_alarm_fires_then_repeats() {
        let (alarms, mut rx) = TokioAlarms::channel(8);
        alarms
            .create(
                "timer-1",
                AlarmSpec::delayed(Duration::from_secs(5), Duration::from_secs(60)),
            )
            .unwrap();

        let start = Instant::now();
        assert_eq!(rx.recv().await.unwrap().name, "timer-1");
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(65));
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_alarm_waits_one_period_first() {
        let (alarms, mut rx) = TokioAlarms::channel(8);
        alarms
            .create("timer-2", AlarmSpec::periodic(Duration::from_secs(30)))
            .unwrap();

        let start = Instant::now();
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn create_replaces_and_clear_cancels() {
        let (alarms, mut rx) = TokioAlarms::channel(8);
        alarms
            .create("timer-3", AlarmSpec::once(Duration::from_secs(10)))
            .unwrap();
        alarms
            .create("timer-3", AlarmSpec::once(Duration::from_secs(100)))
            .unwrap();
        assert_eq!(alarms.names(), vec!["timer-3".to_string()]);
        assert_eq!(
            alarms.get("timer-3"),
            Some(AlarmSpec::once(Duration::from_secs(100)))
        );

        let start = Instant::now();
        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(100));

        // One-shot alarm is gone after firing.
        tokio::task::yield_now().await;
        assert!(alarms.names().is_empty());

        alarms
            .create("timer-4", AlarmSpec::periodic(Duration::from_secs(1)))
            .unwrap();
        assert!(alarms.clear("timer-4"));
        assert!(!alarms.clear("timer-4"));
        let waited = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(waited.is_err(), "cleared alarm must not fire");
    }

    #[tokio::test(start_paused = true)]
    async fn huge_period_fires_once_without_panicking() {
        let (alarms, mut rx) = TokioAlarms::channel(8);
        alarms
            .create(
                "timer-5",
                AlarmSpec::delayed(Duration::from_secs(1), Duration::MAX),
            )
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().name, "timer-5");
        tokio::task::yield_now().await;
        assert!(alarms.names().is_empty());
    }
}
