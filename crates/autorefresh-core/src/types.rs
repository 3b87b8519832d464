use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Browser tab identifier. Unique key of the active timer set.
pub type TabId = i64;

/// Periodic refresh schedule attached to one tab.
///
/// Stored as an element of the `timers` document. Optional fields default so
/// that records written by older builds (no `paused`, no `runCount`) load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub tab_id: TabId,
    /// Refresh period in seconds.
    pub interval: u64,
    /// Tab title captured when the timer was created.
    #[serde(default)]
    pub title: String,
    /// Tab favicon URL captured when the timer was created.
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub paused: bool,
    /// Epoch milliseconds of the next scheduled reload. Meaningless while paused.
    #[serde(default)]
    pub next_trigger_time: i64,
    /// Milliseconds left until the next reload, captured at pause time.
    #[serde(default)]
    pub remaining: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u32>,
    #[serde(default)]
    pub run_count: u32,
}

impl Timer {
    pub fn new(tab_id: TabId, interval: u64) -> Self {
        Self {
            tab_id,
            interval,
            title: String::new(),
            icon: String::new(),
            paused: false,
            next_trigger_time: 0,
            remaining: 0,
            max_runs: None,
            run_count: 0,
        }
    }

    pub fn interval_ms(&self) -> i64 {
        i64::try_from(self.interval)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000)
    }

    /// True once the run cap has been hit. Always false without a cap.
    pub fn is_exhausted(&self) -> bool {
        self.max_runs.is_some_and(|max| self.run_count >= max)
    }

    /// Pause transform: freeze the countdown and keep what was left of it.
    pub fn paused_at(&self, now_ms: i64) -> Timer {
        Timer {
            paused: true,
            remaining: self.next_trigger_time.saturating_sub(now_ms).max(0),
            ..self.clone()
        }
    }

    /// Delay before the first reload after a resume.
    ///
    /// A zero `remaining` means none was captured, so a full interval is used.
    pub fn resume_delay_ms(&self) -> i64 {
        if self.remaining > 0 {
            self.remaining
        } else {
            self.interval_ms()
        }
    }

    /// Resume transform: the countdown restarts from the captured remainder.
    pub fn resumed_at(&self, now_ms: i64) -> Timer {
        Timer {
            paused: false,
            next_trigger_time: now_ms.saturating_add(self.resume_delay_ms()),
            remaining: 0,
            ..self.clone()
        }
    }

    /// State after one completed run (successful or not).
    pub fn after_run(&self, now_ms: i64) -> Timer {
        Timer {
            run_count: self.run_count.saturating_add(1),
            next_trigger_time: now_ms.saturating_add(self.interval_ms()),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshKind {
    /// Fired by the tab's alarm.
    Auto,
    /// Requested through `refreshOnce`.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshStatus {
    Success,
    Failed,
}

/// One entry of the append-only refresh audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRecord {
    pub id: String,
    pub task_id: TabId,
    pub task_title: String,
    pub task_url: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: RefreshKind,
    pub status: RefreshStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// A refresh record before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefreshRecord {
    pub task_id: TabId,
    pub task_title: String,
    pub task_url: String,
    pub kind: RefreshKind,
    pub status: RefreshStatus,
    pub error_message: Option<String>,
}

impl NewRefreshRecord {
    pub fn success(kind: RefreshKind, task_id: TabId, title: &str, url: &str) -> Self {
        Self {
            task_id,
            task_title: title.to_string(),
            task_url: url.to_string(),
            kind,
            status: RefreshStatus::Success,
            error_message: None,
        }
    }

    pub fn failed(kind: RefreshKind, task_id: TabId, title: &str, url: &str, error: &str) -> Self {
        Self {
            status: RefreshStatus::Failed,
            error_message: Some(error.to_string()),
            ..Self::success(kind, task_id, title, url)
        }
    }

    pub fn into_record(self, id: String, timestamp: i64) -> RefreshRecord {
        RefreshRecord {
            id,
            task_id: self.task_id,
            task_title: self.task_title,
            task_url: self.task_url,
            timestamp,
            kind: self.kind,
            status: self.status,
            error_message: self.error_message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHistory {
    pub total_runs: u64,
    /// Epoch milliseconds of the latest successful reload.
    pub last_refresh_time: i64,
}

/// Aggregate refresh counters (`timerStats` document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerStats {
    pub total_refresh_count: u64,
    pub today_refresh_count: u64,
    /// `YYYY-MM-DD` of the day `today_refresh_count` belongs to.
    pub last_reset_date: String,
    #[serde(default)]
    pub daily_history: BTreeMap<String, u64>,
    /// Keyed by tab id; JSON object keys are the decimal ids.
    #[serde(default)]
    pub task_history: BTreeMap<TabId, TaskHistory>,
}

impl TimerStats {
    pub fn new(today: &str) -> Self {
        Self {
            total_refresh_count: 0,
            today_refresh_count: 0,
            last_reset_date: today.to_string(),
            daily_history: BTreeMap::new(),
            task_history: BTreeMap::new(),
        }
    }

    /// Zero today's counter when the calendar day moved on. Returns true if it did.
    pub fn roll_over(&mut self, today: &str) -> bool {
        if self.last_reset_date == today {
            return false;
        }
        self.today_refresh_count = 0;
        self.last_reset_date = today.to_string();
        true
    }

    pub fn record(&mut self, tab_id: TabId, today: &str, now_ms: i64) {
        self.roll_over(today);
        self.total_refresh_count += 1;
        self.today_refresh_count += 1;
        *self.daily_history.entry(today.to_string()).or_insert(0) += 1;
        let task = self.task_history.entry(tab_id).or_default();
        task.total_runs += 1;
        task.last_refresh_time = now_ms;
    }
}

/// Region hint forwarded to the e-mail endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailRegion {
    #[default]
    Cn,
    Global,
}

/// The events a user can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationClass {
    /// First completed run of a timer.
    Start,
    /// Timer reached its run cap and was removed.
    MaxRuns,
    /// Successful `refreshOnce`.
    ManualOnce,
}

/// User notification preferences (`notificationSettings` document).
///
/// Owned by the settings UI; the scheduler only reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub enable_browser: bool,
    pub enable_email: bool,
    pub email: String,
    pub email_region: EmailRegion,
    pub rule_on_start_time_enabled: bool,
    pub rule_on_max_runs_enabled: bool,
    pub rule_on_manual_once_enabled: bool,
}

impl NotificationSettings {
    fn rule_enabled(&self, class: NotificationClass) -> bool {
        match class {
            NotificationClass::Start => self.rule_on_start_time_enabled,
            NotificationClass::MaxRuns => self.rule_on_max_runs_enabled,
            NotificationClass::ManualOnce => self.rule_on_manual_once_enabled,
        }
    }

    pub fn browser_enabled_for(&self, class: NotificationClass) -> bool {
        self.enable_browser && self.rule_enabled(class)
    }

    /// Recipient address when an e-mail should go out for `class`.
    pub fn email_recipient_for(&self, class: NotificationClass) -> Option<&str> {
        (self.enable_email && self.rule_enabled(class) && !self.email.is_empty())
            .then_some(self.email.as_str())
    }
}

/// General application settings (`appSettings` document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Re-register alarms for stored timers when the daemon starts.
    pub restore_on_startup: bool,
    /// Upper bound on concurrently scheduled timers. 0 = unlimited.
    pub max_tasks: u32,
    /// Refresh history retention in days. 0 = keep forever.
    pub history_retention_days: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            restore_on_startup: true,
            max_tasks: 20,
            history_retention_days: 30,
        }
    }
}
