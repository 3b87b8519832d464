use std::sync::Arc;

use autorefresh_core::{
    NewRefreshRecord, NotificationClass, NotificationSettings, RefreshKind, TabId, Timer,
};
use autorefresh_store::TimerStore;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    alarm::parse_alarm_name,
    error::{Result, SchedulerError},
    message::{
        ControlMessage, ControlResponse, MessageError, RefreshRejection, INVALID_TIMER_MSG,
        STORAGE_UNAVAILABLE_MSG,
    },
    notify::{dispatch, Notifier, UNKNOWN_PAGE},
    scheduler::AlarmScheduler,
    tabs::{ReloadError, TabHost, TabInfo},
};

/// Largest interval whose millisecond value fits a timestamp.
pub const MAX_INTERVAL_SECS: u64 = (i64::MAX / 1000) as u64;

/// What an alarm firing led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmOutcome {
    /// Not a `timer-<id>` alarm.
    Ignored,
    /// No stored timer for the tab.
    NotFound,
    Paused,
    /// The timer was already at its cap and has been removed.
    Completed,
    /// The tab is gone; the timer has been removed.
    TabClosed,
    /// A reload was attempted. `stopped` when it used up the last run.
    Refreshed { success: bool, stopped: bool },
    StoreUnavailable,
}

/// Reacts to alarm firings and control messages.
///
/// Every handler re-reads the timer list from the store, mutates it and
/// writes the full list back. Callers must run handlers one at a time.
pub struct TimerController {
    store: Arc<TimerStore>,
    scheduler: AlarmScheduler,
    tabs: Arc<dyn TabHost>,
    notifier: Arc<dyn Notifier>,
}

impl TimerController {
    pub fn new(
        store: Arc<TimerStore>,
        scheduler: AlarmScheduler,
        tabs: Arc<dyn TabHost>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            scheduler,
            tabs,
            notifier,
        }
    }

    pub fn store(&self) -> &Arc<TimerStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &AlarmScheduler {
        &self.scheduler
    }

    /// Load the stored timers into the scheduler and re-arm their alarms
    /// unless `restoreOnStartup` is off. Returns the number of timers.
    pub fn restore(&mut self) -> Result<usize> {
        let timers = self.store.get_timers()?;
        let settings = self.store.get_app_settings()?;
        self.scheduler.restore(&timers, settings.restore_on_startup);
        Ok(timers.len())
    }

    /// Drop history older than the configured retention.
    pub fn cleanup_history(&self) -> usize {
        match self.store.cleanup_old_history() {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "history cleanup failed");
                0
            }
        }
    }

    // ── Alarms ───────────────────────────────────────────────────────────────

    #[instrument(skip(self))]
    pub async fn handle_alarm(&mut self, name: &str) -> AlarmOutcome {
        let Some(tab_id) = parse_alarm_name(name) else {
            debug!("ignoring foreign alarm");
            return AlarmOutcome::Ignored;
        };

        let timers = match self.store.get_timers() {
            Ok(timers) => timers,
            Err(e) => {
                error!(tab_id, error = %e, "cannot read timers for alarm");
                return AlarmOutcome::StoreUnavailable;
            }
        };
        let Some(timer) = timers.iter().find(|t| t.tab_id == tab_id).cloned() else {
            warn!(tab_id, "alarm fired for unknown timer");
            return AlarmOutcome::NotFound;
        };
        if timer.paused {
            debug!(tab_id, "timer paused, skipping");
            return AlarmOutcome::Paused;
        }

        let settings = self.notification_settings();
        if timer.is_exhausted() {
            self.complete(&timers, &timer, &settings).await;
            return AlarmOutcome::Completed;
        }

        let Some(tab) = self.tabs.get(tab_id).await else {
            warn!(tab_id, "tab no longer exists, removing timer");
            let remaining = without(&timers, tab_id);
            self.scheduler.clear(tab_id);
            self.persist(&remaining);
            self.scheduler.handle_remove_timer(&remaining);
            return AlarmOutcome::TabClosed;
        };

        let success = self
            .reload_and_record(&timer, Some(&tab), RefreshKind::Auto)
            .await
            .is_ok();

        let updated = timer.after_run(self.store.clock().now_ms());
        if timer.run_count == 0 {
            dispatch(
                self.notifier.as_ref(),
                &settings,
                NotificationClass::Start,
                &updated,
            )
            .await;
        }

        let timers = replaced(&timers, &updated);
        if updated.is_exhausted() {
            self.complete(&timers, &updated, &settings).await;
            return AlarmOutcome::Refreshed {
                success,
                stopped: true,
            };
        }

        self.persist(&timers);
        self.scheduler.update(&updated);
        self.scheduler.rearm(&updated);
        info!(
            tab_id,
            run_count = updated.run_count,
            next_trigger_time = updated.next_trigger_time,
            success,
            "timer fired"
        );
        AlarmOutcome::Refreshed {
            success,
            stopped: false,
        }
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    /// Decode and handle a raw control message.
    pub async fn handle_value(&mut self, value: Value) -> ControlResponse {
        match ControlMessage::from_value(value) {
            Ok(message) => self.handle_message(message).await,
            Err(MessageError::UnknownType(kind)) => {
                warn!(?kind, "unknown message type");
                ControlResponse::unknown()
            }
            Err(MessageError::Invalid { kind, reason }) => {
                warn!(%kind, %reason, "malformed message");
                if kind == "addTimer" {
                    ControlResponse::failure(INVALID_TIMER_MSG)
                } else {
                    ControlResponse::failure(format!("invalid {kind} message: {reason}"))
                }
            }
        }
    }

    #[instrument(skip(self, message), fields(kind = message.kind()))]
    pub async fn handle_message(&mut self, message: ControlMessage) -> ControlResponse {
        let result = match message {
            ControlMessage::AddTimer { timer } => self.add_timer(timer),
            ControlMessage::RemoveTimer { tab_id } => self.remove_timer(tab_id),
            ControlMessage::RefreshOnce { tab_id } => self.refresh_once(tab_id).await,
            ControlMessage::TogglePauseTimer { tab_id } => self.toggle_pause(tab_id),
            ControlMessage::PauseAllTimers => self.pause_all(),
            ControlMessage::ResumeAllTimers => self.resume_all(),
        };
        match result {
            Ok(response) => response,
            Err(SchedulerError::Store(e)) => {
                error!(error = %e, "store read failed");
                ControlResponse::failure(STORAGE_UNAVAILABLE_MSG)
            }
            Err(SchedulerError::InvalidTimer(reason)) => {
                warn!(%reason, "rejected timer");
                ControlResponse::failure(INVALID_TIMER_MSG)
            }
            Err(e) => {
                warn!(error = %e, "message rejected");
                ControlResponse::failure(e.to_string())
            }
        }
    }

    /// Create or replace the timer for its tab.
    pub fn add_timer(&mut self, timer: Option<Timer>) -> Result<ControlResponse> {
        let timer = timer.ok_or_else(|| SchedulerError::InvalidTimer("missing timer".into()))?;
        if timer.interval == 0 {
            return Err(SchedulerError::InvalidTimer(
                "interval must be greater than 0".into(),
            ));
        }
        if timer.interval > MAX_INTERVAL_SECS {
            return Err(SchedulerError::InvalidTimer(format!(
                "interval must be at most {MAX_INTERVAL_SECS} seconds"
            )));
        }

        let mut timers = without(&self.store.get_timers()?, timer.tab_id);
        let settings = self.store.get_app_settings()?;
        let max = settings.max_tasks as usize;
        if max > 0 && timers.len() >= max {
            return Err(SchedulerError::LimitExceeded(format!(
                "at most {max} timers may run at once"
            )));
        }

        info!(
            tab_id = timer.tab_id,
            interval = timer.interval,
            max_runs = ?timer.max_runs,
            "timer added"
        );
        timers.push(timer);
        self.persist(&timers);
        self.scheduler.handle_add_timer(&timers);
        Ok(ControlResponse::ok())
    }

    pub fn remove_timer(&mut self, tab_id: TabId) -> Result<ControlResponse> {
        let timers = self.store.get_timers()?;
        if !timers.iter().any(|t| t.tab_id == tab_id) {
            debug!(tab_id, "remove for unknown timer");
        }
        let remaining = without(&timers, tab_id);
        self.scheduler.clear(tab_id);
        self.persist(&remaining);
        self.scheduler.handle_remove_timer(&remaining);
        info!(tab_id, "timer removed");
        Ok(ControlResponse::ok())
    }

    /// Reload a timer's tab right now, counting it as a manual run.
    pub async fn refresh_once(&mut self, tab_id: TabId) -> Result<ControlResponse> {
        let timers = self.store.get_timers()?;
        let Some(timer) = timers.iter().find(|t| t.tab_id == tab_id).cloned() else {
            warn!(tab_id, "refreshOnce for unknown timer");
            return Ok(ControlResponse::rejected(RefreshRejection::NotFound));
        };
        if timer.is_exhausted() {
            return Ok(ControlResponse::rejected(RefreshRejection::MaxRunsReached));
        }

        let tab = self.tabs.get(tab_id).await;
        if self
            .reload_and_record(&timer, tab.as_ref(), RefreshKind::Manual)
            .await
            .is_err()
        {
            return Ok(ControlResponse::failed());
        }

        let updated = Timer {
            run_count: timer.run_count.saturating_add(1),
            ..timer.clone()
        };
        let stopped = updated.is_exhausted();
        if stopped {
            let remaining = without(&timers, tab_id);
            self.scheduler.clear(tab_id);
            self.persist(&remaining);
            self.scheduler.handle_remove_timer(&remaining);
            info!(tab_id, run_count = updated.run_count, "timer reached max runs");
        } else {
            self.persist(&replaced(&timers, &updated));
            self.scheduler.update(&updated);
        }

        let settings = self.notification_settings();
        dispatch(
            self.notifier.as_ref(),
            &settings,
            NotificationClass::ManualOnce,
            &updated,
        )
        .await;
        Ok(ControlResponse::refreshed(stopped))
    }

    pub fn toggle_pause(&mut self, tab_id: TabId) -> Result<ControlResponse> {
        let timers = self.store.get_timers()?;
        let Some(timer) = timers.iter().find(|t| t.tab_id == tab_id) else {
            warn!(tab_id, "toggle for unknown timer");
            return Ok(ControlResponse::toggled(None));
        };

        let now = self.store.clock().now_ms();
        let updated = if timer.paused {
            self.resume_one(timer, now)
        } else {
            self.pause_one(timer, now)
        };
        self.persist(&replaced(&timers, &updated));
        self.scheduler.update(&updated);
        Ok(ControlResponse::toggled(Some(updated.paused)))
    }

    pub fn pause_all(&mut self) -> Result<ControlResponse> {
        let now = self.store.clock().now_ms();
        let timers: Vec<Timer> = self
            .store
            .get_timers()?
            .iter()
            .map(|t| if t.paused { t.clone() } else { self.pause_one(t, now) })
            .collect();
        self.persist(&timers);
        self.scheduler.sync(&timers);
        info!(timers = timers.len(), "all timers paused");
        Ok(ControlResponse::ok())
    }

    pub fn resume_all(&mut self) -> Result<ControlResponse> {
        let now = self.store.clock().now_ms();
        let timers: Vec<Timer> = self
            .store
            .get_timers()?
            .iter()
            .map(|t| if t.paused { self.resume_one(t, now) } else { t.clone() })
            .collect();
        self.persist(&timers);
        self.scheduler.sync(&timers);
        info!(timers = timers.len(), "all timers resumed");
        Ok(ControlResponse::ok())
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn pause_one(&self, timer: &Timer, now_ms: i64) -> Timer {
        self.scheduler.clear(timer.tab_id);
        let paused = timer.paused_at(now_ms);
        info!(tab_id = timer.tab_id, remaining = paused.remaining, "timer paused");
        paused
    }

    fn resume_one(&self, timer: &Timer, now_ms: i64) -> Timer {
        let delay = timer.resume_delay_ms();
        self.scheduler.resume(timer, delay);
        info!(tab_id = timer.tab_id, delay_ms = delay, "timer resumed");
        timer.resumed_at(now_ms)
    }

    /// Remove a timer that used up its runs and announce it.
    async fn complete(&mut self, timers: &[Timer], timer: &Timer, settings: &NotificationSettings) {
        let remaining = without(timers, timer.tab_id);
        self.scheduler.clear(timer.tab_id);
        self.persist(&remaining);
        self.scheduler.handle_remove_timer(&remaining);
        info!(
            tab_id = timer.tab_id,
            run_count = timer.run_count,
            "timer reached max runs"
        );
        dispatch(
            self.notifier.as_ref(),
            settings,
            NotificationClass::MaxRuns,
            timer,
        )
        .await;
    }

    /// Reload the tab and log the attempt in stats and history.
    async fn reload_and_record(
        &self,
        timer: &Timer,
        tab: Option<&TabInfo>,
        kind: RefreshKind,
    ) -> std::result::Result<(), ReloadError> {
        let title = tab
            .map(|t| t.title.as_str())
            .filter(|t| !t.is_empty())
            .or_else(|| Some(timer.title.as_str()).filter(|t| !t.is_empty()))
            .unwrap_or(UNKNOWN_PAGE);
        let url = tab.map(|t| t.url.as_str()).unwrap_or_default();

        match self.tabs.reload(timer.tab_id).await {
            Ok(()) => {
                if let Err(e) = self.store.record_refresh(timer.tab_id) {
                    warn!(tab_id = timer.tab_id, error = %e, "failed to update stats");
                }
                self.record(NewRefreshRecord::success(kind, timer.tab_id, title, url));
                Ok(())
            }
            Err(e) => {
                error!(tab_id = timer.tab_id, ?kind, error = %e, "tab reload failed");
                self.record(NewRefreshRecord::failed(
                    kind,
                    timer.tab_id,
                    title,
                    url,
                    &e.to_string(),
                ));
                Err(e)
            }
        }
    }

    fn record(&self, record: NewRefreshRecord) {
        if let Err(e) = self.store.add_refresh_record(record) {
            warn!(error = %e, "failed to append refresh history");
        }
    }

    fn persist(&self, timers: &[Timer]) {
        if let Err(e) = self.store.save_timers(timers) {
            warn!(error = %e, "failed to save timers");
        }
    }

    fn notification_settings(&self) -> NotificationSettings {
        self.store.get_notification_settings().unwrap_or_else(|e| {
            warn!(error = %e, "notification settings unreadable, notifications off");
            NotificationSettings::default()
        })
    }
}

fn without(timers: &[Timer], tab_id: TabId) -> Vec<Timer> {
    timers.iter().filter(|t| t.tab_id != tab_id).cloned().collect()
}

fn replaced(timers: &[Timer], timer: &Timer) -> Vec<Timer> {
    timers
        .iter()
        .map(|t| {
            if t.tab_id == timer.tab_id {
                timer.clone()
            } else {
                t.clone()
            }
        })
        .collect()
}
