use std::sync::Arc;

use autorefresh_core::{
    AppSettings, Clock, NewRefreshRecord, NotificationSettings, RefreshRecord, TabId, Timer,
    TimerStats,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::{
    error::Result,
    kv::{KeyValueStore, StoreChange},
};

/// Refresh history is capped; the oldest records are evicted first.
pub const MAX_HISTORY_RECORDS: usize = 1000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const EXPORT_VERSION: &str = "1.0";

/// Document keys. Shared with the browser extension store layout.
pub mod keys {
    pub const TIMERS: &str = "timers";
    pub const STATS: &str = "timerStats";
    pub const HISTORY: &str = "refreshHistory";
    pub const APP_SETTINGS: &str = "appSettings";
    pub const NOTIFICATION_SETTINGS: &str = "notificationSettings";
}

/// Snapshot produced by [`TimerStore::export_all_data`] for backups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub version: String,
    /// RFC 3339.
    pub export_time: String,
    pub timers: Vec<Timer>,
    pub stats: TimerStats,
    pub history: Vec<RefreshRecord>,
    pub settings: AppSettings,
}

/// Typed CRUD over the timer list, statistics, refresh history and settings.
///
/// Has no scheduling knowledge. Every read treats an absent document as the
/// default value; every write is a full overwrite of its document.
pub struct TimerStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl TimerStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Change notifications of the underlying key-value store.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.kv.subscribe()
    }

    // --- timers ------------------------------------------------------------

    pub fn get_timers(&self) -> Result<Vec<Timer>> {
        Ok(self.read(keys::TIMERS)?.unwrap_or_default())
    }

    #[instrument(skip(self, timers), fields(count = timers.len()))]
    pub fn save_timers(&self, timers: &[Timer]) -> Result<()> {
        self.write(keys::TIMERS, &timers)?;
        debug!("timers saved");
        Ok(())
    }

    // --- stats -------------------------------------------------------------

    /// Current statistics. Today's counter is zeroed lazily when the date changed.
    pub fn get_stats(&self) -> Result<TimerStats> {
        let today = self.clock.today();
        let mut stats = self
            .read::<TimerStats>(keys::STATS)?
            .unwrap_or_else(|| TimerStats::new(&today));
        stats.roll_over(&today);
        Ok(stats)
    }

    pub fn save_stats(&self, stats: &TimerStats) -> Result<()> {
        self.write(keys::STATS, stats)
    }

    /// Count one successful reload of `tab_id` in every counter.
    #[instrument(skip(self))]
    pub fn record_refresh(&self, tab_id: TabId) -> Result<()> {
        let mut stats = self.get_stats()?;
        stats.record(tab_id, &self.clock.today(), self.clock.now_ms());
        self.save_stats(&stats)
    }

    pub fn reset_stats(&self) -> Result<()> {
        self.save_stats(&TimerStats::new(&self.clock.today()))?;
        info!("statistics reset");
        Ok(())
    }

    // --- history -----------------------------------------------------------

    /// Stamp `record` with a fresh id and the current time and prepend it.
    #[instrument(skip(self, record), fields(tab_id = record.task_id, status = ?record.status))]
    pub fn add_refresh_record(&self, record: NewRefreshRecord) -> Result<RefreshRecord> {
        let mut history = self.get_refresh_history(None)?;
        let record = record.into_record(Uuid::now_v7().to_string(), self.clock.now_ms());
        history.insert(0, record.clone());
        history.truncate(MAX_HISTORY_RECORDS);
        self.write(keys::HISTORY, &history)?;
        debug!(id = %record.id, "refresh record added");
        Ok(record)
    }

    /// History newest first, truncated to `limit` entries when `limit > 0`.
    pub fn get_refresh_history(&self, limit: Option<usize>) -> Result<Vec<RefreshRecord>> {
        let mut history: Vec<RefreshRecord> = self.read(keys::HISTORY)?.unwrap_or_default();
        // Stable: equal timestamps keep their stored (newest-first) order.
        history.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit.filter(|&n| n > 0) {
            history.truncate(limit);
        }
        Ok(history)
    }

    pub fn clear_refresh_history(&self) -> Result<()> {
        self.write(keys::HISTORY, &Vec::<RefreshRecord>::new())?;
        info!("refresh history cleared");
        Ok(())
    }

    /// Drop records older than the configured retention window.
    ///
    /// Returns the number of records removed. A retention of 0 days keeps
    /// everything.
    pub fn cleanup_old_history(&self) -> Result<usize> {
        let settings = self.get_app_settings()?;
        if settings.history_retention_days == 0 {
            return Ok(0);
        }

        let history = self.get_refresh_history(None)?;
        let cutoff = self.clock.now_ms() - i64::from(settings.history_retention_days) * DAY_MS;
        let before = history.len();
        let kept: Vec<RefreshRecord> = history
            .into_iter()
            .filter(|record| record.timestamp >= cutoff)
            .collect();

        let removed = before - kept.len();
        if removed > 0 {
            self.write(keys::HISTORY, &kept)?;
            info!(removed, "expired refresh history pruned");
        }
        Ok(removed)
    }

    // --- settings ----------------------------------------------------------

    pub fn get_app_settings(&self) -> Result<AppSettings> {
        Ok(self.read(keys::APP_SETTINGS)?.unwrap_or_default())
    }

    pub fn save_app_settings(&self, settings: &AppSettings) -> Result<()> {
        self.write(keys::APP_SETTINGS, settings)
    }

    pub fn get_notification_settings(&self) -> Result<NotificationSettings> {
        Ok(self.read(keys::NOTIFICATION_SETTINGS)?.unwrap_or_default())
    }

    pub fn save_notification_settings(&self, settings: &NotificationSettings) -> Result<()> {
        self.write(keys::NOTIFICATION_SETTINGS, settings)
    }

    // --- bulk --------------------------------------------------------------

    pub fn export_all_data(&self) -> Result<ExportData> {
        Ok(ExportData {
            version: EXPORT_VERSION.to_string(),
            export_time: self.clock.now().to_rfc3339(),
            timers: self.get_timers()?,
            stats: self.get_stats()?,
            history: self.get_refresh_history(None)?,
            settings: self.get_app_settings()?,
        })
    }

    // --- private helpers ---------------------------------------------------

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key)? {
            Some(value) if !value.is_null() => Ok(Some(serde_json::from_value(value)?)),
            _ => Ok(None),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.kv.set(key, &value)
    }
}
