//! `autorefresh-core`: domain types shared by every autorefresh crate.
//!
//! The persisted document shapes (timers, stats, history, settings) use the
//! camelCase field names of the browser extension store so exported data and
//! existing stores stay interchangeable.

pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AutoRefreshError, Result};
pub use types::{
    AppSettings, EmailRegion, NewRefreshRecord, NotificationClass, NotificationSettings,
    RefreshKind, RefreshRecord, RefreshStatus, TabId, TaskHistory, Timer, TimerStats,
};
