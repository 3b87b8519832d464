//! `autorefresh-scheduler`: alarm-driven tab refresh scheduling.
//!
//! # Overview
//!
//! Each active timer owns one alarm named `timer-<tabId>`. When it fires,
//! the [`TimerController`] reloads the tab, records the attempt, advances the
//! timer and re-arms the alarm, or removes the timer once `maxRuns` is hit.
//! UI surfaces drive the same controller through [`ControlMessage`]s.
//!
//! | Component          | Role                                                  |
//! |--------------------|-------------------------------------------------------|
//! | [`AlarmPlatform`]  | named one-shot / periodic wake-ups ([`TokioAlarms`])  |
//! | [`AlarmScheduler`] | keeps alarms in step with the timer list              |
//! | [`TimerController`]| alarm and message handlers                            |
//! | [`TabHost`]        | looks up and reloads tabs                             |
//! | [`Notifier`]       | browser and e-mail notifications                      |

pub mod alarm;
pub mod controller;
pub mod error;
pub mod message;
pub mod notify;
pub mod scheduler;
pub mod tabs;

pub use alarm::{alarm_name, parse_alarm_name, AlarmEvent, AlarmPlatform, AlarmSpec, TokioAlarms};
pub use controller::{AlarmOutcome, TimerController, MAX_INTERVAL_SECS};
pub use error::{Result, SchedulerError};
pub use message::{ControlMessage, ControlResponse, MessageError, RefreshRejection};
pub use notify::{dispatch, EmailTemplate, Notifier, NOTIFICATION_TITLE};
pub use scheduler::AlarmScheduler;
pub use tabs::{ReloadError, TabHost, TabInfo};
