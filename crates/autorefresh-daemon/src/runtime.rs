use std::time::Duration;

use autorefresh_scheduler::{AlarmEvent, ControlResponse, TimerController};
use autorefresh_store::StoreError;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("scheduler runtime is not running")]
    Closed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Work handed to the event loop by HTTP handlers.
pub enum Command {
    Message {
        value: Value,
        reply: oneshot::Sender<ControlResponse>,
    },
    ResetStats {
        reply: oneshot::Sender<autorefresh_store::Result<()>>,
    },
    ClearHistory {
        reply: oneshot::Sender<autorefresh_store::Result<()>>,
    },
}

/// Cloneable sender side of the event loop.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
}

pub fn channel(capacity: usize) -> (RuntimeHandle, mpsc::Receiver<Command>) {
    let (tx, rx) = mpsc::channel(capacity);
    (RuntimeHandle { tx }, rx)
}

impl RuntimeHandle {
    /// Run a raw control message and wait for its reply.
    pub async fn message(&self, value: Value) -> Result<ControlResponse, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Message { value, reply })
            .await
            .map_err(|_| RuntimeError::Closed)?;
        rx.await.map_err(|_| RuntimeError::Closed)
    }

    pub async fn reset_stats(&self) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ResetStats { reply })
            .await
            .map_err(|_| RuntimeError::Closed)?;
        Ok(rx.await.map_err(|_| RuntimeError::Closed)??)
    }

    pub async fn clear_history(&self) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::ClearHistory { reply })
            .await
            .map_err(|_| RuntimeError::Closed)?;
        Ok(rx.await.map_err(|_| RuntimeError::Closed)??)
    }
}

/// Single writer of scheduler state.
///
/// Alarm firings, control messages and history cleanup are handled one at a
/// time, each to completion, so read-modify-write cycles on the timer list
/// never interleave.
pub struct EventLoop {
    controller: TimerController,
    commands: mpsc::Receiver<Command>,
    alarms: mpsc::Receiver<AlarmEvent>,
    cleanup_every: Duration,
}

impl EventLoop {
    pub fn new(
        controller: TimerController,
        commands: mpsc::Receiver<Command>,
        alarms: mpsc::Receiver<AlarmEvent>,
        cleanup_every: Duration,
    ) -> Self {
        Self {
            controller,
            commands,
            alarms,
            cleanup_every,
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("scheduler runtime started");
        let mut cleanup = tokio::time::interval(self.cleanup_every);
        cleanup.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                Some(event) = self.alarms.recv() => {
                    for name in self.coalesce(event) {
                        let outcome = self.controller.handle_alarm(&name).await;
                        debug!(alarm = %name, ?outcome, "alarm handled");
                    }
                }
                Some(command) = self.commands.recv() => self.execute(command).await,
                _ = cleanup.tick() => {
                    self.controller.cleanup_history();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler runtime shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Drain firings queued while the loop was busy, keeping one per alarm.
    fn coalesce(&mut self, first: AlarmEvent) -> Vec<String> {
        let mut names = vec![first.name];
        let mut dropped = 0usize;
        while let Ok(event) = self.alarms.try_recv() {
            if names.contains(&event.name) {
                dropped += 1;
            } else {
                names.push(event.name);
            }
        }
        if dropped > 0 {
            debug!(dropped, "coalesced missed alarm firings");
        }
        names
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Message { value, reply } => {
                let response = self.controller.handle_value(value).await;
                // Caller may have gone away.
                let _ = reply.send(response);
            }
            Command::ResetStats { reply } => {
                let _ = reply.send(self.controller.store().reset_stats());
            }
            Command::ClearHistory { reply } => {
                let _ = reply.send(self.controller.store().clear_refresh_history());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use autorefresh_core::{EmailRegion, SystemClock, TabId, Timer};
    use autorefresh_scheduler::{
        AlarmScheduler, EmailTemplate, Notifier, ReloadError, TabHost, TabInfo, TokioAlarms,
    };
    use autorefresh_store::{SqliteKv, TimerStore};
    use serde_json::json;

    use super::*;

    struct StaticTabs;

    #[async_trait]
    impl TabHost for StaticTabs {
        async fn get(&self, tab_id: TabId) -> Option<TabInfo> {
            Some(TabInfo {
                id: tab_id,
                title: "Static".into(),
                url: "about:blank".into(),
                icon: String::new(),
            })
        }
        async fn reload(&self, _tab_id: TabId) -> Result<(), ReloadError> {
            Ok(())
        }
    }

    struct Silent;

    #[async_trait]
    impl Notifier for Silent {
        async fn notify_browser(&self, _title: &str, _body: &str) {}
        async fn notify_email(&self, _: &str, _: EmailRegion, _: &EmailTemplate) -> bool {
            true
        }
    }

    fn start() -> (
        RuntimeHandle,
        Arc<TimerStore>,
        watch::Sender<bool>,
        tokio::task::JoinHandle<()>,
    ) {
        let clock = Arc::new(SystemClock);
        let store = Arc::new(TimerStore::new(
            Arc::new(SqliteKv::open_in_memory().unwrap()),
            clock.clone(),
        ));
        let (alarms, alarm_rx) = TokioAlarms::channel(16);
        let scheduler = AlarmScheduler::new(Arc::new(alarms), clock);
        let controller =
            TimerController::new(store.clone(), scheduler, Arc::new(StaticTabs), Arc::new(Silent));
        let (handle, commands) = channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(
            EventLoop::new(controller, commands, alarm_rx, Duration::from_secs(3600))
                .run(shutdown_rx),
        );
        (handle, store, shutdown_tx, task)
    }

    #[tokio::test(start_paused = true)]
    async fn alarms_and_messages_flow_through_the_loop() {
        let (handle, store, shutdown, task) = start();

        let reply = handle
            .message(json!({"type": "addTimer", "timer": {"tabId": 1, "interval": 60, "maxRuns": 2}}))
            .await
            .unwrap();
        assert!(reply.success);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.get_timers().unwrap()[0].run_count, 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(store.get_timers().unwrap().is_empty());
        assert_eq!(store.get_stats().unwrap().total_refresh_count, 2);

        handle.clear_history().await.unwrap();
        assert!(store.get_refresh_history(None).unwrap().is_empty());

        shutdown.send(true).unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.message(json!({"type": "pauseAllTimers"})).await,
            Err(RuntimeError::Closed)
        ));
    }

    #[tokio::test]
    async fn missed_firings_of_one_alarm_run_once() {
        let store = Arc::new(TimerStore::new(
            Arc::new(SqliteKv::open_in_memory().unwrap()),
            Arc::new(SystemClock),
        ));
        let mut timers = vec![Timer::new(1, 60), Timer::new(2, 60)];
        timers[0].max_runs = Some(10);
        store.save_timers(&timers).unwrap();

        let (alarms, alarm_rx) = TokioAlarms::channel(16);
        let (tx, rx) = mpsc::channel(16);
        for name in ["timer-1", "timer-1", "timer-2", "timer-1"] {
            tx.send(AlarmEvent { name: name.into() }).await.unwrap();
        }
        drop(alarm_rx);

        let scheduler = AlarmScheduler::new(Arc::new(alarms), Arc::new(SystemClock));
        let controller =
            TimerController::new(store.clone(), scheduler, Arc::new(StaticTabs), Arc::new(Silent));
        let (_handle, commands) = channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(
            EventLoop::new(controller, commands, rx, Duration::from_secs(3600)).run(shutdown_rx),
        );

        while store.get_stats().unwrap().total_refresh_count < 2 {
            tokio::task::yield_now().await;
        }
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let timers = store.get_timers().unwrap();
        assert_eq!(timers[0].run_count, 1);
        assert_eq!(timers[1].run_count, 1);
        assert_eq!(store.get_stats().unwrap().total_refresh_count, 2);
    }

    #[tokio::test]
    async fn unknown_message_gets_reply() {
        let (handle, _store, _shutdown, _task) = start();
        let reply = handle.message(json!({"type": "nope"})).await.unwrap();
        assert_eq!(reply, ControlResponse::unknown());
    }
}
