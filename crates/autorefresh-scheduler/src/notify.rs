use async_trait::async_trait;
use autorefresh_core::{EmailRegion, NotificationClass, NotificationSettings, TabId, Timer};
use tracing::{debug, warn};

/// Title of every browser notification.
pub const NOTIFICATION_TITLE: &str = "AutoRefresh";

/// Title used when neither the tab nor the timer has one.
pub const UNKNOWN_PAGE: &str = "Unknown page";

/// E-mail templates understood by the mail relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailTemplate {
    TimerStart {
        title: String,
        tab_id: TabId,
    },
    MaxRunsReached {
        title: String,
        tab_id: TabId,
        max_runs: u32,
    },
    ManualRefresh {
        title: String,
        tab_id: TabId,
    },
}

impl EmailTemplate {
    /// Relay path for the template, appended to the API base URL.
    pub fn endpoint(&self) -> &'static str {
        match self {
            EmailTemplate::TimerStart { .. } => "/email/timer-start",
            EmailTemplate::MaxRunsReached { .. } => "/email/max-runs-reached",
            EmailTemplate::ManualRefresh { .. } => "/email/manual-refresh",
        }
    }

    pub fn title(&self) -> &str {
        match self {
            EmailTemplate::TimerStart { title, .. }
            | EmailTemplate::MaxRunsReached { title, .. }
            | EmailTemplate::ManualRefresh { title, .. } => title,
        }
    }

    pub fn tab_id(&self) -> TabId {
        match self {
            EmailTemplate::TimerStart { tab_id, .. }
            | EmailTemplate::MaxRunsReached { tab_id, .. }
            | EmailTemplate::ManualRefresh { tab_id, .. } => *tab_id,
        }
    }

    pub fn max_runs(&self) -> Option<u32> {
        match self {
            EmailTemplate::MaxRunsReached { max_runs, .. } => Some(*max_runs),
            _ => None,
        }
    }
}

/// Outbound notification channels. Failures never reach the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_browser(&self, title: &str, body: &str);

    /// Returns whether the e-mail was accepted.
    async fn notify_email(
        &self,
        recipient: &str,
        region: EmailRegion,
        template: &EmailTemplate,
    ) -> bool;
}

fn display_title(title: &str) -> &str {
    if title.is_empty() {
        UNKNOWN_PAGE
    } else {
        title
    }
}

fn browser_body(class: NotificationClass, title: &str) -> String {
    match (class, title.is_empty()) {
        (NotificationClass::Start, false) => format!("Task started: {title}"),
        (NotificationClass::Start, true) => "Scheduled refresh started".to_string(),
        (NotificationClass::MaxRuns, false) => {
            format!("Task finished and stopped refreshing: {title}")
        }
        (NotificationClass::MaxRuns, true) => {
            "Scheduled refresh finished and stopped".to_string()
        }
        (NotificationClass::ManualOnce, false) => format!("Refreshed once manually: {title}"),
        (NotificationClass::ManualOnce, true) => {
            "Current page refreshed once manually".to_string()
        }
    }
}

fn template_for(class: NotificationClass, timer: &Timer) -> EmailTemplate {
    let title = display_title(&timer.title).to_string();
    let tab_id = timer.tab_id;
    match class {
        NotificationClass::Start => EmailTemplate::TimerStart { title, tab_id },
        NotificationClass::MaxRuns => EmailTemplate::MaxRunsReached {
            title,
            tab_id,
            max_runs: timer.max_runs.unwrap_or(timer.run_count),
        },
        NotificationClass::ManualOnce => EmailTemplate::ManualRefresh { title, tab_id },
    }
}

/// Send `class` for `timer` on every channel the settings enable.
pub async fn dispatch(
    notifier: &dyn Notifier,
    settings: &NotificationSettings,
    class: NotificationClass,
    timer: &Timer,
) {
    if settings.browser_enabled_for(class) {
        notifier
            .notify_browser(NOTIFICATION_TITLE, &browser_body(class, &timer.title))
            .await;
    }
    if let Some(recipient) = settings.email_recipient_for(class) {
        let template = template_for(class, timer);
        if notifier
            .notify_email(recipient, settings.email_region, &template)
            .await
        {
            debug!(tab_id = timer.tab_id, ?class, "email notification accepted");
        } else {
            warn!(tab_id = timer.tab_id, ?class, "email notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_fall_back_without_title() {
        assert_eq!(
            browser_body(NotificationClass::Start, "Inbox"),
            "Task started: Inbox"
        );
        assert_eq!(
            browser_body(NotificationClass::ManualOnce, ""),
            "Current page refreshed once manually"
        );
    }

    #[test]
    fn max_runs_template_carries_cap() {
        let mut timer = Timer::new(9, 60);
        timer.max_runs = Some(3);
        timer.run_count = 3;
        let template = template_for(NotificationClass::MaxRuns, &timer);
        assert_eq!(template.endpoint(), "/email/max-runs-reached");
        assert_eq!(template.title(), UNKNOWN_PAGE);
        assert_eq!(template.max_runs(), Some(3));
        assert_eq!(template.tab_id(), 9);
    }
}
