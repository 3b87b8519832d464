use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autorefresh_core::{config::EmailConfig, EmailRegion, TabId};
use autorefresh_scheduler::{EmailTemplate, Notifier};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::ws::EventBroadcaster;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail relay returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("mail relay rejected the message: {0}")]
    Rejected(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailRequest<'a> {
    to: &'a str,
    title: &'a str,
    tab_id: TabId,
    region: EmailRegion,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_runs: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmailReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the mail relay (`POST {base}/email/<template>`).
pub struct EmailClient {
    client: reqwest::Client,
    base_url: String,
}

impl EmailClient {
    pub fn new(config: &EmailConfig) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn send(
        &self,
        recipient: &str,
        region: EmailRegion,
        template: &EmailTemplate,
    ) -> Result<(), EmailError> {
        let url = format!("{}{}", self.base_url, template.endpoint());
        let body = EmailRequest {
            to: recipient,
            title: template.title(),
            tab_id: template.tab_id(),
            region,
            max_runs: template.max_runs(),
        };
        debug!(%url, tab_id = body.tab_id, "sending e-mail notification");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EmailError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: EmailReply = resp.json().await?;
        if reply.success {
            Ok(())
        } else {
            Err(EmailError::Rejected(reply.message.unwrap_or_default()))
        }
    }
}

/// E-mail waiting for delivery.
#[derive(Debug, Clone)]
pub struct EmailJob {
    pub recipient: String,
    pub region: EmailRegion,
    pub template: EmailTemplate,
}

/// Delivery task: sends queued e-mails one by one until the queue closes.
pub async fn run_email_delivery(mut rx: mpsc::Receiver<EmailJob>, client: EmailClient) {
    info!("e-mail delivery started");
    while let Some(job) = rx.recv().await {
        let tab_id = job.template.tab_id();
        match client.send(&job.recipient, job.region, &job.template).await {
            Ok(()) => info!(tab_id, endpoint = job.template.endpoint(), "e-mail sent"),
            Err(e) => warn!(tab_id, endpoint = job.template.endpoint(), error = %e, "e-mail failed"),
        }
    }
    info!("e-mail delivery stopped");
}

/// [`Notifier`] of the daemon.
///
/// Browser notifications go out as `notification` events on `/events`.
/// E-mails are queued for the delivery task so the scheduler never waits
/// on the relay; `notify_email` reports whether the job was queued.
pub struct DaemonNotifier {
    events: Arc<EventBroadcaster>,
    email_tx: mpsc::Sender<EmailJob>,
}

impl DaemonNotifier {
    pub fn new(events: Arc<EventBroadcaster>, email_tx: mpsc::Sender<EmailJob>) -> Self {
        Self { events, email_tx }
    }
}

#[async_trait]
impl Notifier for DaemonNotifier {
    async fn notify_browser(&self, title: &str, body: &str) {
        self.events
            .send("notification", json!({ "title": title, "body": body }));
    }

    async fn notify_email(
        &self,
        recipient: &str,
        region: EmailRegion,
        template: &EmailTemplate,
    ) -> bool {
        let job = EmailJob {
            recipient: recipient.to_string(),
            region,
            template: template.clone(),
        };
        match self.email_tx.try_send(job) {
            Ok(()) => true,
            Err(e) => {
                warn!(tab_id = template.tab_id(), error = %e, "e-mail queue unavailable");
                false
            }
        }
    }
}
