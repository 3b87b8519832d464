use async_trait::async_trait;
use autorefresh_core::TabId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the tab host knows about a live tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub icon: String,
}

/// A reload that the host could not carry out. Holds the host's error text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ReloadError(pub String);

/// Host of the refreshable tabs.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// `None` when the tab no longer exists.
    async fn get(&self, tab_id: TabId) -> Option<TabInfo>;

    async fn reload(&self, tab_id: TabId) -> Result<(), ReloadError>;
}
