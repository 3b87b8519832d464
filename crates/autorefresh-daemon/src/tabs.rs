use async_trait::async_trait;
use autorefresh_core::{config::TabSeed, TabId};
use autorefresh_scheduler::{ReloadError, TabHost, TabInfo};
use dashmap::DashMap;
use tracing::{debug, info};

/// Tab host for pages reachable over HTTP.
///
/// A tab is a registered URL; reloading it fetches the URL. Tabs come from
/// `[[tabs]]` in the config and from `POST /tabs`.
pub struct HttpTabHost {
    tabs: DashMap<TabId, TabInfo>,
    client: reqwest::Client,
}

impl HttpTabHost {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            tabs: DashMap::new(),
            client,
        }
    }

    pub fn from_seeds(seeds: &[TabSeed], client: reqwest::Client) -> Self {
        let host = Self::new(client);
        for seed in seeds {
            host.open(TabInfo {
                id: seed.id,
                title: seed.title.clone(),
                url: seed.url.clone(),
                icon: seed.icon.clone(),
            });
        }
        host
    }

    /// Register or replace a tab. Returns the tab it replaced.
    pub fn open(&self, tab: TabInfo) -> Option<TabInfo> {
        info!(tab_id = tab.id, url = %tab.url, "tab registered");
        self.tabs.insert(tab.id, tab)
    }

    pub fn close(&self, tab_id: TabId) -> Option<TabInfo> {
        let removed = self.tabs.remove(&tab_id).map(|(_, tab)| tab);
        if removed.is_some() {
            info!(tab_id, "tab closed");
        }
        removed
    }

    pub fn list(&self) -> Vec<TabInfo> {
        let mut tabs: Vec<TabInfo> = self.tabs.iter().map(|e| e.value().clone()).collect();
        tabs.sort_by_key(|t| t.id);
        tabs
    }

    pub fn count(&self) -> usize {
        self.tabs.len()
    }
}

#[async_trait]
impl TabHost for HttpTabHost {
    async fn get(&self, tab_id: TabId) -> Option<TabInfo> {
        self.tabs.get(&tab_id).map(|tab| tab.value().clone())
    }

    async fn reload(&self, tab_id: TabId) -> Result<(), ReloadError> {
        let url = self
            .tabs
            .get(&tab_id)
            .map(|tab| tab.url.clone())
            .ok_or_else(|| ReloadError(format!("No tab with id: {tab_id}.")))?;

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ReloadError(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ReloadError(format!("HTTP {status} from {url}")));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ReloadError(e.to_string()))?;
        debug!(tab_id, %status, bytes = bytes.len(), "tab reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::get, Router};

    use super::*;

    async fn spawn_site() -> String {
        let app = Router::new()
            .route("/ok", get(|| async { "fresh content" }))
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn tab(id: TabId, url: String) -> TabInfo {
        TabInfo {
            id,
            title: format!("Tab {id}"),
            url,
            icon: String::new(),
        }
    }

    #[tokio::test]
    async fn reload_fetches_registered_url() {
        let base = spawn_site().await;
        let host = HttpTabHost::new(reqwest::Client::new());
        host.open(tab(1, format!("{base}/ok")));
        host.open(tab(2, format!("{base}/gone")));

        assert!(host.reload(1).await.is_ok());
        let err = host.reload(2).await.unwrap_err();
        assert!(err.0.contains("404"), "{err}");
        let err = host.reload(3).await.unwrap_err();
        assert_eq!(err.0, "No tab with id: 3.");
    }

    #[tokio::test]
    async fn seeds_and_close() {
        let host = HttpTabHost::from_seeds(
            &[TabSeed {
                id: 5,
                title: "Status".into(),
                url: "http://127.0.0.1:9/status".into(),
                icon: String::new(),
            }],
            reqwest::Client::new(),
        );
        assert_eq!(host.get(5).await.unwrap().title, "Status");
        assert_eq!(host.list().len(), 1);
        assert!(host.close(5).is_some());
        assert!(host.get(5).await.is_none());
        assert!(host.close(5).is_none());
    }
}
