use crate::http::{HttpClient, HttpRequest};
use crate::ice::IceConfig;
use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

const ICE_CONFIG_PATH: &str = "/api/config/ice";

/// Where and how often the ICE configuration is fetched.
#[derive(Debug, Clone)]
pub struct IceFetchConfig {
    /// Base URL of the API, without a trailing slash.
    pub api_url: String,
    pub attempts: u32,
    pub retry_delay: Duration,
    pub token: Option<String>,
}

impl IceFetchConfig {
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            api_url: api_url.into(),
            attempts: 5,
            retry_delay: Duration::from_millis(1500),
            token,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), ICE_CONFIG_PATH)
    }
}

/// Holds the ICE configuration shared by every call of this app run.
///
/// The first [`IceConfigService::get`] fetches it with bounded retries and
/// falls back to the public STUN default; later sessions reuse the stored
/// value until [`IceConfigService::refresh`] replaces it.
pub struct IceConfigService {
    http_client: Arc<dyn HttpClient>,
    fetch: IceFetchConfig,
    token: RwLock<Option<String>>,
    current: RwLock<Option<Arc<IceConfig>>>,
    loading: Mutex<()>,
}

impl IceConfigService {
    pub fn new(http_client: Arc<dyn HttpClient>, fetch: IceFetchConfig) -> Self {
        let token = fetch.token.clone();
        Self {
            http_client,
            fetch,
            token: RwLock::new(token),
            current: RwLock::new(None),
            loading: Mutex::new(()),
        }
    }

    /// Returns the configuration, loading it on first use.
    pub async fn get(&self) -> Arc<IceConfig> {
        if let Some(config) = self.current.read().await.clone() {
            return config;
        }

        let _guard = self.loading.lock().await;
        if let Some(config) = self.current.read().await.clone() {
            return config;
        }

        let config = Arc::new(self.fetch_with_retry().await);
        *self.current.write().await = Some(config.clone());
        config
    }

    /// Returns the stored configuration without triggering a fetch.
    pub async fn current(&self) -> Option<Arc<IceConfig>> {
        self.current.read().await.clone()
    }

    /// Replaces the stored configuration wholesale.
    pub async fn replace(&self, config: IceConfig) {
        *self.current.write().await = Some(Arc::new(config));
    }

    /// Fetches again after a re-login. Does nothing when the token did not
    /// change; keeps the previous configuration when the fetch fails.
    pub async fn refresh(&self, token: String) {
        {
            let mut current_token = self.token.write().await;
            if current_token.as_deref() == Some(token.as_str()) {
                debug!("ICE config token unchanged, skipping refresh");
                return;
            }
            *current_token = Some(token);
        }

        match self.fetch_once().await {
            Ok(config) => {
                info!(
                    "ICE config refreshed ({} servers, relay_only={})",
                    config.servers.len(),
                    config.relay_only
                );
                self.replace(config).await;
            }
            Err(e) => warn!("ICE config refresh failed, keeping previous config: {}", e),
        }
    }

    /// Polls a token file written by an external login and refreshes the
    /// configuration whenever its contents change. Runs until aborted.
    pub async fn watch_token_file(self: Arc<Self>, path: PathBuf, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match tokio::fs::read_to_string(&path).await {
                Ok(contents) => {
                    let token = contents.trim();
                    if !token.is_empty() {
                        self.refresh(token.to_string()).await;
                    }
                }
                Err(e) => debug!("Token file {} unreadable: {}", path.display(), e),
            }
        }
    }

    async fn fetch_with_retry(&self) -> IceConfig {
        let attempts = self.fetch.attempts.max(1);
        for attempt in 1..=attempts {
            match self.fetch_once().await {
                Ok(config) => {
                    info!(
                        "Loaded ICE config ({} servers, relay_only={}) on attempt {}",
                        config.servers.len(),
                        config.relay_only,
                        attempt
                    );
                    return config;
                }
                Err(e) => {
                    warn!("ICE config fetch attempt {}/{} failed: {}", attempt, attempts, e);
                    if attempt < attempts {
                        tokio::time::sleep(self.fetch.retry_delay).await;
                    }
                }
            }
        }

        warn!("Falling back to public STUN server");
        IceConfig::default()
    }

    async fn fetch_once(&self) -> Result<IceConfig> {
        let url = self.fetch.endpoint();
        let mut request = HttpRequest::get(&url);
        if let Some(token) = self.token.read().await.as_deref() {
            request = request.with_bearer(token);
        }

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|e| anyhow!("HTTP request to {} failed: {}", url, e))?;
        if !response.is_success() {
            return Err(anyhow!("{} returned status {}", url, response.status_code));
        }

        Ok(IceConfig::from_response(&response.body)?)
    }
}
