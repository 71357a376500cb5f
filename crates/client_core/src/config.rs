use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Base of the REST API, e.g. `http://localhost:8080/api/v1`.
    pub api_url: String,
    pub ws_url: String,
    pub notification_queue_capacity: usize,
    pub request_timeout_seconds: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080/api/v1".into(),
            ws_url: "ws://localhost:8080/ws/websocket".into(),
            notification_queue_capacity: 256,
            request_timeout_seconds: 30,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn validate(&self) -> Result<()> {
        let api = Url::parse(&self.api_url)
            .with_context(|| format!("invalid api_url '{}'", self.api_url))?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(anyhow!("api_url must start with http:// or https://"));
        }
        let ws = Url::parse(&self.ws_url)
            .with_context(|| format!("invalid ws_url '{}'", self.ws_url))?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(anyhow!("ws_url must start with ws:// or wss://"));
        }
        if self.notification_queue_capacity == 0 {
            return Err(anyhow!("notification_queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_url: Option<String>,
    ws_url: Option<String>,
    notification_queue_capacity: Option<usize>,
    request_timeout_seconds: Option<u64>,
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    let mut settings = ClientSettings::default();
    if let Ok(raw) = fs::read_to_string(DEFAULT_CONFIG_FILE) {
        if let Err(err) = apply_file(&mut settings, &raw) {
            tracing::warn!(error = %err, "ignoring unreadable {DEFAULT_CONFIG_FILE}");
        }
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub fn load_settings_from(path: &Path) -> Result<ClientSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read client config '{}'", path.display()))?;
    let mut settings = ClientSettings::default();
    apply_file(&mut settings, &raw)?;
    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut ClientSettings, raw: &str) -> Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw).context("invalid client config toml")?;
    if let Some(v) = file_cfg.api_url {
        settings.api_url = v;
    }
    if let Some(v) = file_cfg.ws_url {
        settings.ws_url = v;
    }
    if let Some(v) = file_cfg.notification_queue_capacity {
        settings.notification_queue_capacity = v;
    }
    if let Some(v) = file_cfg.request_timeout_seconds {
        settings.request_timeout_seconds = v;
    }
    Ok(())
}

fn apply_env(settings: &mut ClientSettings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CHAT_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = var("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = var("CHAT_WS_URL") {
        settings.ws_url = v;
    }
    if let Some(v) = var("APP__WS_URL") {
        settings.ws_url = v;
    }

    if let Some(v) = var("APP__NOTIFICATION_QUEUE_CAPACITY") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.notification_queue_capacity = parsed;
        }
    }

    if let Some(v) = var("APP__REQUEST_TIMEOUT_SECONDS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_seconds = parsed;
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
