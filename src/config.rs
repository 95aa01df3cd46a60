// Runtime configuration for the chat core
// Loaded from config.json in the platform config dir, then overridden by environment

use anyhow::{anyhow, Result};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::UserId;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

const APP_DIR: &str = "golance-chat";
const CONFIG_FILE: &str = "config.json";

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub ws_url: String,
    /// Private inbox; `{user_id}` is replaced with the current user
    pub inbox_destination: String,
    pub send_destination: String,
    pub poll_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub handshake_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            api_base_url: "http://localhost:8080".to_string(),
            ws_url: "ws://localhost:8080/ws/websocket".to_string(),
            inbox_destination: "/user/{user_id}/queue/messages".to_string(),
            send_destination: "/app/chat.send".to_string(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            handshake_timeout_secs: DEFAULT_HANDSHAKE_TIMEOUT_SECS,
        }
    }
}

impl ChatConfig {
    /// Defaults, then the config file if present, then environment overrides
    pub fn load() -> Result<Self> {
        let path = config_dir()?.join(CONFIG_FILE);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            ChatConfig::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read config {}: {}", path.display(), e))?;
        let config: ChatConfig = serde_json::from_str(&contents)
            .map_err(|e| anyhow!("Invalid config {}: {}", path.display(), e))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = env::var("GOLANCE_API_URL") {
            self.api_base_url = url;
        }
        if let Ok(url) = env::var("GOLANCE_WS_URL") {
            self.ws_url = url;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs.max(1))
    }

    pub fn inbox_for(&self, user: UserId) -> String {
        self.inbox_destination.replace("{user_id}", &user.to_string())
    }

    /// Host header for the STOMP CONNECT frame
    pub fn stomp_host(&self) -> String {
        self.ws_url
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split(['/', ':']).next())
            .filter(|host| !host.is_empty())
            .unwrap_or("localhost")
            .to_string()
    }
}

/// Point config and credential files at another directory (tests, multiple accounts)
pub fn set_config_dir_override(dir: PathBuf) {
    let _ = CONFIG_DIR_OVERRIDE.set(dir);
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = CONFIG_DIR_OVERRIDE.get() {
        return Ok(dir.clone());
    }
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join(APP_DIR);

    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }

    Ok(dir)
}
