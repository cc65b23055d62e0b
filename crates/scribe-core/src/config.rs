//! Persisted application settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::monitor::MonitorConfig;

pub const DEFAULT_PROXY_ADDRESS: &str = "127.0.0.1:7890";

/// Application settings stored in `settings.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Root of the writing project. `None` means the platform default.
    pub project_path: Option<PathBuf>,
    pub proxy_address: String,
    pub proxy_enabled: bool,
    pub openrouter_api_key: Option<String>,
    pub monitor: MonitorConfig,
    /// Scanner command line per monitored platform, program first.
    pub scanner_commands: BTreeMap<String, Vec<String>>,
    pub theme: String,
    pub language: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            project_path: None,
            proxy_address: DEFAULT_PROXY_ADDRESS.to_string(),
            proxy_enabled: false,
            openrouter_api_key: None,
            monitor: MonitorConfig::default(),
            scanner_commands: BTreeMap::new(),
            theme: "system".to_string(),
            language: "en".to_string(),
        }
    }
}

impl AppSettings {
    pub fn proxy(&self) -> ProxyConfig {
        ProxyConfig {
            address: self.proxy_address.clone(),
            enabled: self.proxy_enabled,
        }
    }
}

/// HTTP proxy injected into child process environments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub address: String,
    pub enabled: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_PROXY_ADDRESS.to_string(),
            enabled: false,
        }
    }
}

impl ProxyConfig {
    pub fn url(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            self.address.clone()
        } else {
            format!("http://{}", self.address)
        }
    }

    /// Environment variables to export; empty when the proxy is disabled.
    pub fn env(&self) -> Vec<(String, String)> {
        if !self.enabled {
            return Vec::new();
        }
        let url = self.url();
        ["HTTP_PROXY", "HTTPS_PROXY", "http_proxy", "https_proxy"]
            .into_iter()
            .map(|k| (k.to_string(), url.clone()))
            .collect()
    }
}
