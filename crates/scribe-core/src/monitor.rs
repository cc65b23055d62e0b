//! Scheduled scan (monitor) types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub const DEFAULT_INTERVAL_MINUTES: u32 = 240;
pub const DEFAULT_PLATFORMS: [&str; 3] = ["xiaohongshu", "wechat", "x"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Always at least 1; see [`MonitorConfig::normalized`].
    pub interval_minutes: u32,
    pub keywords: Vec<String>,
    pub platforms: Vec<String>,
    /// Minimum metric values an item must reach to be reported.
    pub thresholds: HashMap<String, f64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            keywords: Vec::new(),
            platforms: DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect(),
            thresholds: HashMap::new(),
        }
    }
}

impl MonitorConfig {
    /// Overlays every field present in `patch`.
    pub fn merge(mut self, patch: MonitorConfigPatch) -> Self {
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        if let Some(interval) = patch.interval_minutes {
            self.interval_minutes = interval;
        }
        if let Some(keywords) = patch.keywords {
            self.keywords = keywords;
        }
        if let Some(platforms) = patch.platforms {
            self.platforms = platforms;
        }
        if let Some(thresholds) = patch.thresholds {
            self.thresholds = thresholds;
        }
        self.normalized()
    }

    pub fn normalized(mut self) -> Self {
        self.interval_minutes = self.interval_minutes.max(1);
        self
    }
}

/// Partial config supplied by callers of `start`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfigPatch {
    pub enabled: Option<bool>,
    pub interval_minutes: Option<u32>,
    pub keywords: Option<Vec<String>>,
    pub platforms: Option<Vec<String>>,
    pub thresholds: Option<HashMap<String, f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorState {
    Idle,
    Running,
    Scanning,
    Paused,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub last_scan: Option<DateTime<Utc>>,
    pub next_scan: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub config: MonitorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorItem {
    pub id: String,
    #[serde(default)]
    pub platform: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub metrics: HashMap<String, f64>,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl MonitorItem {
    /// True when every configured threshold is met. Missing metrics count as 0.
    pub fn meets_thresholds(&self, thresholds: &HashMap<String, f64>) -> bool {
        thresholds
            .iter()
            .all(|(metric, min)| self.metrics.get(metric).copied().unwrap_or(0.0) >= *min)
    }
}

/// Output of one scan pass over one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub platform: String,
    pub items: Vec<MonitorItem>,
    pub new_items: Vec<MonitorItem>,
}

impl ScanResult {
    pub fn new(platform: impl Into<String>, items: Vec<MonitorItem>) -> Self {
        let new_items = items.iter().filter(|i| i.is_new).cloned().collect();
        Self {
            id: format!("scan_{}", Uuid::new_v4()),
            timestamp: Utc::now(),
            platform: platform.into(),
            items,
            new_items,
        }
    }

    pub fn has_new(&self) -> bool {
        !self.new_items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_minutes, 240);
        assert!(config.keywords.is_empty());
        assert_eq!(config.platforms, vec!["xiaohongshu", "wechat", "x"]);
    }

    #[test]
    fn test_merge_overrides_only_present_fields() {
        let merged = MonitorConfig::default().merge(MonitorConfigPatch {
            interval_minutes: Some(30),
            keywords: Some(vec!["rust".into()]),
            ..Default::default()
        });
        assert_eq!(merged.interval_minutes, 30);
        assert_eq!(merged.keywords, vec!["rust"]);
        assert_eq!(merged.platforms.len(), 3);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let merged = MonitorConfig::default().merge(MonitorConfigPatch {
            interval_minutes: Some(0),
            ..Default::default()
        });
        assert_eq!(merged.interval_minutes, 1);
    }

    #[test]
    fn test_thresholds() {
        let item: MonitorItem =
            serde_json::from_str(r#"{"id":"1","title":"t","metrics":{"likes":50}}"#).unwrap();
        let mut thresholds = HashMap::new();
        thresholds.insert("likes".to_string(), 40.0);
        assert!(item.meets_thresholds(&thresholds));
        thresholds.insert("shares".to_string(), 1.0);
        assert!(!item.meets_thresholds(&thresholds));
    }
}
