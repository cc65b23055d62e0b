//! Settings persistence.

use std::path::PathBuf;
use std::sync::RwLock;

use scribe_core::config::AppSettings;
use scribe_core::{Result, ScribeError};
use serde_json::Value;

use crate::paths::ScribePaths;
use crate::storage::{AtomicTomlError, AtomicTomlFile};

/// Cached `AppSettings` backed by `settings.toml`.
pub struct SettingsService {
    file: AtomicTomlFile<AppSettings>,
    current: RwLock<AppSettings>,
}

impl SettingsService {
    /// Opens the settings file at the platform default location.
    pub fn open_default() -> Result<Self> {
        let path = ScribePaths::settings_file().map_err(|e| ScribeError::config(e.to_string()))?;
        Self::open(path)
    }

    /// Opens (or starts fresh at) `path`. A missing file yields defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let file = AtomicTomlFile::new(path);
        let current = file.load()?.unwrap_or_default();
        tracing::debug!(path = %file.path().display(), "[Settings] loaded");
        Ok(Self {
            file,
            current: RwLock::new(current),
        })
    }

    pub fn get(&self) -> AppSettings {
        self.current.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Returns one top-level setting as JSON.
    pub fn get_key(&self, key: &str) -> Result<Value> {
        let value = serde_json::to_value(self.get())?;
        value
            .get(key)
            .cloned()
            .ok_or_else(|| ScribeError::not_found("setting", key))
    }

    /// Replaces one top-level setting and persists the result.
    ///
    /// Unknown keys and values of the wrong shape are rejected without
    /// touching the file.
    pub fn set_key(&self, key: &str, value: Value) -> Result<AppSettings> {
        if self.get_key(key).is_err() {
            return Err(ScribeError::not_found("setting", key));
        }
        self.update(|settings| {
            let mut doc = serde_json::to_value(&*settings)
                .map_err(|e| AtomicTomlError::Rejected(e.to_string()))?;
            if let Some(obj) = doc.as_object_mut() {
                obj.insert(key.to_string(), value);
            }
            *settings = serde_json::from_value(doc)
                .map_err(|e| AtomicTomlError::Rejected(format!("invalid value for '{key}': {e}")))?;
            Ok(())
        })
    }

    /// Applies `f` under the file lock and refreshes the cache.
    pub fn update<F>(&self, f: F) -> Result<AppSettings>
    where
        F: FnOnce(&mut AppSettings) -> std::result::Result<(), AtomicTomlError>,
    {
        let saved = self.file.update(AppSettings::default(), f)?;
        if let Ok(mut current) = self.current.write() {
            *current = saved.clone();
        }
        tracing::info!("[Settings] saved");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> SettingsService {
        SettingsService::open(dir.path().join("settings.toml")).unwrap()
    }

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let settings = service(&dir).get();
        assert_eq!(settings, AppSettings::default());
    }

    #[test]
    fn test_set_key_persists() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.set_key("proxy_enabled", json!(true)).unwrap();
        svc.set_key("theme", json!("dark")).unwrap();

        let reopened = service(&dir);
        assert!(reopened.get().proxy_enabled);
        assert_eq!(reopened.get_key("theme").unwrap(), json!("dark"));
    }

    #[test]
    fn test_unknown_key_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = service(&dir).set_key("nonsense", json!(1)).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_wrong_type_is_rejected_and_cache_unchanged() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let err = svc.set_key("proxy_enabled", json!("yes please")).unwrap_err();
        assert!(err.is_config());
        assert!(!svc.get().proxy_enabled);
    }

    #[test]
    fn test_nested_monitor_config() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.set_key("monitor", json!({"enabled": true, "intervalMinutes": 30}))
            .unwrap();
        let monitor = svc.get().monitor;
        assert!(monitor.enabled);
        assert_eq!(monitor.interval_minutes, 30);
        assert_eq!(monitor.platforms.len(), 3);
    }
}
