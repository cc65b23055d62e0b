//! Path resolution for Scribe configuration and content.
//!
//! ```text
//! ~/.config/scribe/            # Config directory (SCRIBE_CONFIG_DIR overrides)
//! ├── settings.toml            # AppSettings
//! └── logs/                    # Daily-rolling log files
//!     └── scribe.log.YYYY-MM-DD
//!
//! ~/Documents/scribe/          # Default project root
//! ├── assets/                  # System tier content
//! └── outputs/<project-slug>/  # Project tier content
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Environment variable that relocates the config directory.
pub const CONFIG_DIR_ENV: &str = "SCRIBE_CONFIG_DIR";
const APP_DIR_NAME: &str = "scribe";

#[derive(Debug, Error)]
pub enum PathError {
    #[error("Cannot find home directory")]
    HomeDirNotFound,
}

pub struct ScribePaths;

impl ScribePaths {
    /// Returns the Scribe configuration directory.
    pub fn config_dir() -> Result<PathBuf, PathError> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the path to `settings.toml`.
    pub fn settings_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("settings.toml"))
    }

    pub fn logs_dir() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("logs"))
    }

    /// Project root used when settings don't name one.
    ///
    /// Falls back to `~/scribe` on systems without a documents directory.
    pub fn default_project_root() -> Result<PathBuf, PathError> {
        if let Some(docs) = dirs::document_dir() {
            return Ok(docs.join(APP_DIR_NAME));
        }
        dirs::home_dir()
            .map(|home| home.join(APP_DIR_NAME))
            .ok_or(PathError::HomeDirNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_file_under_config_dir() {
        let settings = ScribePaths::settings_file().unwrap();
        assert!(settings.ends_with("settings.toml"));
        assert!(settings.starts_with(ScribePaths::config_dir().unwrap()));
    }

    #[test]
    fn test_logs_dir_under_config_dir() {
        let logs_dir = ScribePaths::logs_dir().unwrap();
        assert!(logs_dir.ends_with("logs"));
        assert!(logs_dir.starts_with(ScribePaths::config_dir().unwrap()));
    }

    #[test]
    fn test_default_project_root_is_named_for_app() {
        let root = ScribePaths::default_project_root().unwrap();
        assert!(root.ends_with("scribe"));
    }
}
