pub mod content_store;
pub mod paths;
pub mod settings;
pub mod storage;
pub mod watcher;

pub use content_store::LayeredContentStore;
pub use paths::ScribePaths;
pub use settings::SettingsService;
pub use watcher::ContentWatcher;
