//! Application services: scheduled scanning, notifications and the
//! bootstrap that wires every service together.

pub mod coordinator;
pub mod notifications;
pub mod scanner;
pub mod schedule;
pub mod services;

pub use coordinator::{CycleOutcome, MONITOR_CONFIG_PATH, ScanCoordinator, apply_config_file};
pub use notifications::{MAX_NOTIFICATIONS, NotificationCenter};
pub use scanner::{CommandTargetScanner, TargetScanner};
pub use schedule::Schedule;
pub use services::AppServices;
