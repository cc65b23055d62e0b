pub mod activity_layer;
pub mod supervisor;

pub use activity_layer::{ActivityEntry, ActivityLogLayer};
pub use supervisor::{ProcessSupervisor, SpawnedProcess, DEFAULT_MAX_CONCURRENT, TIMEOUT_EXIT_CODE};
