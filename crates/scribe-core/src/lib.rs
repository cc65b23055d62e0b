pub mod agent;
pub mod config;
pub mod content;
pub mod error;
pub mod event_bus;
pub mod monitor;
pub mod notification;
pub mod process;

pub use error::{Result, ScribeError};
pub use event_bus::{EventBus, Subscription};
