pub mod ask;
pub mod content;
pub mod monitor;
pub mod run;
pub mod settings;
pub mod watch;
pub mod which;
