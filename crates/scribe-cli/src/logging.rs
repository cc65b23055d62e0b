//! Subscriber setup: stderr, a daily log file and the optional activity feed.

use anyhow::Result;
use scribe_execution::{ActivityEntry, ActivityLogLayer};
use scribe_infrastructure::ScribePaths;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE_PREFIX: &str = "scribe.log";

pub struct Logging {
    /// Receives activity entries when the feed was requested.
    pub activity: Option<mpsc::UnboundedReceiver<ActivityEntry>>,
    _file_guard: Option<WorkerGuard>,
}

pub fn init(with_activity: bool) -> Result<Logging> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, file_guard) = match ScribePaths::logs_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("file logging disabled: {e}");
            (None, None)
        }
    };

    let (activity_layer, activity) = if with_activity {
        let (layer, rx) = ActivityLogLayer::channel();
        (Some(layer), Some(rx))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .with(activity_layer)
        .try_init()?;

    Ok(Logging {
        activity,
        _file_guard: file_guard,
    })
}
