use anyhow::Result;
use scribe_application::{AppServices, CycleOutcome};
use scribe_core::monitor::MonitorConfigPatch;
use scribe_core::notification::AppNotification;
use scribe_execution::ActivityEntry;
use tokio::sync::mpsc;

pub async fn run(
    app: &AppServices,
    once: bool,
    interval: Option<u32>,
    keywords: Vec<String>,
    activity: Option<mpsc::UnboundedReceiver<ActivityEntry>>,
) -> Result<()> {
    if once {
        let outcome = app.coordinator.run_cycle().await;
        match outcome {
            CycleOutcome::Scanned(results) => println!("{}", serde_json::to_string_pretty(&results)?),
            skipped => eprintln!("cycle skipped: {skipped:?}"),
        }
        return Ok(());
    }

    let _notifications = app.notifications.on_notification(|n: &AppNotification| {
        println!("{}\n{}\n", n.title, n.body);
    });

    let patch = MonitorConfigPatch {
        interval_minutes: interval,
        keywords: (!keywords.is_empty()).then_some(keywords),
        ..Default::default()
    };
    app.coordinator.start(patch);
    let status = app.coordinator.status();
    eprintln!(
        "monitoring {} every {} min, Ctrl-C to stop",
        status.config.platforms.join(", "),
        status.config.interval_minutes
    );

    match activity {
        Some(mut feed) => loop {
            tokio::select! {
                entry = feed.recv() => match entry {
                    Some(entry) => eprintln!("[{}] {} {}", entry.timestamp, entry.level, entry.message),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        },
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    app.coordinator.stop();
    Ok(())
}
