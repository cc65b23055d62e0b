use std::path::PathBuf;

use anyhow::Result;
use scribe_application::AppServices;
use scribe_core::content::FileChangeEvent;

pub async fn run(app: &AppServices, paths: Vec<PathBuf>) -> Result<()> {
    let paths = if paths.is_empty() {
        vec![app.project_root().to_path_buf()]
    } else {
        paths
    };

    let _changes = app.watcher.on_change(|event: &FileChangeEvent| {
        println!("{} {}", event.kind.as_str(), event.path.display());
    });
    app.watcher.watch(&paths)?;
    eprintln!("watching {} path(s), Ctrl-C to stop", paths.len());

    tokio::signal::ctrl_c().await?;
    app.watcher.stop();
    Ok(())
}
