use anyhow::{Context, Result, bail};
use scribe_application::AppServices;
use tokio::io::AsyncReadExt;

pub async fn read(app: &AppServices, path: &str, project: Option<&str>) -> Result<()> {
    let content = app.store.read_layered(path, project).await;
    let Some(tier) = content.winning_tier() else {
        bail!("'{path}' not found in any tier");
    };
    tracing::debug!(tier = tier.as_str(), sources = content.sources.len(), "[Content] resolved");
    print!("{}", content.merged);
    Ok(())
}

pub async fn write(
    app: &AppServices,
    path: &str,
    content: Option<String>,
    project: Option<&str>,
) -> Result<()> {
    let content = match content {
        Some(content) => content,
        None => {
            let mut buf = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buf)
                .await
                .context("failed to read content from stdin")?;
            buf
        }
    };

    let written = match project {
        Some(project) => app.store.write_project(project, path, &content).await,
        None => app.store.write_user(path, &content).await,
    }
    .with_context(|| format!("failed to write '{path}'"))?;
    println!("{}", written.display());
    Ok(())
}

pub async fn ls(app: &AppServices, dir: Option<&str>, outputs: bool) -> Result<()> {
    if outputs {
        for slug in app.store.scan_outputs().await {
            println!("{slug}");
        }
        return Ok(());
    }

    let dir = match dir {
        Some(dir) => app.project_root().join(dir),
        None => app.project_root().to_path_buf(),
    };
    for entry in app.store.list_dir(&dir).await {
        let marker = if entry.is_directory { "d" } else { "-" };
        println!(
            "{marker} {:>10} {} {}",
            entry.size,
            entry.modified.format("%Y-%m-%d %H:%M"),
            entry.name
        );
    }
    Ok(())
}
