use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use scribe_application::AppServices;
use scribe_core::process::{OutputChunk, OutputStream, RunOptions};

pub async fn run(app: &AppServices, command: Vec<String>, timeout: Option<u64>, proxy: bool) -> Result<()> {
    let (program, args) = command.split_first().context("no command given")?;

    let mut options = RunOptions::new().cwd(app.project_root()).use_proxy(proxy);
    if let Some(secs) = timeout {
        options = options.timeout(Duration::from_secs(secs));
    }

    let outcome = app
        .supervisor
        .run_streaming(program, args, options, |chunk: &OutputChunk| {
            let _ = match chunk.stream {
                OutputStream::Stdout => std::io::stdout().write_all(&chunk.bytes),
                OutputStream::Stderr => std::io::stderr().write_all(&chunk.bytes),
            };
        })
        .await?;

    if outcome.timed_out {
        bail!("'{program}' timed out");
    }
    if !outcome.success() {
        bail!("'{program}' exited with code {}", outcome.exit_code);
    }
    Ok(())
}
