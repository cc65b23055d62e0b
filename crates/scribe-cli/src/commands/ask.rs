use std::path::PathBuf;

use anyhow::{Result, bail};
use scribe_application::AppServices;
use scribe_core::agent::{CompleteEvent, ErrorEvent, MessageRole, QueryOptions, StreamEvent};
use tokio::sync::mpsc;

enum Outcome {
    Complete(CompleteEvent),
    Failed(ErrorEvent),
}

pub async fn run(
    app: &AppServices,
    prompt: String,
    system: Option<String>,
    allowed_tools: Vec<String>,
    cwd: Option<PathBuf>,
) -> Result<()> {
    let mut options = QueryOptions::new(prompt).with_allowed_tools(allowed_tools);
    if let Some(system) = system {
        options = options.with_system_prompt(system);
    }
    if let Some(cwd) = cwd {
        options = options.with_cwd(cwd);
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _stream = app.bridge.on_stream(|event: &StreamEvent| match event.message.role {
        MessageRole::System => eprintln!("{}", event.message.content),
        _ => println!("{}", event.message.content),
    });
    let completed = tx.clone();
    let _complete = app.bridge.on_complete(move |event: &CompleteEvent| {
        let _ = completed.send(Outcome::Complete(event.clone()));
    });
    let _error = app.bridge.on_error(move |event: &ErrorEvent| {
        let _ = tx.send(Outcome::Failed(event.clone()));
    });

    let session_id = app.bridge.query(options);
    tracing::debug!(session_id = %session_id, "[Ask] query started");

    tokio::select! {
        outcome = rx.recv() => settle(outcome),
        _ = tokio::signal::ctrl_c() => {
            app.bridge.cancel(&session_id);
            eprintln!("cancelled");
            Ok(())
        }
    }
}

/// Maps the first session outcome to the command result.
fn settle(outcome: Option<Outcome>) -> Result<()> {
    match outcome {
        Some(Outcome::Complete(_)) => Ok(()),
        Some(Outcome::Failed(event)) => bail!("{}", event.error),
        None => bail!("agent session ended without a result"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::agent::SessionId;

    #[test]
    fn test_failure_reports_error_verbatim() {
        let event = ErrorEvent {
            session_id: SessionId::from("s1"),
            error: "Agent CLI exited with code 2".to_string(),
            exit_code: Some(2),
        };
        let err = settle(Some(Outcome::Failed(event))).unwrap_err();
        assert_eq!(err.to_string(), "Agent CLI exited with code 2");
    }

    #[test]
    fn test_closed_channel_is_an_error() {
        assert!(settle(None).is_err());
    }
}
