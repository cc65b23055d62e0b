use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use scribe_application::AppServices;
use scribe_infrastructure::SettingsService;

mod commands;
mod logging;

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Scribe - writing assistant backend driving the claude CLI", long_about = None)]
struct Cli {
    /// Settings file to use instead of the platform default
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a prompt to the agent and stream its answer
    Ask {
        prompt: String,
        /// System prompt passed to the agent
        #[arg(long)]
        system: Option<String>,
        /// Tool the agent may use without asking (repeatable)
        #[arg(long = "allow-tool")]
        allowed_tools: Vec<String>,
        /// Working directory for the agent (defaults to the project root)
        #[arg(long)]
        cwd: Option<PathBuf>,
    },
    /// Print a content file resolved across the system, user and project tiers
    Read {
        path: String,
        #[arg(long)]
        project: Option<String>,
    },
    /// Write a content file into the user tier, or a project's tier
    Write {
        path: String,
        /// Content to write; read from stdin when omitted
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    /// List a directory under the project root
    Ls {
        dir: Option<String>,
        /// List project slugs with an outputs directory instead
        #[arg(long)]
        outputs: bool,
    },
    /// Run the trending-content monitor
    Monitor {
        /// Run a single cycle and print the results as JSON
        #[arg(long)]
        once: bool,
        /// Echo the activity feed while running
        #[arg(long)]
        activity: bool,
        /// Override the scan interval in minutes
        #[arg(long)]
        interval: Option<u32>,
        /// Override the keywords (repeatable)
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// Print content change events under the project root until Ctrl-C
    Watch { paths: Vec<PathBuf> },
    /// Read or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Run an external command under the process supervisor
    Run {
        /// Seconds before the command is terminated
        #[arg(long)]
        timeout: Option<u64>,
        /// Route the command through the configured proxy
        #[arg(long)]
        proxy: bool,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Show where the agent binary resolves to
    Which,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print all settings, or one top-level key
    Get { key: Option<String> },
    /// Set a top-level key; the value is parsed as JSON, falling back to a string
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let activity = matches!(cli.command, Commands::Monitor { activity: true, .. });
    let logging = logging::init(activity)?;

    let settings = Arc::new(match &cli.settings {
        Some(path) => SettingsService::open(path)?,
        None => SettingsService::open_default()?,
    });

    match cli.command {
        Commands::Settings { action } => match action {
            SettingsAction::Get { key } => commands::settings::get(&settings, key.as_deref())?,
            SettingsAction::Set { key, value } => commands::settings::set(&settings, &key, &value)?,
        },
        Commands::Which => commands::which::run().await,
        command => {
            let app = AppServices::bootstrap(settings).await?;
            let result = match command {
                Commands::Ask {
                    prompt,
                    system,
                    allowed_tools,
                    cwd,
                } => commands::ask::run(&app, prompt, system, allowed_tools, cwd).await,
                Commands::Read { path, project } => {
                    commands::content::read(&app, &path, project.as_deref()).await
                }
                Commands::Write {
                    path,
                    content,
                    project,
                } => commands::content::write(&app, &path, content, project.as_deref()).await,
                Commands::Ls { dir, outputs } => {
                    commands::content::ls(&app, dir.as_deref(), outputs).await
                }
                Commands::Monitor {
                    once,
                    interval,
                    keywords,
                    ..
                } => commands::monitor::run(&app, once, interval, keywords, logging.activity).await,
                Commands::Watch { paths } => commands::watch::run(&app, paths).await,
                Commands::Run {
                    timeout,
                    proxy,
                    command,
                } => commands::run::run(&app, command, timeout, proxy).await,
                Commands::Settings { .. } | Commands::Which => Ok(()),
            };
            app.shutdown();
            result?;
        }
    }

    Ok(())
}
