//! CLI binary for parley.
//!
//! Reads user input from stdin, one item per line, and prints reply
//! sentences as they stream in. Chat mode takes plain text lines; translate
//! mode takes JSON transcript updates (plain lines are treated as final
//! text). A line reading `/flush` interrupts the current reply.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use parley::{ChatInput, Downstream, ParleyConfig, Session, SessionMode, TranscriptUpdate};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Parley: turn-taking control for streamed voice conversations.
#[derive(Parser)]
#[command(name = "parley", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured session mode.
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Chat,
    Translate,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Chat => SessionMode::Chat,
            ModeArg::Translate => SessionMode::Translate,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run a session over stdin/stdout.
    Run,

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration as TOML.
    ShowConfig,
}

const FLUSH_COMMAND: &str = "/flush";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout carries only reply text.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parley=info")),
        )
        .init();

    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(ParleyConfig::default_config_path);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let mut config = load_config(cli.config.is_some(), &path)?;
            if let Some(mode) = cli.mode {
                config.session.mode = mode.into();
            }
            run_session(config).await
        }
        Command::InitConfig { force } => init_config(&path, force),
        Command::ShowConfig => {
            let mut config = load_config(cli.config.is_some(), &path)?;
            if let Some(mode) = cli.mode {
                config.session.mode = mode.into();
            }
            print!("{}", toml::to_string_pretty(&config.validate()?)?);
            Ok(())
        }
    }
}

/// An explicit path must exist; the default path is optional.
fn load_config(explicit: bool, path: &Path) -> anyhow::Result<ParleyConfig> {
    if explicit || path.exists() {
        info!("loading config from {}", path.display());
        Ok(ParleyConfig::from_file(path)?)
    } else {
        Ok(ParleyConfig::default())
    }
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite",
            path.display()
        );
    }
    ParleyConfig::default().save_to_file(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run_session(config: ParleyConfig) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(64);
    let session = Arc::new(Session::with_api(config, tx)?);
    let printer = tokio::spawn(print_downstream(rx));

    session.start().await?;
    eprintln!(
        "parley v{} ({:?} mode). Type input, {FLUSH_COMMAND} to interrupt, Ctrl+D to finish.",
        env!("CARGO_PKG_VERSION"),
        session.mode()
    );

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut replies = Vec::new();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down...");
                replies.clear();
                break;
            }
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == FLUSH_COMMAND {
            session.flush().await?;
            continue;
        }
        let handle = match session.mode() {
            SessionMode::Chat => session.on_chat_input(ChatInput::final_text(line)).await,
            SessionMode::Translate => match serde_json::from_str::<TranscriptUpdate>(line) {
                Ok(update) => session.on_transcript(update).await,
                Err(e) if line.starts_with('{') => {
                    warn!("invalid transcript update: {e}");
                    None
                }
                Err(_) => session.on_chat_input(ChatInput::final_text(line)).await,
            },
        };
        replies.extend(handle);
    }

    // Let pending replies finish on end of input.
    for reply in replies {
        if let Err(e) = reply.await {
            warn!("reply task failed: {e}");
        }
    }
    session.shutdown().await;
    drop(session);
    printer.await?;
    Ok(())
}

async fn print_downstream(mut rx: mpsc::Receiver<Downstream>) {
    let mut stdout = std::io::stdout();
    while let Some(message) = rx.recv().await {
        let written = match message {
            Downstream::Segment(unit) if unit.end_of_segment => writeln!(stdout, "{}", unit.text),
            Downstream::Segment(unit) => write!(stdout, "{}", unit.text),
            Downstream::Flush => writeln!(stdout, " [interrupted]"),
        };
        if written.and_then(|()| stdout.flush()).is_err() {
            break;
        }
    }
}
