//! # roundtable
//!
//! Console front end: one person at the terminal talks to the configured
//! chatbot, or to the built-in echo bot with `--echo`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use roundtable::logging::init_subscriber;
use roundtable::{
    EchoParticipant, LocalParticipant, MemorySink, Orchestrator, Participant, ParticipantChannel,
    SessionConfig, WorkerIdentity,
};

/// Typed on its own line, ends the conversation from the terminal side.
const LEAVE_COMMAND: &str = "/leave";

/// Turn-based chat session in the terminal.
#[derive(Parser, Debug)]
#[command(name = "roundtable", about = "Turn-based chat session in the terminal")]
struct Cli {
    /// JSON session config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker name to register the terminal user under.
    #[arg(long, default_value = "console")]
    worker: String,

    /// Unit id used for the completion code.
    #[arg(long, default_value = "local-unit")]
    unit_id: String,

    #[arg(long)]
    assignment_id: Option<String>,

    /// Talk to the in-process echo bot instead of the remote one.
    #[arg(long)]
    echo: bool,

    /// Minimum log level (`RUST_LOG` takes precedence).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

impl Cli {
    fn load_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_path(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => SessionConfig::default(),
        };
        config
            .apply_env_overrides()
            .context("Invalid environment override")?;
        config.validate().context("Invalid session config")?;
        Ok(config)
    }

    fn identity(&self) -> WorkerIdentity {
        let identity = WorkerIdentity::new(&self.worker, &self.unit_id);
        match &self.assignment_id {
            Some(assignment) => identity.with_assignment(assignment),
            None => identity,
        }
    }
}

/// Pump stdin into the channel and deliveries onto stdout until the
/// session closes delivery.
async fn run_console(mut channel: ParticipantChannel) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            delivered = channel.recv() => match delivered {
                Some(turn) => println!("{}: {}", turn.id, turn.text),
                None => break,
            },
            line = lines.next_line(), if stdin_open => {
                let sent = match line {
                    Ok(Some(line)) if line.trim() == LEAVE_COMMAND => channel.leave(""),
                    Ok(Some(line)) => channel.say(line.trim()),
                    // EOF or unreadable input
                    _ => {
                        stdin_open = false;
                        channel.leave("")
                    }
                };
                if sent.is_err() {
                    break;
                }
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    let sink = Arc::new(MemorySink::new());

    let (worker, channel) = LocalParticipant::with_channel(cli.identity());
    let worker: Arc<dyn Participant> = Arc::new(worker);

    let orchestrator = if cli.echo {
        let bot: Arc<dyn Participant> = Arc::new(
            EchoParticipant::new(&config.bot.registered_name).with_id(&config.bot.screen_name),
        );
        Orchestrator::start(config, vec![bot, worker], sink.clone()).await
    } else {
        Orchestrator::assemble(config, vec![worker], sink.clone()).await
    }
    .context("Failed to start session")?;

    info!(session_id = %orchestrator.id(), "Session ready");
    println!("Connected. Type a message and press enter; {LEAVE_COMMAND} to quit.");

    let console = tokio::spawn(run_console(channel));
    let outcome = orchestrator.run().await;
    let _ = console.await;

    println!(
        "Session {} ended after {} turns: {:?} ({} utterances recorded)",
        outcome.session_id,
        outcome.turns,
        outcome.reason,
        sink.utterances().len()
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let result = runtime.block_on(run(cli));
    // a pending stdin read would otherwise hold the runtime open
    runtime.shutdown_background();
    result
}
