//! Arcana Reader - Terminal Tarot Reading
//!
//! A line-oriented surface for the arcana reading core. Cards are dealt face
//! down, picked by number, interpreted by the configured generation backend
//! and then discussed in a streaming follow-up chat.
//!
//! # Usage
//!
//! ```bash
//! # Gemini with the key from the environment
//! GEMINI_API_KEY=... arcana-reader
//!
//! # Local Ollama model, English readings
//! arcana-reader --backend ollama --model llama3.2 --language en
//!
//! # With config file
//! arcana-reader --config ~/.config/arcana/reader.toml
//!
//! # Verbose logging (written to stderr)
//! RUST_LOG=debug arcana-reader
//! ```

mod surface;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::info;

use arcana_core::{
    backend, default_config_path, load_config_from_path, BackendKind, Conductor, ConfigOverrides,
    Language, SurfaceEvent,
};

use surface::{Command, Surface, HELP};

/// How often background work is applied
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Arcana Reader - tarot readings with a generated interpretation
#[derive(Parser, Debug)]
#[command(name = "arcana-reader")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generation backend (gemini, ollama)
    #[arg(short = 'b', long)]
    backend: Option<BackendKind>,

    /// Model identifier
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Working language (zh-Hant, en)
    #[arg(long)]
    language: Option<Language>,

    /// Ask for the interpretation as soon as the spread is complete
    #[arg(long)]
    auto_interpret: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "ARCANA_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("arcana_reader={level},arcana_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    // Config file, then environment, then CLI flags
    let config_path = args.config.clone().or_else(default_config_path);
    let mut config = load_config_from_path(config_path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(backend) = args.backend {
        overrides = overrides.with_backend(backend);
    }
    if let Some(model) = args.model.clone() {
        overrides = overrides.with_model(model);
    }
    if let Some(language) = args.language {
        overrides = overrides.with_language(language);
    }
    if args.auto_interpret {
        overrides = overrides.with_auto_interpret(true);
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        backend = ?config.backend,
        model = %config.model,
        language = %config.language,
        source = %config.source(),
        "Configuration loaded"
    );

    let backend = backend::from_config(&config.backend_config());
    let (tx, mut rx) = mpsc::channel(1024);
    let mut conductor = Conductor::with_shared_backend(backend, config.reader_config(), tx);
    let mut surface = Surface::new();
    let mut stdout = std::io::stdout();

    println!("{HELP}");

    conductor.start().await?;
    conductor
        .handle_event(SurfaceEvent::Connected {
            event_id: SurfaceEvent::new_event_id(),
        })
        .await?;

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut tick = tokio::time::interval(POLL_INTERVAL);

    loop {
        while let Ok(msg) = rx.try_recv() {
            if surface.render(&msg, &mut stdout) {
                info!("Reader closed");
                return Ok(());
            }
        }

        tokio::select! {
            line = lines.next() => {
                let command = match line {
                    Some(line) => Command::parse(&line.context("Failed to read input")?),
                    // End of input
                    None => Command::Quit,
                };
                if let Some(event) = surface.event_for(command, &mut stdout) {
                    conductor.handle_event(event).await?;
                }
            }
            _ = tick.tick() => {
                conductor.poll().await;
            }
        }
    }
}
