//! callwarden CLI - co-presence policy enforcement for calls

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, ValueEnum};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use warden_core::{Collaborators, SubscriptionManager, Warden, WardenConfig};
use warden_events::{pump, EventDecoder, DEFAULT_MAX_RECORD_BYTES};
use warden_webex::{RelayInbox, WebexClient};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Parser)]
#[command(name = "callwarden")]
#[command(version, about = "callwarden - hangs up calls that monitored people share")]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Register feeds and enforce the policy until interrupted
    Run {
        /// Configuration file path
        #[arg(short, long, default_value = "config/callwarden.toml")]
        config: PathBuf,
    },
    /// Check configuration validity
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config/callwarden.toml")]
        config: PathBuf,
    },
    /// Delete every registered feed
    Cleanup {
        /// Configuration file path
        #[arg(short, long, default_value = "config/callwarden.toml")]
        config: PathBuf,
    },
    /// Decode a captured relay stream and print its events as JSON lines
    Decode {
        /// Captured stream file
        file: PathBuf,
        /// Largest record accepted, in bytes
        #[arg(long, default_value_t = DEFAULT_MAX_RECORD_BYTES)]
        max_record_bytes: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Some(Commands::Run { config }) => run(&config).await,
        Some(Commands::Check { config }) => check(&config),
        Some(Commands::Cleanup { config }) => cleanup(&config).await,
        Some(Commands::Decode {
            file,
            max_record_bytes,
        }) => decode(&file, max_record_bytes).await,
        None => {
            println!(
                "callwarden v{} - Use --help for commands",
                env!("CARGO_PKG_VERSION")
            );
            Ok(())
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.with_target(false).compact().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load(path: &Path) -> anyhow::Result<WardenConfig> {
    WardenConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

async fn run(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    let client = Arc::new(WebexClient::from_config(&config.platform).context("building platform client")?);
    let relay = Arc::new(
        RelayInbox::from_config(&config.relay, config.platform.request_timeout())
            .await
            .context("creating relay inbox")?,
    );

    let collaborators = Collaborators {
        identities: client.clone(),
        subscriptions: client.clone(),
        channel: relay,
        terminator: client.clone(),
        notifier: client,
    };
    let warden = Warden::new(config, collaborators)?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            trigger.cancel();
        }
    });

    let report = warden.run(shutdown).await.context("enforcement run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    println!("Config OK: {}", path.display());
    println!("  monitored:  {}", config.policy.monitored.join(", "));
    println!("  threshold:  {}", config.policy.threshold);
    println!("  notify:     {}", config.notice().is_some());
    println!("  platform:   {}", config.platform.api_base);
    println!(
        "  token:      {}",
        if config.platform.token().is_ok() { "set" } else { "MISSING" }
    );
    println!("  relay:      {}", config.relay.api_base);
    println!("  keepalive:  {}s", config.relay.keepalive_secs);
    println!("  reconnects: {}", config.relay.reconnect_attempts);
    Ok(())
}

async fn cleanup(path: &Path) -> anyhow::Result<()> {
    let config = load(path)?;
    let client = WebexClient::from_config(&config.platform).context("building platform client")?;
    let removed = client
        .delete_all()
        .await
        .context("deleting registered feeds")?;
    println!("Removed {removed} feed(s)");
    Ok(())
}

async fn decode(path: &Path, max_record_bytes: usize) -> anyhow::Result<()> {
    let mut input = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;

    let (chunk_tx, mut chunks) = mpsc::channel::<Bytes>(16);
    let reader = tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = input.read(&mut buf).await?;
            if n == 0 || chunk_tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                break;
            }
        }
        Ok::<_, std::io::Error>(())
    });

    let (event_tx, mut events) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        Ok::<_, serde_json::Error>(())
    });

    let mut decoder = EventDecoder::with_max_record_bytes(max_record_bytes);
    pump(&mut chunks, &mut decoder, &event_tx).await;
    drop(event_tx);

    reader.await?.with_context(|| format!("reading {}", path.display()))?;
    printer.await??;
    info!(stats = ?decoder.stats(), "decode finished");
    Ok(())
}
