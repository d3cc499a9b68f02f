// Regenerate watcher binary
//
// Opens (or attaches to) Chrome, watches the chat tab, and reads operator
// commands from stdin: `max <n>`, `status`, `start`, `stop`.

use std::path::PathBuf;
use std::pin::Pin;

use anyhow::Result;
use clap::Parser;
use futures::{Stream, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use regen_watch::watcher::WatchCommand;

#[derive(Parser, Debug)]
#[command(name = "regen-watch", version, about = "Re-trigger generation when a chat page reports a busy server")]
struct Cli {
    /// YAML config file (default: <config dir>/regen-watch/config.yaml)
    #[arg(short, long, env = "REGEN_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Chat page to watch
    #[arg(long)]
    url: Option<String>,

    /// Regenerate clicks allowed this session
    #[arg(long, conflicts_with = "uncapped")]
    max_clicks: Option<u32>,

    /// Keep clicking for as long as the error shows
    #[arg(long)]
    uncapped: bool,

    /// Retry delays in milliseconds, e.g. 1000,5000,20000
    #[arg(long, value_delimiter = ',')]
    intervals: Option<Vec<u64>>,

    /// Run Chrome without a window (needs an already logged-in profile)
    #[arg(long)]
    headless: bool,

    /// Attach to a running Chrome (ws:// or http://host:port debugger URL)
    #[arg(long, env = "REGEN_WATCH_CONNECT")]
    connect: Option<String>,

    /// Chrome profile directory
    #[arg(long)]
    user_data_dir: Option<PathBuf>,

    /// Do not read operator commands from stdin
    #[arg(long)]
    no_stdin: bool,
}

fn stdin_commands() -> Pin<Box<dyn Stream<Item = WatchCommand> + Send>> {
    let lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    Box::pin(lines.filter_map(|line| async move {
        match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => match line.parse::<WatchCommand>() {
                Ok(command) => Some(command),
                Err(e) => {
                    warn!("Ignoring command: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                None
            }
        }
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = regen_watch::load_yaml_config(cli.config.as_deref())?;
    if let Some(url) = cli.url {
        config.url = url;
    }
    if let Some(max) = cli.max_clicks {
        config.max_clicks = Some(max);
    }
    if cli.uncapped {
        config.max_clicks = None;
    }
    if let Some(intervals) = cli.intervals {
        config.retry_intervals_ms = intervals;
    }
    if cli.headless {
        config.browser.headless = true;
    }
    if let Some(connect) = cli.connect {
        config.browser.connect_url = Some(connect);
    }
    if let Some(dir) = cli.user_data_dir {
        config.browser.user_data_dir = Some(dir);
    }

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    info!("Watching {} (max clicks: {:?})", config.url, config.max_clicks);

    let commands = if cli.no_stdin {
        Box::pin(futures::stream::pending::<WatchCommand>()) as Pin<Box<dyn Stream<Item = WatchCommand> + Send>>
    } else {
        stdin_commands()
    };

    let snapshot = regen_watch::run(config, commands, shutdown).await?;
    info!("Session summary: {}", serde_json::to_string(&snapshot)?);
    Ok(())
}
