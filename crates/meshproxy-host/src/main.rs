//! MeshProxy host console entry point.
//!
//! Connects to a MeshProxy gateway over USB serial, keeps a live view of its
//! configuration and counters, and lets the user change its radio settings
//! from a line-oriented console.
//!
//! # Usage
//!
//! ```text
//! meshproxy [OPTIONS]
//!
//! Options:
//!   --port <PORT>             Serial port of the gateway
//!   --baud <RATE>             Line rate [default from config: 115200]
//!   --config <PATH>           Config file [default: platform config dir]
//!   --stats-interval <MS>     Stats polling interval, 10-10000
//!   --no-connect              Start disconnected
//!   --verbose                 Also print firmware RX:/TX: trace lines
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence when both are present; both take precedence over
//! the config file.
//!
//! | Variable             | Description                         |
//! |----------------------|-------------------------------------|
//! | `MESHPROXY_PORT`     | Serial port                         |
//! | `MESHPROXY_BAUD`     | Line rate                           |
//! | `MESHPROXY_CONFIG`   | Config file path                    |
//! | `RUST_LOG`           | `tracing` filter (stderr)           |
//!
//! # Architecture overview
//!
//! ```text
//! stdin ──► ui_bridge::parse_command ──► SessionHandle ─┐
//!                                                       ▼
//!                       LinkSession task (framer, snapshot, form, timers)
//!                                                       │
//! stdout ◄── ui_bridge::render_event ◄── SessionEvent ◄─┘
//!                                                       ▲
//!                       SerialTransport (reader thread) ┘
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meshproxy_core::protocol::framer::FrameCodec;
use meshproxy_host::application::link_session::LinkSession;
use meshproxy_host::application::transport::Transport;
use meshproxy_host::infrastructure::storage::config::{
    clamp_stats_interval_ms, config_file_path, load_config_from, save_config_to, HostConfig,
};
use meshproxy_host::infrastructure::ui_bridge::{
    execute, parse_command, render_event, Outcome, HELP_TEXT,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// MeshProxy host console.
#[derive(Debug, Parser)]
#[command(
    name = "meshproxy",
    about = "Host console for the MeshProxy LoRa protocol gateway",
    version
)]
struct Cli {
    /// Serial port of the gateway, e.g. `/dev/ttyACM0` or `COM3`.
    #[arg(long, env = "MESHPROXY_PORT")]
    port: Option<String>,

    /// Serial line rate.
    #[arg(long, env = "MESHPROXY_BAUD")]
    baud: Option<u32>,

    /// Path of the TOML config file.
    #[arg(long, env = "MESHPROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Stats polling interval in milliseconds (clamped to 10-10000).
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Do not connect on startup.
    #[arg(long)]
    no_connect: bool,

    /// Print firmware debug lines that trace individual packets.
    #[arg(long)]
    verbose: bool,
}

/// Everything `main` needs after merging CLI, environment, and config file.
#[derive(Debug)]
struct Settings {
    config: HostConfig,
    config_path: PathBuf,
    connect: bool,
    show_debug: bool,
}

impl Cli {
    /// Loads the config file and applies CLI overrides on top of it.
    ///
    /// # Errors
    ///
    /// Returns an error if no config path can be determined or the file
    /// exists but cannot be read or parsed.
    fn into_settings(self) -> anyhow::Result<Settings> {
        let config_path = match self.config {
            Some(path) => path,
            None => config_file_path().context("cannot determine config file location")?,
        };
        let mut config = load_config_from(&config_path)
            .with_context(|| format!("failed to load config from {}", config_path.display()))?;

        if let Some(port) = self.port {
            config.serial.port = port;
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(ms) = self.stats_interval {
            config.polling.stats_interval_ms = clamp_stats_interval_ms(ms);
        }
        let connect = !self.no_connect && config.general.auto_connect;

        Ok(Settings {
            config,
            config_path,
            connect,
            show_debug: self.verbose,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Settings {
        mut config,
        config_path,
        connect,
        show_debug,
    } = Cli::parse().into_settings()?;

    // RUST_LOG wins over the config file's level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        port = %config.serial.port,
        baud = config.serial.baud_rate,
        config = %config_path.display(),
        "MeshProxy host starting"
    );

    let transport = build_transport(&config)?;
    let (events_tx, mut events) = mpsc::unbounded_channel();
    let (handle, task) = LinkSession::new(
        transport,
        FrameCodec::new(),
        Box::new(events_tx),
        config.session_config(),
    )
    .spawn();

    println!("{HELP_TEXT}");
    if connect {
        if let Err(e) = handle.connect().await {
            warn!("initial connect failed: {e}");
        }
    }

    let mut lines = spawn_stdin_reader();
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if let Some(line) = render_event(&event, show_debug) {
                    println!("{line}");
                }
            }
            line = lines.recv() => {
                // stdin closed
                let Some(line) = line else { break };
                let command = match parse_command(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(e) => {
                        println!("[error] {e}");
                        continue;
                    }
                };
                match execute(&handle, command).await {
                    Ok(Outcome::Done) => {}
                    Ok(Outcome::Print(text)) => println!("{text}"),
                    Ok(Outcome::RateChanged(ms)) => {
                        config.set_stats_interval_ms(ms);
                        match save_config_to(&config, &config_path) {
                            Ok(()) => println!("[info]  stats polling every {ms} ms (saved)"),
                            Err(e) => warn!("could not save config: {e}"),
                        }
                    }
                    Ok(Outcome::Quit) => break,
                    Err(e) => println!("[error] {e}"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    handle.shutdown().await;
    task.await.context("session task failed")?;
    info!("MeshProxy host stopped");
    Ok(())
}

#[cfg(feature = "serial")]
fn build_transport(config: &HostConfig) -> anyhow::Result<Box<dyn Transport>> {
    use meshproxy_host::infrastructure::transport::SerialTransport;

    Ok(Box::new(SerialTransport::new(
        config.serial.port.clone(),
        config.serial.baud_rate,
        config.read_timeout(),
    )))
}

#[cfg(not(feature = "serial"))]
fn build_transport(_config: &HostConfig) -> anyhow::Result<Box<dyn Transport>> {
    anyhow::bail!("built without serial support; rebuild with `--features serial`")
}

/// Reads stdin on a plain thread so a pending read never blocks shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

// ── Tests ─────────────────────────────────────────────────────────────────────
