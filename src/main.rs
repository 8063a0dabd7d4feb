//! av2-bridge daemon
//!
//! Opens the amplifier's serial control port, synchronises state, and
//! keeps the amplifier in step with the local player's activity file.
//! The `monitor` subcommand decodes and prints the device's status
//! frames instead of running the bridge.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

mod cli;
mod config;
mod player;

use av2_amplifier::{AmpEvent, AmpState, Amplifier};
use av2_transport::protocol::status_code;
use av2_transport::{frame, status, Channel, SerialChannel};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let mut config = config::Config::load(&cli.config)?;
    if let Some(device) = cli.device {
        config.device = device;
    }

    match cli.command.unwrap_or(cli::Commands::Run) {
        cli::Commands::Run => run(config).await,
        cli::Commands::Monitor { json } => monitor(&config.device, json).await,
    }
}

async fn run(config: config::Config) -> anyhow::Result<()> {
    info!("opening {}", config.device);
    let amp = Arc::new(Amplifier::open(&config.device).context("opening control port")?);

    // Startup synchronisation: ask for everything; readiness arrives
    // with the responses, in whatever order the device answers
    amp.request_all_status();

    let mut events = amp.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AmpEvent::Ready) => info!("amplifier synchronised"),
                Ok(AmpEvent::AudioStatus { volume, mute }) => {
                    // Consumed by the CEC side to answer "give audio
                    // status" from the television
                    debug!("audio status: volume={volume} mute={mute}");
                }
                Ok(AmpEvent::StateChanged { previous, current }) => {
                    log_transitions(&previous, &current);
                }
                Err(RecvError::Lagged(n)) => {
                    warn!("event logger lagged by {n} events");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(player::run(Arc::clone(&amp), config.player.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

fn log_transitions(previous: &AmpState, current: &AmpState) {
    let (Some(prev), Some(cur)) = (previous.system, current.system) else {
        return;
    };
    if prev.power != cur.power {
        info!("power: {}", if cur.power { "on" } else { "standby" });
    }
    if prev.input != cur.input {
        info!("input: {}", cur.input);
    }
    if prev.volume != cur.volume || prev.mute != cur.mute {
        debug!(
            "volume: {}{}",
            cur.volume,
            if cur.mute { " (muted)" } else { "" }
        );
    }
}

async fn monitor(device: &str, json: bool) -> anyhow::Result<()> {
    let channel = SerialChannel::open(device).context("opening control port")?;
    let mut frames = channel.subscribe_frames();
    info!("monitoring {device} - ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = frames.recv() => match received {
                Ok(raw) => print_frame(&raw, json),
                Err(RecvError::Lagged(n)) => warn!("monitor lagged by {n} frames"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

fn print_frame(raw: &[u8], json: bool) {
    let payload = match frame::decode(raw) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("{e}");
            return;
        }
    };
    match status::try_parse_status(payload) {
        Ok(parsed) if json => match serde_json::to_string(&parsed) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("serialise failed: {e}"),
        },
        Ok(parsed) => println!("{:<20} {:?}", status_code::name(payload[0]), parsed),
        Err(e) => warn!("{e}: {raw:02X?}"),
    }
}
