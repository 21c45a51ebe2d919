use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use udpcam_video::{FrameSink, HeadlessSink, JpegDecoder, SnapshotSink};

mod config;
mod control;
mod reaper;
mod receiver;
mod recorder;
mod stats;
mod udp;

use config::{RecordConfig, ReceiverConfig, StreamMode};
use control::{Command, ControlClient};
use receiver::Receiver;
use recorder::Recorder;

#[derive(Parser)]
#[command(name = "udpcam-receiver", about = "Live camera stream receiver over UDP")]
struct Args {
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Receive, reassemble and display the stream (default)
    Receive(ReceiveArgs),
    /// Send commands to the camera's control port
    Control(ControlArgs),
}

#[derive(clap::Args, Default)]
struct ReceiveArgs {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address (IP), overrides config
    #[arg(long)]
    host: Option<String>,

    /// UDP port, overrides config
    #[arg(long)]
    port: Option<u16>,

    /// Wire format, overrides config
    #[arg(long, value_enum)]
    mode: Option<StreamMode>,

    /// Display buffer capacity, overrides config
    #[arg(long)]
    display_capacity: Option<usize>,

    /// Maximum age of a partial frame in milliseconds, overrides config
    #[arg(long)]
    max_frame_age_ms: Option<u64>,

    /// Write rendered frames to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Record decoded frames to this MJPEG file (requires --record-log)
    #[arg(long, requires = "record_log")]
    record_video: Option<PathBuf>,

    /// Record per-frame metadata to this JSON-lines file (requires --record-video)
    #[arg(long, requires = "record_video")]
    record_log: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ControlArgs {
    /// Control server address (HOST:PORT)
    #[arg(long)]
    addr: String,

    /// Commands to send in order; reads from stdin when omitted
    commands: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "udpcam_receiver=info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command.unwrap_or(Cmd::Receive(ReceiveArgs::default())) {
        Cmd::Receive(receive) => run_receiver(receive).await,
        Cmd::Control(control) => run_control(control).await,
    }
}

fn load_config(args: ReceiveArgs) -> Result<ReceiverConfig> {
    let mut config = if let Some(config_path) = &args.config {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read config file: {}", config_path))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid config file: {}", config_path))?
    } else {
        ReceiverConfig::default()
    };

    // CLI overrides
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(capacity) = args.display_capacity {
        config.display_capacity = capacity;
    }
    if let Some(age) = args.max_frame_age_ms {
        config.max_frame_age_ms = age;
    }
    if let Some(path) = args.snapshot {
        config.snapshot_path = Some(path);
    }
    if let (Some(video_path), Some(log_path)) = (args.record_video, args.record_log) {
        config.record = Some(RecordConfig { video_path, log_path });
    }

    Ok(config)
}

async fn run_receiver(args: ReceiveArgs) -> Result<()> {
    let config = load_config(args)?;

    info!("udpcam receiver starting");
    info!(
        host = %config.host,
        port = config.port,
        mode = ?config.mode,
        display_capacity = config.display_capacity,
        max_frame_age_ms = config.max_frame_age_ms,
    );

    // Failing to bind is fatal.
    let socket = udp::bind_socket(&config)?;

    let sink: Box<dyn FrameSink> = match &config.snapshot_path {
        Some(path) => Box::new(SnapshotSink::new(path, config.snapshot_every)),
        None => Box::new(HeadlessSink::new()),
    };
    let mut receiver = Receiver::new(&config, JpegDecoder::new(), sink, Instant::now());
    if let Some(record) = &config.record {
        receiver = receiver.with_recorder(Recorder::open(record)?);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
                shutdown.store(true, Ordering::Release);
            }
        });
    }

    udp::run_receive_loop(socket, &mut receiver, &config, &shutdown).await;
    Ok(())
}

async fn run_control(args: ControlArgs) -> Result<()> {
    let mut client = ControlClient::connect(&args.addr).await?;
    info!(addr = %args.addr, "connected to control server");

    if !args.commands.is_empty() {
        for command in &args.commands {
            exchange(&mut client, command).await?;
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        exchange(&mut client, &line).await?;
    }
    Ok(())
}

async fn exchange(client: &mut ControlClient, command: &str) -> Result<()> {
    let response = match command.parse::<Command>() {
        Ok(known) => client.send_command(known).await?,
        Err(e) => {
            warn!("{}, sending as-is", e);
            client.send(command).await?
        }
    };
    println!("{}", response);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_receive() {
        let args = Args::parse_from(["udpcam-receiver"]);
        assert!(args.command.is_none());
    }

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "udpcam-receiver",
            "receive",
            "--port",
            "6000",
            "--mode",
            "single",
            "--display-capacity",
            "2",
            "--record-video",
            "out.mjpeg",
            "--record-log",
            "frames.jsonl",
        ]);
        let Some(Cmd::Receive(receive)) = args.command else {
            panic!("expected receive subcommand");
        };
        let config = load_config(receive).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.mode, StreamMode::Single);
        assert_eq!(config.display_capacity, 2);
        assert_eq!(config.host, "0.0.0.0");
        assert!(config.record.is_some());
    }

    #[test]
    fn record_flags_go_together() {
        let result = Args::try_parse_from(["udpcam-receiver", "receive", "--record-video", "out.mjpeg"]);
        assert!(result.is_err());
    }

    #[test]
    fn config_file_then_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receiver.toml");
        fs::write(&path, "port = 5001\nbatch_size = 10\n").unwrap();

        let args = ReceiveArgs {
            config: Some(path.to_string_lossy().into_owned()),
            host: Some("127.0.0.1".into()),
            ..ReceiveArgs::default()
        };
        let config = load_config(args).unwrap();
        assert_eq!(config.port, 5001);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn control_args_parse() {
        let args = Args::parse_from(["udpcam-receiver", "control", "--addr", "10.0.0.2:5000", "START", "STOP"]);
        let Some(Cmd::Control(control)) = args.command else {
            panic!("expected control subcommand");
        };
        assert_eq!(control.addr, "10.0.0.2:5000");
        assert_eq!(control.commands, vec!["START", "STOP"]);
    }
}
