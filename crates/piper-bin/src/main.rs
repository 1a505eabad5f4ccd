//! CLI entry point for the Piper simulated detector.
//!
//! Starts the device, then reads control commands from stdin until `quit`,
//! end of input or Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! piper run --config config/piper.toml --acquire
//! piper run --save-to /tmp/frames --synthetic-input 10
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod console;
mod feed;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::Command;
use piper_core::Observable;
use piper_device::{DeviceSettings, PiperDevice};
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "piper")]
#[command(about = "Simulated detector with periodic frame producers and a frame ingestor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the device with a stdin control console
    Run {
        /// Settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the save directory
        #[arg(long)]
        save_to: Option<PathBuf>,

        /// Start in ACQUIRING
        #[arg(long, conflicts_with = "process")]
        acquire: bool,

        /// Start in PROCESSING
        #[arg(long)]
        process: bool,

        /// Feed generated frames to the ingestor at this rate (Hz)
        #[arg(long, value_name = "HZ")]
        synthetic_input: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            save_to,
            acquire,
            process,
            synthetic_input,
        } => run(config, save_to, acquire, process, synthetic_input).await,
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(
    config: Option<PathBuf>,
    save_to: Option<PathBuf>,
    acquire: bool,
    process: bool,
    synthetic_input: Option<f64>,
) -> Result<()> {
    let mut settings = DeviceSettings::load(config.as_deref())?;
    if let Some(dir) = save_to {
        settings.save_to = dir;
        settings
            .validate()
            .context("Invalid --save-to directory")?;
    }
    if let Some(hz) = synthetic_input {
        if !hz.is_finite() || hz <= 0.0 || hz > feed::MAX_FEED_RATE_HZ {
            bail!(
                "--synthetic-input must be in (0, {}] Hz, got {}",
                feed::MAX_FEED_RATE_HZ,
                hz
            );
        }
    }

    init_tracing(&settings.log_level);

    println!("🔬 piper - simulated detector");
    println!("   Instance: {}", settings.instance_id);
    println!("   Save to:  {}", settings.save_to.display());
    println!("   Tick:     {:?}", settings.tick_interval());
    println!();

    let source = format!("{}:synthetic", settings.instance_id);
    let device = PiperDevice::new(settings).context("Failed to create device")?;
    device.start().context("Failed to start device")?;

    if acquire {
        device.toggle_acquisition();
    } else if process {
        device.toggle_processing();
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let monitor = tokio::spawn(monitor_throughput(device.throughput().clone(), stop_rx));
    let feed = synthetic_input.map(|hz| tokio::spawn(feed::run(device.input(), hz, source)));

    println!("{}", console::HELP);
    println!("📡 Device running - Ctrl+C or 'quit' to stop");

    let console_result = control_console(&device).await;

    println!("\n🛑 Shutting down...");
    if let Some(feed) = feed {
        feed.abort();
    }
    stop_tx.send_replace(true);
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "Throughput monitor did not stop cleanly");
    }
    device.shutdown().await.context("Device shutdown failed")?;

    println!("👋 Shutdown complete ({} frames saved)", device.saved_count());
    console_result
}

/// Forward stdin lines from a plain thread.
///
/// A blocking read cannot be cancelled, so it is kept off the runtime's
/// blocking pool where it would hold up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Read commands from stdin until `quit`, EOF or Ctrl+C.
async fn control_console(device: &PiperDevice) -> Result<()> {
    let mut lines = spawn_stdin_reader();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                if let Err(e) = signal {
                    tracing::warn!(error = %e, "Ctrl+C handler failed");
                }
                return Ok(());
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    return Ok(());
                };
                let line = line.context("Failed to read stdin")?;
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(Command::Quit) => return Ok(()),
                    Ok(command) => match console::execute(device, command) {
                        Ok(reply) => println!("{}", reply),
                        Err(e) => eprintln!("error: {:#}", e),
                    },
                    Err(e) => eprintln!("error: {}", e),
                }
            }
        }
    }
}

/// Log every throughput update until stopped.
async fn monitor_throughput(throughput: Observable<f64>, mut stop: watch::Receiver<bool>) {
    let name = throughput.name();
    let units = throughput.units();
    let mut updates = throughput.subscribe();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *updates.borrow_and_update();
                tracing::info!(value, units = %units, "Pattern {}", name);
            }
            _ = stop.changed() => break,
        }
    }
}
