//! Recording example.
//!
//! Records an input device to a WAV file.
//!
//! Run with: cargo run --example record -- recording.wav --seconds 5

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use duplex_audio::{CpalBackend, DeviceSelection, DuplexAudio, FileSink};

#[derive(Parser)]
#[command(name = "record")]
#[command(about = "Record an input device to a WAV file")]
struct Args {
    /// Output file
    #[arg(default_value = "recording.wav")]
    path: PathBuf,

    /// Audio backend to use (see the list_devices example)
    #[arg(long)]
    backend: Option<String>,

    /// Input device id
    #[arg(long)]
    device: Option<String>,

    /// Open the device raw
    #[arg(long, requires = "device")]
    raw: bool,

    /// How long to record, in seconds
    #[arg(long, default_value = "5")]
    seconds: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let backend = match &args.backend {
        Some(name) => CpalBackend::with_host_name(name)?,
        None => CpalBackend::new(),
    };
    let device = match args.device {
        Some(id) if args.raw => DeviceSelection::raw(id),
        Some(id) => DeviceSelection::by_id(id),
        None => DeviceSelection::SystemDefault,
    };

    let session = DuplexAudio::recorder()
        .device(device)
        .add_sink(FileSink::wav(&args.path))
        .on_event(|e| tracing::warn!(?e, "stream event"))
        .start(&backend)
        .await?;

    println!(
        "Recording {} to {} for {} seconds...",
        session.format(),
        args.path.display(),
        args.seconds
    );
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;

    // Get stats before stopping (stop() consumes the session)
    let stats = session.stats();
    session.stop().await?;

    println!("Recording saved to {}", args.path.display());
    println!("Stats: {stats:?}");
    Ok(())
}
