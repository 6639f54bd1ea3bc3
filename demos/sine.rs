//! Sine tone example.
//!
//! Plays a tone on an output device.
//!
//! Run with: cargo run --example sine -- --frequency 440

use std::time::Duration;

use clap::Parser;
use duplex_audio::{CpalBackend, DeviceSelection, DuplexAudio};

#[derive(Parser)]
#[command(name = "sine")]
#[command(about = "Play a sine tone")]
struct Args {
    /// Audio backend to use (see the list_devices example)
    #[arg(long)]
    backend: Option<String>,

    /// Output device id
    #[arg(long)]
    device: Option<String>,

    /// Open the device raw
    #[arg(long, requires = "device")]
    raw: bool,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440")]
    frequency: f64,

    /// Sample rate in Hz (negotiated when omitted)
    #[arg(long = "sample-rate")]
    sample_rate: Option<u32>,

    /// Software latency in seconds
    #[arg(long, value_parser = parse_latency)]
    latency: Option<Duration>,

    /// Stream name shown by the system mixer
    #[arg(long, default_value = "sine")]
    name: String,

    /// How long to play, in seconds
    #[arg(long, default_value = "10")]
    seconds: u64,
}

fn parse_latency(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("latency must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let backend = match &args.backend {
        Some(name) => CpalBackend::with_host_name(name)?,
        None => CpalBackend::new(),
    };

    let mut tone = DuplexAudio::tone()
        .frequency(args.frequency)
        .stream_name(args.name);
    if let Some(id) = args.device {
        tone = tone.device(if args.raw {
            DeviceSelection::raw(id)
        } else {
            DeviceSelection::by_id(id)
        });
    }
    if let Some(rate) = args.sample_rate {
        tone = tone.sample_rate(rate);
    }
    if let Some(latency) = args.latency {
        tone = tone.latency(latency);
    }

    let player = tone.start(&backend)?;
    println!(
        "Playing {} (latency {:?})",
        player.format(),
        player.software_latency()
    );

    std::thread::sleep(Duration::from_secs(args.seconds));
    player.stop();
    Ok(())
}
