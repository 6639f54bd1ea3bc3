//! Microphone passthrough example.
//!
//! Routes an input device to an output device through the ring buffer.
//!
//! Run with: cargo run --example microphone -- --latency 0.1

use std::time::Duration;

use clap::Parser;
use duplex_audio::{CpalBackend, DeviceSelection, DuplexAudio, StreamEvent};

#[derive(Parser)]
#[command(name = "microphone")]
#[command(about = "Play an input device through an output device")]
struct Args {
    /// Audio backend to use (see the list_devices example)
    #[arg(long)]
    backend: Option<String>,

    /// Input device id
    #[arg(long = "in-device")]
    in_device: Option<String>,

    /// Output device id
    #[arg(long = "out-device")]
    out_device: Option<String>,

    /// Open the input device raw
    #[arg(long = "in-raw", requires = "in_device")]
    in_raw: bool,

    /// Open the output device raw
    #[arg(long = "out-raw", requires = "out_device")]
    out_raw: bool,

    /// Software latency in seconds
    #[arg(long, default_value = "0.2", value_parser = parse_latency)]
    latency: Duration,

    /// How long to run, in seconds
    #[arg(long, default_value = "30")]
    seconds: u64,
}

fn parse_latency(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|e| format!("{e}"))?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err("latency must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(secs).map_err(|e| e.to_string())
}

fn select(id: Option<String>, raw: bool) -> DeviceSelection {
    match id {
        Some(id) if raw => DeviceSelection::raw(id),
        Some(id) => DeviceSelection::by_id(id),
        None => DeviceSelection::SystemDefault,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let backend = match &args.backend {
        Some(name) => CpalBackend::with_host_name(name)?,
        None => CpalBackend::new(),
    };

    let session = DuplexAudio::builder()
        .input_device(select(args.in_device, args.in_raw))
        .output_device(select(args.out_device, args.out_raw))
        .latency(args.latency)
        .on_event(|event| match event {
            StreamEvent::Overflow { count, .. } => eprintln!("overflow {count}"),
            StreamEvent::Underflow { count, .. } => eprintln!("underflow {count}"),
            StreamEvent::StreamError { direction, error } => {
                eprintln!("{direction} stream error: {error}");
            }
            _ => {}
        })
        .start(&backend)?;

    println!(
        "Passing {} through for {} seconds...",
        session.format(),
        args.seconds
    );
    std::thread::sleep(Duration::from_secs(args.seconds));

    let stats = session.stats();
    session.stop()?;
    println!("Stats: {stats:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_defaults_to_200ms() {
        let args = Args::try_parse_from(["microphone"]).unwrap();
        assert_eq!(args.latency, Duration::from_millis(200));
        assert_eq!(select(args.in_device, args.in_raw), DeviceSelection::SystemDefault);
    }

    #[test]
    fn test_latency_rejects_non_positive_and_non_finite() {
        for value in ["--latency=-0.5", "--latency=0", "--latency=NaN", "--latency=inf", "--latency=1e300"] {
            assert!(Args::try_parse_from(["microphone", value]).is_err(), "{value}");
        }
    }

    #[test]
    fn test_raw_requires_device() {
        assert!(Args::try_parse_from(["microphone", "--in-raw"]).is_err());
        let args = Args::try_parse_from(["microphone", "--in-device", "hw:1", "--in-raw"]).unwrap();
        assert_eq!(select(args.in_device, args.in_raw), DeviceSelection::raw("hw:1"));
    }
}
