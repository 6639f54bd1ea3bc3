//! Lists the devices of every available backend.
//!
//! Run with: cargo run --example list_devices -- --backend ALSA

use clap::Parser;
use duplex_audio::{available_backends, list_devices, CpalBackend};

#[derive(Parser)]
#[command(name = "list_devices")]
#[command(about = "List audio devices")]
struct Args {
    /// Only list this backend
    #[arg(long)]
    backend: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let names: Vec<String> = match args.backend {
        Some(name) => vec![name],
        None => available_backends().into_iter().map(String::from).collect(),
    };

    for name in names {
        let backend = CpalBackend::with_host_name(&name)?;
        println!("{}", list_devices(&backend)?);
        println!();
    }
    Ok(())
}
