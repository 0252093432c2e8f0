//! midiremap: translate MIDI controller messages between two ALSA rawmidi
//! ports. CC, channel aftertouch and pitch-bend messages are rewritten per
//! a mapping table (CC/RPN/NRPN/pitch-bend/aftertouch destinations, with
//! value scaling); everything else passes through untouched.

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use remap_device::{MidiInput, MidiOutput};
use remap_engine::{Destination, Engine, MapEntry, MappingTable};

/// Transmission time of one byte at MIDI's 31250 baud; the poll interval
/// when the input port has nothing to read.
const POLL_INTERVAL: Duration = Duration::from_micros(320);

#[derive(Parser, Debug)]
#[command(
    name = "midiremap",
    about = "Remap MIDI CC/aftertouch/pitch-bend messages between rawmidi ports"
)]
struct Args {
    /// TOML mapping file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Inline mapping, repeatable; e.g. "cc1=nrpn262", "at=pb", "cc5=none"
    #[arg(short, long = "map", value_name = "SRC=DEST")]
    map: Vec<String>,

    /// ALSA rawmidi input device
    #[arg(short, long, default_value = "virtual")]
    input: String,

    /// ALSA rawmidi output device
    #[arg(short, long, default_value = "virtual")]
    output: String,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate the mapping configuration and exit
    #[arg(long)]
    check: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    // The table is fully built and validated before any port is opened;
    // the engine never runs against a half-loaded configuration.
    let mut table = MappingTable::new();
    if let Some(path) = &args.config {
        config::load_map_file(&mut table, path)?;
    }
    for arg in &args.map {
        config::parse_inline_map(&mut table, arg)?;
    }

    for (controller, entry) in table.configured_cc() {
        log_mapping(&format!("cc {}", controller), entry);
    }
    if table.at().kind != Destination::None {
        log_mapping("aftertouch", table.at());
    }
    if table.pb().kind != Destination::None {
        log_mapping("pitch bend", table.pb());
    }

    if args.check {
        info!("mapping configuration valid");
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to install signal handler: {}", e))?;

    let mut input = MidiInput::open(&args.input)?;
    let mut output = MidiOutput::open(&args.output)?;
    let mut engine = Engine::new(&table);

    info!(input = %args.input, output = %args.output, "remapper running");

    // Forward whatever arrived, however it was chunked; message boundaries
    // are the engine's problem, not the reader's.
    let mut buf = [0u8; 1024];
    let mut total: u64 = 0;
    while running.load(Ordering::SeqCst) {
        match input.read(&mut buf)? {
            Some(n) => {
                total += n as u64;
                engine.process(&buf[..n], &mut output)?;
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }

    info!(bytes = total, "remapper stopped");
    Ok(())
}

fn log_mapping(source: &str, entry: &MapEntry) {
    info!(
        source,
        destination = ?entry.kind,
        number = entry.number,
        from = entry.range_from,
        to = entry.range_to,
        "mapping"
    );
}
