use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use edrum_core::{
    Command, Engine, FileStorage, Frame, KitConfig, MemoryStorage, Monitor, NoteKind, Oscilloscope,
    Outbound, Recording, RecordingTransport, ReplayScanner, Scanner, SendQueue, Storage,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() -> edrum_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => KitConfig::load(path)?,
        None => KitConfig::default(),
    };
    config.validate()?;

    match cli.command {
        Commands::Curves { format } => print_curves(format),
        Commands::Dump => run_dump(config),
        Commands::Simulate {
            samples,
            eeprom,
            monitor,
            scope,
        } => run_simulate(config, &samples, eeprom.as_deref(), monitor, &scope),
    }
}

#[derive(Serialize)]
struct CurveTable<'a> {
    id: u8,
    name: &'static str,
    table: &'a [u8],
}

fn print_curves(format: CurveFormat) -> edrum_core::Result<()> {
    let kit = edrum_core::Kit::new(&KitConfig::default())?;
    match format {
        CurveFormat::Json => {
            let tables: Vec<CurveTable<'_>> = kit
                .curves()
                .iter()
                .map(|curve| CurveTable {
                    id: curve.shape().id(),
                    name: curve.shape().name(),
                    table: curve.table(),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&tables)?);
        }
        CurveFormat::C => {
            for curve in kit.curves() {
                let values: Vec<String> = curve.table().iter().map(u8::to_string).collect();
                println!(
                    "const uint8_t curve_{}[{}] = {{",
                    curve.shape().name().to_lowercase(),
                    values.len()
                );
                for row in values.chunks(16) {
                    println!("    {},", row.join(", "));
                }
                println!("}};");
            }
        }
    }
    Ok(())
}

fn run_dump(config: KitConfig) -> edrum_core::Result<()> {
    let vendor = config.vendor_id;
    let storage = MemoryStorage::new(config.storage_size());
    let mut engine = Engine::new(config, storage)?;
    engine.receive(&Frame::new(Command::RequestConfig).encode(vendor));

    let scanner = ReplayScanner::new(engine.config().sensor_count, Recording::default());
    let mut transport = RecordingTransport::new();
    engine.tick(0, &scanner, &mut transport);

    for bytes in transport.frames() {
        println!("{}", hex(bytes));
    }
    Ok(())
}

fn run_simulate(
    config: KitConfig,
    samples: &Path,
    eeprom: Option<&Path>,
    monitor: Option<u8>,
    scope: &[u8],
) -> edrum_core::Result<()> {
    let text = std::fs::read_to_string(samples)?;
    let recording: Recording = serde_json::from_str(&text)?;
    tracing::info!(ticks = recording.len(), path = %samples.display(), "loaded recording");

    let mut requests = Vec::new();
    if let Some(pad) = monitor {
        requests.push(Monitor::request(&config, true, pad)?.encode(config.vendor_id));
    }
    if !scope.is_empty() {
        requests.push(Oscilloscope::request(&config, scope, None)?.encode(config.vendor_id));
    }

    match eeprom {
        Some(path) => {
            let storage = FileStorage::open(path, config.storage_size())?;
            let mut storage = replay(config, storage, recording, &requests)?;
            storage.flush()?;
            tracing::info!(path = %path.display(), "saved storage image");
        }
        None => {
            let storage = MemoryStorage::new(config.storage_size());
            replay(config, storage, recording, &requests)?;
        }
    }
    Ok(())
}

/// Feeds every recorded tick through a fresh engine and prints the output.
fn replay<S: Storage>(
    config: KitConfig,
    storage: S,
    recording: Recording,
    requests: &[Vec<u8>],
) -> edrum_core::Result<S> {
    let tick_micros = config.tick_micros();
    let ticks = recording.len();
    let mut scanner = ReplayScanner::new(config.sensor_count, recording);
    scanner.calibrate();

    let mut queue = SendQueue::new(RecordingTransport::new(), config.send_queue_capacity);
    let mut engine = Engine::new(config, storage)?;
    for request in requests {
        engine.receive(request);
    }

    let mut now = 0u32;
    let mut notes = 0usize;
    let mut frames = 0usize;
    for _ in 0..ticks {
        scanner.read();
        for pad_hit in engine.tick(now, &scanner, &mut queue) {
            tracing::debug!(pad = pad_hit.pad, zone = ?pad_hit.hit.zone, peak = pad_hit.hit.peak, "hit");
        }
        queue.flush();

        for item in queue.inner_mut().take() {
            match item {
                Outbound::Note(note) => {
                    notes += 1;
                    let kind = match note.kind {
                        NoteKind::On => "on ",
                        NoteKind::Off => "off",
                    };
                    println!(
                        "{now:>10} note-{kind} ch={} note={} vel={}  [{}]",
                        note.channel,
                        note.note,
                        note.velocity,
                        hex(&note.to_bytes())
                    );
                }
                Outbound::Frame(bytes) => {
                    frames += 1;
                    println!("{now:>10} frame {}", hex(&bytes));
                }
            }
        }
        now = now.wrapping_add(tick_micros);
    }

    tracing::info!(
        ticks,
        notes,
        frames,
        dropped = queue.dropped(),
        rejected = engine.rejected(),
        sensors = scanner.sensor_count(),
        "simulation finished"
    );
    Ok(engine.into_storage())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "eDrum trigger module host tools", long_about = None)]
struct Cli {
    /// Kit configuration as JSON. Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print every velocity curve table.
    Curves {
        #[arg(short, long, value_enum, default_value_t = CurveFormat::C)]
        format: CurveFormat,
    },
    /// Answer a configuration request and print the frames as hex.
    Dump,
    /// Replay recorded sensor readings through the trigger engine.
    Simulate {
        /// JSON recording: `{"ticks": [[s1, s2, ...], ...]}`.
        samples: PathBuf,
        /// Storage image holding pad settings, created if missing.
        #[arg(long)]
        eeprom: Option<PathBuf>,
        /// Monitor this pad and print its captures.
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=127))]
        monitor: Option<u8>,
        /// Oscilloscope probe sensors, probe 1 arms the capture.
        #[arg(
            long,
            value_delimiter = ',',
            num_args = 1..=4,
            value_parser = clap::value_parser!(u8).range(0..=127)
        )]
        scope: Vec<u8>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CurveFormat {
    C,
    Json,
}
