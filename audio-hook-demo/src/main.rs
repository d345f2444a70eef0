mod devices;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use audio_hook_core::storage::metadata;
use audio_hook_core::{
    read_stream_file, AudioFormatMessage, AudioHook, CaptureSummary, DeviceHandle, HookConfiguration, HookDelegate,
    HookError, Message, StreamFileWriter, StreamFormat,
};
use clap::{Parser, Subcommand};

use devices::{PlanarMmapDevice, SineDevice, SyntheticDevice};

#[derive(Parser)]
#[command(name = "audio-hook-demo")]
#[command(about = "Capture synthetic devices through the audio hook into a stream file")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record two synthetic devices into a stream file plus summary sidecar
    Record {
        /// Directory the stream file is written to
        #[arg(short, long)]
        output_dir: PathBuf,

        /// How long the devices produce audio
        #[arg(short, long, default_value = "1000")]
        duration_ms: u64,

        /// JSON hook configuration
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Drop buffers instead of waiting when a capture worker is busy
        #[arg(long)]
        skip_on_busy: bool,
    },
    /// Print per-stream contents of a stream file
    Inspect {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Record {
            output_dir,
            duration_ms,
            config,
            skip_on_busy,
        } => record(&output_dir, Duration::from_millis(duration_ms), config.as_deref(), skip_on_busy),
        Command::Inspect { file } => inspect(&file),
    }
}

struct LoggingDelegate;

impl HookDelegate for LoggingDelegate {
    fn on_stream_initialized(&self, stream_id: u32, format: &StreamFormat) {
        log::info!(
            "stream {} ready: {:?}, {} ch @ {} Hz",
            stream_id,
            format.encoding,
            format.channels,
            format.rate
        );
    }

    fn on_buffer_dropped(&self, stream_id: u32) {
        log::debug!("stream {} dropped a buffer", stream_id);
    }

    fn on_error(&self, stream_id: u32, error: &HookError) {
        log::error!("stream {}: {}", stream_id, error);
    }
}

fn record(output_dir: &Path, duration: Duration, config: Option<&Path>, skip_on_busy: bool) -> Result<()> {
    let mut config = match config {
        Some(path) => HookConfiguration::from_json_file(path).context("Failed to load hook configuration")?,
        None => HookConfiguration::default(),
    };
    config.skip_on_busy |= skip_on_busy;

    let stream_path = output_dir.join("capture.ahks");
    let writer = Arc::new(StreamFileWriter::create(stream_path.clone()).context("Failed to create stream file")?);

    let hook = AudioHook::new(config)?;
    hook.bind_sink(writer.clone())?;
    hook.set_delegate(Arc::new(LoggingDelegate));

    let mut devices: Vec<Box<dyn SyntheticDevice>> = vec![
        Box::new(SineDevice::new(DeviceHandle(0x1000), 48000, 480, 440.0)),
        Box::new(PlanarMmapDevice::new(DeviceHandle(0x2000), 44100, 441)),
    ];
    for device in &devices {
        hook.open_stream(device.handle(), device.name(), device.mode());
        hook.configure_stream(device.handle(), &device.params())
            .with_context(|| format!("Failed to configure {}", device.name()))?;
    }

    hook.start()?;
    let hook_ref = &hook;
    let deadline = Instant::now() + duration;
    thread::scope(|scope| -> Result<()> {
        let runs: Vec<_> = devices
            .iter_mut()
            .map(|device| scope.spawn(move || run_device(device.as_mut(), hook_ref, deadline)))
            .collect();
        for run in runs {
            run.join().map_err(|_| anyhow::anyhow!("device thread panicked"))??;
        }
        Ok(())
    })?;
    hook.stop();

    let streams = hook.diagnostics();
    hook.teardown();
    let checksum = writer.finish()?;

    let summary = CaptureSummary::new(&stream_path, &checksum, streams);
    let summary_path = metadata::write_summary(&summary, &stream_path)?;
    log::info!("Wrote {}", summary_path.display());

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Feed one period per period duration until `deadline`.
fn run_device(device: &mut dyn SyntheticDevice, hook: &AudioHook, deadline: Instant) -> Result<()> {
    let params = device.params();
    let period = Duration::from_secs_f64(params.period_frames.unwrap_or(1) as f64 / params.rate as f64);

    while Instant::now() < deadline {
        match device.produce(hook) {
            Ok(()) => {}
            Err(e) if e.is_transient() => log::warn!("{}: {}", device.name(), e),
            Err(e) => return Err(e).with_context(|| format!("{} failed", device.name())),
        }
        thread::sleep(period);
    }
    Ok(())
}

#[derive(Default)]
struct StreamContents {
    format: Option<AudioFormatMessage>,
    buffers: u64,
    bytes: u64,
    first_timestamp: Option<u64>,
    last_timestamp: Option<u64>,
}

fn inspect(file: &Path) -> Result<()> {
    let packets = read_stream_file(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let mut streams: BTreeMap<u32, StreamContents> = BTreeMap::new();
    let mut malformed = 0;
    for packet in &packets {
        match Message::decode(packet) {
            Ok(Message::AudioFormat(announcement)) => {
                streams.entry(announcement.stream_id).or_default().format = Some(announcement);
            }
            Ok(Message::Audio { header, .. }) => {
                let contents = streams.entry(header.stream_id).or_default();
                contents.buffers += 1;
                contents.bytes += header.size;
                contents.first_timestamp.get_or_insert(header.timestamp);
                contents.last_timestamp = Some(header.timestamp);
            }
            Err(e) => {
                log::warn!("{}", e);
                malformed += 1;
            }
        }
    }

    println!("{}: {} packets", file.display(), packets.len());
    for (stream_id, contents) in &streams {
        match &contents.format {
            Some(format) => println!(
                "stream {}: {} ch @ {} Hz, flags {:#06x}",
                stream_id, format.channels, format.rate, format.flags
            ),
            None => println!("stream {}: no format announcement", stream_id),
        }
        println!(
            "  {} buffers, {} bytes, timestamps {:?}..{:?}",
            contents.buffers, contents.bytes, contents.first_timestamp, contents.last_timestamp
        );
    }
    if malformed > 0 {
        println!("{} malformed packets", malformed);
    }
    Ok(())
}
