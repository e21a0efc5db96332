mod config;

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use studio_core::backend::CaptureService;
use studio_core::devices::display_label;
use studio_core::{DeviceId, Session, SymphoniaDecoder, SystemClock};
use studio_engine::capture::CpalCapture;

use crate::config::{Config, track_from_number};

/// Session refresh period, roughly one display frame.
const TICK: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "studio", about = "Multi-track audio recorder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List capture devices
    Devices,
    /// Record on the armed tracks, then play the take back
    Record {
        /// Length of the take in seconds
        #[arg(short, long, default_value_t = 4.0)]
        seconds: f64,
        /// Tracks to arm, one-based
        #[arg(
            short,
            long,
            value_delimiter = ',',
            default_value = "1",
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        arm: Vec<u64>,
        /// Skip playback after recording
        #[arg(long)]
        no_playback: bool,
    },
    /// Write the current settings to the config file
    InitConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Devices => list_devices(),
        Commands::Record {
            seconds,
            arm,
            no_playback,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            runtime.block_on(record(&config, seconds, &arm, !no_playback))
        }
        Commands::InitConfig => {
            let path = config.save()?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

fn list_devices() -> Result<()> {
    let capture = CpalCapture::new();
    // the service view logs listing errors instead of failing
    let devices = CaptureService::input_devices(&capture);
    if devices.is_empty() {
        bail!("no capture devices found");
    }
    for (index, device) in devices.iter().enumerate() {
        println!("{}\t{}", device.id, display_label(device, index));
    }
    Ok(())
}

fn session_for(config: &Config) -> Result<Session> {
    let engine = studio_engine::start().context("failed to open the output device")?;
    let mut session = Session::new(
        config.settings(),
        Box::new(CpalCapture::new()),
        Box::new(SymphoniaDecoder),
        Box::new(engine),
        Box::new(SystemClock::new()),
    );

    for input in &config.track_inputs {
        let Some(track) = input.track_id() else {
            continue;
        };
        if let Err(err) = session.set_track_input(track, Some(DeviceId::new(input.device.as_str()))) {
            log::warn!("track {}: {err}", input.track);
        }
    }
    Ok(session)
}

async fn record(config: &Config, seconds: f64, arm: &[u64], playback: bool) -> Result<()> {
    if !(seconds.is_finite() && seconds > 0.0) {
        bail!("take length must be positive, got {seconds}");
    }

    let mut session = session_for(config)?;
    for &number in arm {
        let Some(track) = track_from_number(number) else {
            bail!("track numbers start at 1, got {number}");
        };
        session
            .arm(track)
            .with_context(|| format!("cannot arm track {number}"))?;
    }

    let clips = session.start_recording()?;
    log::info!("recording {} clip(s) for {seconds}s", clips.len());

    let mut interval = tokio::time::interval(TICK);
    let deadline = Instant::now() + Duration::from_secs_f64(seconds);
    while Instant::now() < deadline {
        interval.tick().await;
        session.tick();
    }

    let report = session.stop_recording().context("recording ended unexpectedly")?;
    for (track, metrics) in &report.metrics {
        log::info!(
            "{track}: {} bytes in {} chunks ({:.0} B/s)",
            metrics.total_bytes,
            metrics.chunks,
            metrics.data_rate
        );
    }
    for (clip, err) in &report.discarded {
        log::warn!("{clip} discarded: {err}");
    }
    for (clip, err) in &report.unplayable {
        log::warn!("{clip} will not play: {err}");
    }
    if !playback || report.populated.is_empty() {
        return Ok(());
    }

    let pps = session.pixels_per_second();
    let end_px = session
        .tracks()
        .iter()
        .flat_map(|track| track.clips())
        .map(|clip| clip.position_px() + clip.width_px(pps))
        .fold(0.0, f64::max);

    session.stop();
    let Some(token) = session.play() else {
        return Ok(());
    };
    let mut shown = String::new();
    while !token.is_cancelled() {
        interval.tick().await;
        let playhead = session.tick();
        let text = session.display_text();
        if text != shown {
            log::debug!("{text}");
            shown = text;
        }
        if playhead >= end_px {
            break;
        }
    }
    session.stop();
    Ok(())
}
