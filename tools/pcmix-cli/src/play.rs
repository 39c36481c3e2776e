//! Real-time playback to the default audio device

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use pcmix_core::{MixerSystem, WavCapture};
use tracing::info;

use crate::driver::EmulatedClock;
use crate::settings::MixerArgs;
use crate::tone::attach_voices;

/// Arguments for the play command
#[derive(Args)]
pub struct PlayArgs {
    #[command(flatten)]
    pub mixer: MixerArgs,

    /// Record the mixed stream to a WAV file while playing
    #[arg(long)]
    pub capture: Option<PathBuf>,
}

/// Execute the play command
pub fn execute(args: PlayArgs) -> Result<()> {
    let config = args.mixer.resolve()?;
    let mut system = MixerSystem::start(&config).context("Failed to start mixer")?;
    let handles = attach_voices(system.mixer(), &args.mixer.voices)?;

    if let Some(path) = &args.capture {
        let capture = WavCapture::create(path, system.mixer().rate())
            .with_context(|| format!("Failed to create {}", path.display()))?;
        system.mixer_mut().start_capture(Box::new(capture));
        info!("Recording to {}", path.display());
    }

    for line in system.mixer().volume_listing() {
        println!("{}", line);
    }

    if system.is_silent() {
        info!("Running without audio output");
    }

    let total_ms = u64::from(args.mixer.seconds) * 1000;
    let mut clock = EmulatedClock::new();
    let start = Instant::now();
    for ms in 0..total_ms {
        clock.run_millisecond(system.mixer_mut());

        // Pace emulated time against the wall clock
        let deadline = start + Duration::from_millis(ms + 1);
        if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    let metrics = system.mixer().metrics();
    info!(
        "Mixed {} frames in {}s ({} dropped)",
        metrics.total_frames_mixed, metrics.seconds_elapsed, metrics.total_frames_dropped
    );
    if let Some(stats) = system.playback_snapshot() {
        info!(
            "Playback: {} frames, {} silent, {} stretched / {} compressed of {} callbacks",
            stats.frames_played,
            stats.silence_frames,
            stats.stretched_callbacks,
            stats.compressed_callbacks,
            stats.callbacks
        );
    }

    drop(handles);
    system.stop().context("Failed to stop mixer")?;
    Ok(())
}
