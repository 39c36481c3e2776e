//! Offline render: mixer, ring and playback resampler without a device

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use pcmix_core::{
    CaptureSink, Mixer, OUTPUT_BUFFER_SIZE, OutputFrame, PlaybackResampler, WavCapture,
    output_ring,
};
use tracing::{info, warn};

use crate::driver::EmulatedClock;
use crate::settings::MixerArgs;
use crate::tone::attach_voices;

/// Arguments for the render command
#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    pub output: PathBuf,

    #[command(flatten)]
    pub mixer: MixerArgs,
}

/// Execute the render command.
///
/// A simulated device pulls one block every `blocksize` frames of emulated
/// time, so the file holds exactly what a host callback would have played.
pub fn execute(args: RenderArgs) -> Result<()> {
    let mut config = args.mixer.resolve()?;
    if config.nosound {
        warn!("nosound is set in the config; rendering anyway");
        config.nosound = false;
    }

    let (writer, reader) = output_ring(OUTPUT_BUFFER_SIZE);
    let mut mixer = Mixer::new(&config, Some(writer)).context("Failed to create mixer")?;
    let bounds = config.latency_bounds(config.rate, config.blocksize);
    let mut resampler = PlaybackResampler::new(reader, bounds);
    let handles = attach_voices(&mixer, &args.mixer.voices)?;

    let mut wav = WavCapture::create(&args.output, config.rate)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let rate = u64::from(config.rate);
    let blocksize = config.blocksize as usize;
    let mut block: Vec<OutputFrame> = vec![[0; 2]; blocksize];
    let mut played: u64 = 0;

    let total_ms = u64::from(args.mixer.seconds) * 1000;
    let mut clock = EmulatedClock::new();
    for ms in 1..=total_ms {
        clock.run_millisecond(&mut mixer);

        let device_due = ms * rate / 1000;
        while played + blocksize as u64 <= device_due {
            resampler.fill(&mut block);
            wav.add_wave(config.rate, &block)?;
            played += blocksize as u64;
        }
    }

    let stats = resampler.stats().snapshot();
    info!(
        "Rendered {} frames to {} ({} from the mixer, {} silent, {} stretched / {} compressed blocks)",
        wav.frames_written(),
        wav.path().display(),
        stats.frames_played,
        stats.silence_frames,
        stats.stretched_callbacks,
        stats.compressed_callbacks
    );

    drop(handles);
    Box::new(wav).finish()?;
    mixer.stop()?;
    Ok(())
}
