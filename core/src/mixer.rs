//! The mixer context: producer-side tick, mixdown and ring output
//!
//! A [`Mixer`] is built from a [`MixerConfig`] and an optional ring writer.
//! Without a writer (or with `nosound`) it runs in silent mode and only keeps
//! time. The scheduler drives it with either [`Mixer::tick`] once per
//! millisecond or [`Mixer::sample_event`] once per output sample.

use std::sync::{Arc, Mutex};

use tracing::{debug, error, trace, warn};

use crate::capture::CaptureSink;
use crate::channel::MixerChannel;
use crate::config::{MixerConfig, VOLUME_LISTING_HEADER, format_volume_row};
use crate::error::MixerError;
use crate::gain::{StereoVolume, VOLUME_SHIFT};
use crate::metrics::MixerMetrics;
use crate::registry::{ChannelHandle, ChannelInfo, ChannelRegistry, SharedRegistry, lock_registry};
use crate::ring::{OutputFrame, RingWriter};
use crate::timing::{DriftCorrector, MillisecondClock, SampleClock};

/// Largest number of frames mixed in one pass
pub const MAX_TICK_FRAMES: usize = 4096;

#[inline]
fn clip(sample: i64) -> i16 {
    sample.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
}

/// Producer-side mixer state
pub struct Mixer {
    registry: SharedRegistry,
    writer: Option<RingWriter>,
    clock: MillisecondClock,
    sample_clock: SampleClock,
    drift: DriftCorrector,
    rate: u32,
    swap_stereo: bool,
    sample_accurate: bool,
    /// Frames already mixed in the current millisecond
    ms_progress: usize,
    accum: Vec<[i64; 2]>,
    out: Vec<OutputFrame>,
    capture: Option<Box<dyn CaptureSink>>,
    metrics: MixerMetrics,
}

impl Mixer {
    /// Build a mixer running at `config.rate`.
    ///
    /// `writer` is the producer end of the output ring; `None` selects silent mode.
    pub fn new(config: &MixerConfig, writer: Option<RingWriter>) -> Result<Self, MixerError> {
        config.validate()?;

        let writer = if config.nosound { None } else { writer };
        let rate = config.rate;
        let clock = MillisecondClock::new(rate);
        let ring_capacity = writer.as_ref().map_or(0, RingWriter::capacity);

        let mut registry = ChannelRegistry::new(rate);
        registry.set_master_volume(config.master());

        debug!(
            "Mixer: rate={}Hz sample_accurate={} silent={} samples_per_ms={}.{:03} ring={}",
            rate,
            config.sample_accurate,
            writer.is_none(),
            clock.samples_per_ms(),
            clock.samples_per_ms_fraction(),
            ring_capacity
        );

        Ok(Self {
            registry: Arc::new(Mutex::new(registry)),
            writer,
            clock,
            sample_clock: SampleClock::new(),
            drift: DriftCorrector::new(rate),
            rate,
            swap_stereo: config.swapstereo,
            sample_accurate: config.sample_accurate,
            ms_progress: 0,
            accum: vec![[0; 2]; MAX_TICK_FRAMES],
            out: Vec::with_capacity(MAX_TICK_FRAMES),
            capture: None,
            metrics: MixerMetrics::new(ring_capacity),
        })
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// True when no output ring is attached: ticks keep time but render nothing
    pub fn is_silent(&self) -> bool {
        self.writer.is_none()
    }

    pub fn is_sample_accurate(&self) -> bool {
        self.sample_accurate
    }

    /// Cadence at which the scheduler should drive the mixer, in milliseconds
    pub fn event_interval_ms(&self) -> f64 {
        if self.sample_accurate {
            1000.0 / f64::from(self.rate)
        } else {
            1.0
        }
    }

    /// Frames scheduled for the current millisecond
    pub fn samples_this_ms(&self) -> usize {
        self.clock.samples_this_ms()
    }

    pub fn metrics(&self) -> &MixerMetrics {
        &self.metrics
    }

    // =============================================================
    // Channels and volume
    // =============================================================

    /// Register a sound source. The channel starts disabled at unity volume
    /// and is removed when the returned handle is dropped.
    pub fn add_channel<F>(&self, handler: F, rate: u32, name: &str) -> Result<ChannelHandle, MixerError>
    where
        F: FnMut(&mut MixerChannel, usize) + Send + 'static,
    {
        let id = lock_registry(&self.registry).add(Box::new(handler), rate, name)?;
        Ok(ChannelHandle::new(id, name, self.registry.clone()))
    }

    /// Case-insensitive channel lookup
    pub fn find_channel(&self, name: &str) -> Option<ChannelInfo> {
        let registry = lock_registry(&self.registry);
        registry.find(name).and_then(|id| registry.info(id))
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        lock_registry(&self.registry).infos()
    }

    pub fn master_volume(&self) -> StereoVolume {
        lock_registry(&self.registry).master_volume()
    }

    pub fn set_master_volume(&self, left: f32, right: f32) {
        lock_registry(&self.registry).set_master_volume(StereoVolume::new(left, right));
    }

    /// Console-style listing: a heading, the master row, then one row per channel
    pub fn volume_listing(&self) -> Vec<String> {
        let registry = lock_registry(&self.registry);
        let mut rows = vec![
            VOLUME_LISTING_HEADER.to_string(),
            format_volume_row("MASTER", registry.master_volume()),
        ];
        rows.extend(
            registry
                .infos()
                .iter()
                .map(|info| format_volume_row(&info.name, info.volume)),
        );
        rows
    }

    // =============================================================
    // Capture
    // =============================================================

    /// Offer every subsequent tick's output to `sink`, replacing any active capture
    pub fn start_capture(&mut self, sink: Box<dyn CaptureSink>) {
        if let Err(e) = self.stop_capture() {
            error!("Failed to finish previous capture: {}", e);
        }
        self.capture = Some(sink);
    }

    pub fn stop_capture(&mut self) -> Result<(), MixerError> {
        match self.capture.take() {
            Some(sink) => sink.finish(),
            None => Ok(()),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    // =============================================================
    // Scheduling
    // =============================================================

    /// Mix the rest of the current millisecond and advance to the next one
    pub fn tick(&mut self) {
        let remaining = self.clock.samples_this_ms() - self.ms_progress;
        self.mix_samples(remaining);
    }

    /// Reference drift correction to the scheduler's current emulated time.
    ///
    /// Without this the first precision-mode event sets the reference.
    pub fn start_timing(&mut self, emulated_ms: f64) {
        self.drift.reset(emulated_ms);
    }

    /// One precision-mode event.
    ///
    /// `emulated_ms` is the emulated time base; drift against it is corrected
    /// while `irq_important` is set or a capture is running. Returns the
    /// number of frames mixed.
    pub fn sample_event(&mut self, emulated_ms: f64, irq_important: bool) -> usize {
        let important = irq_important || self.capture.is_some();
        let adj = self.drift.check(emulated_ms, important);
        let due = self.sample_clock.advance(adj);
        self.mix_samples(due);
        due
    }

    /// Mix `frames` output frames, in chunks that never cross a millisecond
    /// boundary, advancing the clock as each millisecond completes
    pub fn mix_samples(&mut self, frames: usize) {
        let mut remaining = frames;
        while remaining > 0 {
            let left_in_ms = self.clock.samples_this_ms() - self.ms_progress;
            let chunk = remaining.min(left_in_ms).min(MAX_TICK_FRAMES);
            if !self.is_silent() {
                self.mix_frames(chunk);
            }
            self.drift.add_samples(chunk);
            self.ms_progress += chunk;
            remaining -= chunk;

            if self.ms_progress >= self.clock.samples_this_ms() {
                self.ms_progress = 0;
                if let Some(summary) = self.clock.next_millisecond() {
                    self.metrics.end_second(summary);
                }
            }
        }
    }

    /// Pull, mix and output `needed` frames
    fn mix_frames(&mut self, needed: usize) {
        let needed = needed.min(MAX_TICK_FRAMES);
        let frames_per_ms = self.clock.samples_this_ms();

        let report = {
            let mut registry = lock_registry(&self.registry);
            let mut report = registry.mix_data(needed, frames_per_ms);
            registry.render_out(&mut self.accum[..needed], &mut report);
            report
        };
        self.metrics.record_channels(report);

        self.out.clear();
        let swap = self.swap_stereo;
        self.out.extend(self.accum[..needed].iter().map(|acc| {
            let left = clip(acc[0] >> VOLUME_SHIFT);
            let right = clip(acc[1] >> VOLUME_SHIFT);
            if swap { [right, left] } else { [left, right] }
        }));

        if let Some(sink) = self.capture.as_mut() {
            if let Err(e) = sink.add_wave(self.rate, &self.out) {
                error!("Capture failed, stopping: {}", e);
                self.capture = None;
            }
        }

        let mut dropped = 0;
        if let Some(writer) = self.writer.as_mut() {
            let pushed = writer.push_frames(&self.out);
            dropped = needed - pushed;
            if dropped > 0 {
                warn!("Mixer output buffer full, dropped {} frames", dropped);
            }
            self.metrics.update_buffer_fill(writer.occupied());
        }
        self.metrics.record_output(needed, dropped);
        trace!("Mixed {} frames ({} dropped)", needed, dropped);
    }

    /// Finish any capture and release the output ring
    pub fn stop(mut self) -> Result<(), MixerError> {
        debug!(
            "Mixer stopped after {} frames ({} dropped)",
            self.metrics.total_frames_mixed, self.metrics.total_frames_dropped
        );
        self.stop_capture()
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("rate", &self.rate)
            .field("silent", &self.is_silent())
            .field("sample_accurate", &self.sample_accurate)
            .field("capturing", &self.is_capturing())
            .finish()
    }
}

#[cfg(test)]
mod tests;
