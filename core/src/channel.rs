//! Mixer channel: per-source rate conversion into a bounded render buffer
//!
//! Each channel converts its device's sample rate to the mixer rate with a
//! phase accumulator (`delta_rem`) and linear interpolation between the two
//! most recently decoded samples:
//!
//! - `delta_rem < 0`: the output position is past the current sample, so the
//!   next source sample is loaded and `delta_rem += mixer_rate`
//! - `delta_rem >= 0`: one output frame is interpolated and
//!   `delta_rem -= source_rate`
//!
//! Rendered frames wait in the render buffer until the mixdown stage consumes
//! them. The render cursor never passes the per-tick cap; source samples that
//! arrive once the cap is reached are dropped (render overrun).

use bytemuck::Pod;
use tracing::warn;

use crate::format::SampleFormat;
use crate::gain::{ChannelGain, StereoVolume};

/// Capacity of each channel's render buffer, in frames
pub const RENDER_BUFFER_SIZE: usize = 2048;

/// A rendered stereo frame (16-bit domain, scaled by the channel gain)
pub type RenderFrame = [i32; 2];

/// Cumulative counters for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Source samples requested from the handler
    pub samples_requested: u64,
    /// Source samples decoded into the interpolator
    pub samples_loaded: u64,
    /// Source samples discarded because the render buffer was full
    pub samples_discarded: u64,
    /// Times the render cap was hit with input still pending
    pub render_overruns: u64,
    /// Ticks that produced fewer frames than required
    pub underruns: u64,
}

/// One registered sound source.
///
/// Handlers receive `&mut MixerChannel` together with the number of source
/// samples due and push raw PCM with [`add_samples`](Self::add_samples) or one
/// of the typed helpers.
pub struct MixerChannel {
    name: String,
    src_rate: u32,
    mixer_rate: u32,
    /// Carry of the source-sample request (`needed * src_rate mod mixer_rate`)
    src_rate_f: u64,
    delta_rem: i64,
    last: [i64; 2],
    current: [i64; 2],
    render: Box<[RenderFrame]>,
    render_pos: usize,
    render_max: usize,
    gain: ChannelGain,
    master: StereoVolume,
    underrun_wait: usize,
    enabled: bool,
    allow_overrendering: bool,
    stats: ChannelStats,
}

impl MixerChannel {
    pub(crate) fn new(name: &str, src_rate: u32, mixer_rate: u32, master: StereoVolume) -> Self {
        Self {
            name: name.to_string(),
            src_rate,
            mixer_rate,
            src_rate_f: 0,
            delta_rem: -(mixer_rate as i64),
            last: [0; 2],
            current: [0; 2],
            render: vec![[0; 2]; RENDER_BUFFER_SIZE].into_boxed_slice(),
            render_pos: 0,
            render_max: 0,
            gain: ChannelGain::new(master),
            master,
            underrun_wait: 0,
            enabled: false,
            allow_overrendering: false,
            stats: ChannelStats::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    pub fn set_freq(&mut self, rate: u32) {
        self.src_rate = rate;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Let the channel render up to the full render buffer per tick instead
    /// of one millisecond's worth
    pub fn set_overrendering(&mut self, allow: bool) {
        self.allow_overrendering = allow;
    }

    pub fn set_volume(&mut self, left: f32, right: f32) {
        self.gain.set_volume(StereoVolume::new(left, right), self.master);
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.gain.set_scale(scale, self.master);
    }

    pub fn gain(&self) -> &ChannelGain {
        &self.gain
    }

    /// Frames still owed from an earlier underrun
    pub fn underrun_wait(&self) -> usize {
        self.underrun_wait
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Frames rendered and waiting for mixdown
    pub fn rendered(&self) -> &[RenderFrame] {
        &self.render[..self.render_pos]
    }

    pub(crate) fn set_master(&mut self, master: StereoVolume) {
        self.master = master;
        self.gain.refresh(master);
    }

    /// Set the render cap for the coming tick
    pub(crate) fn begin_tick(&mut self, frames_per_ms: usize) {
        self.render_max = if self.allow_overrendering {
            RENDER_BUFFER_SIZE
        } else {
            frames_per_ms.min(RENDER_BUFFER_SIZE)
        };
    }

    /// Number of source samples needed to produce `needed` output frames.
    ///
    /// The remainder is carried to the next call so the long-run total is exact.
    pub(crate) fn source_samples_due(&mut self, needed: usize) -> usize {
        let mixer_rate = u64::from(self.mixer_rate.max(1));
        let count = needed as u64 * u64::from(self.src_rate) + self.src_rate_f;
        self.src_rate_f = count % mixer_rate;
        let due = (count / mixer_rate) as usize;
        self.stats.samples_requested += due as u64;
        due
    }

    /// Decode and resample raw PCM in `format` into the render buffer
    pub fn add_samples(&mut self, format: SampleFormat, data: &[u8]) {
        let mut remaining = format.frame_count(data);
        let mut frames = format.frames(data);

        loop {
            if self.delta_rem >= 0 {
                if self.render_pos >= self.render_max {
                    if remaining > 0 {
                        warn!(
                            "{} unrendered source samples due to render overrun in '{}' ({} >= {})",
                            remaining, self.name, self.render_pos, self.render_max
                        );
                        self.stats.samples_discarded += remaining as u64;
                        self.stats.render_overruns += 1;
                    }
                    break;
                }
                self.render_sample();
            } else {
                let Some(frame) = frames.next() else {
                    break;
                };
                remaining -= 1;
                self.load_sample(frame, format.stereo);
            }
        }
    }

    pub fn add_samples_u8(&mut self, stereo: bool, data: &[u8]) {
        let format = if stereo {
            SampleFormat::U8_STEREO
        } else {
            SampleFormat::U8_MONO
        };
        self.add_samples(format, data);
    }

    pub fn add_samples_i8(&mut self, stereo: bool, data: &[i8]) {
        let format = if stereo {
            SampleFormat::I8_STEREO
        } else {
            SampleFormat::I8_MONO
        };
        self.add_typed(format, data);
    }

    pub fn add_samples_i16(&mut self, stereo: bool, data: &[i16]) {
        let format = if stereo {
            SampleFormat::I16_STEREO
        } else {
            SampleFormat::I16_MONO
        };
        self.add_typed(format, data);
    }

    pub fn add_samples_u16(&mut self, stereo: bool, data: &[u16]) {
        let format = if stereo {
            SampleFormat::U16_STEREO
        } else {
            SampleFormat::U16_MONO
        };
        self.add_typed(format, data);
    }

    pub fn add_samples_i32(&mut self, stereo: bool, data: &[i32]) {
        let format = if stereo {
            SampleFormat::I32_STEREO
        } else {
            SampleFormat::I32_MONO
        };
        self.add_typed(format, data);
    }

    fn add_typed<T: Pod>(&mut self, format: SampleFormat, data: &[T]) {
        self.add_samples(format, bytemuck::cast_slice(data));
    }

    /// Advance the interpolation endpoints by one decoded source frame.
    ///
    /// Gain is applied here, once per source sample. Mono sources take the
    /// left multiplier and are duplicated to the right side.
    fn load_sample(&mut self, frame: [i64; 2], stereo: bool) {
        let multiplier = self.gain.multiplier();
        self.last = self.current;
        self.current[0] = frame[0] * multiplier[0];
        self.current[1] = if stereo {
            frame[1] * multiplier[1]
        } else {
            self.current[0]
        };
        self.delta_rem += i64::from(self.mixer_rate);
        self.stats.samples_loaded += 1;
    }

    fn render_sample(&mut self) {
        if self.render_pos >= self.render_max {
            return;
        }
        let rate = i64::from(self.mixer_rate.max(1));
        // 16-bit fraction of the way from `last` to `current`
        let m = ((rate - self.delta_rem) << 16) / rate;
        let frame = &mut self.render[self.render_pos];
        for side in 0..2 {
            let value = self.last[side] + (((self.current[side] - self.last[side]) * m) >> 16);
            frame[side] = value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        }
        self.delta_rem -= i64::from(self.src_rate);
        self.render_pos += 1;
    }

    /// Drop the first `count` rendered frames, keeping the tail for the next tick
    pub(crate) fn remove_rendered(&mut self, count: usize) {
        let count = count.min(self.render_pos);
        if count != 0 {
            self.render.copy_within(count..self.render_pos, 0);
        }
        self.render_pos -= count;
    }

    /// Discard everything rendered so far
    pub(crate) fn clear_rendered(&mut self) {
        self.render_pos = 0;
    }

    /// Sum this channel's contribution to a tick of `needed` frames into `accum`.
    ///
    /// Outstanding underrun debt is repaid from the requested amount first.
    /// Consumed frames are removed from the render buffer. Returns `true` when
    /// the channel underran this tick.
    pub(crate) fn mix_into(&mut self, accum: &mut [[i64; 2]], needed: usize) -> bool {
        let due = if needed >= self.underrun_wait {
            let due = needed - self.underrun_wait;
            self.underrun_wait = 0;
            due
        } else {
            self.underrun_wait -= needed;
            0
        };

        let count = due.min(self.render_pos).min(accum.len());
        for (acc, frame) in accum.iter_mut().zip(&self.render[..count]) {
            acc[0] += i64::from(frame[0]);
            acc[1] += i64::from(frame[1]);
        }

        let underran = count != 0 && count < due;
        if underran {
            self.underrun_wait = (self.underrun_wait + (due - count)).min(needed);
            self.stats.underruns += 1;
            warn!("Channel '{}' render underrun {} < {}", self.name, count, due);
        }

        self.remove_rendered(count);
        underran
    }
}

impl std::fmt::Debug for MixerChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixerChannel")
            .field("name", &self.name)
            .field("src_rate", &self.src_rate)
            .field("enabled", &self.enabled)
            .field("render_pos", &self.render_pos)
            .field("render_max", &self.render_max)
            .field("underrun_wait", &self.underrun_wait)
            .finish()
    }
}
