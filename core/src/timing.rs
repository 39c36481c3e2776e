//! Millisecond scheduling and drift correction
//!
//! [`MillisecondClock`] decides how many frames each millisecond renders. It
//! keeps `rate / 1000` whole frames per millisecond and carries the
//! `rate % 1000` remainder Bresenham-style, so every wall-clock second renders
//! exactly `rate` frames.
//!
//! [`DriftCorrector`] and [`SampleClock`] drive precision mode, where the
//! scheduler fires once per output sample and the emulated time base may
//! wander away from the number of frames actually produced.

use tracing::warn;

/// Fraction bits of the per-sample tick accumulator
pub const TICK_SHIFT: u32 = 14;

const TICK_UNIT: i64 = 1 << TICK_SHIFT;
const TICK_REMAIN: i64 = TICK_UNIT - 1;

/// Largest correction, in milliseconds, applied per check
pub const MAX_DRIFT_CORRECTION_MS: f64 = 20.0;

const DRIFT_DAMPING: f64 = 0.075;

/// Frame accounting for one completed second
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecondSummary {
    /// Frames scheduled during the second
    pub frames: u64,
    /// Configured sample rate
    pub expected: u32,
}

/// Per-millisecond frame scheduler with an exact per-second total
#[derive(Debug, Clone)]
pub struct MillisecondClock {
    rate: u32,
    samples_per_ms: usize,
    samples_per_ms_f: u32,
    sample_f_count: u32,
    current_samples: usize,
    second_counter: u64,
    current_ms: u32,
}

impl MillisecondClock {
    pub fn new(rate: u32) -> Self {
        let samples_per_ms = (rate / 1000) as usize;
        let samples_per_ms_f = rate % 1000;
        Self {
            rate,
            samples_per_ms,
            samples_per_ms_f,
            sample_f_count: 0,
            current_samples: samples_per_ms + usize::from(samples_per_ms_f != 0),
            second_counter: 0,
            current_ms: 0,
        }
    }

    /// Frames to render in the current millisecond
    pub fn samples_this_ms(&self) -> usize {
        self.current_samples
    }

    /// Whole frames per millisecond
    pub fn samples_per_ms(&self) -> usize {
        self.samples_per_ms
    }

    /// Thousandths of a frame per millisecond
    pub fn samples_per_ms_fraction(&self) -> u32 {
        self.samples_per_ms_f
    }

    /// Milliseconds elapsed in the current second
    pub fn current_ms(&self) -> u32 {
        self.current_ms
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Close the current millisecond and schedule the next one.
    ///
    /// Returns the second's accounting when this call completes a second.
    pub fn next_millisecond(&mut self) -> Option<SecondSummary> {
        if self.current_ms == 0 {
            self.second_counter = 0;
            self.sample_f_count = 0;
        }

        self.second_counter += self.current_samples as u64;

        self.current_ms += 1;
        self.current_samples = self.samples_per_ms;
        self.sample_f_count += self.samples_per_ms_f;
        if self.sample_f_count >= 1000 {
            // Carry a whole frame out of the accumulated fraction
            self.sample_f_count -= 1000;
            self.current_samples += 1;
        }

        if self.current_ms < 1000 {
            return None;
        }

        if self.current_ms > 1000 {
            warn!("Mixer clock passed {}ms within one second", self.current_ms);
        }
        if self.sample_f_count >= 1000 {
            warn!("Mixer clock fraction overflowed ({} >= 1000)", self.sample_f_count);
        }
        if self.second_counter != u64::from(self.rate) {
            warn!(
                "Mixer rendered {} frames in the last second, expected {}",
                self.second_counter, self.rate
            );
        }
        if self.sample_f_count != 0 {
            warn!(
                "Mixer clock fraction nonzero ({}) at second boundary, accuracy may drift",
                self.sample_f_count
            );
        }

        self.current_ms = 0;
        Some(SecondSummary {
            frames: self.second_counter,
            expected: self.rate,
        })
    }
}

/// Compares frames produced against emulated elapsed time and derives a
/// damped correction for the per-sample tick interval.
///
/// The reference point is the emulated time of the first check (or of the
/// last [`reset`](Self::reset)), never a fixed origin.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    rate: u32,
    start_ms: Option<f64>,
    sample_counter: u64,
}

impl DriftCorrector {
    /// A corrector whose reference is taken from the first [`check`](Self::check)
    pub fn new(rate: u32) -> Self {
        Self {
            rate,
            start_ms: None,
            sample_counter: 0,
        }
    }

    /// A corrector referenced to `now_ms`
    pub fn with_start(rate: u32, now_ms: f64) -> Self {
        Self {
            rate,
            start_ms: Some(now_ms),
            sample_counter: 0,
        }
    }

    /// Move the reference point to `now_ms` and forget counted frames
    pub fn reset(&mut self, now_ms: f64) {
        self.start_ms = Some(now_ms);
        self.sample_counter = 0;
    }

    pub fn start_ms(&self) -> Option<f64> {
        self.start_ms
    }

    /// Count frames produced since the reference point
    pub fn add_samples(&mut self, frames: usize) {
        self.sample_counter += frames as u64;
    }

    pub fn sample_counter(&self) -> u64 {
        self.sample_counter
    }

    /// Quadratically damped correction in milliseconds for an error of
    /// `error_ms` (positive when audio is ahead of emulated time), bounded to
    /// [`MAX_DRIFT_CORRECTION_MS`]
    pub fn correction_ms(error_ms: f64) -> f64 {
        let adj = error_ms.signum() * error_ms * error_ms * DRIFT_DAMPING;
        adj.clamp(-MAX_DRIFT_CORRECTION_MS, MAX_DRIFT_CORRECTION_MS)
    }

    /// Tick adjustment, in [`TICK_SHIFT`] fixed point, for the current time.
    ///
    /// Only corrects while timing is `important` and a reference exists;
    /// otherwise the reference point is moved to `now_ms` and no correction
    /// is applied.
    pub fn check(&mut self, now_ms: f64, important: bool) -> i32 {
        let Some(start_ms) = self.start_ms.filter(|_| important) else {
            self.reset(now_ms);
            return 0;
        };

        let rate = f64::from(self.rate);
        let elapsed = now_ms - start_ms;
        let should = self.sample_counter as f64 * 1000.0 / rate;
        let adj = Self::correction_ms(should - elapsed);
        (-adj * rate * TICK_UNIT as f64 / 1000.0) as i32
    }
}

/// Per-sample event accumulator for precision mode.
///
/// Each event nominally produces one frame; drift adjustments stretch or
/// shrink that in [`TICK_SHIFT`] fixed point.
#[derive(Debug, Clone, Default)]
pub struct SampleClock {
    tick_remain: i64,
}

impl SampleClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames due for one event with adjustment `adj`
    pub fn advance(&mut self, adj: i32) -> usize {
        self.tick_remain += TICK_UNIT + i64::from(adj);
        if self.tick_remain < 0 {
            self.tick_remain = 0;
        }
        let due = (self.tick_remain >> TICK_SHIFT) as usize;
        self.tick_remain &= TICK_REMAIN;
        due
    }
}
