//! Consumer-side adaptive resampler
//!
//! Runs inside the host audio callback. Each call looks at how much audio is
//! buffered and picks a fixed-point step: below `min_needed` the stream is
//! stretched (step < 1), above `max_needed` it is compressed (step > 1),
//! otherwise frames are copied through. Non-unit steps walk the ring by
//! nearest-frame selection. An empty ring produces silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::ring::{OutputFrame, RingReader};

/// Fraction bits of the playback step
pub const STEP_SHIFT: u32 = 14;

/// Step that consumes exactly one buffered frame per output frame
pub const STEP_UNIT: u32 = 1 << STEP_SHIFT;

const STEP_REMAIN: u32 = STEP_UNIT - 1;

/// Longest prebuffer honoured, in milliseconds
pub const MAX_PREBUFFER_MS: u32 = 90;

/// Desired ring occupancy window, in frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyBounds {
    pub min_needed: usize,
    pub max_needed: usize,
}

impl LatencyBounds {
    pub fn new(rate: u32, blocksize: u32, prebuffer_ms: u32) -> Self {
        let prebuffer_ms = prebuffer_ms.min(MAX_PREBUFFER_MS);
        let min_needed = (u64::from(rate) * u64::from(prebuffer_ms) / 1000) as usize;
        Self {
            min_needed,
            max_needed: blocksize as usize * 2 + 2 * min_needed,
        }
    }

    /// Step for a ring currently holding `total` frames
    pub fn step_for(&self, total: usize) -> u32 {
        let scaled = (total as u64) << STEP_SHIFT;
        if total < self.min_needed {
            (scaled / self.min_needed as u64) as u32
        } else if total > self.max_needed && self.max_needed > 0 {
            (scaled / self.max_needed as u64).min(u64::from(u32::MAX)) as u32
        } else {
            STEP_UNIT
        }
    }
}

/// Counters updated by the audio callback, readable from any thread
#[derive(Debug, Default)]
pub struct PlaybackStatsShared {
    frames_played: AtomicU64,
    silence_frames: AtomicU64,
    stretched_callbacks: AtomicU64,
    compressed_callbacks: AtomicU64,
    callbacks: AtomicU64,
}

impl PlaybackStatsShared {
    pub fn snapshot(&self) -> PlaybackStats {
        PlaybackStats {
            frames_played: self.frames_played.load(Ordering::Relaxed),
            silence_frames: self.silence_frames.load(Ordering::Relaxed),
            stretched_callbacks: self.stretched_callbacks.load(Ordering::Relaxed),
            compressed_callbacks: self.compressed_callbacks.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PlaybackStatsShared`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    /// Frames taken from the ring
    pub frames_played: u64,
    /// Output frames filled with silence because the ring ran dry
    pub silence_frames: u64,
    /// Callbacks that stretched a low buffer
    pub stretched_callbacks: u64,
    /// Callbacks that compressed a high buffer
    pub compressed_callbacks: u64,
    pub callbacks: u64,
}

/// Drains the output ring into host-sized blocks
pub struct PlaybackResampler {
    reader: RingReader,
    bounds: LatencyBounds,
    stats: Arc<PlaybackStatsShared>,
}

impl PlaybackResampler {
    pub fn new(reader: RingReader, bounds: LatencyBounds) -> Self {
        Self {
            reader,
            bounds,
            stats: Arc::new(PlaybackStatsShared::default()),
        }
    }

    pub fn bounds(&self) -> LatencyBounds {
        self.bounds
    }

    /// Shared counters, for reading from outside the audio thread
    pub fn stats(&self) -> Arc<PlaybackStatsShared> {
        self.stats.clone()
    }

    pub fn buffered(&self) -> usize {
        self.reader.available()
    }

    /// Fill `out` completely. Never blocks.
    pub fn fill(&mut self, out: &mut [OutputFrame]) {
        let total = self.reader.available();
        let mut written = 0;
        let mut consumed = 0;

        if total != 0 {
            let step = self.bounds.step_for(total);
            if step == STEP_UNIT {
                while written < out.len() {
                    let chunk = self.reader.sequential();
                    if chunk.is_empty() {
                        break;
                    }
                    let count = chunk.len().min(out.len() - written);
                    out[written..written + count].copy_from_slice(&chunk[..count]);
                    self.reader.consume(count);
                    written += count;
                    consumed += count;
                }
            } else {
                if step < STEP_UNIT {
                    self.stats.stretched_callbacks.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.stats.compressed_callbacks.fetch_add(1, Ordering::Relaxed);
                }

                // TODO: interpolate between neighbouring frames instead of picking the nearest
                let mut frac: u32 = 0;
                while written < out.len() {
                    let chunk = self.reader.sequential();
                    if chunk.is_empty() {
                        break;
                    }
                    let mut index = 0;
                    while index < chunk.len() && written < out.len() {
                        out[written] = chunk[index];
                        written += 1;
                        frac = frac.saturating_add(step);
                        while index < chunk.len() && frac > STEP_REMAIN {
                            index += 1;
                            frac -= STEP_UNIT;
                        }
                    }
                    self.reader.consume(index);
                    consumed += index;
                }
            }
        }

        out[written..].fill([0; 2]);

        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);
        self.stats
            .frames_played
            .fetch_add(consumed as u64, Ordering::Relaxed);
        self.stats
            .silence_frames
            .fetch_add((out.len() - written) as u64, Ordering::Relaxed);
    }
}
