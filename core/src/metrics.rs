//! Producer-side health counters and diagnostics

use tracing::debug;

use crate::timing::SecondSummary;

/// Channel events collected during one mixing tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ChannelTickReport {
    pub underruns: u64,
    pub render_overruns: u64,
    pub samples_discarded: u64,
}

/// Counters for mixer health monitoring.
///
/// Per-second counters are logged and reset on every emulated second
/// boundary; `total_*` counters accumulate for the mixer's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerMetrics {
    /// Output frames mixed this second
    pub frames_mixed: u64,
    /// Output frames dropped this second because the ring was full
    pub frames_dropped: u64,
    /// Channel underruns this second
    pub channel_underruns: u64,
    /// Render overruns this second
    pub render_overruns: u64,
    /// Source samples discarded by render overruns this second
    pub samples_discarded: u64,
    /// Ring fill after the last push (frames)
    pub buffer_fill: usize,
    /// Minimum ring fill seen this second
    pub buffer_fill_min: usize,
    /// Maximum ring fill seen this second
    pub buffer_fill_max: usize,
    /// Output frames mixed since start
    pub total_frames_mixed: u64,
    /// Output frames dropped since start
    pub total_frames_dropped: u64,
    /// Emulated seconds completed
    pub seconds_elapsed: u64,
    /// Accounting of the last completed second
    pub last_second: Option<SecondSummary>,
    ring_capacity: usize,
}

impl MixerMetrics {
    pub fn new(ring_capacity: usize) -> Self {
        Self {
            frames_mixed: 0,
            frames_dropped: 0,
            channel_underruns: 0,
            render_overruns: 0,
            samples_discarded: 0,
            buffer_fill: 0,
            buffer_fill_min: ring_capacity,
            buffer_fill_max: 0,
            total_frames_mixed: 0,
            total_frames_dropped: 0,
            seconds_elapsed: 0,
            last_second: None,
            ring_capacity,
        }
    }

    pub(crate) fn record_channels(&mut self, report: ChannelTickReport) {
        self.channel_underruns += report.underruns;
        self.render_overruns += report.render_overruns;
        self.samples_discarded += report.samples_discarded;
    }

    pub(crate) fn record_output(&mut self, mixed: usize, dropped: usize) {
        self.frames_mixed += mixed as u64;
        self.total_frames_mixed += mixed as u64;
        self.frames_dropped += dropped as u64;
        self.total_frames_dropped += dropped as u64;
    }

    /// Update buffer fill metrics
    pub(crate) fn update_buffer_fill(&mut self, fill: usize) {
        self.buffer_fill = fill;
        self.buffer_fill_min = self.buffer_fill_min.min(fill);
        self.buffer_fill_max = self.buffer_fill_max.max(fill);
    }

    /// Log the finished second and reset per-second counters
    pub(crate) fn end_second(&mut self, summary: SecondSummary) {
        self.seconds_elapsed += 1;
        self.last_second = Some(summary);

        let capacity = self.ring_capacity.max(1) as f64;
        debug!(
            "MIXER METRICS: second={}, rendered={}/{}, mixed={}, dropped={}, underruns={}, \
             overruns={} ({} samples), buf={:.1}% (min={:.1}%, max={:.1}%)",
            self.seconds_elapsed,
            summary.frames,
            summary.expected,
            self.frames_mixed,
            self.frames_dropped,
            self.channel_underruns,
            self.render_overruns,
            self.samples_discarded,
            self.buffer_fill as f64 / capacity * 100.0,
            self.buffer_fill_min as f64 / capacity * 100.0,
            self.buffer_fill_max as f64 / capacity * 100.0,
        );

        self.frames_mixed = 0;
        self.frames_dropped = 0;
        self.channel_underruns = 0;
        self.render_overruns = 0;
        self.samples_discarded = 0;
        self.buffer_fill_min = self.buffer_fill;
        self.buffer_fill_max = self.buffer_fill;
    }
}
