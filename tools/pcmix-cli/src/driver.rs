//! Emulated-time scheduler that drives the mixer

use pcmix_core::Mixer;

/// Advances emulated time one millisecond at a time
#[derive(Debug, Default)]
pub struct EmulatedClock {
    now_ms: f64,
}

impl EmulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Run one emulated millisecond of mixer events. Returns the frames mixed.
    ///
    /// In sample-accurate mode this issues one event per scheduled output
    /// frame, stepping emulated time by the event interval; otherwise a
    /// single tick covers the whole millisecond.
    pub fn run_millisecond(&mut self, mixer: &mut Mixer) -> usize {
        let start = self.now_ms;
        let mixed = if mixer.is_sample_accurate() {
            let interval = mixer.event_interval_ms();
            let events = mixer.samples_this_ms();
            let mut mixed = 0;
            for event in 0..events {
                mixed += mixer.sample_event(start + event as f64 * interval, false);
            }
            mixed
        } else {
            let scheduled = mixer.samples_this_ms();
            mixer.tick();
            scheduled
        };
        self.now_ms = start + 1.0;
        mixed
    }
}
